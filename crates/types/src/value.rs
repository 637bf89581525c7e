use core::fmt::Debug;

use crate::ConstInstruction;

/// A WebAssembly value.
///
/// Floats are compared by bit pattern: two NaNs are equal only if their payloads match,
/// and `+0.0 != -0.0`. This is what a deterministic engine has to promise, so equality
/// follows it.
///
/// See <https://webassembly.github.io/spec/core/syntax/types.html#value-types>
#[derive(Clone, Copy)]
pub enum WasmValue {
    /// A 32-bit integer.
    I32(i32),
    /// A 64-bit integer.
    I64(i64),
    /// A 32-bit float.
    F32(f32),
    /// A 64-bit float.
    F64(f64),
}

impl WasmValue {
    /// Get the default value for a given type.
    #[inline]
    pub fn default_for(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Self::I32(0),
            ValType::I64 => Self::I64(0),
            ValType::F32 => Self::F32(0.0),
            ValType::F64 => Self::F64(0.0),
        }
    }

    /// Build a value of the given type from its raw bit pattern.
    #[inline]
    pub fn from_bits(ty: ValType, bits: u64) -> Self {
        match ty {
            ValType::I32 => Self::I32(bits as u32 as i32),
            ValType::I64 => Self::I64(bits as i64),
            ValType::F32 => Self::F32(f32::from_bits(bits as u32)),
            ValType::F64 => Self::F64(f64::from_bits(bits)),
        }
    }

    /// The raw bit pattern of the value, zero-extended to 64 bits.
    #[inline]
    pub fn to_bits(&self) -> u64 {
        match self {
            Self::I32(i) => *i as u32 as u64,
            Self::I64(i) => *i as u64,
            Self::F32(f) => f.to_bits() as u64,
            Self::F64(f) => f.to_bits(),
        }
    }

    #[inline]
    pub fn const_instr(&self) -> ConstInstruction {
        match self {
            Self::I32(i) => ConstInstruction::I32Const(*i),
            Self::I64(i) => ConstInstruction::I64Const(*i),
            Self::F32(f) => ConstInstruction::F32Const(f.to_bits()),
            Self::F64(f) => ConstInstruction::F64Const(f.to_bits()),
        }
    }

    /// Get the type of a [`WasmValue`]
    #[inline]
    pub fn val_type(&self) -> ValType {
        match self {
            Self::I32(_) => ValType::I32,
            Self::I64(_) => ValType::I64,
            Self::F32(_) => ValType::F32,
            Self::F64(_) => ValType::F64,
        }
    }
}

impl PartialEq for WasmValue {
    fn eq(&self, other: &Self) -> bool {
        self.val_type() == other.val_type() && self.to_bits() == other.to_bits()
    }
}

impl Eq for WasmValue {}

impl Debug for WasmValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WasmValue::I32(i) => write!(f, "i32({i})"),
            WasmValue::I64(i) => write!(f, "i64({i})"),
            WasmValue::F32(v) => write!(f, "f32({v}, {:#010x})", v.to_bits()),
            WasmValue::F64(v) => write!(f, "f64({v}, {:#018x})", v.to_bits()),
        }
    }
}

/// Type of a WebAssembly value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValType {
    /// A 32-bit integer.
    I32,
    /// A 64-bit integer.
    I64,
    /// A 32-bit float.
    F32,
    /// A 64-bit float.
    F64,
}

impl ValType {
    #[inline]
    pub fn default_value(&self) -> WasmValue {
        WasmValue::default_for(*self)
    }
}

macro_rules! impl_conversion_for_wasmvalue {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl From<$t> for WasmValue {
                #[inline]
                fn from(i: $t) -> Self {
                    Self::$variant(i)
                }
            }

            impl TryFrom<WasmValue> for $t {
                type Error = ();

                #[inline]
                fn try_from(value: WasmValue) -> Result<Self, Self::Error> {
                    if let WasmValue::$variant(i) = value {
                        Ok(i)
                    } else {
                        Err(())
                    }
                }
            }
        )*
    }
}

impl_conversion_for_wasmvalue! {
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64
}
