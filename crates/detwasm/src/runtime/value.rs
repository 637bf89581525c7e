use detwasm_types::{ValType, WasmValue};

/// An untyped WebAssembly value.
///
/// Every value is carried as a 64-bit pattern; 32-bit values (`i32`, `f32`) live in the low
/// half and are always zero-extended. The type is known statically from validation, so both
/// execution strategies keep operands in this form.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct RawValue(pub u64);

impl RawValue {
    /// Attach a type, producing a [`WasmValue`].
    #[inline]
    pub fn attach_type(self, ty: ValType) -> WasmValue {
        WasmValue::from_bits(ty, self.0)
    }
}

impl core::fmt::Debug for RawValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "RawValue({:#x})", self.0)
    }
}

impl From<WasmValue> for RawValue {
    #[inline]
    fn from(value: WasmValue) -> Self {
        Self(value.to_bits())
    }
}

impl From<bool> for RawValue {
    #[inline]
    fn from(value: bool) -> Self {
        Self(value as u64)
    }
}

macro_rules! impl_from_raw_value {
    ($($t:ty => |$v:ident| $to:expr, |$r:ident| $from:expr),* $(,)?) => {
        $(
            impl From<$t> for RawValue {
                #[inline]
                fn from($v: $t) -> Self {
                    Self($to)
                }
            }

            impl From<RawValue> for $t {
                #[inline]
                fn from($r: RawValue) -> Self {
                    $from
                }
            }
        )*
    };
}

impl_from_raw_value! {
    i32 => |v| v as u32 as u64, |r| r.0 as u32 as i32,
    u32 => |v| v as u64, |r| r.0 as u32,
    i64 => |v| v as u64, |r| r.0 as i64,
    u64 => |v| v, |r| r.0,
}
