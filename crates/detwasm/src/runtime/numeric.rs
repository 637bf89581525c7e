use detwasm_types::Instruction;

use super::RawValue;
use crate::float::{self, FloatPolicy, IntTarget};
use crate::{Error, Result, Trap};

pub(crate) type UnaryFn = fn(RawValue) -> Result<RawValue>;
pub(crate) type BinaryFn = fn(RawValue, RawValue) -> Result<RawValue>;

/// A numeric instruction, resolved to the function that computes it.
///
/// Binary operations take the operands in stack order: the second argument was on top.
#[derive(Clone, Copy)]
pub(crate) enum NumericOp {
    Unary(UnaryFn),
    Binary(BinaryFn),
}

/// Apply a unary function to a typed operand
macro_rules! un {
    (|$a:ident: $t:ty| $body:expr) => {
        NumericOp::Unary(|a| {
            let $a: $t = a.into();
            Ok(RawValue::from($body))
        })
    };
}

/// Apply a binary function to typed operands
macro_rules! bin {
    (|$a:ident: $ta:ty, $b:ident: $tb:ty| $body:expr) => {
        NumericOp::Binary(|a, b| {
            let ($a, $b): ($ta, $tb) = (a.into(), b.into());
            Ok(RawValue::from($body))
        })
    };
}

/// Like `bin!`, for operations that can trap
macro_rules! bin_checked {
    (|$a:ident: $ta:ty, $b:ident: $tb:ty| $body:expr) => {
        NumericOp::Binary(|a, b| {
            let ($a, $b): ($ta, $tb) = (a.into(), b.into());
            let result: core::result::Result<_, Trap> = $body;
            Ok(RawValue::from(result?))
        })
    };
}

/// Like `un!`, for conversions that can trap
macro_rules! un_checked {
    (|$a:ident: $t:ty| $body:expr) => {
        NumericOp::Unary(|a| {
            let $a: $t = a.into();
            let result: core::result::Result<_, Trap> = $body;
            Ok(RawValue::from(result?))
        })
    };
}

macro_rules! div_rem {
    (signed $a:ident / $b:ident) => {
        match $b {
            0 => Err(Trap::DivisionByZero),
            _ => $a.checked_div($b).ok_or(Trap::IntegerOverflow),
        }
    };
    (signed $a:ident % $b:ident) => {
        match $b {
            0 => Err(Trap::DivisionByZero),
            _ => Ok($a.wrapping_rem($b)),
        }
    };
    (unsigned $a:ident $op:tt $b:ident) => {
        match $b {
            0 => Err(Trap::DivisionByZero),
            _ => Ok($a $op $b),
        }
    };
}

/// Resolve a numeric instruction. Returns `None` for everything that is not a pure
/// operation on stack values.
#[rustfmt::skip]
pub(crate) fn numeric_op<F: FloatPolicy>(instr: &Instruction) -> Option<NumericOp> {
    use Instruction::*;
    use IntTarget::{I32 as TI32, I64 as TI64, U32 as TU32, U64 as TU64};

    Some(match instr {
        I32Eqz => un!(|a: i32| a == 0),
        I32Eq => bin!(|a: i32, b: i32| a == b),
        I32Ne => bin!(|a: i32, b: i32| a != b),
        I32LtS => bin!(|a: i32, b: i32| a < b),
        I32LtU => bin!(|a: u32, b: u32| a < b),
        I32GtS => bin!(|a: i32, b: i32| a > b),
        I32GtU => bin!(|a: u32, b: u32| a > b),
        I32LeS => bin!(|a: i32, b: i32| a <= b),
        I32LeU => bin!(|a: u32, b: u32| a <= b),
        I32GeS => bin!(|a: i32, b: i32| a >= b),
        I32GeU => bin!(|a: u32, b: u32| a >= b),

        I64Eqz => un!(|a: i64| a == 0),
        I64Eq => bin!(|a: i64, b: i64| a == b),
        I64Ne => bin!(|a: i64, b: i64| a != b),
        I64LtS => bin!(|a: i64, b: i64| a < b),
        I64LtU => bin!(|a: u64, b: u64| a < b),
        I64GtS => bin!(|a: i64, b: i64| a > b),
        I64GtU => bin!(|a: u64, b: u64| a > b),
        I64LeS => bin!(|a: i64, b: i64| a <= b),
        I64LeU => bin!(|a: u64, b: u64| a <= b),
        I64GeS => bin!(|a: i64, b: i64| a >= b),
        I64GeU => bin!(|a: u64, b: u64| a >= b),

        F32Eq => bin!(|a: u32, b: u32| F::f32_eq(a, b)),
        F32Ne => bin!(|a: u32, b: u32| F::f32_ne(a, b)),
        F32Lt => bin!(|a: u32, b: u32| F::f32_lt(a, b)),
        F32Gt => bin!(|a: u32, b: u32| F::f32_gt(a, b)),
        F32Le => bin!(|a: u32, b: u32| F::f32_le(a, b)),
        F32Ge => bin!(|a: u32, b: u32| F::f32_ge(a, b)),
        F64Eq => bin!(|a: u64, b: u64| F::f64_eq(a, b)),
        F64Ne => bin!(|a: u64, b: u64| F::f64_ne(a, b)),
        F64Lt => bin!(|a: u64, b: u64| F::f64_lt(a, b)),
        F64Gt => bin!(|a: u64, b: u64| F::f64_gt(a, b)),
        F64Le => bin!(|a: u64, b: u64| F::f64_le(a, b)),
        F64Ge => bin!(|a: u64, b: u64| F::f64_ge(a, b)),

        I32Clz => un!(|a: u32| a.leading_zeros()),
        I32Ctz => un!(|a: u32| a.trailing_zeros()),
        I32Popcnt => un!(|a: u32| a.count_ones()),
        I32Add => bin!(|a: u32, b: u32| a.wrapping_add(b)),
        I32Sub => bin!(|a: u32, b: u32| a.wrapping_sub(b)),
        I32Mul => bin!(|a: u32, b: u32| a.wrapping_mul(b)),
        I32DivS => bin_checked!(|a: i32, b: i32| div_rem!(signed a / b)),
        I32DivU => bin_checked!(|a: u32, b: u32| div_rem!(unsigned a / b)),
        I32RemS => bin_checked!(|a: i32, b: i32| div_rem!(signed a % b)),
        I32RemU => bin_checked!(|a: u32, b: u32| div_rem!(unsigned a % b)),
        I32And => bin!(|a: u32, b: u32| a & b),
        I32Or => bin!(|a: u32, b: u32| a | b),
        I32Xor => bin!(|a: u32, b: u32| a ^ b),
        I32Shl => bin!(|a: u32, b: u32| a.wrapping_shl(b)),
        I32ShrS => bin!(|a: i32, b: u32| a.wrapping_shr(b)),
        I32ShrU => bin!(|a: u32, b: u32| a.wrapping_shr(b)),
        I32Rotl => bin!(|a: u32, b: u32| a.rotate_left(b)),
        I32Rotr => bin!(|a: u32, b: u32| a.rotate_right(b)),

        I64Clz => un!(|a: u64| a.leading_zeros() as u64),
        I64Ctz => un!(|a: u64| a.trailing_zeros() as u64),
        I64Popcnt => un!(|a: u64| a.count_ones() as u64),
        I64Add => bin!(|a: u64, b: u64| a.wrapping_add(b)),
        I64Sub => bin!(|a: u64, b: u64| a.wrapping_sub(b)),
        I64Mul => bin!(|a: u64, b: u64| a.wrapping_mul(b)),
        I64DivS => bin_checked!(|a: i64, b: i64| div_rem!(signed a / b)),
        I64DivU => bin_checked!(|a: u64, b: u64| div_rem!(unsigned a / b)),
        I64RemS => bin_checked!(|a: i64, b: i64| div_rem!(signed a % b)),
        I64RemU => bin_checked!(|a: u64, b: u64| div_rem!(unsigned a % b)),
        I64And => bin!(|a: u64, b: u64| a & b),
        I64Or => bin!(|a: u64, b: u64| a | b),
        I64Xor => bin!(|a: u64, b: u64| a ^ b),
        I64Shl => bin!(|a: u64, b: u64| a.wrapping_shl(b as u32)),
        I64ShrS => bin!(|a: i64, b: u64| a.wrapping_shr(b as u32)),
        I64ShrU => bin!(|a: u64, b: u64| a.wrapping_shr(b as u32)),
        I64Rotl => bin!(|a: u64, b: u64| a.rotate_left((b % 64) as u32)),
        I64Rotr => bin!(|a: u64, b: u64| a.rotate_right((b % 64) as u32)),

        F32Abs => un!(|a: u32| float::f32_abs(a)),
        F32Neg => un!(|a: u32| float::f32_neg(a)),
        F32Ceil => un!(|a: u32| F::f32_ceil(a)),
        F32Floor => un!(|a: u32| F::f32_floor(a)),
        F32Trunc => un!(|a: u32| F::f32_trunc(a)),
        F32Nearest => un!(|a: u32| F::f32_nearest(a)),
        F32Sqrt => un!(|a: u32| F::f32_sqrt(a)),
        F32Add => bin!(|a: u32, b: u32| F::f32_add(a, b)),
        F32Sub => bin!(|a: u32, b: u32| F::f32_sub(a, b)),
        F32Mul => bin!(|a: u32, b: u32| F::f32_mul(a, b)),
        F32Div => bin!(|a: u32, b: u32| F::f32_div(a, b)),
        F32Min => bin!(|a: u32, b: u32| F::f32_min(a, b)),
        F32Max => bin!(|a: u32, b: u32| F::f32_max(a, b)),
        F32Copysign => bin!(|a: u32, b: u32| float::f32_copysign(a, b)),

        F64Abs => un!(|a: u64| float::f64_abs(a)),
        F64Neg => un!(|a: u64| float::f64_neg(a)),
        F64Ceil => un!(|a: u64| F::f64_ceil(a)),
        F64Floor => un!(|a: u64| F::f64_floor(a)),
        F64Trunc => un!(|a: u64| F::f64_trunc(a)),
        F64Nearest => un!(|a: u64| F::f64_nearest(a)),
        F64Sqrt => un!(|a: u64| F::f64_sqrt(a)),
        F64Add => bin!(|a: u64, b: u64| F::f64_add(a, b)),
        F64Sub => bin!(|a: u64, b: u64| F::f64_sub(a, b)),
        F64Mul => bin!(|a: u64, b: u64| F::f64_mul(a, b)),
        F64Div => bin!(|a: u64, b: u64| F::f64_div(a, b)),
        F64Min => bin!(|a: u64, b: u64| F::f64_min(a, b)),
        F64Max => bin!(|a: u64, b: u64| F::f64_max(a, b)),
        F64Copysign => bin!(|a: u64, b: u64| float::f64_copysign(a, b)),

        I32WrapI64 => un!(|a: u64| a as u32),
        I64ExtendI32S => un!(|a: i32| a as i64),
        I64ExtendI32U => un!(|a: u32| a as u64),
        I32Extend8S => un!(|a: i32| a as i8 as i32),
        I32Extend16S => un!(|a: i32| a as i16 as i32),
        I64Extend8S => un!(|a: i64| a as i8 as i64),
        I64Extend16S => un!(|a: i64| a as i16 as i64),
        I64Extend32S => un!(|a: i64| a as i32 as i64),

        I32TruncF32S => un_checked!(|a: u32| F::f32_trunc_int(a, TI32)),
        I32TruncF32U => un_checked!(|a: u32| F::f32_trunc_int(a, TU32)),
        I32TruncF64S => un_checked!(|a: u64| F::f64_trunc_int(a, TI32)),
        I32TruncF64U => un_checked!(|a: u64| F::f64_trunc_int(a, TU32)),
        I64TruncF32S => un_checked!(|a: u32| F::f32_trunc_int(a, TI64)),
        I64TruncF32U => un_checked!(|a: u32| F::f32_trunc_int(a, TU64)),
        I64TruncF64S => un_checked!(|a: u64| F::f64_trunc_int(a, TI64)),
        I64TruncF64U => un_checked!(|a: u64| F::f64_trunc_int(a, TU64)),

        I32TruncSatF32S => un!(|a: u32| F::f32_trunc_sat(a, TI32)),
        I32TruncSatF32U => un!(|a: u32| F::f32_trunc_sat(a, TU32)),
        I32TruncSatF64S => un!(|a: u64| F::f64_trunc_sat(a, TI32)),
        I32TruncSatF64U => un!(|a: u64| F::f64_trunc_sat(a, TU32)),
        I64TruncSatF32S => un!(|a: u32| F::f32_trunc_sat(a, TI64)),
        I64TruncSatF32U => un!(|a: u32| F::f32_trunc_sat(a, TU64)),
        I64TruncSatF64S => un!(|a: u64| F::f64_trunc_sat(a, TI64)),
        I64TruncSatF64U => un!(|a: u64| F::f64_trunc_sat(a, TU64)),

        F32ConvertI32S => un!(|a: u64| F::f32_convert(a, TI32)),
        F32ConvertI32U => un!(|a: u64| F::f32_convert(a, TU32)),
        F32ConvertI64S => un!(|a: u64| F::f32_convert(a, TI64)),
        F32ConvertI64U => un!(|a: u64| F::f32_convert(a, TU64)),
        F64ConvertI32S => un!(|a: u64| F::f64_convert(a, TI32)),
        F64ConvertI32U => un!(|a: u64| F::f64_convert(a, TU32)),
        F64ConvertI64S => un!(|a: u64| F::f64_convert(a, TI64)),
        F64ConvertI64U => un!(|a: u64| F::f64_convert(a, TU64)),
        F32DemoteF64 => un!(|a: u64| F::f32_demote(a)),
        F64PromoteF32 => un!(|a: u32| F::f64_promote(a)),

        // values are kept as bit patterns already
        I32ReinterpretF32 | I64ReinterpretF64 | F32ReinterpretI32 | F64ReinterpretI64 => un!(|a: u64| a),

        _ => return None,
    })
}

impl NumericOp {
    /// Resolve a numeric instruction, or fail for anything else.
    pub(crate) fn resolve<F: FloatPolicy>(instr: &Instruction) -> Result<Self> {
        numeric_op::<F>(instr).ok_or_else(|| {
            crate::cold();
            Error::UnsupportedFeature(alloc::format!("instruction {instr:?}"))
        })
    }
}
