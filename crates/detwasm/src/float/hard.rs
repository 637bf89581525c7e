use super::{demote_nan, promote_nan, FloatPolicy, IntTarget, F32, F64};
use crate::{unlikely, Trap};

#[cfg(not(feature = "std"))]
#[allow(unused_imports)]
use super::no_std_floats::FExt;

/// Floating point on the host FPU.
///
/// Operations map to native `f32`/`f64` arithmetic (or `libm` without `std`). Whenever the
/// native result is a NaN it is replaced according to the shared NaN rule, because the NaN
/// a host produces differs between architectures.
#[derive(Debug, Clone, Copy, Default)]
pub struct HardFloat;

/// Doing the actual conversion from float to int is a bit tricky, because
/// we need to check for overflow. This macro generates the exclusive bounds
/// for a specific conversion, which are then used in the actual conversion.
#[rustfmt::skip]
macro_rules! float_min_max {
    (f32, i32) => {(-2147483904.0_f32, 2147483648.0_f32)};
    (f64, i32) => {(-2147483649.0_f64, 2147483648.0_f64)};
    (f32, u32) => {(-1.0_f32, 4294967296.0_f32)}; // 2^32
    (f64, u32) => {(-1.0_f64, 4294967296.0_f64)}; // 2^32
    (f32, i64) => {(-9223373136366403584.0_f32, 9223372036854775808.0_f32)}; // 2^63 + 2^40 | 2^63
    (f64, i64) => {(-9223372036854777856.0_f64, 9223372036854775808.0_f64)}; // 2^63 + 2^11 | 2^63
    (f32, u64) => {(-1.0_f32, 18446744073709551616.0_f32)}; // 2^64
    (f64, u64) => {(-1.0_f64, 18446744073709551616.0_f64)}; // 2^64
    // other conversions are not allowed
    ($from:ty, $to:ty) => {compile_error!("invalid float conversion")};
}

/// Truncate a float to an integer, trapping on NaN and out of range values
macro_rules! checked_conv_float {
    ($v:expr, $from:tt, $to:tt) => {{
        let v = $v;
        let (min, max) = float_min_max!($from, $to);
        if unlikely(v.is_nan()) {
            return Err(Trap::InvalidConversionToInt);
        }
        if unlikely(v <= min || v >= max) {
            return Err(Trap::IntegerOverflow);
        }
        Ok(v as $to as u64)
    }};
}

macro_rules! binary_op {
    ($name:ident, $bits:ty, $float:ty, $format:expr, $op:tt) => {
        #[inline]
        fn $name(a: $bits, b: $bits) -> $bits {
            let result = (<$float>::from_bits(a) $op <$float>::from_bits(b)).to_bits();
            if $format.is_nan(result as u64) {
                return $format.nan_result(a as u64, b as u64) as $bits;
            }
            result
        }
    };
}

macro_rules! unary_op {
    ($name:ident, $bits:ty, $float:ty, $format:expr, |$v:ident| $body:expr) => {
        #[inline]
        fn $name(a: $bits) -> $bits {
            let $v = <$float>::from_bits(a);
            let result = ($body).to_bits();
            if $format.is_nan(result as u64) {
                return $format.nan_result(a as u64, a as u64) as $bits;
            }
            result
        }
    };
}

impl FloatPolicy for HardFloat {
    const NAME: &'static str = "hardfloat";

    binary_op!(f32_add, u32, f32, F32, +);
    binary_op!(f32_sub, u32, f32, F32, -);
    binary_op!(f32_mul, u32, f32, F32, *);
    binary_op!(f32_div, u32, f32, F32, /);
    unary_op!(f32_sqrt, u32, f32, F32, |v| v.sqrt());
    unary_op!(f32_ceil, u32, f32, F32, |v| v.ceil());
    unary_op!(f32_floor, u32, f32, F32, |v| v.floor());
    unary_op!(f32_trunc, u32, f32, F32, |v| v.trunc());
    unary_op!(f32_nearest, u32, f32, F32, |v| v.round_ties_even());

    binary_op!(f64_add, u64, f64, F64, +);
    binary_op!(f64_sub, u64, f64, F64, -);
    binary_op!(f64_mul, u64, f64, F64, *);
    binary_op!(f64_div, u64, f64, F64, /);
    unary_op!(f64_sqrt, u64, f64, F64, |v| v.sqrt());
    unary_op!(f64_ceil, u64, f64, F64, |v| v.ceil());
    unary_op!(f64_floor, u64, f64, F64, |v| v.floor());
    unary_op!(f64_trunc, u64, f64, F64, |v| v.trunc());
    unary_op!(f64_nearest, u64, f64, F64, |v| v.round_ties_even());

    #[inline]
    fn f32_eq(a: u32, b: u32) -> bool {
        f32::from_bits(a) == f32::from_bits(b)
    }

    #[inline]
    fn f32_lt(a: u32, b: u32) -> bool {
        f32::from_bits(a) < f32::from_bits(b)
    }

    #[inline]
    fn f32_le(a: u32, b: u32) -> bool {
        f32::from_bits(a) <= f32::from_bits(b)
    }

    #[inline]
    fn f64_eq(a: u64, b: u64) -> bool {
        f64::from_bits(a) == f64::from_bits(b)
    }

    #[inline]
    fn f64_lt(a: u64, b: u64) -> bool {
        f64::from_bits(a) < f64::from_bits(b)
    }

    #[inline]
    fn f64_le(a: u64, b: u64) -> bool {
        f64::from_bits(a) <= f64::from_bits(b)
    }

    fn f32_demote(a: u64) -> u32 {
        if F64.is_nan(a) {
            return demote_nan(a);
        }
        (f64::from_bits(a) as f32).to_bits()
    }

    fn f64_promote(a: u32) -> u64 {
        if F32.is_nan(a as u64) {
            return promote_nan(a);
        }
        (f32::from_bits(a) as f64).to_bits()
    }

    fn f32_convert(raw: u64, from: IntTarget) -> u32 {
        let v = match from {
            IntTarget::I32 => raw as u32 as i32 as f32,
            IntTarget::U32 => raw as u32 as f32,
            IntTarget::I64 => raw as i64 as f32,
            IntTarget::U64 => raw as f32,
        };
        v.to_bits()
    }

    fn f64_convert(raw: u64, from: IntTarget) -> u64 {
        let v = match from {
            IntTarget::I32 => raw as u32 as i32 as f64,
            IntTarget::U32 => raw as u32 as f64,
            IntTarget::I64 => raw as i64 as f64,
            IntTarget::U64 => raw as f64,
        };
        v.to_bits()
    }

    fn f32_trunc_int(a: u32, to: IntTarget) -> Result<u64, Trap> {
        let v = f32::from_bits(a);
        match to {
            IntTarget::I32 => checked_conv_float!(v, f32, i32).map(|r| r as u32 as u64),
            IntTarget::U32 => checked_conv_float!(v, f32, u32),
            IntTarget::I64 => checked_conv_float!(v, f32, i64),
            IntTarget::U64 => checked_conv_float!(v, f32, u64),
        }
    }

    fn f64_trunc_int(a: u64, to: IntTarget) -> Result<u64, Trap> {
        let v = f64::from_bits(a);
        match to {
            IntTarget::I32 => checked_conv_float!(v, f64, i32).map(|r| r as u32 as u64),
            IntTarget::U32 => checked_conv_float!(v, f64, u32),
            IntTarget::I64 => checked_conv_float!(v, f64, i64),
            IntTarget::U64 => checked_conv_float!(v, f64, u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_nans_are_replaced() {
        let inf = f32::INFINITY.to_bits();
        assert_eq!(HardFloat::f32_sub(inf, inf), 0x7fc0_0000);
        assert_eq!(HardFloat::f32_add(0x7f80_0001, 0x3f80_0000), 0x7fc0_0001);
        assert_eq!(HardFloat::f64_sqrt((-1.0f64).to_bits()), 0x7ff8_0000_0000_0000);
        assert_eq!(HardFloat::f64_nearest(0xfff0_0000_0000_0001), 0xfff8_0000_0000_0001);
    }

    #[test]
    fn truncation_bounds() {
        assert_eq!(HardFloat::f32_trunc_int((-1.5f32).to_bits(), IntTarget::I32), Ok(0xffff_ffff));
        assert_eq!(HardFloat::f32_trunc_int((-0.9f32).to_bits(), IntTarget::U32), Ok(0));
        assert_eq!(HardFloat::f64_trunc_int(4294967296.0f64.to_bits(), IntTarget::U32), Err(Trap::IntegerOverflow));
        assert_eq!(HardFloat::f64_trunc_int(f64::NAN.to_bits(), IntTarget::I64), Err(Trap::InvalidConversionToInt));
        assert_eq!(HardFloat::f64_trunc_sat(f64::NEG_INFINITY.to_bits(), IntTarget::I32), 0x8000_0000);
        assert_eq!(HardFloat::f32_trunc_sat(f32::INFINITY.to_bits(), IntTarget::U64), u64::MAX);
    }

    #[test]
    fn signed_zero_min_max() {
        let (pos, neg) = (0.0f32.to_bits(), (-0.0f32).to_bits());
        assert_eq!(HardFloat::f32_min(pos, neg), neg);
        assert_eq!(HardFloat::f32_max(neg, pos), pos);
    }
}
