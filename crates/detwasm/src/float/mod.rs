//! Floating point semantics.
//!
//! Every floating point opcode goes through a [`FloatPolicy`]. Policies work on raw bit
//! patterns (`u32` for `f32`, `u64` for `f64`) so values never have to pass through a host
//! float register unless the policy decides to.
//!
//! Both policies follow the same NaN rule, implemented once in this module:
//!
//! * a NaN operand is returned with its quiet bit set, the first operand winning if both
//!   are NaN (this includes `min` and `max`);
//! * an invalid operation on non-NaN operands (`inf - inf`, `0 * inf`, `0 / 0`, `inf / inf`,
//!   `sqrt(-1)`) produces the positive canonical NaN;
//! * `promote` widens the payload, `demote` keeps its top bits, and both set the quiet bit.
//!
//! Everything else is plain IEEE-754 with round-to-nearest-even, which is why
//! [`SoftFloat`] and [`HardFloat`] agree bit for bit.

use crate::{Result, Trap};

mod hard;
#[cfg(not(feature = "std"))]
mod no_std_floats;
mod soft;

pub use hard::HardFloat;
pub use soft::SoftFloat;

/// The integer side of a float/int conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntTarget {
    /// `i32`, sign-extended from the low 32 bits of the raw value.
    I32,
    /// `u32`, the low 32 bits of the raw value.
    U32,
    /// `i64`
    I64,
    /// `u64`
    U64,
}

impl IntTarget {
    /// Split a raw integer into its sign and magnitude.
    #[inline]
    pub fn sign_magnitude(self, raw: u64) -> (bool, u64) {
        match self {
            Self::I32 => {
                let v = raw as u32 as i32;
                (v < 0, v.unsigned_abs() as u64)
            }
            Self::U32 => (false, raw as u32 as u64),
            Self::I64 => {
                let v = raw as i64;
                (v < 0, v.unsigned_abs())
            }
            Self::U64 => (false, raw),
        }
    }

    /// The smallest value of the target, as a raw value.
    pub fn min_raw(self) -> u64 {
        match self {
            Self::I32 => i32::MIN as u32 as u64,
            Self::I64 => i64::MIN as u64,
            Self::U32 | Self::U64 => 0,
        }
    }

    /// The largest value of the target, as a raw value.
    pub fn max_raw(self) -> u64 {
        match self {
            Self::I32 => i32::MAX as u64,
            Self::U32 => u32::MAX as u64,
            Self::I64 => i64::MAX as u64,
            Self::U64 => u64::MAX,
        }
    }

    /// Build the raw value of `-magnitude` / `magnitude`, if it is in range.
    pub fn from_sign_magnitude(self, negative: bool, magnitude: u64) -> Option<u64> {
        let limit = match (self, negative) {
            (Self::I32, true) => 1 << 31,
            (Self::I32, false) => i32::MAX as u64,
            (Self::U32, false) => u32::MAX as u64,
            (Self::I64, true) => 1 << 63,
            (Self::I64, false) => i64::MAX as u64,
            (Self::U64, false) => u64::MAX,
            (Self::U32 | Self::U64, true) => 0,
        };
        if magnitude > limit {
            return None;
        }

        Some(match (self, negative) {
            (Self::I32, true) => (magnitude as u32).wrapping_neg() as u64,
            (Self::I64, true) => magnitude.wrapping_neg(),
            _ => magnitude,
        })
    }
}

/// IEEE-754 arithmetic on bit patterns.
///
/// Implementors provide the operations whose rounding matters. Sign manipulation, `min`,
/// `max`, the derived comparisons and saturating truncation are provided on top of them
/// and shared by every policy.
pub trait FloatPolicy: Copy + core::fmt::Debug + Default + 'static {
    /// A short name, used in logs and benchmark ids.
    const NAME: &'static str;

    fn f32_add(a: u32, b: u32) -> u32;
    fn f32_sub(a: u32, b: u32) -> u32;
    fn f32_mul(a: u32, b: u32) -> u32;
    fn f32_div(a: u32, b: u32) -> u32;
    fn f32_sqrt(a: u32) -> u32;
    fn f32_ceil(a: u32) -> u32;
    fn f32_floor(a: u32) -> u32;
    fn f32_trunc(a: u32) -> u32;
    fn f32_nearest(a: u32) -> u32;
    fn f32_eq(a: u32, b: u32) -> bool;
    fn f32_lt(a: u32, b: u32) -> bool;
    fn f32_le(a: u32, b: u32) -> bool;

    fn f64_add(a: u64, b: u64) -> u64;
    fn f64_sub(a: u64, b: u64) -> u64;
    fn f64_mul(a: u64, b: u64) -> u64;
    fn f64_div(a: u64, b: u64) -> u64;
    fn f64_sqrt(a: u64) -> u64;
    fn f64_ceil(a: u64) -> u64;
    fn f64_floor(a: u64) -> u64;
    fn f64_trunc(a: u64) -> u64;
    fn f64_nearest(a: u64) -> u64;
    fn f64_eq(a: u64, b: u64) -> bool;
    fn f64_lt(a: u64, b: u64) -> bool;
    fn f64_le(a: u64, b: u64) -> bool;

    /// `f32.demote_f64`
    fn f32_demote(a: u64) -> u32;
    /// `f64.promote_f32`
    fn f64_promote(a: u32) -> u64;

    /// `f32.convert_*`, rounding to nearest even.
    fn f32_convert(raw: u64, from: IntTarget) -> u32;
    /// `f64.convert_*`, rounding to nearest even.
    fn f64_convert(raw: u64, from: IntTarget) -> u64;

    /// `*.trunc_f32_*`: the raw integer, or a trap for NaN and out of range values.
    fn f32_trunc_int(a: u32, to: IntTarget) -> Result<u64, Trap>;
    /// `*.trunc_f64_*`: the raw integer, or a trap for NaN and out of range values.
    fn f64_trunc_int(a: u64, to: IntTarget) -> Result<u64, Trap>;

    #[inline]
    fn f32_ne(a: u32, b: u32) -> bool {
        !Self::f32_eq(a, b)
    }

    #[inline]
    fn f32_gt(a: u32, b: u32) -> bool {
        Self::f32_lt(b, a)
    }

    #[inline]
    fn f32_ge(a: u32, b: u32) -> bool {
        Self::f32_le(b, a)
    }

    #[inline]
    fn f64_ne(a: u64, b: u64) -> bool {
        !Self::f64_eq(a, b)
    }

    #[inline]
    fn f64_gt(a: u64, b: u64) -> bool {
        Self::f64_lt(b, a)
    }

    #[inline]
    fn f64_ge(a: u64, b: u64) -> bool {
        Self::f64_le(b, a)
    }

    fn f32_min(a: u32, b: u32) -> u32 {
        if let Some(nan) = F32.propagate(a as u64, b as u64) {
            return nan as u32;
        }
        if F32.is_zero(a as u64) && F32.is_zero(b as u64) {
            return a | b;
        }
        if Self::f32_lt(a, b) { a } else { b }
    }

    fn f32_max(a: u32, b: u32) -> u32 {
        if let Some(nan) = F32.propagate(a as u64, b as u64) {
            return nan as u32;
        }
        if F32.is_zero(a as u64) && F32.is_zero(b as u64) {
            return a & b;
        }
        if Self::f32_lt(b, a) { a } else { b }
    }

    fn f64_min(a: u64, b: u64) -> u64 {
        if let Some(nan) = F64.propagate(a, b) {
            return nan;
        }
        if F64.is_zero(a) && F64.is_zero(b) {
            return a | b;
        }
        if Self::f64_lt(a, b) { a } else { b }
    }

    fn f64_max(a: u64, b: u64) -> u64 {
        if let Some(nan) = F64.propagate(a, b) {
            return nan;
        }
        if F64.is_zero(a) && F64.is_zero(b) {
            return a & b;
        }
        if Self::f64_lt(b, a) { a } else { b }
    }

    /// `*.trunc_sat_f32_*`
    fn f32_trunc_sat(a: u32, to: IntTarget) -> u64 {
        saturate(Self::f32_trunc_int(a, to), F32.sign(a as u64), to)
    }

    /// `*.trunc_sat_f64_*`
    fn f64_trunc_sat(a: u64, to: IntTarget) -> u64 {
        saturate(Self::f64_trunc_int(a, to), F64.sign(a), to)
    }
}

fn saturate(result: Result<u64, Trap>, negative: bool, to: IntTarget) -> u64 {
    match result {
        Ok(v) => v,
        Err(Trap::InvalidConversionToInt) => 0,
        Err(_) if negative => to.min_raw(),
        Err(_) => to.max_raw(),
    }
}

/// Layout of an IEEE-754 binary format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Format {
    pub(crate) mant_bits: u32,
    pub(crate) exp_bits: u32,
}

pub(crate) const F32: Format = Format { mant_bits: 23, exp_bits: 8 };
pub(crate) const F64: Format = Format { mant_bits: 52, exp_bits: 11 };

impl Format {
    #[inline]
    pub(crate) const fn bias(self) -> i32 {
        (1 << (self.exp_bits - 1)) - 1
    }

    /// The all-ones biased exponent of infinities and NaNs.
    #[inline]
    pub(crate) const fn max_exp(self) -> u64 {
        (1 << self.exp_bits) - 1
    }

    #[inline]
    pub(crate) const fn sign_bit(self) -> u64 {
        1 << (self.mant_bits + self.exp_bits)
    }

    #[inline]
    pub(crate) const fn mant_mask(self) -> u64 {
        (1 << self.mant_bits) - 1
    }

    #[inline]
    pub(crate) const fn exp_mask(self) -> u64 {
        self.max_exp() << self.mant_bits
    }

    #[inline]
    pub(crate) const fn quiet_bit(self) -> u64 {
        1 << (self.mant_bits - 1)
    }

    #[inline]
    pub(crate) const fn canonical_nan(self) -> u64 {
        self.exp_mask() | self.quiet_bit()
    }

    #[inline]
    pub(crate) const fn infinity(self, negative: bool) -> u64 {
        self.exp_mask() | if negative { self.sign_bit() } else { 0 }
    }

    #[inline]
    pub(crate) const fn zero(self, negative: bool) -> u64 {
        if negative { self.sign_bit() } else { 0 }
    }

    #[inline]
    pub(crate) const fn magnitude(self, a: u64) -> u64 {
        a & !self.sign_bit()
    }

    #[inline]
    pub(crate) const fn sign(self, a: u64) -> bool {
        a & self.sign_bit() != 0
    }

    #[inline]
    pub(crate) const fn is_nan(self, a: u64) -> bool {
        self.magnitude(a) > self.exp_mask()
    }

    #[inline]
    pub(crate) const fn is_infinite(self, a: u64) -> bool {
        self.magnitude(a) == self.exp_mask()
    }

    #[inline]
    pub(crate) const fn is_zero(self, a: u64) -> bool {
        self.magnitude(a) == 0
    }

    #[inline]
    pub(crate) const fn quiet(self, a: u64) -> u64 {
        a | self.quiet_bit()
    }

    /// The NaN result of a binary operation, if either operand is NaN.
    #[inline]
    pub(crate) fn propagate(self, a: u64, b: u64) -> Option<u64> {
        if self.is_nan(a) {
            Some(self.quiet(a))
        } else if self.is_nan(b) {
            Some(self.quiet(b))
        } else {
            None
        }
    }

    /// The result of an operation whose native result was NaN.
    #[inline]
    pub(crate) fn nan_result(self, a: u64, b: u64) -> u64 {
        self.propagate(a, b).unwrap_or(self.canonical_nan())
    }
}

/// `f32.demote_f64` of a NaN: sign and top payload bits, quieted.
#[inline]
pub(crate) fn demote_nan(a: u64) -> u32 {
    let sign = ((a >> 63) as u32) << 31;
    sign | F32.canonical_nan() as u32 | ((a >> (F64.mant_bits - F32.mant_bits)) as u32 & F32.mant_mask() as u32)
}

/// `f64.promote_f32` of a NaN: payload widened, quieted.
#[inline]
pub(crate) fn promote_nan(a: u32) -> u64 {
    let sign = ((a >> 31) as u64) << 63;
    let payload = (a as u64 & F32.mant_mask()) << (F64.mant_bits - F32.mant_bits);
    sign | F64.canonical_nan() | payload
}

#[inline]
pub(crate) fn f32_abs(a: u32) -> u32 {
    a & 0x7fff_ffff
}

#[inline]
pub(crate) fn f32_neg(a: u32) -> u32 {
    a ^ 0x8000_0000
}

#[inline]
pub(crate) fn f32_copysign(a: u32, b: u32) -> u32 {
    (a & 0x7fff_ffff) | (b & 0x8000_0000)
}

#[inline]
pub(crate) fn f64_abs(a: u64) -> u64 {
    a & 0x7fff_ffff_ffff_ffff
}

#[inline]
pub(crate) fn f64_neg(a: u64) -> u64 {
    a ^ 0x8000_0000_0000_0000
}

#[inline]
pub(crate) fn f64_copysign(a: u64, b: u64) -> u64 {
    (a & 0x7fff_ffff_ffff_ffff) | (b & 0x8000_0000_0000_0000)
}
