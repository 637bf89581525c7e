use super::{demote_nan, promote_nan, FloatPolicy, Format, IntTarget, F32, F64};
use crate::Trap;

/// Floating point emulated on integers.
///
/// Results do not depend on the host FPU, its rounding mode or its flush-to-zero settings.
/// All operations round to nearest, ties to even, with full subnormal support.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftFloat;

/// A finite, non-zero value `(-1)^negative * sig * 2^exp`.
#[derive(Debug, Clone, Copy)]
struct Unpacked {
    negative: bool,
    sig: u64,
    exp: i32,
}

impl Format {
    /// Lowest exponent a result bit can have (the last bit of the smallest subnormal).
    #[inline]
    const fn min_lsb(self) -> i32 {
        1 - self.bias() - self.mant_bits as i32
    }

    #[inline]
    fn unpack(self, a: u64) -> Unpacked {
        let biased = ((a >> self.mant_bits) & self.max_exp()) as i32;
        let mant = a & self.mant_mask();
        if biased == 0 {
            Unpacked { negative: self.sign(a), sig: mant, exp: self.min_lsb() }
        } else {
            Unpacked { negative: self.sign(a), sig: mant | (1 << self.mant_bits), exp: biased + self.min_lsb() - 1 }
        }
    }

    /// Like [`Format::unpack`], with the leading bit of `sig` moved to `mant_bits`.
    #[inline]
    fn unpack_normalized(self, a: u64) -> Unpacked {
        let mut v = self.unpack(a);
        let shift = v.sig.leading_zeros() - (63 - self.mant_bits);
        v.sig <<= shift;
        v.exp -= shift as i32;
        v
    }

    /// Round `(sig + sticky) * 2^exp` to this format.
    ///
    /// `sticky` marks a non-zero remainder below the last bit of `sig`. When it is set, `sig`
    /// has to carry at least two bits more than the format keeps.
    fn round_pack(self, negative: bool, sig: u128, exp: i32, sticky: bool) -> u64 {
        let (sig, exp) = if sticky { ((sig << 1) | 1, exp - 1) } else { (sig, exp) };
        if sig == 0 {
            return self.zero(negative);
        }

        let top = exp + (127 - sig.leading_zeros() as i32);
        let lsb = (top - self.mant_bits as i32).max(self.min_lsb());
        let shift = lsb - exp;

        let mut q = if shift <= 0 {
            sig << -shift
        } else if shift > 128 {
            0
        } else {
            let (q, rem) = if shift == 128 { (0, sig) } else { (sig >> shift, sig & ((1 << shift) - 1)) };
            let half = 1u128 << (shift - 1);
            if rem > half || (rem == half && q & 1 == 1) { q + 1 } else { q }
        };

        let mut lsb = lsb;
        if q >> (self.mant_bits + 1) != 0 {
            q >>= 1;
            lsb += 1;
        }

        let sign = if negative { self.sign_bit() } else { 0 };
        if q >> self.mant_bits == 0 {
            return sign | q as u64;
        }

        let biased = lsb + self.mant_bits as i32 + self.bias();
        if biased >= self.max_exp() as i32 {
            return self.infinity(negative);
        }
        sign | ((biased as u64) << self.mant_bits) | (q as u64 & self.mant_mask())
    }

    fn add(self, a: u64, b: u64) -> u64 {
        if let Some(nan) = self.propagate(a, b) {
            return nan;
        }

        match (self.is_infinite(a), self.is_infinite(b)) {
            (true, true) if self.sign(a) != self.sign(b) => return self.canonical_nan(),
            (true, _) => return a,
            (_, true) => return b,
            _ => {}
        }

        match (self.is_zero(a), self.is_zero(b)) {
            (true, true) => return a & b,
            (true, false) => return b,
            (false, true) => return a,
            _ => {}
        }

        let (x, y) = {
            let (x, y) = (self.unpack(a), self.unpack(b));
            if x.exp >= y.exp { (x, y) } else { (y, x) }
        };

        // align both operands on x's exponent with 64 guard bits
        let exp = x.exp - 64;
        let big = (x.sig as u128) << 64;
        let small = shift_right_jam((y.sig as u128) << 64, (x.exp - y.exp) as u32);

        if x.negative == y.negative {
            return self.round_pack(x.negative, big + small, exp, false);
        }

        match big.cmp(&small) {
            core::cmp::Ordering::Greater => self.round_pack(x.negative, big - small, exp, false),
            core::cmp::Ordering::Less => self.round_pack(y.negative, small - big, exp, false),
            core::cmp::Ordering::Equal => self.zero(false),
        }
    }

    fn sub(self, a: u64, b: u64) -> u64 {
        if let Some(nan) = self.propagate(a, b) {
            return nan;
        }
        self.add(a, b ^ self.sign_bit())
    }

    fn mul(self, a: u64, b: u64) -> u64 {
        if let Some(nan) = self.propagate(a, b) {
            return nan;
        }

        let negative = self.sign(a) != self.sign(b);
        let (a_inf, b_inf) = (self.is_infinite(a), self.is_infinite(b));
        let (a_zero, b_zero) = (self.is_zero(a), self.is_zero(b));
        if (a_inf && b_zero) || (b_inf && a_zero) {
            return self.canonical_nan();
        }
        if a_inf || b_inf {
            return self.infinity(negative);
        }
        if a_zero || b_zero {
            return self.zero(negative);
        }

        let (x, y) = (self.unpack(a), self.unpack(b));
        self.round_pack(negative, x.sig as u128 * y.sig as u128, x.exp + y.exp, false)
    }

    fn div(self, a: u64, b: u64) -> u64 {
        if let Some(nan) = self.propagate(a, b) {
            return nan;
        }

        let negative = self.sign(a) != self.sign(b);
        let (a_inf, b_inf) = (self.is_infinite(a), self.is_infinite(b));
        let (a_zero, b_zero) = (self.is_zero(a), self.is_zero(b));
        if (a_inf && b_inf) || (a_zero && b_zero) {
            return self.canonical_nan();
        }
        if a_inf || b_zero {
            return self.infinity(negative);
        }
        if b_inf || a_zero {
            return self.zero(negative);
        }

        let (x, y) = (self.unpack_normalized(a), self.unpack_normalized(b));
        let shift = self.mant_bits + 4;
        let dividend = (x.sig as u128) << shift;
        let divisor = y.sig as u128;
        let (q, rem) = (dividend / divisor, dividend % divisor);
        self.round_pack(negative, q, x.exp - y.exp - shift as i32, rem != 0)
    }

    fn sqrt(self, a: u64) -> u64 {
        if self.is_nan(a) {
            return self.quiet(a);
        }
        if self.is_zero(a) {
            return a;
        }
        if self.sign(a) {
            return self.canonical_nan();
        }
        if self.is_infinite(a) {
            return a;
        }

        let mut v = self.unpack_normalized(a);
        if v.exp & 1 != 0 {
            v.sig <<= 1;
            v.exp -= 1;
        }

        // even, so the exponent halves exactly
        let shift = (self.mant_bits + 6) & !1;
        let (root, rem) = isqrt((v.sig as u128) << shift);
        self.round_pack(false, root, (v.exp - shift as i32) / 2, rem != 0)
    }

    fn round_to_int(self, a: u64, mode: Rounding) -> u64 {
        if self.is_nan(a) {
            return self.quiet(a);
        }
        if self.is_infinite(a) || self.is_zero(a) {
            return a;
        }

        let negative = self.sign(a);
        let exp = ((a >> self.mant_bits) & self.max_exp()) as i32 - self.bias();
        if exp >= self.mant_bits as i32 {
            return a;
        }

        let one = (self.bias() as u64) << self.mant_bits;
        if exp < 0 {
            let away = match mode {
                Rounding::Trunc => false,
                Rounding::Floor => negative,
                Rounding::Ceil => !negative,
                // above one half (exp == -1 and a non-zero fraction)
                Rounding::Nearest => exp == -1 && a & self.mant_mask() != 0,
            };
            return self.zero(negative) | if away { one } else { 0 };
        }

        let frac_bits = self.mant_bits - exp as u32;
        let unit = 1u64 << frac_bits;
        let frac = a & (unit - 1);
        if frac == 0 {
            return a;
        }

        let base = a & !(unit - 1);
        let away = match mode {
            Rounding::Trunc => false,
            Rounding::Floor => negative,
            Rounding::Ceil => !negative,
            Rounding::Nearest => {
                let half = unit >> 1;
                frac > half || (frac == half && base & unit != 0)
            }
        };

        // adding one unit to the pattern carries into the exponent when needed
        if away { base + unit } else { base }
    }

    fn eq(self, a: u64, b: u64) -> bool {
        if self.is_nan(a) || self.is_nan(b) {
            return false;
        }
        a == b || (self.is_zero(a) && self.is_zero(b))
    }

    fn lt(self, a: u64, b: u64) -> bool {
        if self.is_nan(a) || self.is_nan(b) || (self.is_zero(a) && self.is_zero(b)) {
            return false;
        }

        match (self.sign(a), self.sign(b)) {
            (true, false) => true,
            (false, true) => false,
            (false, false) => a < b,
            (true, true) => self.magnitude(a) > self.magnitude(b),
        }
    }

    fn le(self, a: u64, b: u64) -> bool {
        self.lt(a, b) || self.eq(a, b)
    }

    /// Convert a finite, non-zero value of another format.
    fn convert_from(self, from: Format, a: u64) -> u64 {
        let v = from.unpack(a);
        self.round_pack(v.negative, v.sig as u128, v.exp, false)
    }

    fn from_int(self, raw: u64, from: IntTarget) -> u64 {
        let (negative, magnitude) = from.sign_magnitude(raw);
        self.round_pack(negative, magnitude as u128, 0, false)
    }

    fn to_int(self, a: u64, to: IntTarget) -> Result<u64, Trap> {
        if self.is_nan(a) {
            return Err(Trap::InvalidConversionToInt);
        }
        if self.is_infinite(a) {
            return Err(Trap::IntegerOverflow);
        }
        if self.is_zero(a) {
            return Ok(0);
        }

        let v = self.unpack(a);
        let magnitude = match v.exp {
            // at least 2^64, out of range for every target
            exp if exp > 64 - self.mant_bits as i32 => return Err(Trap::IntegerOverflow),
            exp if exp >= 0 => (v.sig as u128) << exp,
            exp if exp > -64 => (v.sig >> -exp) as u128,
            _ => 0,
        };

        u64::try_from(magnitude)
            .ok()
            .and_then(|magnitude| to.from_sign_magnitude(v.negative, magnitude))
            .ok_or(Trap::IntegerOverflow)
    }
}

#[derive(Debug, Clone, Copy)]
enum Rounding {
    Ceil,
    Floor,
    Trunc,
    Nearest,
}

/// Shift right, folding every bit shifted out into the lowest bit.
#[inline]
fn shift_right_jam(v: u128, n: u32) -> u128 {
    match n {
        0 => v,
        n if n < 128 => (v >> n) | ((v << (128 - n)) != 0) as u128,
        _ => (v != 0) as u128,
    }
}

/// Integer square root and remainder.
fn isqrt(n: u128) -> (u128, u128) {
    let mut rem = n;
    let mut root = 0u128;
    let mut bit = 1u128 << 126;
    while bit > n {
        bit >>= 2;
    }

    while bit != 0 {
        if rem >= root + bit {
            rem -= root + bit;
            root = (root >> 1) + bit;
        } else {
            root >>= 1;
        }
        bit >>= 2;
    }
    (root, rem)
}

impl FloatPolicy for SoftFloat {
    const NAME: &'static str = "softfloat";

    fn f32_add(a: u32, b: u32) -> u32 {
        F32.add(a as u64, b as u64) as u32
    }

    fn f32_sub(a: u32, b: u32) -> u32 {
        F32.sub(a as u64, b as u64) as u32
    }

    fn f32_mul(a: u32, b: u32) -> u32 {
        F32.mul(a as u64, b as u64) as u32
    }

    fn f32_div(a: u32, b: u32) -> u32 {
        F32.div(a as u64, b as u64) as u32
    }

    fn f32_sqrt(a: u32) -> u32 {
        F32.sqrt(a as u64) as u32
    }

    fn f32_ceil(a: u32) -> u32 {
        F32.round_to_int(a as u64, Rounding::Ceil) as u32
    }

    fn f32_floor(a: u32) -> u32 {
        F32.round_to_int(a as u64, Rounding::Floor) as u32
    }

    fn f32_trunc(a: u32) -> u32 {
        F32.round_to_int(a as u64, Rounding::Trunc) as u32
    }

    fn f32_nearest(a: u32) -> u32 {
        F32.round_to_int(a as u64, Rounding::Nearest) as u32
    }

    fn f32_eq(a: u32, b: u32) -> bool {
        F32.eq(a as u64, b as u64)
    }

    fn f32_lt(a: u32, b: u32) -> bool {
        F32.lt(a as u64, b as u64)
    }

    fn f32_le(a: u32, b: u32) -> bool {
        F32.le(a as u64, b as u64)
    }

    fn f64_add(a: u64, b: u64) -> u64 {
        F64.add(a, b)
    }

    fn f64_sub(a: u64, b: u64) -> u64 {
        F64.sub(a, b)
    }

    fn f64_mul(a: u64, b: u64) -> u64 {
        F64.mul(a, b)
    }

    fn f64_div(a: u64, b: u64) -> u64 {
        F64.div(a, b)
    }

    fn f64_sqrt(a: u64) -> u64 {
        F64.sqrt(a)
    }

    fn f64_ceil(a: u64) -> u64 {
        F64.round_to_int(a, Rounding::Ceil)
    }

    fn f64_floor(a: u64) -> u64 {
        F64.round_to_int(a, Rounding::Floor)
    }

    fn f64_trunc(a: u64) -> u64 {
        F64.round_to_int(a, Rounding::Trunc)
    }

    fn f64_nearest(a: u64) -> u64 {
        F64.round_to_int(a, Rounding::Nearest)
    }

    fn f64_eq(a: u64, b: u64) -> bool {
        F64.eq(a, b)
    }

    fn f64_lt(a: u64, b: u64) -> bool {
        F64.lt(a, b)
    }

    fn f64_le(a: u64, b: u64) -> bool {
        F64.le(a, b)
    }

    fn f32_demote(a: u64) -> u32 {
        if F64.is_nan(a) {
            return demote_nan(a);
        }
        if F64.is_infinite(a) {
            return F32.infinity(F64.sign(a)) as u32;
        }
        if F64.is_zero(a) {
            return F32.zero(F64.sign(a)) as u32;
        }
        F32.convert_from(F64, a) as u32
    }

    fn f64_promote(a: u32) -> u64 {
        let a = a as u64;
        if F32.is_nan(a) {
            return promote_nan(a as u32);
        }
        if F32.is_infinite(a) {
            return F64.infinity(F32.sign(a));
        }
        if F32.is_zero(a) {
            return F64.zero(F32.sign(a));
        }
        F64.convert_from(F32, a)
    }

    fn f32_convert(raw: u64, from: IntTarget) -> u32 {
        F32.from_int(raw, from) as u32
    }

    fn f64_convert(raw: u64, from: IntTarget) -> u64 {
        F64.from_int(raw, from)
    }

    fn f32_trunc_int(a: u32, to: IntTarget) -> Result<u64, Trap> {
        F32.to_int(a as u64, to)
    }

    fn f64_trunc_int(a: u64, to: IntTarget) -> Result<u64, Trap> {
        F64.to_int(a, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HardFloat;

    // xorshift64*, biased towards the interesting corners of the encoding
    struct Operands(u64);

    impl Operands {
        fn next_u64(&mut self) -> u64 {
            self.0 ^= self.0 >> 12;
            self.0 ^= self.0 << 25;
            self.0 ^= self.0 >> 27;
            self.0.wrapping_mul(0x2545_f491_4f6c_dd1d)
        }

        fn f64(&mut self) -> u64 {
            let r = self.next_u64();
            match r % 8 {
                0 => r & 0x800f_ffff_ffff_ffff,                   // subnormal
                1 => (r & 0x8000_0000_0000_ffff) | 0x7ff0_0000_0000_0000, // inf / nan
                2 => (r & 0x8000_0000_0000_0000) | SPECIAL_F64[(r >> 8) as usize % SPECIAL_F64.len()],
                3 => (r & 0xc3ff_ffff_ffff_ffff) | 0x4300_0000_0000_0000, // around 2^52..2^64
                _ => r,
            }
        }

        fn f32(&mut self) -> u32 {
            let r = self.next_u64() as u32;
            match r % 8 {
                0 => r & 0x807f_ffff,
                1 => (r & 0x8000_00ff) | 0x7f80_0000,
                2 => (r & 0x8000_0000) | SPECIAL_F32[(r >> 8) as usize % SPECIAL_F32.len()],
                3 => (r & 0xc1ff_ffff) | 0x4b00_0000,
                _ => r,
            }
        }
    }

    const SPECIAL_F32: &[u32] = &[0, 1, 0x3f00_0000, 0x3f80_0000, 0x3fc0_0000, 0x4f00_0000, 0x5f00_0000, 0x7f7f_ffff, 0x0080_0000];
    const SPECIAL_F64: &[u64] = &[
        0,
        1,
        0x3fe0_0000_0000_0000,
        0x3ff0_0000_0000_0000,
        0x3ff8_0000_0000_0000,
        0x41e0_0000_0000_0000,
        0x43e0_0000_0000_0000,
        0x7fef_ffff_ffff_ffff,
        0x0010_0000_0000_0000,
        0x47ef_ffff_e000_0000,
        0x3690_0000_0000_0000,
    ];

    const ROUNDS: usize = 20_000;
    const TARGETS: [IntTarget; 4] = [IntTarget::I32, IntTarget::U32, IntTarget::I64, IntTarget::U64];

    macro_rules! agree {
        ($op:ident($($arg:expr),*)) => {{
            let (soft, hard) = (SoftFloat::$op($($arg),*), HardFloat::$op($($arg),*));
            assert_eq!(soft, hard, "{}({:x?})", stringify!($op), ($($arg),*));
        }};
    }

    #[test]
    fn f32_agrees_with_hardware() {
        let mut rng = Operands(0x9e37_79b9_7f4a_7c15);
        for _ in 0..ROUNDS {
            let (a, b) = (rng.f32(), rng.f32());
            agree!(f32_add(a, b));
            agree!(f32_sub(a, b));
            agree!(f32_mul(a, b));
            agree!(f32_div(a, b));
            agree!(f32_min(a, b));
            agree!(f32_max(a, b));
            agree!(f32_sqrt(a));
            agree!(f32_ceil(a));
            agree!(f32_floor(a));
            agree!(f32_trunc(a));
            agree!(f32_nearest(a));
            agree!(f32_eq(a, b));
            agree!(f32_lt(a, b));
            agree!(f32_le(a, b));
            agree!(f64_promote(a));
            let raw = rng.next_u64();
            for to in TARGETS {
                agree!(f32_trunc_int(a, to));
                agree!(f32_convert(raw, to));
            }
        }
    }

    #[test]
    fn f64_agrees_with_hardware() {
        let mut rng = Operands(0x0123_4567_89ab_cdef);
        for _ in 0..ROUNDS {
            let (a, b) = (rng.f64(), rng.f64());
            agree!(f64_add(a, b));
            agree!(f64_sub(a, b));
            agree!(f64_mul(a, b));
            agree!(f64_div(a, b));
            agree!(f64_min(a, b));
            agree!(f64_max(a, b));
            agree!(f64_sqrt(a));
            agree!(f64_ceil(a));
            agree!(f64_floor(a));
            agree!(f64_trunc(a));
            agree!(f64_nearest(a));
            agree!(f64_eq(a, b));
            agree!(f64_lt(a, b));
            agree!(f64_le(a, b));
            agree!(f32_demote(a));
            let raw = rng.next_u64();
            for to in TARGETS {
                agree!(f64_trunc_int(a, to));
                agree!(f64_convert(raw, to));
            }
        }
    }

    #[test]
    fn demote_sweep() {
        for i in 0..65536u64 {
            for j in [-1i64, 0, 1] {
                let a = (i << 48).wrapping_add(j as u64);
                agree!(f32_demote(a));
            }
        }
    }

    #[test]
    fn rounding_edges() {
        // ties go to even
        assert_eq!(SoftFloat::f64_nearest(2.5f64.to_bits()), 2.0f64.to_bits());
        assert_eq!(SoftFloat::f64_nearest(3.5f64.to_bits()), 4.0f64.to_bits());
        assert_eq!(SoftFloat::f32_nearest((-0.5f32).to_bits()), (-0.0f32).to_bits());
        assert_eq!(SoftFloat::f32_ceil((-0.25f32).to_bits()), (-0.0f32).to_bits());
        assert_eq!(SoftFloat::f32_floor(0.25f32.to_bits()), 0);
        assert_eq!(SoftFloat::f64_floor((-1.5f64).to_bits()), (-2.0f64).to_bits());

        // largest subnormal rounds up into the normal range
        assert_eq!(SoftFloat::f32_demote(0x380f_ffff_f000_0000), 0x0080_0000);
        // overflow to infinity
        assert_eq!(SoftFloat::f32_demote(f64::MAX.to_bits()), f32::INFINITY.to_bits());
        // smallest f64 subnormal vanishes
        assert_eq!(SoftFloat::f32_demote(0x0000_8000_0000_0001), 0);
        assert_eq!(SoftFloat::f32_demote(0x8000_0000_0000_0001), 0x8000_0000);
    }

    #[test]
    fn special_arithmetic() {
        let inf = f64::INFINITY.to_bits();
        assert_eq!(SoftFloat::f64_add(inf, f64::NEG_INFINITY.to_bits()), 0x7ff8_0000_0000_0000);
        assert_eq!(SoftFloat::f64_mul(0, inf), 0x7ff8_0000_0000_0000);
        assert_eq!(SoftFloat::f64_div(1.0f64.to_bits(), (-0.0f64).to_bits()), f64::NEG_INFINITY.to_bits());
        assert_eq!(SoftFloat::f64_sub(1.0f64.to_bits(), 1.0f64.to_bits()), 0);
        assert_eq!(SoftFloat::f32_add((-0.0f32).to_bits(), (-0.0f32).to_bits()), 0x8000_0000);
        assert_eq!(SoftFloat::f32_sqrt(4.0f32.to_bits()), 2.0f32.to_bits());
        assert_eq!(SoftFloat::f32_sqrt((-0.0f32).to_bits()), 0x8000_0000);
        assert_eq!(SoftFloat::f32_div(1.0f32.to_bits(), 3.0f32.to_bits()), (1.0f32 / 3.0).to_bits());
    }
}
