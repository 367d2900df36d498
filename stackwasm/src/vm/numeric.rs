//! Numeric instruction semantics that are not a single Rust operator: trapping division,
//! NaN-aware `min`/`max`, and checked float-to-integer truncation.

use crate::error::Trap;

macro_rules! int_div {
    ($div_s:ident, $rem_s:ident, $div_u:ident, $rem_u:ident, $s:ty, $u:ty) => {
        #[inline]
        pub fn $div_s(a: $s, b: $s) -> Result<$s, Trap> {
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            a.checked_div(b).ok_or(Trap::IntegerOverflow)
        }

        /// `MIN % -1` is 0, not an overflow.
        #[inline]
        pub fn $rem_s(a: $s, b: $s) -> Result<$s, Trap> {
            if b == 0 {
                return Err(Trap::IntegerDivideByZero);
            }
            Ok(a.wrapping_rem(b))
        }

        #[inline]
        pub fn $div_u(a: $u, b: $u) -> Result<$u, Trap> {
            a.checked_div(b).ok_or(Trap::IntegerDivideByZero)
        }

        #[inline]
        pub fn $rem_u(a: $u, b: $u) -> Result<$u, Trap> {
            a.checked_rem(b).ok_or(Trap::IntegerDivideByZero)
        }
    };
}

int_div!(i32_div_s, i32_rem_s, i32_div_u, i32_rem_u, i32, u32);
int_div!(i64_div_s, i64_rem_s, i64_div_u, i64_rem_u, i64, u64);

macro_rules! float_min_max {
    ($min:ident, $max:ident, $t:ty) => {
        #[inline]
        pub fn $min(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return <$t>::NAN;
            }
            if a == b {
                // only differs for -0 / +0
                return if a.is_sign_negative() { a } else { b };
            }
            a.min(b)
        }

        #[inline]
        pub fn $max(a: $t, b: $t) -> $t {
            if a.is_nan() || b.is_nan() {
                return <$t>::NAN;
            }
            if a == b {
                return if a.is_sign_positive() { a } else { b };
            }
            a.max(b)
        }
    };
}

float_min_max!(f32_min, f32_max, f32);
float_min_max!(f64_min, f64_max, f64);

// Bounds are exact powers of two, so the f64 comparisons below are exact for f32 inputs too.
const TWO_31: f64 = 2_147_483_648.0;
const TWO_32: f64 = 4_294_967_296.0;
const TWO_63: f64 = 9_223_372_036_854_775_808.0;
const TWO_64: f64 = 18_446_744_073_709_551_616.0;

#[inline]
fn truncate(x: f64, min_exclusive: f64, max_exclusive: f64) -> Result<f64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    if t <= min_exclusive || t >= max_exclusive {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t)
}

#[inline]
pub fn trunc_i32(x: f64) -> Result<i32, Trap> {
    truncate(x, -TWO_31 - 1.0, TWO_31).map(|t| t as i32)
}

#[inline]
pub fn trunc_u32(x: f64) -> Result<u32, Trap> {
    truncate(x, -1.0, TWO_32).map(|t| t as u32)
}

#[inline]
pub fn trunc_i64(x: f64) -> Result<i64, Trap> {
    if x.is_nan() {
        return Err(Trap::InvalidConversionToInteger);
    }
    let t = x.trunc();
    // -2^63 is representable, -2^63 - 1 is not distinguishable in f64
    if t < -TWO_63 || t >= TWO_63 {
        return Err(Trap::IntegerOverflow);
    }
    Ok(t as i64)
}

#[inline]
pub fn trunc_u64(x: f64) -> Result<u64, Trap> {
    truncate(x, -1.0, TWO_64).map(|t| t as u64)
}

/// Float `abs`, `neg` and `copysign` only touch the sign bit, so NaN payloads pass through.
pub mod sign {
    pub const F32_SIGN: u32 = 1 << 31;
    pub const F64_SIGN: u64 = 1 << 63;

    #[inline]
    pub fn f32_copysign(a: u32, b: u32) -> u32 {
        (a & !F32_SIGN) | (b & F32_SIGN)
    }

    #[inline]
    pub fn f64_copysign(a: u64, b: u64) -> u64 {
        (a & !F64_SIGN) | (b & F64_SIGN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn division_traps() {
        assert_eq!(i32_div_s(7, 0), Err(Trap::IntegerDivideByZero));
        assert_eq!(i32_div_s(i32::MIN, -1), Err(Trap::IntegerOverflow));
        assert_eq!(i32_rem_s(i32::MIN, -1), Ok(0));
        assert_eq!(i32_div_s(-7, 2), Ok(-3));
        assert_eq!(i32_rem_s(-7, 2), Ok(-1));
        assert_eq!(i64_div_u(u64::MAX, 2), Ok(u64::MAX / 2));
        assert_eq!(i64_rem_u(1, 0), Err(Trap::IntegerDivideByZero));
    }

    #[test]
    fn min_max_order_signed_zero() {
        assert!(f32_min(0.0, -0.0).is_sign_negative());
        assert!(f32_min(-0.0, 0.0).is_sign_negative());
        assert!(f64_max(-0.0, 0.0).is_sign_positive());
        assert!(f64_min(f64::NAN, 1.0).is_nan());
        assert!(f32_max(1.0, f32::NAN).is_nan());
        assert_eq!(f64_max(1.0, 2.0), 2.0);
    }

    #[test]
    fn truncation_bounds() {
        assert_eq!(trunc_i32(-2_147_483_648.9), Ok(i32::MIN));
        assert_eq!(trunc_i32(2_147_483_647.9), Ok(i32::MAX));
        assert_eq!(trunc_i32(2_147_483_648.0), Err(Trap::IntegerOverflow));
        assert_eq!(trunc_i32(f64::NAN), Err(Trap::InvalidConversionToInteger));
        assert_eq!(trunc_u32(-0.9), Ok(0));
        assert_eq!(trunc_u32(-1.0), Err(Trap::IntegerOverflow));
        assert_eq!(trunc_i64(-TWO_63), Ok(i64::MIN));
        assert_eq!(trunc_i64(TWO_63), Err(Trap::IntegerOverflow));
        assert_eq!(trunc_u64(TWO_64), Err(Trap::IntegerOverflow));
        assert_eq!(trunc_u64(f64::INFINITY), Err(Trap::IntegerOverflow));
    }

    #[test]
    fn copysign_keeps_payload() {
        let nan = 0x7FC0_0001u32;
        assert_eq!(sign::f32_copysign(nan, (-1.0f32).to_bits()), nan | sign::F32_SIGN);
        assert_eq!(
            f64::from_bits(sign::f64_copysign(2.0f64.to_bits(), (-0.0f64).to_bits())),
            -2.0
        );
    }
}
