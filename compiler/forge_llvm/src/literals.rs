//! Constant formatting.
//!
//! Integers emit as decimal text. Floats emit in LLVM's hex constant
//! forms: `half` uses 16-bit hex with the `0xH` prefix, `float` and
//! `double` use the 64-bit double encoding, and `fp128` uses the `0xL`
//! 128-bit encoding. The half and quad conversions are exact bit
//! manipulations (round-to-nearest-even for half), so special values land
//! on their canonical patterns.

/// Convert to IEEE half bits with round-to-nearest-even.
pub fn f16_bits(value: f64) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 63) as u16) << 15;
    let exp = ((bits >> 52) & 0x7ff) as i64;
    let mant = bits & 0x000f_ffff_ffff_ffff;

    if exp == 0x7ff {
        // Inf keeps a zero mantissa; NaN canonicalizes to the quiet bit.
        return if mant == 0 { sign | 0x7c00 } else { sign | 0x7e00 };
    }

    let e = exp - 1023;
    if e > 15 {
        return sign | 0x7c00;
    }
    if e >= -14 {
        // Normal range. Rounding may carry into the exponent, and from
        // there into infinity.
        let mut he = (e + 15) as u16;
        let mut hm = (mant >> 42) as u16;
        let rem = mant & 0x3ff_ffff_ffff;
        let halfway = 1u64 << 41;
        if rem > halfway || (rem == halfway && (hm & 1) == 1) {
            hm += 1;
            if hm == 0x400 {
                hm = 0;
                he += 1;
            }
        }
        if he >= 31 {
            return sign | 0x7c00;
        }
        return sign | (he << 10) | hm;
    }
    if e < -25 {
        // Below half the smallest subnormal: rounds to zero.
        return sign;
    }

    // Subnormal range: shift the full 53-bit significand into place.
    let full = (1u64 << 52) | mant;
    let shift = (28 - e) as u32;
    let mut hm = (full >> shift) as u16;
    let rem = full & ((1u64 << shift) - 1);
    let halfway = 1u64 << (shift - 1);
    if rem > halfway || (rem == halfway && (hm & 1) == 1) {
        hm += 1;
    }
    // hm == 0x400 means we rounded up into the smallest normal; the bit
    // pattern is already correct for that case.
    sign | hm
}

/// Widen to IEEE quad bits. Every double is exactly representable.
pub fn f128_bits(value: f64) -> u128 {
    let bits = value.to_bits();
    let sign = u128::from(bits >> 63) << 127;
    let exp = (bits >> 52) & 0x7ff;
    let mant = u128::from(bits & 0x000f_ffff_ffff_ffff);

    if exp == 0x7ff {
        let inf = 0x7fffu128 << 112;
        return if mant == 0 {
            sign | inf
        } else {
            sign | inf | (1u128 << 111)
        };
    }
    if exp == 0 {
        if mant == 0 {
            return sign;
        }
        // Subnormal double becomes a normal quad: normalize the mantissa.
        let p = 127 - i64::from(mant.leading_zeros());
        let e128 = (p - 1074 + 16383) as u128;
        let frac = (mant ^ (1u128 << p)) << (112 - p);
        return sign | (e128 << 112) | frac;
    }
    let e128 = u128::from(exp) + 16383 - 1023;
    sign | (e128 << 112) | (mant << 60)
}

/// Format a float constant for the given LLVM primitive type.
pub fn float_constant(prim: &str, value: f64) -> String {
    match prim {
        "half" => format!("0xH{:04X}", f16_bits(value)),
        "fp128" => format!("0xL{:032X}", f128_bits(value)),
        "float" => {
            // LLVM prints float constants in double hex, with the value
            // first rounded to single precision.
            #[allow(clippy::cast_possible_truncation)]
            let narrowed = value as f32;
            format!("0x{:016X}", f64::from(narrowed).to_bits())
        }
        _ => format!("0x{:016X}", value.to_bits()),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn half_normals() {
        assert_eq!(f16_bits(1.0), 0x3C00);
        assert_eq!(f16_bits(-2.5), 0xC100);
        assert_eq!(f16_bits(65504.0), 0x7BFF);
    }

    #[test]
    fn half_specials() {
        assert_eq!(f16_bits(f64::INFINITY), 0x7C00);
        assert_eq!(f16_bits(f64::NEG_INFINITY), 0xFC00);
        assert_eq!(f16_bits(f64::NAN) & 0x7E00, 0x7E00);
        assert_eq!(f16_bits(0.0), 0x0000);
        assert_eq!(f16_bits(-0.0), 0x8000);
    }

    #[test]
    fn half_overflow_and_subnormals() {
        assert_eq!(f16_bits(100_000.0), 0x7C00);
        // Smallest subnormal is 2^-24.
        assert_eq!(f16_bits(2f64.powi(-24)), 0x0001);
        // Half of that is a tie and rounds to even (zero).
        assert_eq!(f16_bits(2f64.powi(-25)), 0x0000);
        assert_eq!(f16_bits(2f64.powi(-30)), 0x0000);
        // Smallest normal.
        assert_eq!(f16_bits(2f64.powi(-14)), 0x0400);
    }

    #[test]
    fn quad_normals() {
        assert_eq!(f128_bits(1.0), 0x3FFF_u128 << 112);
        assert_eq!(f128_bits(2.0), 0x4000_u128 << 112);
        assert_eq!(f128_bits(-0.0), 1u128 << 127);
        assert_eq!(f128_bits(0.0), 0);
    }

    #[test]
    fn quad_specials() {
        assert_eq!(f128_bits(f64::INFINITY), 0x7FFF_u128 << 112);
        let nan = f128_bits(f64::NAN);
        assert_eq!(nan & (0x7FFF_u128 << 112), 0x7FFF_u128 << 112);
        assert_ne!(nan & ((1u128 << 112) - 1), 0);
    }

    #[test]
    fn quad_subnormal_double_normalizes() {
        // Smallest positive double, 2^-1074.
        let tiny = f64::from_bits(1);
        let bits = f128_bits(tiny);
        let exp = (bits >> 112) & 0x7fff;
        assert_eq!(exp, (16383 - 1074) as u128);
        assert_eq!(bits & ((1u128 << 112) - 1), 0);
    }

    #[test]
    fn constant_prefixes() {
        assert_eq!(float_constant("half", 1.0), "0xH3C00");
        assert_eq!(
            float_constant("fp128", 1.0),
            "0xL3FFF0000000000000000000000000000"
        );
        assert_eq!(float_constant("double", 1.0), "0x3FF0000000000000");
        // 1.5 is exact in single precision.
        assert_eq!(float_constant("float", 1.5), "0x3FF8000000000000");
    }

    proptest! {
        #[test]
        fn half_constants_are_four_upper_hex_digits(v in -1.0e6f64..1.0e6f64) {
            let text = float_constant("half", v);
            prop_assert!(text.starts_with("0xH"));
            prop_assert_eq!(text.len(), 7);
            prop_assert!(text[3..]
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }

        #[test]
        fn quad_constants_are_thirty_two_digits(v in -1.0e12f64..1.0e12f64) {
            let text = float_constant("fp128", v);
            prop_assert!(text.starts_with("0xL"));
            prop_assert_eq!(text.len(), 35);
        }
    }
}
