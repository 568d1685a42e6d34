//! Q16.16 Fixed-Point Arithmetic
//!
//! Deterministic fixed-point math for the simulation core. Every value that
//! crosses a tick boundary is stored in this format; gameplay code never
//! touches floating point.
//!
//! ## Format: Q16.16
//!
//! 32-bit signed integer, 16 integer bits, 16 fractional bits.
//! Range ±32767.99998, precision 1/65536. Plenty for a 512×512-cell map.
//!
//! ## Hash quantization
//!
//! Positions and health values are re-quantized (low bits dropped) before
//! they enter the state checksum, so the hash space is defined by
//! [`quantize_pos`] and [`quantize_amount`], not by raw Q16.16 noise.

/// Q16.16 fixed-point number stored as i32.
pub type Fixed = i32;

/// Number of fractional bits.
pub const FIXED_SHIFT: i32 = 16;

/// 1.0 in fixed-point (65536).
pub const FIXED_ONE: Fixed = 1 << FIXED_SHIFT;

/// 0.5 in fixed-point (32768).
pub const FIXED_HALF: Fixed = FIXED_ONE >> 1;

// =============================================================================
// QUANTIZATION (hash-boundary scales)
// =============================================================================

/// Bits dropped from positions before hashing (granularity 1/256 cell).
pub const POS_QUANT_SHIFT: u32 = 8;

/// Bits dropped from health/damage/amount values before hashing
/// (granularity 1/64 point).
pub const AMOUNT_QUANT_SHIFT: u32 = 10;

/// Quantize a position coordinate for hashing.
#[inline]
pub fn quantize_pos(v: Fixed) -> i32 {
    v >> POS_QUANT_SHIFT
}

/// Quantize a health/damage/resource amount for hashing.
#[inline]
pub fn quantize_amount(v: Fixed) -> i32 {
    v >> AMOUNT_QUANT_SHIFT
}

// =============================================================================
// CORE OPERATIONS (deterministic, wrapping semantics)
// =============================================================================

/// Convert a compile-time float to fixed-point.
///
/// Initialization only. Never call in the tick loop.
#[inline]
pub const fn to_fixed(f: f64) -> Fixed {
    (f * (FIXED_ONE as f64)) as Fixed
}

/// Convert an integer to fixed-point.
#[inline]
pub const fn from_int(i: i32) -> Fixed {
    i << FIXED_SHIFT
}

/// Integer part of a fixed-point value (floor toward negative infinity).
#[inline]
pub const fn to_int_floor(f: Fixed) -> i32 {
    f >> FIXED_SHIFT
}

/// Convert fixed-point to float for display/telemetry.
///
/// Output only; the result must never feed back into simulation state.
#[inline]
pub fn to_float(f: Fixed) -> f32 {
    f as f32 / FIXED_ONE as f32
}

/// Multiply two fixed-point numbers (i64 intermediate, truncating).
#[inline]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    let wide = (a as i64) * (b as i64);
    (wide >> FIXED_SHIFT) as Fixed
}

/// Divide two fixed-point numbers.
///
/// Truncates toward zero; divide-by-zero returns 0 rather than panicking so
/// a degenerate denominator can never take down a tick.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if b == 0 {
        return 0;
    }
    let wide = (a as i64) << FIXED_SHIFT;
    (wide / b as i64) as Fixed
}

/// Square root via Newton-Raphson, fixed 6 iterations.
///
/// Non-positive inputs return 0. Prefer squared distances where a comparison
/// is all that is needed.
#[inline]
pub fn fixed_sqrt(x: Fixed) -> Fixed {
    if x <= 0 {
        return 0;
    }
    let mut guess = (x >> 1).max(1);
    for _ in 0..6 {
        let div = fixed_div(x, guess);
        guess = (guess.wrapping_add(div)) >> 1;
        if guess == 0 {
            guess = 1;
        }
    }
    guess
}

/// Absolute value.
#[inline]
pub fn fixed_abs(x: Fixed) -> Fixed {
    if x < 0 { x.wrapping_neg() } else { x }
}

/// Clamp to a range.
#[inline]
pub fn fixed_clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Linear interpolation: `a + (b - a) * t`, t in [0, FIXED_ONE].
#[inline]
pub fn fixed_lerp(a: Fixed, b: Fixed, t: Fixed) -> Fixed {
    let diff = b.wrapping_sub(a);
    a.wrapping_add(fixed_mul(diff, t))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(FIXED_ONE, 65536);
        assert_eq!(FIXED_HALF, 32768);
        assert_eq!(to_fixed(1.0), FIXED_ONE);
        assert_eq!(to_fixed(-2.5), -FIXED_ONE * 2 - FIXED_HALF);
        assert_eq!(from_int(7), 7 * FIXED_ONE);
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(fixed_mul(to_fixed(2.0), to_fixed(3.0)), to_fixed(6.0));
        assert_eq!(fixed_mul(FIXED_HALF, FIXED_HALF), to_fixed(0.25));
        assert_eq!(fixed_mul(to_fixed(-2.0), to_fixed(3.0)), to_fixed(-6.0));
        assert_eq!(fixed_div(to_fixed(6.0), to_fixed(2.0)), to_fixed(3.0));
        assert_eq!(fixed_div(FIXED_ONE, to_fixed(4.0)), to_fixed(0.25));
        // Divide by zero is defined, not a panic.
        assert_eq!(fixed_div(FIXED_ONE, 0), 0);
    }

    #[test]
    fn test_sqrt() {
        let result = fixed_sqrt(to_fixed(4.0));
        assert!((result - to_fixed(2.0)).abs() < 100);
        assert_eq!(fixed_sqrt(0), 0);
        assert_eq!(fixed_sqrt(-FIXED_ONE), 0);
        assert!(fixed_sqrt(1) >= 0);
    }

    #[test]
    fn test_floor() {
        assert_eq!(to_int_floor(to_fixed(3.7)), 3);
        assert_eq!(to_int_floor(to_fixed(-0.5)), -1);
        assert_eq!(to_int_floor(from_int(12)), 12);
    }

    #[test]
    fn test_quantization_closure() {
        // Quantizing twice is the same as quantizing once.
        let v = to_fixed(123.4567);
        assert_eq!(
            quantize_pos(v),
            quantize_pos(quantize_pos(v) << POS_QUANT_SHIFT)
        );
        assert_eq!(
            quantize_amount(v),
            quantize_amount(quantize_amount(v) << AMOUNT_QUANT_SHIFT)
        );
    }

    #[test]
    fn test_lerp_endpoints() {
        let a = to_fixed(10.0);
        let b = to_fixed(20.0);
        assert_eq!(fixed_lerp(a, b, 0), a);
        assert_eq!(fixed_lerp(a, b, FIXED_ONE), b);
        assert_eq!(fixed_lerp(a, b, FIXED_HALF), to_fixed(15.0));
    }

    #[test]
    fn test_determinism() {
        for _ in 0..1000 {
            assert_eq!(fixed_mul(12345678, 87654321), fixed_mul(12345678, 87654321));
            assert_eq!(fixed_div(12345678, 87654321), fixed_div(12345678, 87654321));
            assert_eq!(fixed_sqrt(12345678), fixed_sqrt(12345678));
        }
    }
}
