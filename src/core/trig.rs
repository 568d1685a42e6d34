//! Integer-Input Trigonometry
//!
//! Shared sin/cos for direction vectors and kite calculations. Angles use
//! binary angular measure (BAM): a full turn is 65536, so a `u16` wraps
//! naturally and no radian conversion ever happens in gameplay code.
//!
//! The implementation is Bhaskara I's approximation evaluated in pure
//! integer arithmetic, so every platform computes bit-identical results.
//! Worst-case error is under 0.2% of full scale, far below what survives
//! hash quantization.

use super::fixed::{Fixed, FIXED_ONE};
use super::vec2::FixedVec2;

/// One full turn in BAM units.
pub const BAM_FULL: u32 = 65536;

/// A quarter turn (90 degrees).
pub const BAM_QUARTER: u16 = 16384;

/// A half turn (180 degrees).
pub const BAM_HALF: u16 = 32768;

/// Sine of a BAM angle, result in Q16.16.
///
/// Bhaskara I on [0, half-turn]: `sin(x) ≈ 16x(π−x) / (5π² − 4x(π−x))`
/// with x measured in BAM half-turn units. The second half-turn negates.
pub fn fixed_sin(angle: u16) -> Fixed {
    let (x, negate) = if angle < BAM_HALF {
        (angle as i64, false)
    } else {
        ((angle - BAM_HALF) as i64, true)
    };

    // n = x * (HALF - x), in half-turn-squared units.
    let half = BAM_HALF as i64;
    let n = x * (half - x);

    // sin = 16n / (5 * HALF^2 / 4 ... ) rearranged for integer math:
    // with x in [0, H], sin(x) = 4n / (5*H*H/4 - n)
    let denom = 5 * half * half / 4 - n;
    if denom == 0 {
        return 0;
    }
    let value = (4 * n * FIXED_ONE as i64) / denom;

    let v = value as Fixed;
    if negate { -v } else { v }
}

/// Cosine of a BAM angle, result in Q16.16.
#[inline]
pub fn fixed_cos(angle: u16) -> Fixed {
    fixed_sin(angle.wrapping_add(BAM_QUARTER))
}

/// Unit direction vector for a BAM angle.
#[inline]
pub fn direction(angle: u16) -> FixedVec2 {
    FixedVec2::new(fixed_cos(angle), fixed_sin(angle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{fixed_abs, to_fixed};

    #[test]
    fn test_cardinal_angles() {
        assert_eq!(fixed_sin(0), 0);
        assert_eq!(fixed_sin(BAM_HALF), 0);
        // sin(90°) = 1, sin(270°) = -1, within approximation error.
        assert!(fixed_abs(fixed_sin(BAM_QUARTER) - FIXED_ONE) < 400);
        assert!(fixed_abs(fixed_sin(BAM_QUARTER.wrapping_add(BAM_HALF)) + FIXED_ONE) < 400);
        assert!(fixed_abs(fixed_cos(0) - FIXED_ONE) < 400);
    }

    #[test]
    fn test_sin_symmetry() {
        for angle in (0u32..BAM_FULL).step_by(997) {
            let a = angle as u16;
            let mirrored = (BAM_FULL as i64 - angle as i64) as u16;
            // sin(-x) = -sin(x)
            assert_eq!(fixed_sin(a), -fixed_sin(mirrored), "angle {}", angle);
        }
    }

    #[test]
    fn test_accuracy_against_float() {
        // Verification only - float trig never runs in gameplay.
        for angle in (0u32..BAM_FULL).step_by(311) {
            let expected = (angle as f64 / BAM_FULL as f64 * std::f64::consts::TAU).sin();
            let got = fixed_sin(angle as u16);
            let err = fixed_abs(got - to_fixed(expected));
            assert!(err < 200, "angle {} err {}", angle, err);
        }
    }

    #[test]
    fn test_determinism() {
        for angle in [0u16, 1, 1000, 16384, 32768, 50000, 65535] {
            assert_eq!(fixed_sin(angle), fixed_sin(angle));
            assert_eq!(fixed_cos(angle), fixed_cos(angle));
        }
    }
}
