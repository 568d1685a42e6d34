//! Fixed-Point 2D Vector
//!
//! Deterministic 2D vector operations for unit positions, velocities and
//! target points. All arithmetic is Q16.16; components wrap rather than
//! saturate, matching the rest of the core.

use std::fmt;
use std::ops::{Add, Neg, Sub};

use serde::{Deserialize, Serialize};

use super::fixed::{fixed_div, fixed_mul, fixed_sqrt, to_int_floor, Fixed};

/// 2D vector with fixed-point components.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FixedVec2 {
    /// X component (Q16.16)
    pub x: Fixed,
    /// Y component (Q16.16)
    pub y: Fixed,
}

impl FixedVec2 {
    /// Zero vector.
    pub const ZERO: Self = Self { x: 0, y: 0 };

    /// Create from fixed-point components.
    #[inline]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create from integer cell coordinates.
    #[inline]
    pub const fn from_cell(cx: i32, cy: i32) -> Self {
        Self {
            x: cx << 16,
            y: cy << 16,
        }
    }

    /// Cell this point falls in (floor of both components).
    #[inline]
    pub const fn cell(self) -> (i32, i32) {
        (to_int_floor(self.x), to_int_floor(self.y))
    }

    /// Scale by a fixed-point scalar.
    #[inline]
    pub fn scale(self, scalar: Fixed) -> Self {
        Self {
            x: fixed_mul(self.x, scalar),
            y: fixed_mul(self.y, scalar),
        }
    }

    /// Dot product.
    #[inline]
    pub fn dot(self, other: Self) -> Fixed {
        fixed_mul(self.x, other.x).wrapping_add(fixed_mul(self.y, other.y))
    }

    /// Perpendicular vector (rotated a quarter turn counter-clockwise).
    #[inline]
    pub fn perp(self) -> Self {
        Self {
            x: -self.y,
            y: self.x,
        }
    }

    /// Squared length. Prefer this for comparisons - no sqrt.
    #[inline]
    pub fn length_squared(self) -> Fixed {
        fixed_mul(self.x, self.x).wrapping_add(fixed_mul(self.y, self.y))
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.length_squared())
    }

    /// Squared distance to another point.
    #[inline]
    pub fn distance_squared(self, other: Self) -> Fixed {
        (self - other).length_squared()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Normalize to unit length. Zero stays zero.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len == 0 {
            return Self::ZERO;
        }
        Self {
            x: fixed_div(self.x, len),
            y: fixed_div(self.y, len),
        }
    }

    /// Direction from this point toward another, unit length.
    #[inline]
    pub fn direction_to(self, target: Self) -> Self {
        (target - self).normalize()
    }

    /// Cap the length at `max_len`, preserving direction.
    pub fn clamp_length(self, max_len: Fixed) -> Self {
        let len_sq = self.length_squared();
        let max_sq = fixed_mul(max_len, max_len);
        if len_sq <= max_sq {
            return self;
        }
        self.normalize().scale(max_len)
    }

    /// Convert to floats for display. Never feeds back into simulation.
    pub fn to_floats(self) -> (f32, f32) {
        (
            super::fixed::to_float(self.x),
            super::fixed::to_float(self.y),
        )
    }
}

impl Add for FixedVec2 {
    type Output = Self;
    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x.wrapping_add(rhs.x),
            y: self.y.wrapping_add(rhs.y),
        }
    }
}

impl Sub for FixedVec2 {
    type Output = Self;
    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x.wrapping_sub(rhs.x),
            y: self.y.wrapping_sub(rhs.y),
        }
    }
}

impl Neg for FixedVec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self {
            x: self.x.wrapping_neg(),
            y: self.y.wrapping_neg(),
        }
    }
}

impl fmt::Debug for FixedVec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (x, y) = self.to_floats();
        write!(f, "({:.3}, {:.3})", x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixed::{to_fixed, FIXED_HALF, FIXED_ONE};

    #[test]
    fn test_basic_ops() {
        let a = FixedVec2::new(to_fixed(3.0), to_fixed(4.0));
        let b = FixedVec2::new(to_fixed(1.0), to_fixed(2.0));

        assert_eq!((a + b).x, to_fixed(4.0));
        assert_eq!((a - b).y, to_fixed(2.0));
        assert_eq!(a.scale(FIXED_HALF).x, to_fixed(1.5));
        assert_eq!((-b).x, to_fixed(-1.0));
    }

    #[test]
    fn test_length() {
        // 3-4-5 triangle
        let v = FixedVec2::new(to_fixed(3.0), to_fixed(4.0));
        assert_eq!(v.length_squared(), to_fixed(25.0));
        let len = v.length();
        assert!((len - to_fixed(5.0)).abs() < 100);
    }

    #[test]
    fn test_normalize() {
        let v = FixedVec2::new(to_fixed(10.0), 0);
        let n = v.normalize();
        assert!((n.x - FIXED_ONE).abs() < 100);
        assert_eq!(n.y, 0);

        assert_eq!(FixedVec2::ZERO.normalize(), FixedVec2::ZERO);
    }

    #[test]
    fn test_cell_roundtrip() {
        let v = FixedVec2::from_cell(12, -3);
        assert_eq!(v.cell(), (12, -3));

        let off = FixedVec2::new(to_fixed(12.9), to_fixed(-2.1));
        assert_eq!(off.cell(), (12, -3));
    }

    #[test]
    fn test_clamp_length() {
        let v = FixedVec2::new(to_fixed(10.0), 0);
        let c = v.clamp_length(to_fixed(2.0));
        assert!((c.x - to_fixed(2.0)).abs() < 200);

        let short = FixedVec2::new(to_fixed(1.0), 0);
        assert_eq!(short.clamp_length(to_fixed(2.0)), short);
    }

    #[test]
    fn test_dot_perp() {
        let a = FixedVec2::new(FIXED_ONE, 0);
        let b = FixedVec2::new(0, FIXED_ONE);
        assert_eq!(a.dot(b), 0);
        assert_eq!(a.perp(), b);
    }
}
