//! Orthorhombic periodic simulation box.

use crate::{MdError, Result};
use rbmd_math::Vec3;

/// Periodic box spanning `[-L/2, L/2)` in every dimension.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimBox {
    lengths: Vec3,
}

impl SimBox {
    /// Create a box with edge lengths `(Lx, Ly, Lz)`.
    pub fn new(lengths: Vec3) -> Result<Self> {
        if lengths.iter().any(|l| !l.is_finite() || *l <= 0.0) {
            return Err(MdError::config(format!(
                "box lengths must be positive and finite, got ({}, {}, {})",
                lengths.x, lengths.y, lengths.z
            )));
        }
        Ok(Self { lengths })
    }

    /// Cubic box of edge `l`.
    pub fn cube(l: f64) -> Result<Self> {
        Self::new(Vec3::new(l, l, l))
    }

    pub fn lengths(&self) -> Vec3 {
        self.lengths
    }

    pub fn volume(&self) -> f64 {
        self.lengths.x * self.lengths.y * self.lengths.z
    }

    /// Smallest box length; the minimum image is valid for distances below
    /// half of it.
    pub fn min_length(&self) -> f64 {
        self.lengths.min()
    }

    /// Apply minimum image convention to a separation vector.
    pub fn minimum_image(&self, mut dr: Vec3) -> Vec3 {
        for d in 0..3 {
            let l = self.lengths[d];
            dr[d] -= l * (dr[d] / l).round();
        }
        dr
    }

    /// Map a position back into the primary box.
    pub fn wrap(&self, mut x: Vec3) -> Vec3 {
        for d in 0..3 {
            let l = self.lengths[d];
            x[d] -= l * (x[d] / l + 0.5).floor();
        }
        x
    }

    /// Fractional coordinate in `[0, 1)` along each axis.
    pub fn fractional(&self, x: &Vec3) -> Vec3 {
        let w = self.wrap(*x);
        Vec3::new(
            w.x / self.lengths.x + 0.5,
            w.y / self.lengths.y + 0.5,
            w.z / self.lengths.z + 0.5,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimum_image() {
        let b = SimBox::cube(10.0).unwrap();
        let dr = b.minimum_image(Vec3::new(6.0, 3.0, -7.0));
        assert_relative_eq!(dr, Vec3::new(-4.0, 3.0, 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_wrap_into_primary_box() {
        let b = SimBox::new(Vec3::new(4.0, 6.0, 8.0)).unwrap();
        let x = b.wrap(Vec3::new(2.5, -3.5, 17.0));
        assert_relative_eq!(x, Vec3::new(-1.5, 2.5, 1.0), epsilon = 1e-12);
        for d in 0..3 {
            assert!(x[d] >= -0.5 * b.lengths()[d] && x[d] < 0.5 * b.lengths()[d]);
        }
    }

    #[test]
    fn test_fractional_range() {
        let b = SimBox::cube(2.0).unwrap();
        let f = b.fractional(&Vec3::new(-1.0, 0.0, 0.999));
        assert_relative_eq!(f.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(f.y, 0.5, epsilon = 1e-12);
        assert!(f.z < 1.0);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert!(SimBox::new(Vec3::new(1.0, 0.0, 1.0)).is_err());
        assert!(SimBox::new(Vec3::new(1.0, f64::NAN, 1.0)).is_err());
    }
}
