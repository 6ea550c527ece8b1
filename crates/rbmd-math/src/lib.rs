//! Math primitives for the rbmd molecular dynamics engine.
//!
//! Thin aliases over `nalgebra` plus a unit quaternion used for rigid-body
//! orientations.

pub mod quaternion;

pub use quaternion::Quat;

use nalgebra as na;

/// Position, velocity or force in reduced units.
pub type Vec3 = na::Vector3<f64>;
/// Inertia tensors and rotation matrices.
pub type Mat3 = na::Matrix3<f64>;

/// Skew matrix `[v]×` with `[v]× w = v × w`.
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// True if every component is finite.
#[inline]
pub fn is_finite(v: &Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skew_matches_cross() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        let diff = skew(&a) * b - a.cross(&b);
        assert!(diff.norm() < 1e-14);
    }

    #[test]
    fn test_is_finite() {
        assert!(is_finite(&Vec3::new(1.0, 2.0, 3.0)));
        assert!(!is_finite(&Vec3::new(1.0, f64::NAN, 3.0)));
        assert!(!is_finite(&Vec3::new(f64::INFINITY, 0.0, 0.0)));
    }
}
