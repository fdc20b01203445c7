//! Fractional Miller indices, rounding, and residuals.
//!
//! The residual is measured in fractional-index space, not in reciprocal
//! length: tolerances throughout the crate are expressed in index units.

use crate::reflection::{MillerIndex, UNINDEXED};
use crate::{Matrix3, Vector3};

/// Fractional Miller index `f = A⁻¹ · p`.
#[inline]
pub fn fractional_miller_index(reciprocal_inverse: &Matrix3, rlp: &Vector3) -> Vector3 {
    reciprocal_inverse * rlp
}

/// Round a fractional index to the nearest integer triple and return it with
/// the Euclidean residual `‖f − round(f)‖`.
///
/// Non-finite input, or components outside the `i32` range, round to the
/// unindexed sentinel with an infinite residual.
#[inline]
pub fn round_miller_index(fractional: &Vector3) -> (MillerIndex, f64) {
    let rounded = fractional.map(f64::round);
    if !rounded.iter().all(|v| v.is_finite() && v.abs() <= i32::MAX as f64) {
        return (UNINDEXED, f64::INFINITY);
    }
    let residual = (fractional - rounded).norm();
    (
        [rounded.x as i32, rounded.y as i32, rounded.z as i32],
        residual,
    )
}

/// Nearest lattice point of `rlp` under fractionalization matrix `A⁻¹`.
///
/// The origin maps to `(0, 0, 0)` with residual 0 for any crystal.
#[inline]
pub fn nearest_lattice_point(reciprocal_inverse: &Matrix3, rlp: &Vector3) -> (MillerIndex, f64) {
    round_miller_index(&fractional_miller_index(reciprocal_inverse, rlp))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_exact() {
        let (hkl, residual) = round_miller_index(&Vector3::new(1.0, -2.0, 3.0));
        assert_eq!(hkl, [1, -2, 3]);
        assert!(residual.abs() < 1e-15);
    }

    #[test]
    fn test_round_residual_is_index_space_norm() {
        let (hkl, residual) = round_miller_index(&Vector3::new(1.1, -1.9, 0.2));
        assert_eq!(hkl, [1, -2, 0]);
        let expected = (0.1f64 * 0.1 + 0.1 * 0.1 + 0.2 * 0.2).sqrt();
        assert!((residual - expected).abs() < 1e-12);
    }

    #[test]
    fn test_origin_is_unindexed() {
        let a_inv = Matrix3::identity() * 50.0;
        let (hkl, residual) = nearest_lattice_point(&a_inv, &Vector3::zeros());
        assert_eq!(hkl, UNINDEXED);
        assert_eq!(residual, 0.0);
    }

    #[test]
    fn test_non_finite_input() {
        let (hkl, residual) = round_miller_index(&Vector3::new(f64::NAN, 0.0, 1.0));
        assert_eq!(hkl, UNINDEXED);
        assert!(residual.is_infinite());
    }

    #[test]
    fn test_nearest_lattice_point_scaled() {
        let a_inv = Matrix3::identity() * 50.0;
        let (hkl, residual) = nearest_lattice_point(&a_inv, &Vector3::new(0.0201, 0.0, -0.04));
        assert_eq!(hkl, [1, 0, -2]);
        assert!((residual - 0.005).abs() < 1e-9);
    }
}
