//! Synthetic forward prediction, for validating assignment against known
//! indices.
//!
//! No detector geometry is involved: every lattice point inside the
//! resolution sphere is predicted, whether or not it would diffract.

use nalgebra::Rotation3;

use crate::crystal::CrystalModel;
use crate::error::Result;
use crate::reflection::MillerIndex;
use crate::{Matrix3, Vector3};

/// A predicted reflection: its index and reciprocal lattice point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictedReflection {
    pub miller_index: MillerIndex,
    pub rlp: Vector3,
}

/// All reflections of `crystal` with `d ≥ d_min`, excluding `(0, 0, 0)`,
/// ordered by `h`, then `k`, then `l`.
///
/// Returns nothing for a non-positive `d_min`.
pub fn predict_reflections(crystal: &CrystalModel, d_min: f64) -> Vec<PredictedReflection> {
    if !(d_min > 0.0) {
        return Vec::new();
    }
    // h = a · p with |p| ≤ 1/d_min bounds |h| by |a| / d_min.
    let [a, b, c] = crystal.real_space_vectors();
    let bound = |v: &Vector3| (v.norm() / d_min).floor() as i32;
    let (hmax, kmax, lmax) = (bound(&a), bound(&b), bound(&c));
    let max_sq = 1.0 / (d_min * d_min);

    let mut out = Vec::new();
    for h in -hmax..=hmax {
        for k in -kmax..=kmax {
            for l in -lmax..=lmax {
                if (h, k, l) == (0, 0, 0) {
                    continue;
                }
                let miller_index = [h, k, l];
                let rlp = crystal.predict_rlp(&miller_index);
                if rlp.norm_squared() <= max_sq {
                    out.push(PredictedReflection { miller_index, rlp });
                }
            }
        }
    }
    out
}

/// Rotation matrix from Euler angles in degrees, applied as roll about x,
/// then pitch about y, then yaw about z.
pub fn rotation_from_euler_deg(angles: [f64; 3]) -> Matrix3 {
    Rotation3::from_euler_angles(
        angles[0].to_radians(),
        angles[1].to_radians(),
        angles[2].to_radians(),
    )
    .into_inner()
}

/// Copy of `crystal` with every basis vector lengthened by
/// `relative_error` (e.g. `0.02` for 2 %). Orientation is unchanged.
pub fn scale_basis(crystal: &CrystalModel, relative_error: f64) -> Result<CrystalModel> {
    let scaled = crystal.real_space_matrix() * (1.0 + relative_error);
    let model = CrystalModel::from_real_space_matrix(scaled)?;
    Ok(match crystal.space_group() {
        Some(sg) => model.with_space_group(sg),
        None => model,
    })
}
