//! Miller index assignment.
//!
//! Two methods share one contract: given reciprocal-space points and a list
//! of candidate crystals, produce one [`Reflection`] per point carrying either
//! an integer index and crystal id, or the unindexed sentinel.
//!
//! 1. **Global** ([`global`]): round `A⁻¹·p` per crystal and keep the best
//!    crystal whose residual is within tolerance. Embarrassingly parallel.
//! 2. **Local** ([`local`]): sweep outward from the origin, fitting a
//!    linear map from each point's already-indexed neighbours and rounding
//!    under that map instead. Tolerates a few percent of systematic model
//!    error that makes the global method mis-round at high resolution.
//!
//! Both write into a freshly allocated result vector, so the two can run on
//! the same input and be compared with [`crate::compare`].
//!
//! Ties between crystals with equal residual go to the lower crystal id.

pub mod global;
pub mod local;

use tracing::info;

use crate::crystal::CrystalModel;
use crate::reflection::{count_indexed, Reflection};
use crate::Vector3;

pub use global::assign_global;
pub use local::{assign_local, assign_local_with_index};

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters for the global assigner.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalAssignConfig {
    /// Maximum residual, in fractional-index units, for a reflection to be
    /// indexed. Default 0.3.
    pub tolerance: f64,
    /// Resolution cutoff. Reflections with `d = 1/|p| < d_min` stay
    /// unindexed. Default None (no cutoff).
    pub d_min: Option<f64>,
    /// Evaluate reflections on the rayon thread pool. Results are identical
    /// either way. Default true.
    pub parallel: bool,
}

impl Default for GlobalAssignConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.3,
            d_min: None,
            parallel: true,
        }
    }
}

impl GlobalAssignConfig {
    pub fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            ..Default::default()
        }
    }
}

/// Parameters for the local assigner.
///
/// `epsilon`, `delta` and `l_min` gate each local fit in the manner of the
/// XDS keywords `INDEX_ERROR`, `INDEX_MAGNITUDE` and `INDEX_QUALITY`. A fit
/// that fails any of them is discarded and the reflection falls back to the
/// global rounding for that crystal.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalAssignConfig {
    /// Maximum residual, in fractional-index units, of a point under its
    /// locally fitted map. Also the tolerance of the global fallback, and the
    /// residual within which a neighbour agrees with a fit. Default 0.3.
    pub tolerance: f64,
    /// Neighbourhood size `k` for each local fit. Default 20.
    pub nearest_neighbours: usize,
    /// Resolution cutoff, as for [`GlobalAssignConfig::d_min`]. Default None.
    pub d_min: Option<f64>,
    /// Minimum number of usable neighbours for a local fit. Values below 4
    /// are raised to 4, so that every fit leaves a residual to judge it by.
    /// Default 6.
    pub min_neighbours: usize,
    /// Maximum weighted RMS residual, in index units, of the neighbours under
    /// the fitted map. Default 0.05.
    pub epsilon: f64,
    /// Maximum index distance (largest component, under the crystal model)
    /// between a point and a neighbour used in its fit. Default 8.
    pub delta: u32,
    /// Minimum fraction of neighbours that must agree with the fit. The
    /// disagreeing ones are dropped and the map refitted. Default 0.8.
    pub l_min: f64,
}

impl Default for LocalAssignConfig {
    fn default() -> Self {
        Self {
            tolerance: 0.3,
            nearest_neighbours: 20,
            d_min: None,
            min_neighbours: 6,
            epsilon: 0.05,
            delta: 8,
            l_min: 0.8,
        }
    }
}

impl LocalAssignConfig {
    pub fn new(tolerance: f64, nearest_neighbours: usize) -> Self {
        Self {
            tolerance,
            nearest_neighbours,
            ..Default::default()
        }
    }
}

/// Which assigner [`index_reflections`] runs.
#[derive(Debug, Clone, PartialEq)]
pub enum AssignmentMethod {
    Global(GlobalAssignConfig),
    Local(LocalAssignConfig),
}

impl Default for AssignmentMethod {
    fn default() -> Self {
        AssignmentMethod::Global(GlobalAssignConfig::default())
    }
}

// ── In-place entry point ────────────────────────────────────────────────────

/// Assign indices to `reflections` in place, overwriting any previous
/// assignment. Positions are left untouched.
///
/// Returns the number of reflections indexed.
pub fn index_reflections(
    reflections: &mut [Reflection],
    crystals: &[CrystalModel],
    method: &AssignmentMethod,
) -> usize {
    let rlps: Vec<Vector3> = reflections.iter().map(|r| r.rlp).collect();
    let assigned = match method {
        AssignmentMethod::Global(config) => assign_global(&rlps, crystals, config),
        AssignmentMethod::Local(config) => assign_local(&rlps, crystals, config),
    };
    for (dst, src) in reflections.iter_mut().zip(assigned) {
        *dst = src;
    }
    let n_indexed = count_indexed(reflections);
    info!(
        "Indexed {} of {} reflections with {} crystal(s)",
        n_indexed,
        reflections.len(),
        crystals.len()
    );
    n_indexed
}

// ── Shared helpers ──────────────────────────────────────────────────────────

/// `false` for points beyond the resolution cutoff `d_min`.
#[inline]
pub(crate) fn within_resolution(rlp: &Vector3, d_min: Option<f64>) -> bool {
    match d_min {
        Some(d_min) if d_min > 0.0 => rlp.norm() * d_min <= 1.0,
        _ => true,
    }
}

/// Residuals closer than this are a tie. A local fit and a global rounding
/// reach the same index through different arithmetic.
const RESIDUAL_TIE: f64 = 1e-9;

/// Best `(index, residual, crystal)` seen so far across candidate crystals.
///
/// Candidates must be offered in ascending crystal id; a later candidate
/// replaces the current best only on a residual smaller by more than
/// rounding error.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BestCandidate {
    best: Option<([i32; 3], f64, usize)>,
}

impl BestCandidate {
    pub(crate) fn offer(&mut self, hkl: [i32; 3], residual: f64, crystal_id: usize) {
        match self.best {
            Some((_, best_residual, _)) if !(residual < best_residual - RESIDUAL_TIE) => {}
            _ if !residual.is_finite() => {}
            _ => self.best = Some((hkl, residual, crystal_id)),
        }
    }

    /// Indexed reflection if the winner is within `tolerance` and not the
    /// unindexed sentinel, otherwise an unassigned one.
    pub(crate) fn into_reflection(self, rlp: Vector3, tolerance: f64) -> Reflection {
        match self.best {
            Some((hkl, residual, id)) if residual <= tolerance && hkl != [0, 0, 0] => {
                Reflection::indexed(rlp, hkl, id, residual)
            }
            _ => Reflection::unassigned(rlp),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crystal::UnitCell;
    use crate::Matrix3;

    #[test]
    fn test_defaults() {
        let g = GlobalAssignConfig::default();
        assert_eq!(g.tolerance, 0.3);
        assert!(g.d_min.is_none());
        let l = LocalAssignConfig::new(0.2, 10);
        assert_eq!(l.tolerance, 0.2);
        assert_eq!(l.nearest_neighbours, 10);
        assert_eq!(l.min_neighbours, 6);
        assert_eq!(l.epsilon, 0.05);
        assert_eq!(l.delta, 8);
        assert_eq!(l.l_min, 0.8);
        assert!(matches!(AssignmentMethod::default(), AssignmentMethod::Global(_)));
    }

    #[test]
    fn test_within_resolution() {
        let p = Vector3::new(0.0, 0.0, 0.4); // d = 2.5
        assert!(within_resolution(&p, None));
        assert!(within_resolution(&p, Some(2.0)));
        assert!(!within_resolution(&p, Some(3.0)));
    }

    #[test]
    fn test_best_candidate_prefers_lower_id_on_tie() {
        let mut best = BestCandidate::default();
        best.offer([1, 0, 0], 0.1, 0);
        best.offer([0, 1, 0], 0.1, 1);
        let r = best.into_reflection(Vector3::zeros(), 0.2);
        assert_eq!(r.crystal_id, Some(0));
        assert_eq!(r.miller_index, [1, 0, 0]);

        let mut best = BestCandidate::default();
        best.offer([1, 0, 0], 0.1, 0);
        best.offer([0, 1, 0], 0.05, 1);
        let r = best.into_reflection(Vector3::zeros(), 0.2);
        assert_eq!(r.crystal_id, Some(1));

        // Rounding-level differences still count as a tie.
        let mut best = BestCandidate::default();
        best.offer([2, 0, 0], 3e-15, 0);
        best.offer([2, 0, 0], 1e-15, 1);
        let r = best.into_reflection(Vector3::zeros(), 0.2);
        assert_eq!(r.crystal_id, Some(0));
    }

    #[test]
    fn test_index_reflections_in_place() {
        let xtal = CrystalModel::from_unit_cell(&UnitCell::cubic(20.0), &Matrix3::identity()).unwrap();
        let mut refls = vec![
            Reflection::unassigned(xtal.predict_rlp(&[1, 2, 3])),
            Reflection::unassigned(Vector3::new(0.025, 0.025, 0.025)), // (0.5, 0.5, 0.5)
            Reflection::indexed(xtal.predict_rlp(&[2, 0, 0]), [9, 9, 9], 3, 0.4),
        ];
        for method in [
            AssignmentMethod::Global(GlobalAssignConfig::new(0.2)),
            AssignmentMethod::Local(LocalAssignConfig::new(0.2, 5)),
        ] {
            let n = index_reflections(&mut refls, std::slice::from_ref(&xtal), &method);
            assert_eq!(n, 2);
            assert_eq!(refls[0].miller_index, [1, 2, 3]);
            assert!(!refls[1].is_indexed());
            assert_eq!(refls[1].crystal_id, None);
            assert_eq!(refls[2].miller_index, [2, 0, 0]);
            assert_eq!(refls[2].crystal_id, Some(0));
        }
    }
}
