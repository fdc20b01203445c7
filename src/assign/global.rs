//! Global assignment: one fractionalization matrix per crystal, applied to
//! every reflection independently.

use rayon::prelude::*;
use tracing::{debug, info};

use super::{within_resolution, BestCandidate, GlobalAssignConfig};
use crate::crystal::CrystalModel;
use crate::reflection::{count_indexed, Reflection};
use crate::rounding::nearest_lattice_point;
use crate::Vector3;

/// Assign every point to the crystal that rounds it with the smallest
/// residual, if that residual is within `config.tolerance`.
///
/// The result has one reflection per input point, in input order. The
/// origin rounds to `(0, 0, 0)` for every crystal and so is always
/// unindexed. Deterministic, and independent of `config.parallel`.
pub fn assign_global(
    rlps: &[Vector3],
    crystals: &[CrystalModel],
    config: &GlobalAssignConfig,
) -> Vec<Reflection> {
    let assign = |rlp: &Vector3| assign_one(rlp, crystals, config);
    let reflections: Vec<Reflection> = if config.parallel {
        rlps.par_iter().map(assign).collect()
    } else {
        rlps.iter().map(assign).collect()
    };

    if tracing::enabled!(tracing::Level::DEBUG) {
        let mut per_crystal = vec![0usize; crystals.len()];
        for id in reflections.iter().filter_map(|r| r.crystal_id) {
            per_crystal[id] += 1;
        }
        debug!("Global assignment per crystal: {:?}", per_crystal);
    }
    let n_indexed = count_indexed(&reflections);
    info!(
        "Global assignment: {} indexed, {} unindexed (tolerance {:.3})",
        n_indexed,
        reflections.len() - n_indexed,
        config.tolerance
    );
    reflections
}

/// Global assignment of a single point.
pub(crate) fn assign_one(
    rlp: &Vector3,
    crystals: &[CrystalModel],
    config: &GlobalAssignConfig,
) -> Reflection {
    if !within_resolution(rlp, config.d_min) {
        return Reflection::unassigned(*rlp);
    }
    let mut best = BestCandidate::default();
    for (id, crystal) in crystals.iter().enumerate() {
        let (hkl, residual) = nearest_lattice_point(crystal.reciprocal_matrix_inverse(), rlp);
        best.offer(hkl, residual, id);
    }
    best.into_reflection(*rlp, config.tolerance)
}
