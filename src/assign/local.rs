//! Local assignment: per-reflection linear maps fitted from indexed
//! neighbours.
//!
//! A crystal model with a small systematic error (cell a few percent off, a
//! fraction of a degree of misorientation) still maps reciprocal space to
//! index space linearly, just with the wrong matrix. Rounding with the model's
//! `A⁻¹` therefore drifts with `|h|`, but the true map can be re-estimated
//! from any well-indexed patch of the lattice.
//!
//! The sweep:
//! 1. Order points by distance from the origin (ties by input position), so
//!    low-resolution points, where model error matters least, are indexed
//!    first and seed the neighbourhoods of the rest.
//! 2. For each point and each crystal, take the `k` nearest points already
//!    indexed to that crystal, drop those more than `delta` index units away,
//!    and fit `T` minimizing `Σ w_j ‖T·p_j − h_j‖²` with
//!    `w_j = 1 / (1 + (d_j / d_far)²)`.
//! 3. Judge the fit. At least `l_min` of the neighbours must agree with it
//!    (the rest are dropped and `T` refitted), their weighted RMS residual
//!    must be within `epsilon`, and the point itself must not lie in a
//!    direction the neighbours barely span.
//! 4. Round `T·p`. Accept if the residual is within tolerance.
//! 5. Where a crystal has too few usable neighbours, or its fit fails a
//!    check, use the global rounding for that crystal instead.
//! 6. Across crystals the smallest residual wins, lowest id on ties.
//!
//! The sweep is a single pass; a point indexed here serves as a neighbour
//! for every point processed after it.

use tracing::{debug, info};

use super::{within_resolution, BestCandidate, LocalAssignConfig};
use crate::crystal::{miller_to_vector, CrystalModel};
use crate::lstsq::NormalEquations3;
use crate::neighbors::NeighborIndex;
use crate::reflection::{reflections_from_rlps, MillerIndex, Reflection};
use crate::rounding::{nearest_lattice_point, round_miller_index};
use crate::{Matrix3, Vector3};

/// Fewest neighbours for a fit: one more than the unknowns per row, so a
/// fit always leaves a residual to judge it by.
const MIN_FIT_NEIGHBOURS: usize = 4;

/// Largest [`NormalEquations3::prediction_variance`] accepted at the point
/// being indexed. Beyond it the neighbours do not constrain `T·p`.
const MAX_PREDICTION_VARIANCE: f64 = 4.0;

/// Outcome of fitting one crystal's local map around one point.
enum LocalFit {
    /// Rounded index and residual under the fitted map.
    Fitted(MillerIndex, f64),
    /// Too few usable neighbours, or neighbours that do not span 3D.
    Underdetermined,
    /// A map was fitted but failed a quality check.
    Rejected,
}

/// One neighbour equation `T·rlp ≈ hkl`.
struct Sample {
    rlp: Vector3,
    hkl: Vector3,
    weight: f64,
}

#[derive(Debug, Default)]
struct SweepStats {
    local_fits: usize,
    fallbacks: usize,
    rejected: usize,
    skipped: usize,
}

/// Local assignment with a neighbour index built over `rlps`.
pub fn assign_local(
    rlps: &[Vector3],
    crystals: &[CrystalModel],
    config: &LocalAssignConfig,
) -> Vec<Reflection> {
    let index = NeighborIndex::build(rlps);
    assign_local_with_index(rlps, crystals, &index, config)
}

/// Local assignment reusing a prebuilt neighbour index.
///
/// `index` must have been built over exactly `rlps` (same points, same
/// order). The result has one reflection per input point, in input order.
///
/// # Panics
///
/// If `index` holds a different number of points than `rlps`.
pub fn assign_local_with_index(
    rlps: &[Vector3],
    crystals: &[CrystalModel],
    index: &NeighborIndex,
    config: &LocalAssignConfig,
) -> Vec<Reflection> {
    assert_eq!(
        index.len(),
        rlps.len(),
        "neighbour index must be built over the reflections being assigned"
    );

    let min_neighbours = config.min_neighbours.max(MIN_FIT_NEIGHBOURS);
    let k = config.nearest_neighbours.max(min_neighbours);

    let mut order: Vec<usize> = (0..rlps.len()).collect();
    order.sort_by(|&i, &j| {
        rlps[i]
            .norm_squared()
            .total_cmp(&rlps[j].norm_squared())
            .then(i.cmp(&j))
    });

    let mut reflections = reflections_from_rlps(rlps);
    let mut indexed_per_crystal = vec![0usize; crystals.len()];
    let mut stats = SweepStats::default();

    for &i in &order {
        let rlp = &rlps[i];
        if !within_resolution(rlp, config.d_min) || rlp.norm_squared() == 0.0 {
            stats.skipped += 1;
            continue;
        }

        let mut best = BestCandidate::default();
        for (id, crystal) in crystals.iter().enumerate() {
            let fit = if indexed_per_crystal[id] < min_neighbours {
                LocalFit::Underdetermined
            } else {
                // Never ask for more than exist, or the query scans the whole grid.
                let k = k.min(indexed_per_crystal[id]);
                let neighbours = index.query_k_nearest_where(rlp, k, |j| {
                    reflections[j].crystal_id == Some(id)
                });
                fit_local_map(rlp, crystal, &neighbours, &reflections, config, min_neighbours)
            };
            let (hkl, residual) = match fit {
                LocalFit::Fitted(hkl, residual) => {
                    stats.local_fits += 1;
                    (hkl, residual)
                }
                outcome => {
                    stats.fallbacks += 1;
                    stats.rejected += usize::from(matches!(outcome, LocalFit::Rejected));
                    nearest_lattice_point(crystal.reciprocal_matrix_inverse(), rlp)
                }
            };
            best.offer(hkl, residual, id);
        }

        let assigned = best.into_reflection(*rlp, config.tolerance);
        if let Some(id) = assigned.crystal_id {
            indexed_per_crystal[id] += 1;
        }
        reflections[i] = assigned;
    }

    debug!(
        "Local sweep: {} local fits, {} global fallbacks ({} after a rejected fit), {} points skipped, per crystal {:?}",
        stats.local_fits, stats.fallbacks, stats.rejected, stats.skipped, indexed_per_crystal
    );
    let n_indexed: usize = indexed_per_crystal.iter().sum();
    info!(
        "Local assignment: {} indexed, {} unindexed (k = {}, tolerance {:.3})",
        n_indexed,
        rlps.len() - n_indexed,
        k,
        config.tolerance
    );
    reflections
}

/// Fit `T` with `T·p_j ≈ h_j` over the neighbours, judge it, and round
/// `T·rlp`.
fn fit_local_map(
    rlp: &Vector3,
    crystal: &CrystalModel,
    neighbours: &[(usize, f64)],
    reflections: &[Reflection],
    config: &LocalAssignConfig,
    min_neighbours: usize,
) -> LocalFit {
    // Index distance under the model; a few percent of model error does not
    // matter at this scale.
    let to_fractional = crystal.reciprocal_matrix_inverse();
    let delta = f64::from(config.delta);
    let usable: Vec<(usize, f64)> = neighbours
        .iter()
        .copied()
        .filter(|&(j, _)| (to_fractional * (reflections[j].rlp - rlp)).amax() <= delta)
        .collect();
    if usable.len() < min_neighbours {
        return LocalFit::Underdetermined;
    }

    let d_far = usable.iter().map(|&(_, d)| d).fold(0.0, f64::max);
    let mut samples: Vec<Sample> = usable
        .iter()
        .map(|&(j, d)| Sample {
            rlp: reflections[j].rlp,
            hkl: miller_to_vector(&reflections[j].miller_index),
            weight: if d_far > 0.0 {
                1.0 / (1.0 + (d / d_far).powi(2))
            } else {
                1.0
            },
        })
        .collect();

    let Some((mut t, mut eqns)) = solve_samples(&samples) else {
        return LocalFit::Underdetermined;
    };

    let n_samples = samples.len();
    samples.retain(|s| (t * s.rlp - s.hkl).norm() <= config.tolerance);
    if (samples.len() as f64) < config.l_min * n_samples as f64 {
        return LocalFit::Rejected;
    }
    if samples.len() < n_samples {
        if samples.len() < min_neighbours {
            return LocalFit::Rejected;
        }
        let Some(refit) = solve_samples(&samples) else {
            return LocalFit::Rejected;
        };
        (t, eqns) = refit;
    }

    if weighted_rms(&t, &samples) > config.epsilon {
        return LocalFit::Rejected;
    }
    match eqns.prediction_variance(rlp) {
        Some(v) if v <= MAX_PREDICTION_VARIANCE => {}
        _ => return LocalFit::Underdetermined,
    }

    let (hkl, residual) = round_miller_index(&(t * rlp));
    LocalFit::Fitted(hkl, residual)
}

fn solve_samples(samples: &[Sample]) -> Option<(Matrix3, NormalEquations3)> {
    let mut eqns = NormalEquations3::new();
    for s in samples {
        eqns.add_equation(&s.rlp, &s.hkl, s.weight);
    }
    let t = eqns.solve()?;
    Some((t, eqns))
}

fn weighted_rms(t: &Matrix3, samples: &[Sample]) -> f64 {
    let (sum, weight) = samples.iter().fold((0.0, 0.0), |(sum, weight), s| {
        (sum + s.weight * (t * s.rlp - s.hkl).norm_squared(), weight + s.weight)
    });
    if weight > 0.0 {
        (sum / weight).sqrt()
    } else {
        f64::INFINITY
    }
}
