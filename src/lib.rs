//! # hklindex
//!
//! **Miller index assignment** for reciprocal-space spot observations.
//!
//! Given reciprocal lattice points measured from a diffraction experiment and
//! one or more candidate crystal models, `hklindex` labels each point with the
//! integer index `(h, k, l)` and crystal that explain it, or leaves it
//! unindexed when nothing does.
//!
//! ## Features
//!
//! - **Global assignment**: round `A⁻¹·p` per crystal, best crystal wins,
//!   parallel over reflections
//! - **Local assignment**: per-reflection linear maps fitted from already
//!   indexed neighbours, robust to a few percent of cell or orientation error
//! - **Multiple crystals**: any number of candidates, deterministic
//!   lowest-id tie-break
//! - **Reindexing**: rational change-of-basis operators, with discovery of the
//!   operator relating two labelings of the same reflections
//! - **Scoring**: correct / misindexed / unindexed counts against known indices
//!
//! ## Example
//!
//! ```
//! use hklindex::{
//!     assign_global, assign_local, compare, CrystalModel, GlobalAssignConfig,
//!     LocalAssignConfig, UnitCell,
//! };
//! use hklindex::predict::{predict_reflections, rotation_from_euler_deg, scale_basis};
//!
//! let cell = UnitCell::cubic(50.0);
//! let truth = CrystalModel::from_unit_cell(&cell, &rotation_from_euler_deg([10.0, 20.0, 30.0])).unwrap();
//! let predicted = predict_reflections(&truth, 4.0);
//! let rlps: Vec<_> = predicted.iter().map(|r| r.rlp).collect();
//! let expected: Vec<_> = predicted.iter().map(|r| r.miller_index).collect();
//!
//! // A model whose cell is 2 % too long.
//! let model = scale_basis(&truth, 0.02).unwrap();
//!
//! let global = assign_global(&rlps, std::slice::from_ref(&model), &GlobalAssignConfig::new(0.2));
//! let local = assign_local(&rlps, &[model], &LocalAssignConfig::new(0.2, 20));
//! let stats = compare(&global, &local, &expected);
//! assert!(stats.correct_local >= stats.correct_global);
//! ```
//!
//! ## Algorithm overview
//!
//! 1. **Fractionalization**: a crystal with real-space basis `a, b, c` maps a
//!    reciprocal lattice point to fractional indices `f = A⁻¹·p`, with
//!    `a, b, c` as the rows of `A⁻¹`
//! 2. **Rounding**: the nearest integer triple, with residual `‖f − round(f)‖`
//!    in index units; `(0, 0, 0)` is the unindexed sentinel
//! 3. **Global pass**: every reflection independently, every crystal, smallest
//!    residual within tolerance wins
//! 4. **Local pass**: reflections in order of increasing `|p|`; each takes its
//!    `k` nearest indexed neighbours from a grid index, fits `T` with
//!    `T·p_j ≈ h_j` by weighted least squares, and rounds `T·p`. Too few
//!    neighbours, neighbours that barely span the direction of `p`, or a fit
//!    the neighbours disagree with fall back to the global rounding
//! 5. **Scoring**: both passes write fresh result vectors, compared
//!    position-by-position against known indices
//!
//! Per-reflection failures are never errors: they show up as unindexed
//! reflections. [`IndexingError`] is reserved for malformed inputs such as a
//! singular basis or an unparsable operator.

pub mod assign;
pub mod compare;
pub mod crystal;
pub mod error;
pub mod geometry;
pub mod lstsq;
pub mod neighbors;
pub mod predict;
pub mod reflection;
pub mod reindex;
pub mod rounding;

pub use assign::{
    assign_global, assign_local, assign_local_with_index, index_reflections, AssignmentMethod,
    GlobalAssignConfig, LocalAssignConfig,
};
pub use compare::{compare, compare_global_local, Comparison, MethodStats};
pub use crystal::{CrystalModel, UnitCell};
pub use error::{IndexingError, Result};
pub use geometry::{map_spots_to_reciprocal_space, ReciprocalSpaceMapping, SpotObservation};
pub use neighbors::NeighborIndex;
pub use reflection::{MillerIndex, Reflection, UNINDEXED};
pub use reindex::{derive_change_of_basis, reindex_reflections, ChangeOfBasis};

// Commonly used types. Index-space residuals of a few hundredths at
// |h| in the hundreds need 64-bit precision throughout.
pub type Vector3 = nalgebra::Vector3<f64>;
pub type Matrix3 = nalgebra::Matrix3<f64>;
