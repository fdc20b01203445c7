//! Scoring assignments against known indices.
//!
//! "Correct" is exact equality with the expected index. "Misindexed" counts
//! only reflections that were given an index different from the expected
//! one; a reflection left unindexed abstained and is counted separately.
//! A wrong index silently corrupts refinement downstream, so a method that
//! abstains on hard points is preferred over one that guesses.

use tracing::info;

use crate::assign::{assign_global, assign_local, GlobalAssignConfig, LocalAssignConfig};
use crate::crystal::CrystalModel;
use crate::reflection::{MillerIndex, Reflection};
use crate::Vector3;

/// Outcome counts for one assignment method.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MethodStats {
    pub correct: usize,
    pub misindexed: usize,
    pub unindexed: usize,
}

impl MethodStats {
    /// Score `result` against `expected`, position by position.
    ///
    /// # Panics
    ///
    /// If the two slices differ in length.
    pub fn score(result: &[Reflection], expected: &[MillerIndex]) -> Self {
        assert_eq!(
            result.len(),
            expected.len(),
            "result and expected indices must have the same length"
        );
        let mut stats = Self::default();
        for (refl, hkl) in result.iter().zip(expected.iter()) {
            debug_assert_eq!(refl.is_indexed(), refl.crystal_id.is_some());
            if !refl.is_indexed() {
                stats.unindexed += 1;
            } else if refl.miller_index == *hkl {
                stats.correct += 1;
            } else {
                stats.misindexed += 1;
            }
        }
        stats
    }
}

/// Side-by-side scores of the global and local methods on one dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparison {
    pub misindexed_global: usize,
    pub correct_global: usize,
    pub misindexed_local: usize,
    pub correct_local: usize,
    pub total: usize,
    pub unindexed_global: usize,
    pub unindexed_local: usize,
}

impl Comparison {
    pub fn global(&self) -> MethodStats {
        MethodStats {
            correct: self.correct_global,
            misindexed: self.misindexed_global,
            unindexed: self.unindexed_global,
        }
    }

    pub fn local(&self) -> MethodStats {
        MethodStats {
            correct: self.correct_local,
            misindexed: self.misindexed_local,
            unindexed: self.unindexed_local,
        }
    }

    /// `true` if the local result should be trusted over the global one: no
    /// more misindexed reflections and at least as many correct.
    pub fn prefer_local(&self) -> bool {
        self.misindexed_local <= self.misindexed_global && self.correct_local >= self.correct_global
    }
}

/// Score two assignments of the same reflections against `expected`.
pub fn compare(global: &[Reflection], local: &[Reflection], expected: &[MillerIndex]) -> Comparison {
    let g = MethodStats::score(global, expected);
    let l = MethodStats::score(local, expected);
    Comparison {
        misindexed_global: g.misindexed,
        correct_global: g.correct,
        misindexed_local: l.misindexed,
        correct_local: l.correct,
        total: expected.len(),
        unindexed_global: g.unindexed,
        unindexed_local: l.unindexed,
    }
}

/// Run both assigners on `rlps` and score them against `expected`.
///
/// Returns the comparison along with both assignments.
pub fn compare_global_local(
    rlps: &[Vector3],
    crystals: &[CrystalModel],
    expected: &[MillerIndex],
    global_config: &GlobalAssignConfig,
    local_config: &LocalAssignConfig,
) -> (Comparison, Vec<Reflection>, Vec<Reflection>) {
    let global = assign_global(rlps, crystals, global_config);
    let local = assign_local(rlps, crystals, local_config);
    let comparison = compare(&global, &local, expected);
    info!(
        "Global: {} correct, {} misindexed; local: {} correct, {} misindexed (of {})",
        comparison.correct_global,
        comparison.misindexed_global,
        comparison.correct_local,
        comparison.misindexed_local,
        comparison.total
    );
    (comparison, global, local)
}
