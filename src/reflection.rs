//! Define a reflection: one observed diffraction spot mapped into reciprocal
//! space, together with the Miller index and crystal an assigner gave it.
//! Reflections are the input to and output of the assignment passes.

use crate::Vector3;

/// Integer Miller index `(h, k, l)`.
pub type MillerIndex = [i32; 3];

/// Sentinel index meaning "no crystal explained this observation".
pub const UNINDEXED: MillerIndex = [0, 0, 0];

/// Returns `true` if `hkl` is the unindexed sentinel.
#[inline]
pub fn is_unindexed(hkl: &MillerIndex) -> bool {
    *hkl == UNINDEXED
}

/// One observation and its assignment. Unindexed reflections carry
/// [`UNINDEXED`] and no crystal id.
#[derive(Debug, Clone, PartialEq)]
pub struct Reflection {
    /// Reciprocal-space position of the spot, in inverse length units.
    pub rlp: Vector3,
    /// Assigned Miller index, or [`UNINDEXED`].
    pub miller_index: MillerIndex,
    /// Index into the candidate crystal list. `None` when unindexed
    /// (the `-1` id of reflection tables).
    pub crystal_id: Option<usize>,
    /// Distance in fractional-index units from the nearest lattice point.
    /// Only meaningful when the reflection is indexed.
    pub residual: f64,
}

impl Reflection {
    /// A fresh, unassigned reflection at reciprocal-space point `rlp`.
    pub fn unassigned(rlp: Vector3) -> Self {
        Self {
            rlp,
            miller_index: UNINDEXED,
            crystal_id: None,
            residual: 0.0,
        }
    }

    /// An indexed reflection.
    pub fn indexed(rlp: Vector3, miller_index: MillerIndex, crystal_id: usize, residual: f64) -> Self {
        Self {
            rlp,
            miller_index,
            crystal_id: Some(crystal_id),
            residual,
        }
    }

    pub fn is_indexed(&self) -> bool {
        !is_unindexed(&self.miller_index)
    }

    /// Reflection table style id: the crystal index, or `-1` if unassigned.
    pub fn id(&self) -> i64 {
        self.crystal_id.map(|id| id as i64).unwrap_or(-1)
    }

    /// Resolution of the spot, `d = 1 / |rlp|`. Infinite at the origin.
    pub fn d_spacing(&self) -> f64 {
        let norm = self.rlp.norm();
        if norm > 0.0 {
            1.0 / norm
        } else {
            f64::INFINITY
        }
    }

    /// Reset to the unassigned state, keeping the position.
    pub fn clear_assignment(&mut self) {
        self.miller_index = UNINDEXED;
        self.crystal_id = None;
        self.residual = 0.0;
    }
}

/// Wrap reciprocal-space points as unassigned reflections.
pub fn reflections_from_rlps(rlps: &[Vector3]) -> Vec<Reflection> {
    rlps.iter().map(|&p| Reflection::unassigned(p)).collect()
}

/// Count of reflections with a non-sentinel index.
pub fn count_indexed(reflections: &[Reflection]) -> usize {
    reflections.iter().filter(|r| r.is_indexed()).count()
}
