//! Crystal model: real-space basis vectors and the reciprocal transforms
//! derived from them.
//!
//! `CrystalModel` holds the basis `a, b, c` of one candidate lattice together
//! with two cached matrices used by every assignment pass.
//!
//! # Conventions
//!
//! - **Real-space matrix** `R`: columns are `a, b, c`.
//! - **Reciprocal matrix** `A = (R⁻¹)ᵀ`: columns are `a*, b*, c*`, so a
//!   reciprocal lattice point is `p = A · (h, k, l)`.
//! - **Fractionalization matrix** `A⁻¹ = Rᵀ`: rows are `a, b, c`, so the
//!   fractional Miller index of a point is `f = A⁻¹ · p`, i.e. `h = a · p`.
//!
//! ```text
//! (h, k, l) ── A ──▶ p        p ── A⁻¹ ──▶ (h, k, l) + error
//! ```

use tracing::debug;

use crate::error::{IndexingError, Result};
use crate::reflection::MillerIndex;
use crate::reindex::ChangeOfBasis;
use crate::{Matrix3, Vector3};

/// Relative determinant below which a basis is treated as singular.
const SINGULAR_BASIS_TOLERANCE: f64 = 1e-10;

// ── Unit cell ───────────────────────────────────────────────────────────────

/// Unit cell parameters. Lengths in arbitrary (consistent) units, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UnitCell {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl UnitCell {
    pub fn new(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            a,
            b,
            c,
            alpha,
            beta,
            gamma,
        }
    }

    /// Cubic cell with edge `a`.
    pub fn cubic(a: f64) -> Self {
        Self::new(a, a, a, 90.0, 90.0, 90.0)
    }

    /// Cell parameters of the lattice spanned by the columns of `real_space`.
    pub fn from_real_space_matrix(real_space: &Matrix3) -> Self {
        let a: Vector3 = real_space.column(0).into_owned();
        let b: Vector3 = real_space.column(1).into_owned();
        let c: Vector3 = real_space.column(2).into_owned();
        Self {
            a: a.norm(),
            b: b.norm(),
            c: c.norm(),
            alpha: b.angle(&c).to_degrees(),
            beta: a.angle(&c).to_degrees(),
            gamma: a.angle(&b).to_degrees(),
        }
    }

    /// `sqrt(1 - cos²α - cos²β - cos²γ + 2 cosα cosβ cosγ)`, the volume of a
    /// unit-edge cell with these angles.
    fn volume_factor(&self) -> f64 {
        let (ca, cb, cg) = (
            self.alpha.to_radians().cos(),
            self.beta.to_radians().cos(),
            self.gamma.to_radians().cos(),
        );
        (1.0 - ca * ca - cb * cb - cg * cg + 2.0 * ca * cb * cg)
            .max(0.0)
            .sqrt()
    }

    pub fn volume(&self) -> f64 {
        self.a * self.b * self.c * self.volume_factor()
    }

    /// Orthogonalization matrix (real-space basis as columns), with `a`
    /// along x and `b` in the xy-plane.
    pub fn orthogonalization_matrix(&self) -> Matrix3 {
        let (ca, cb) = (self.alpha.to_radians().cos(), self.beta.to_radians().cos());
        let (sg, cg) = self.gamma.to_radians().sin_cos();
        let v = self.volume_factor();
        Matrix3::new(
            self.a,
            self.b * cg,
            self.c * cb,
            0.0,
            self.b * sg,
            self.c * (ca - cb * cg) / sg,
            0.0,
            0.0,
            self.c * v / sg,
        )
    }

    /// Reciprocal basis `B` (columns `a*, b*, c*`) in the same Cartesian frame
    /// as [`UnitCell::orthogonalization_matrix`]. Returns `None` for a
    /// degenerate cell.
    pub fn reciprocal_matrix(&self) -> Option<Matrix3> {
        self.orthogonalization_matrix()
            .try_inverse()
            .map(|f| f.transpose())
    }

    /// Interplanar spacing of reflection `hkl`. Infinite for `(0, 0, 0)`.
    pub fn d_spacing(&self, hkl: &MillerIndex) -> f64 {
        let Some(b) = self.reciprocal_matrix() else {
            return f64::NAN;
        };
        let s = b * miller_to_vector(hkl);
        let norm = s.norm();
        if norm > 0.0 {
            1.0 / norm
        } else {
            f64::INFINITY
        }
    }
}

// ── Crystal model ───────────────────────────────────────────────────────────

/// One candidate crystal: orientation and metric of its lattice.
///
/// Immutable after construction; both the reciprocal matrix and its inverse
/// are computed once and cached.
#[derive(Debug, Clone, PartialEq)]
pub struct CrystalModel {
    real_space: Matrix3,
    reciprocal: Matrix3,
    reciprocal_inverse: Matrix3,
    space_group: Option<String>,
}

impl CrystalModel {
    /// Build a crystal from real-space basis vectors.
    ///
    /// Fails with [`IndexingError::InvalidTransform`] if the vectors are
    /// (nearly) linearly dependent.
    pub fn new(a: Vector3, b: Vector3, c: Vector3) -> Result<Self> {
        Self::from_real_space_matrix(Matrix3::from_columns(&[a, b, c]))
    }

    /// Build a crystal from a matrix whose columns are `a, b, c`.
    pub fn from_real_space_matrix(real_space: Matrix3) -> Result<Self> {
        let scale = real_space.column(0).norm()
            * real_space.column(1).norm()
            * real_space.column(2).norm();
        let det = real_space.determinant();
        if !det.is_finite() || scale <= 0.0 || (det / scale).abs() < SINGULAR_BASIS_TOLERANCE {
            return Err(IndexingError::InvalidTransform(format!(
                "real-space basis is singular (det = {det:e})"
            )));
        }
        let inverse = real_space.try_inverse().ok_or_else(|| {
            IndexingError::InvalidTransform("real-space basis is not invertible".to_string())
        })?;
        Ok(Self {
            real_space,
            reciprocal: inverse.transpose(),
            reciprocal_inverse: real_space.transpose(),
            space_group: None,
        })
    }

    /// Build a crystal from a reciprocal matrix `A = U·B`. The real-space
    /// vectors are the rows of `A⁻¹`.
    pub fn from_reciprocal_matrix(reciprocal: &Matrix3) -> Result<Self> {
        let direct = reciprocal.try_inverse().ok_or_else(|| {
            IndexingError::InvalidTransform("reciprocal matrix is not invertible".to_string())
        })?;
        Self::from_real_space_matrix(direct.transpose())
    }

    /// Build a crystal from unit cell parameters and an orientation matrix `U`.
    pub fn from_unit_cell(cell: &UnitCell, orientation: &Matrix3) -> Result<Self> {
        Self::from_real_space_matrix(orientation * cell.orthogonalization_matrix())
    }

    /// Tag the crystal with a space group symbol. The tag is carried along
    /// for scoring and reporting; assignment never reads it.
    pub fn with_space_group(mut self, symbol: impl Into<String>) -> Self {
        self.space_group = Some(symbol.into());
        self
    }

    pub fn space_group(&self) -> Option<&str> {
        self.space_group.as_deref()
    }

    /// Real-space basis vectors `[a, b, c]`.
    pub fn real_space_vectors(&self) -> [Vector3; 3] {
        [
            self.real_space.column(0).into_owned(),
            self.real_space.column(1).into_owned(),
            self.real_space.column(2).into_owned(),
        ]
    }

    pub fn real_space_matrix(&self) -> &Matrix3 {
        &self.real_space
    }

    /// Reciprocal matrix `A` (columns `a*, b*, c*`).
    pub fn reciprocal_matrix(&self) -> &Matrix3 {
        &self.reciprocal
    }

    /// Fractionalization matrix `A⁻¹`, mapping reciprocal-space points to
    /// fractional Miller indices.
    pub fn reciprocal_matrix_inverse(&self) -> &Matrix3 {
        &self.reciprocal_inverse
    }

    pub fn unit_cell(&self) -> UnitCell {
        UnitCell::from_real_space_matrix(&self.real_space)
    }

    /// Reciprocal lattice point of `hkl`.
    pub fn predict_rlp(&self, hkl: &MillerIndex) -> Vector3 {
        self.reciprocal * miller_to_vector(hkl)
    }

    /// Fractional Miller index of reciprocal-space point `rlp`.
    pub fn fractional_index(&self, rlp: &Vector3) -> Vector3 {
        self.reciprocal_inverse * rlp
    }

    /// Apply a change of basis: the new basis vectors are
    /// `a'_i = Σ_j M_ij a_j`, so indices transform as `h' = M·h`.
    ///
    /// Singular operators are rejected. Operators with `|det| != 1` describe
    /// a super- or sub-cell and are accepted.
    pub fn change_basis(&self, cb_op: &ChangeOfBasis) -> Result<Self> {
        let m = cb_op.as_matrix();
        let det = m.determinant();
        if det.abs() < SINGULAR_BASIS_TOLERANCE {
            return Err(IndexingError::InvalidTransform(format!(
                "change of basis {cb_op} is singular"
            )));
        }
        if (det.abs() - 1.0).abs() > 1e-9 {
            debug!("Change of basis {} has determinant {:.3}", cb_op, det);
        }
        let mut model = Self::from_real_space_matrix(self.real_space * m.transpose())?;
        model.space_group = self.space_group.clone();
        Ok(model)
    }

    /// Rotate the crystal: `R' = U·R`.
    pub fn rotated(&self, rotation: &Matrix3) -> Result<Self> {
        let mut model = Self::from_real_space_matrix(rotation * self.real_space)?;
        model.space_group = self.space_group.clone();
        Ok(model)
    }
}

#[inline]
pub(crate) fn miller_to_vector(hkl: &MillerIndex) -> Vector3 {
    Vector3::new(hkl[0] as f64, hkl[1] as f64, hkl[2] as f64)
}

/// Build the orientation-and-metric matrix `A` from a unit cell and an orientation.
pub fn reciprocal_matrix_from_cell(cell: &UnitCell, orientation: &Matrix3) -> Option<Matrix3> {
    cell.reciprocal_matrix().map(|b| orientation * b)
}

// ── Tests ───────────────────────────────────────────────────────────────────
