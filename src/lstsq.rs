//! Three-parameter weighted linear least squares with a shared design matrix.
//!
//! Both the local assigner and reindexing discovery solve three independent
//! systems `x · r_i ≈ b_i` (one per output row) that share the same 3-column
//! design matrix. The normal matrix `Σ w x xᵀ` is accumulated once and the
//! three right-hand sides `Σ w x b_i` alongside it, so each fit costs one
//! 3×3 factorization regardless of the number of equations.

use nalgebra::Cholesky;

use crate::{Matrix3, Vector3};

/// Smallest-to-largest eigenvalue ratio of the normal matrix below which the
/// design is considered numerically rank deficient. A neighbourhood that is
/// only nearly coplanar passes this floor; callers that extrapolate should
/// also check [`NormalEquations3::prediction_variance`].
pub const MIN_CONDITION: f64 = 1e-8;

/// Accumulator for the normal equations of three row-wise LS systems.
#[derive(Debug, Clone)]
pub struct NormalEquations3 {
    ata: Matrix3,
    /// Column `i` holds `Σ w x b_i`.
    atb: Matrix3,
    n_equations: usize,
}

impl Default for NormalEquations3 {
    fn default() -> Self {
        Self::new()
    }
}

impl NormalEquations3 {
    pub fn new() -> Self {
        Self {
            ata: Matrix3::zeros(),
            atb: Matrix3::zeros(),
            n_equations: 0,
        }
    }

    /// Add one equation: design row `x`, right-hand sides `b` (one per system).
    pub fn add_equation(&mut self, x: &Vector3, b: &Vector3, weight: f64) {
        let wx = x * weight;
        self.ata += wx * x.transpose();
        self.atb += wx * b.transpose();
        self.n_equations += 1;
    }

    /// Ratio of the smallest to the largest eigenvalue of the normal matrix.
    /// Zero when nothing has been accumulated.
    pub fn condition(&self) -> f64 {
        let eig = self.ata.symmetric_eigenvalues();
        let max = eig.max();
        if max <= 0.0 || !max.is_finite() {
            return 0.0;
        }
        (eig.min() / max).max(0.0)
    }

    /// `xᵀ (Σ w x xᵀ)⁻¹ x`: the variance of `T·x` relative to the noise of a
    /// unit-weight equation. Scale free. Small when `x` lies inside the cloud
    /// of design rows, large when reaching `x` needs a direction the rows
    /// barely span. `None` when the normal matrix is not positive definite.
    pub fn prediction_variance(&self, x: &Vector3) -> Option<f64> {
        let chol = Cholesky::new(self.ata)?;
        let v = x.dot(&chol.solve(x));
        v.is_finite().then_some(v.max(0.0))
    }

    /// Solve all three systems.
    ///
    /// Returns the matrix `T` whose row `i` is the solution of system `i`,
    /// so that `T · x ≈ b` for every accumulated equation. `None` if fewer
    /// than three equations were added or the design is rank deficient.
    pub fn solve(&self) -> Option<Matrix3> {
        if self.n_equations < 3 || self.condition() < MIN_CONDITION {
            return None;
        }
        let chol = Cholesky::new(self.ata)?;
        // Column i of the solution is r_i; rows of T are the r_i.
        let solution = chol.solve(&self.atb);
        if solution.iter().all(|v| v.is_finite()) {
            Some(solution.transpose())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recovers_exact_linear_map() {
        let t = Matrix3::new(2.0, 0.5, -1.0, 0.0, 3.0, 0.25, 1.0, -1.0, 4.0);
        let xs = [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(-2.0, 0.5, 1.0),
        ];
        let mut eqns = NormalEquations3::new();
        for (i, x) in xs.iter().enumerate() {
            eqns.add_equation(x, &(t * x), 1.0 + i as f64);
        }
        let solved = eqns.solve().unwrap();
        assert!((solved - t).abs().max() < 1e-10);
    }

    #[test]
    fn test_too_few_equations() {
        let mut eqns = NormalEquations3::new();
        eqns.add_equation(&Vector3::new(1.0, 0.0, 0.0), &Vector3::new(1.0, 0.0, 0.0), 1.0);
        eqns.add_equation(&Vector3::new(0.0, 1.0, 0.0), &Vector3::new(0.0, 1.0, 0.0), 1.0);
        assert!(eqns.solve().is_none());
    }

    #[test]
    fn test_collinear_design_is_rejected() {
        let mut eqns = NormalEquations3::new();
        for i in 1..6 {
            let x = Vector3::new(i as f64, 2.0 * i as f64, -(i as f64));
            eqns.add_equation(&x, &x, 1.0);
        }
        assert!(eqns.condition() < MIN_CONDITION);
        assert!(eqns.solve().is_none());
    }

    #[test]
    fn test_coplanar_design_is_rejected() {
        let mut eqns = NormalEquations3::new();
        for x in [
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
            Vector3::new(1.0, 1.0, 0.0),
            Vector3::new(2.0, -1.0, 0.0),
        ] {
            eqns.add_equation(&x, &x, 1.0);
        }
        assert!(eqns.solve().is_none());
    }

    #[test]
    fn test_prediction_variance_flags_extrapolation() {
        // Four rows close to the xz-plane: solvable, but y is barely seen.
        let mut eqns = NormalEquations3::new();
        for x in [
            Vector3::new(1.0, 0.001, 0.0),
            Vector3::new(-1.0, 0.001, 0.0),
            Vector3::new(0.0, 0.001, 1.0),
            Vector3::new(0.0, -0.001, 1.0),
        ] {
            eqns.add_equation(&x, &x, 1.0);
        }
        assert!(eqns.solve().is_some());
        let inside = eqns.prediction_variance(&Vector3::new(1.0, 0.0, 1.0)).unwrap();
        let outside = eqns.prediction_variance(&Vector3::new(0.0, 1.0, 0.0)).unwrap();
        assert!((inside - 1.0).abs() < 1e-9, "inside {inside}");
        assert!(outside > 1e4, "outside {outside}");

        // Uniform scaling of the design leaves the variance unchanged.
        let mut scaled = NormalEquations3::new();
        for x in [
            Vector3::new(1.0, 0.001, 0.0),
            Vector3::new(-1.0, 0.001, 0.0),
            Vector3::new(0.0, 0.001, 1.0),
            Vector3::new(0.0, -0.001, 1.0),
        ] {
            scaled.add_equation(&(x * 0.02), &x, 1.0);
        }
        let rescaled = scaled.prediction_variance(&Vector3::new(0.02, 0.0, 0.02)).unwrap();
        assert!((rescaled - inside).abs() < 1e-9 * inside.max(1.0));
    }
}
