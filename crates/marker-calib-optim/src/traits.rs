use anyhow::{ensure, Result};
use marker_calib_core::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Generic non-linear least squares problem with dense parameter/residual vectors.
///
/// The default implementations apply robust IRLS row scaling without differentiating
/// the weights: residuals and Jacobian rows are scaled by `sqrt(w_i)` computed from
/// unweighted residuals.
pub trait NllsProblem {
    /// Number of parameters in the optimization vector.
    fn num_params(&self) -> usize;
    /// Number of residual rows in the problem.
    fn num_residuals(&self) -> usize;

    /// Unweighted residuals for the current parameters.
    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;
    /// Unweighted Jacobian for the current parameters.
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// Per-row IRLS scales (sqrt(weights)) computed from unweighted residuals.
    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        DVector::from_element(r_unweighted.len(), 1.0)
    }

    /// Weighted residuals used by the solver.
    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = self.residuals_unweighted(x);
        let scales = self.robust_row_scales(&r);
        debug_assert_eq!(scales.len(), r.len());
        r.component_mul_assign(&scales);
        r
    }

    /// Weighted Jacobian used by the solver.
    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let r_unweighted = self.residuals_unweighted(x);
        let scales = self.robust_row_scales(&r_unweighted);
        let mut j = self.jacobian_unweighted(x);
        debug_assert_eq!(scales.len(), j.nrows());
        for (mut row, scale) in j.row_iter_mut().zip(scales.iter()) {
            if *scale != 1.0 {
                row.scale_mut(*scale);
            }
        }
        j
    }

    /// Least-squares cost `0.5 * ||r||^2` of the weighted residuals.
    fn cost(&self, x: &DVector<Real>) -> Real {
        0.5 * self.residuals(x).norm_squared()
    }
}

/// Solver tolerances and limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Maximum number of solver iterations before termination.
    ///
    /// The LM backend follows the MINPACK convention and caps function
    /// evaluations at `max_iters * (n + 1)`.
    pub max_iters: usize,
    /// Relative tolerance on the objective (cost) reduction.
    pub ftol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
    /// Log every cost evaluation at `debug` level.
    pub verbose: bool,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-10,
            gtol: 1e-10,
            xtol: 1e-10,
            verbose: false,
        }
    }
}

impl SolveOptions {
    /// Reject limits the LM backend cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.max_iters > 0, "max_iters must be at least 1");
        for (name, tol) in [("ftol", self.ftol), ("xtol", self.xtol), ("gtol", self.gtol)] {
            ensure!(
                tol.is_finite() && tol >= 0.0,
                "{name} must be a non-negative number, got {tol}"
            );
        }
        Ok(())
    }
}

/// How the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// A tolerance was met or the residuals vanished.
    Converged,
    /// The iteration cap was hit first.
    MaxIterations,
    /// The tolerances are too tight for further progress in floating point.
    Stalled,
    /// The solver hit non-finite values or an inconsistent problem.
    NumericalFailure,
    /// The solver stopped with corners still behind their camera, so the
    /// cost is dominated by the constant depth penalty.
    InvalidDepth,
}

/// Outcome of a solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveReport {
    pub status: SolveStatus,
    /// Residual evaluations performed by the backend. The LM crate counts
    /// evaluations, not outer iterations.
    pub evaluations: usize,
    /// Cost `0.5 * ||r||^2` at the starting point.
    pub initial_cost: Real,
    /// Cost `0.5 * ||r||^2` at the returned point.
    pub final_cost: Real,
}

impl SolveReport {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scaled;

    impl NllsProblem for Scaled {
        fn num_params(&self) -> usize {
            1
        }
        fn num_residuals(&self) -> usize {
            2
        }
        fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_vec(vec![x[0], 2.0 * x[0]])
        }
        fn jacobian_unweighted(&self, _x: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_vec(2, 1, vec![1.0, 2.0])
        }
        fn robust_row_scales(&self, r: &DVector<Real>) -> DVector<Real> {
            DVector::from_element(r.len(), 0.5)
        }
    }

    #[test]
    fn row_scales_apply_to_residuals_and_jacobian() {
        let x = DVector::from_element(1, 4.0);
        let p = Scaled;
        assert_eq!(p.residuals(&x).as_slice(), &[2.0, 4.0]);
        assert_eq!(p.jacobian(&x).as_slice(), &[0.5, 1.0]);
        assert!((p.cost(&x) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn solve_options_fill_missing_fields() {
        let opts: SolveOptions = serde_json::from_str(r#"{ "max_iters": 50 }"#).unwrap();
        assert_eq!(opts.max_iters, 50);
        assert_eq!(opts.ftol, 1e-10);
        assert_eq!(opts.xtol, 1e-10);
        assert!(!opts.verbose);
    }

    #[test]
    fn solve_options_reject_unusable_limits() {
        assert!(SolveOptions::default().validate().is_ok());

        let mut opts = SolveOptions::default();
        opts.xtol = -1e-6;
        let err = opts.validate().unwrap_err();
        assert!(err.to_string().contains("xtol"), "{err}");

        let mut opts = SolveOptions::default();
        opts.gtol = Real::NAN;
        assert!(opts.validate().is_err());

        let mut opts = SolveOptions::default();
        opts.max_iters = 0;
        assert!(opts.validate().is_err());
    }
}
