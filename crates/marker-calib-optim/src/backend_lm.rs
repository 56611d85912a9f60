use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport, SolveStatus};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::{debug, warn};
use marker_calib_core::Real;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn};

struct LmWrapper<'a, P: NllsProblem> {
    problem: &'a P,
    params: DVector<Real>,
    verbose: bool,
}

impl<'a, P: NllsProblem> LeastSquaresProblem<Real, Dyn, Dyn> for LmWrapper<'a, P> {
    type ResidualStorage = Owned<Real, Dyn>;
    type JacobianStorage = Owned<Real, Dyn, Dyn>;
    type ParameterStorage = Owned<Real, Dyn>;

    fn set_params(&mut self, x: &DVector<Real>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<Real> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<Real>> {
        let r = self.problem.residuals(&self.params);
        if self.verbose {
            debug!("lm: cost {:.6e}", 0.5 * r.norm_squared());
        }
        Some(r)
    }

    fn jacobian(&self) -> Option<DMatrix<Real>> {
        Some(self.problem.jacobian(&self.params))
    }
}

fn status_from_termination(reason: &TerminationReason) -> SolveStatus {
    match reason {
        TerminationReason::ResidualsZero
        | TerminationReason::Orthogonal
        | TerminationReason::Converged { .. } => SolveStatus::Converged,
        TerminationReason::LostPatience => SolveStatus::MaxIterations,
        TerminationReason::NoImprovementPossible(_) => SolveStatus::Stalled,
        TerminationReason::User(_)
        | TerminationReason::Numerical(_)
        | TerminationReason::NoParameters
        | TerminationReason::NoResiduals
        | TerminationReason::WrongDimensions(_) => SolveStatus::NumericalFailure,
    }
}

/// Levenberg-Marquardt backend built on the `levenberg-marquardt` crate.
#[derive(Debug, Default, Clone)]
pub struct LmBackend;

impl NllsSolverBackend for LmBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport) {
        let initial_cost = problem.cost(&x0);

        let lm = LevenbergMarquardt::new()
            .with_ftol(opts.ftol)
            .with_xtol(opts.xtol)
            .with_gtol(opts.gtol)
            .with_patience(opts.max_iters.max(1));

        let wrapper = LmWrapper {
            problem,
            params: x0,
            verbose: opts.verbose,
        };

        let (wrapper, report) = lm.minimize(wrapper);
        let status = status_from_termination(&report.termination);
        if status != SolveStatus::Converged {
            warn!("lm: stopped without convergence: {:?}", report.termination);
        } else {
            debug!("lm: {:?}", report.termination);
        }

        (
            wrapper.params,
            SolveReport {
                status,
                evaluations: report.number_of_evaluations,
                initial_cost,
                final_cost: report.objective_function,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::LmBackend;
    use crate::{NllsProblem, NllsSolverBackend, SolveOptions, SolveStatus};
    use marker_calib_core::Real;
    use nalgebra::{DMatrix, DVector};

    #[derive(Debug)]
    struct OneDimProblem;

    impl NllsProblem for OneDimProblem {
        fn num_params(&self) -> usize {
            1
        }

        fn num_residuals(&self) -> usize {
            1
        }

        fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
            DVector::from_element(1, x[0] - 3.0)
        }

        fn jacobian_unweighted(&self, _x: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_element(1, 1, 1.0)
        }
    }

    /// Rosenbrock function written as residuals `[10 (y - x^2), 1 - x]`.
    struct Rosenbrock;

    impl NllsProblem for Rosenbrock {
        fn num_params(&self) -> usize {
            2
        }

        fn num_residuals(&self) -> usize {
            2
        }

        fn residuals_unweighted(&self, p: &DVector<Real>) -> DVector<Real> {
            DVector::from_vec(vec![10.0 * (p[1] - p[0] * p[0]), 1.0 - p[0]])
        }

        fn jacobian_unweighted(&self, p: &DVector<Real>) -> DMatrix<Real> {
            DMatrix::from_row_slice(2, 2, &[-20.0 * p[0], 10.0, -1.0, 0.0])
        }
    }

    #[test]
    fn lm_backend_solves_trivial_problem() {
        let backend = LmBackend;
        let problem = OneDimProblem;
        let x0 = DVector::from_element(1, 10.0);
        let opts = SolveOptions::default();

        let (x_opt, report) = backend.solve(&problem, x0, &opts);
        let x_final = x_opt[0];

        assert!(
            (x_final - 3.0).abs() < 1e-6,
            "expected optimizer to reach 3.0, got {}",
            x_final
        );
        assert!(
            (report.initial_cost - 24.5).abs() < 1e-12,
            "initial cost: {}",
            report.initial_cost
        );
        assert!(
            report.final_cost.abs() < 1e-12,
            "final cost too high: {}",
            report.final_cost
        );
        assert!(
            report.converged(),
            "LM backend did not report convergence: {:?}",
            report
        );
        assert!(
            report.evaluations > 0,
            "expected positive evaluations, got {}",
            report.evaluations
        );
    }

    #[test]
    fn lm_backend_minimizes_rosenbrock() {
        let x0 = DVector::from_vec(vec![-1.2, 1.0]);
        let (x, report) = LmBackend.solve(&Rosenbrock, x0, &SolveOptions::default());
        assert!(
            (x[0] - 1.0).abs() < 1e-6 && (x[1] - 1.0).abs() < 1e-6,
            "expected (1, 1), got {:?}",
            x
        );
        assert_eq!(report.status, SolveStatus::Converged);
    }

    #[test]
    fn tiny_iteration_cap_reports_max_iterations() {
        let x0 = DVector::from_vec(vec![-1.2, 1.0]);
        let opts = SolveOptions {
            max_iters: 1,
            ..SolveOptions::default()
        };
        let (_, report) = LmBackend.solve(&Rosenbrock, x0, &opts);
        assert_eq!(report.status, SolveStatus::MaxIterations, "{report:?}");
        assert!(report.final_cost <= report.initial_cost);
    }
}
