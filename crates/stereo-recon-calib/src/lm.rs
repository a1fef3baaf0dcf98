//! Levenberg-Marquardt refinement of [`ViewBlocks`] problems.

use crate::bundle::{block_residuals, BlockProblem, ViewBlocks};
use crate::CalibrationError;
use levenberg_marquardt::{LevenbergMarquardt, TerminationReason};
use log::debug;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Iteration budget and relative tolerance of a refinement.
///
/// `max_iters` is the solver patience: it may spend `max_iters * (n + 1)`
/// residual evaluations for `n` parameters. `eps` bounds both the relative
/// cost reduction and the relative parameter update.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermCriteria {
    pub max_iters: usize,
    pub eps: f64,
}

impl TermCriteria {
    pub fn new(max_iters: usize, eps: f64) -> Self {
        Self { max_iters, eps }
    }
}

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iters: 30,
            eps: f64::EPSILON,
        }
    }
}

#[derive(Debug)]
pub struct SolveReport {
    pub evaluations: usize,
    /// Half the squared residual norm at the starting parameters.
    pub initial_cost: f64,
    /// Half the squared residual norm at the returned parameters.
    pub final_cost: f64,
    pub termination: TerminationReason,
}

// `TerminationReason` does not implement `Clone`; every variant holds only
// `Copy` data, so rebuild it field for field.
impl Clone for SolveReport {
    fn clone(&self) -> Self {
        use TerminationReason as R;
        let termination = match &self.termination {
            R::User(s) => R::User(s),
            R::Numerical(s) => R::Numerical(s),
            R::ResidualsZero => R::ResidualsZero,
            R::Orthogonal => R::Orthogonal,
            R::Converged { ftol, xtol } => R::Converged { ftol: *ftol, xtol: *xtol },
            R::NoImprovementPossible(s) => R::NoImprovementPossible(s),
            R::LostPatience => R::LostPatience,
            R::NoParameters => R::NoParameters,
            R::NoResiduals => R::NoResiduals,
            R::WrongDimensions(s) => R::WrongDimensions(s),
        };
        Self {
            evaluations: self.evaluations,
            initial_cost: self.initial_cost,
            final_cost: self.final_cost,
            termination,
        }
    }
}

/// Reaching machine precision before the tolerance counts as converged.
fn accepted(reason: &TerminationReason) -> bool {
    reason.was_successful() || matches!(reason, TerminationReason::NoImprovementPossible(_))
}

/// Minimize the stacked reprojection residuals of `blocks` from `x0`.
pub(crate) fn refine<B: ViewBlocks>(
    blocks: &B,
    x0: DVector<f64>,
    criteria: &TermCriteria,
) -> Result<(DVector<f64>, SolveReport), CalibrationError> {
    let problem = BlockProblem::new(blocks, x0);
    if blocks.num_rows() < problem.num_params() {
        return Err(CalibrationError::NonConvergence(format!(
            "{} residuals cannot constrain {} parameters",
            blocks.num_rows(),
            problem.num_params()
        )));
    }
    let initial_cost = 0.5 * block_residuals(blocks, problem.current()).norm_squared();

    let eps = criteria.eps.max(0.0);
    let lm = LevenbergMarquardt::new()
        .with_ftol(eps)
        .with_xtol(eps)
        .with_patience(criteria.max_iters.max(1));
    let (problem, report) = lm.minimize(problem);
    debug!(
        "lm: {} evaluations, cost {:.6e} -> {:.6e} ({:?})",
        report.number_of_evaluations, initial_cost, report.objective_function, report.termination
    );
    if !accepted(&report.termination) {
        return Err(CalibrationError::NonConvergence(format!(
            "{:?} after {} evaluations",
            report.termination, report.number_of_evaluations
        )));
    }

    let report = SolveReport {
        evaluations: report.number_of_evaluations,
        initial_cost,
        final_cost: report.objective_function,
        termination: report.termination,
    };
    Ok((problem.into_params(), report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::POSE_PARAMS;
    use approx::assert_relative_eq;
    use std::ops::Range;

    /// `y = a * exp(b * t)` split into views; the per-view poses are unused.
    struct ExpBlocks {
        rows_per_view: usize,
        t: Vec<f64>,
        y: Vec<f64>,
    }

    impl ViewBlocks for ExpBlocks {
        fn num_globals(&self) -> usize {
            2
        }

        fn num_views(&self) -> usize {
            self.t.len() / self.rows_per_view
        }

        fn view_rows(&self, view: usize) -> Range<usize> {
            view * self.rows_per_view..(view + 1) * self.rows_per_view
        }

        fn eval_view(&self, x: &DVector<f64>, view: usize, out: &mut [f64]) {
            for (r, i) in out.iter_mut().zip(self.view_rows(view)) {
                *r = x[0] * (x[1] * self.t[i]).exp() - self.y[i];
            }
        }
    }

    fn exp_blocks(views: usize, rows_per_view: usize) -> (ExpBlocks, DVector<f64>) {
        let t: Vec<f64> = (0..views * rows_per_view).map(|i| i as f64 * 0.1).collect();
        let y = t.iter().map(|&t| 2.5 * (-1.3 * t).exp()).collect();
        let mut x0 = DVector::zeros(2 + POSE_PARAMS * views);
        x0[0] = 1.0;
        (ExpBlocks { rows_per_view, t, y }, x0)
    }

    #[test]
    fn refines_exponential_fit() {
        let (blocks, x0) = exp_blocks(2, 10);
        let (x, report) = refine(&blocks, x0, &TermCriteria::new(100, 1e-12)).expect("refine");
        assert_relative_eq!(x[0], 2.5, epsilon = 1e-5);
        assert_relative_eq!(x[1], -1.3, epsilon = 1e-5);
        assert!(report.final_cost < report.initial_cost);
        assert!(report.final_cost < 1e-12, "{report:?}");
        assert!(report.evaluations > 0);
    }

    #[test]
    fn underdetermined_problem_is_non_convergence() {
        let (blocks, x0) = exp_blocks(1, 4);
        let err = refine(&blocks, x0, &TermCriteria::default()).unwrap_err();
        assert!(matches!(err, CalibrationError::NonConvergence(_)));
    }

    #[test]
    fn only_converged_terminations_are_accepted() {
        assert!(accepted(&TerminationReason::Converged {
            ftol: true,
            xtol: false
        }));
        assert!(accepted(&TerminationReason::ResidualsZero));
        assert!(accepted(&TerminationReason::NoImprovementPossible("xtol")));
        assert!(!accepted(&TerminationReason::LostPatience));
        assert!(!accepted(&TerminationReason::Numerical("jacobian")));
    }
}
