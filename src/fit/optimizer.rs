//! Nelder-Mead search over the flat parameter vector (argmin adapter).

use argmin::core::{CostFunction, Error, Executor, State, TerminationReason, TerminationStatus};
use argmin::solver::neldermead::NelderMead;

use crate::domain::ModelSpec;
use crate::error::VarError;
use crate::fit::start_grid::initial_simplex;
use crate::models::{ModelParams, evaluate};

/// Cost assigned to infeasible or numerically invalid points.
///
/// Finite so the simplex can still order its vertices.
pub const PENALTY_COST: f64 = 1e10;

/// Solver budget.
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    pub max_iters: u64,
    pub sd_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_iters: 5000,
            sd_tolerance: 1e-6,
        }
    }
}

/// Negative log-likelihood of `spec` on a fixed return sample.
pub struct NegLogLikelihood<'a> {
    pub spec: &'a ModelSpec,
    pub returns: &'a [f64],
}

impl NegLogLikelihood<'_> {
    /// Plain evaluation without the argmin error wrapper.
    pub fn value(&self, theta: &[f64]) -> f64 {
        let Ok(params) = ModelParams::from_slice(self.spec, theta) else {
            return PENALTY_COST;
        };
        match evaluate(self.spec, &params, self.returns) {
            Some(eval) => -eval.log_likelihood,
            None => PENALTY_COST,
        }
    }
}

impl CostFunction for NegLogLikelihood<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, theta: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.value(theta))
    }
}

/// Outcome of one simplex run.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    pub theta: Vec<f64>,
    pub cost: f64,
    pub iterations: u64,
    pub converged: bool,
}

/// Run Nelder-Mead from `x0`.
///
/// `converged` is true only when the simplex spread fell below the tolerance;
/// hitting the iteration budget is reported as not converged.
pub fn run_nelder_mead(
    spec: &ModelSpec,
    returns: &[f64],
    x0: &[f64],
    opts: SolverOptions,
) -> Result<SolverOutcome, VarError> {
    let problem = NegLogLikelihood { spec, returns };
    let solver_error = |e: Error| VarError::ConvergenceFailure {
        iterations: 0,
        reason: e.to_string(),
    };

    let solver = NelderMead::new(initial_simplex(x0))
        .with_sd_tolerance(opts.sd_tolerance)
        .map_err(solver_error)?;
    let result = Executor::new(problem, solver)
        .configure(|state| state.max_iters(opts.max_iters))
        .run()
        .map_err(solver_error)?;

    let state = result.state();
    let iterations = state.get_iter();
    let theta = state
        .get_best_param()
        .cloned()
        .ok_or_else(|| VarError::ConvergenceFailure {
            iterations,
            reason: "solver produced no parameters".to_string(),
        })?;
    let converged = matches!(
        state.get_termination_status(),
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
    );

    Ok(SolverOutcome {
        theta,
        cost: state.get_best_cost(),
        iterations,
        converged,
    })
}
