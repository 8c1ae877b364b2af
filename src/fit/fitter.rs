//! Maximum-likelihood fitting for a single model spec.
//!
//! Given:
//! - a return prefix `r_0 .. r_{n-1}`
//! - a [`ModelSpec`]
//!
//! we:
//! - scale the returns to unit sample variance
//! - evaluate the likelihood on a deterministic starting grid (parallel)
//! - refine the best start with Nelder-Mead
//! - map the estimate back to the original units and re-evaluate it there
//!
//! The fit is a pure function of its inputs. The solver has no randomness, so
//! repeated fits are bit-identical.

use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::Serialize;
use tracing::trace;

use crate::domain::{ForecastPoint, ModelSpec, Variant};
use crate::error::VarError;
use crate::fit::optimizer::{NegLogLikelihood, PENALTY_COST, SolverOptions, run_nelder_mead};
use crate::fit::start_grid::start_grid;
use crate::math::{covariance, delta_standard_errors, mean, sample_std};
use crate::models::{Evaluation, ModelParams, evaluate};

/// Sample standard deviations at or below this are treated as constant input.
const MIN_INPUT_STD: f64 = 1e-12;

/// Anything that turns a return prefix into a fitted volatility model.
///
/// The rolling engine and the selector only talk to this trait, so alternative
/// estimators (or test doubles) can be swapped in without touching them.
pub trait VolatilityFitter: Sync {
    fn fit(&self, returns: &[f64], spec: &ModelSpec) -> Result<FittedModel, VarError>;
}

/// Fitting options.
#[derive(Debug, Clone, Copy, Default)]
pub struct FitOptions {
    pub solver: SolverOptions,
    /// Overrides [`ModelSpec::minimum_observations`] when set.
    pub min_observations: Option<usize>,
    /// Compute standard errors from the numerical Hessian.
    pub std_errors: bool,
}

impl FitOptions {
    fn required_observations(&self, spec: &ModelSpec) -> usize {
        self.min_observations
            .unwrap_or_else(|| spec.minimum_observations())
    }
}

/// A model fitted to one return prefix.
#[derive(Debug, Clone, Serialize)]
pub struct FittedModel {
    pub spec: ModelSpec,
    pub params: ModelParams,
    /// Conditional standard deviations aligned with the input prefix.
    pub volatility: Vec<f64>,
    pub residuals: Vec<f64>,
    pub log_likelihood: f64,
    pub converged: bool,
    pub iterations: u64,
    pub n_obs: usize,
    /// Conditional variance one step past the end of the prefix.
    pub next_variance: f64,
    /// In flat-layout order (see [`ModelParams::names`]).
    pub std_errors: Option<Vec<f64>>,
}

impl FittedModel {
    /// Evaluate fixed parameters on `returns` without any optimization.
    pub fn from_params(
        spec: ModelSpec,
        params: ModelParams,
        returns: &[f64],
    ) -> Result<Self, VarError> {
        spec.validate()?;
        let eval = evaluate(&spec, &params, returns).ok_or_else(|| {
            VarError::DegenerateInput("parameters do not produce a valid variance path".to_string())
        })?;
        Ok(Self::assemble(spec, params, eval, true, 0))
    }

    fn assemble(
        spec: ModelSpec,
        params: ModelParams,
        eval: Evaluation,
        converged: bool,
        iterations: u64,
    ) -> Self {
        let Evaluation {
            residuals,
            mut variance,
            log_likelihood,
        } = eval;
        let n_obs = residuals.len();
        let next_variance = variance.pop().unwrap_or(f64::NAN);
        Self {
            spec,
            params,
            volatility: variance.into_iter().map(f64::sqrt).collect(),
            residuals,
            log_likelihood,
            converged,
            iterations,
            n_obs,
            next_variance,
            std_errors: None,
        }
    }

    /// One-step-ahead conditional standard deviation.
    pub fn forecast_one_step(&self) -> f64 {
        self.next_variance.sqrt()
    }

    /// The one-step forecast labelled with the index it applies to.
    ///
    /// For a model fitted on `[0, i)` the forecast is for index `i = n_obs`
    /// relative to the start of the prefix.
    pub fn forecast_point(&self) -> ForecastPoint {
        ForecastPoint {
            as_of_index: self.n_obs,
            sigma: self.forecast_one_step(),
        }
    }

    /// `e_t / sigma_t`.
    pub fn standardized_residuals(&self) -> Vec<f64> {
        self.residuals
            .iter()
            .zip(&self.volatility)
            .map(|(e, s)| e / s)
            .collect()
    }

    pub fn param_count(&self) -> usize {
        self.spec.param_count()
    }
}

/// Gaussian / Student-t quasi maximum likelihood with a Nelder-Mead search.
#[derive(Debug, Clone, Copy, Default)]
pub struct MleFitter {
    pub opts: FitOptions,
}

impl MleFitter {
    pub fn new(opts: FitOptions) -> Self {
        Self { opts }
    }
}

impl VolatilityFitter for MleFitter {
    fn fit(&self, returns: &[f64], spec: &ModelSpec) -> Result<FittedModel, VarError> {
        fit_model(returns, spec, &self.opts)
    }
}

#[derive(Debug, Clone)]
struct StartCandidate {
    idx: usize,
    theta: Vec<f64>,
    cost: f64,
}

/// Fit `spec` to `returns` by maximum likelihood.
pub fn fit_model(
    returns: &[f64],
    spec: &ModelSpec,
    opts: &FitOptions,
) -> Result<FittedModel, VarError> {
    spec.validate()?;

    let required = opts.required_observations(spec);
    if returns.len() < required {
        return Err(VarError::InsufficientData {
            required,
            available: returns.len(),
        });
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(VarError::DegenerateInput(
            "non-finite value in returns".to_string(),
        ));
    }
    let scale = match sample_std(returns) {
        Some(s) if s.is_finite() && s > MIN_INPUT_STD => s,
        _ => {
            return Err(VarError::DegenerateInput(
                "returns have zero variance".to_string(),
            ));
        }
    };

    // Work in unit-variance space so the grid and tolerances are unit free.
    let scaled: Vec<f64> = returns.iter().map(|r| r / scale).collect();
    let scaled_mean = mean(&scaled).unwrap_or(0.0);
    let problem = NegLogLikelihood {
        spec,
        returns: &scaled,
    };

    let start = best_start(spec, scaled_mean, &problem)?;
    let outcome = run_nelder_mead(spec, &scaled, &start.theta, opts.solver)?;
    trace!(
        spec = %spec,
        start = start.idx,
        iterations = outcome.iterations,
        cost = outcome.cost,
        "nelder-mead finished"
    );

    if !outcome.converged {
        return Err(VarError::ConvergenceFailure {
            iterations: outcome.iterations,
            reason: "simplex did not contract within the iteration budget".to_string(),
        });
    }
    if !(outcome.cost.is_finite() && outcome.cost < PENALTY_COST) {
        return Err(VarError::ConvergenceFailure {
            iterations: outcome.iterations,
            reason: "optimum is infeasible".to_string(),
        });
    }

    let scaled_params = ModelParams::from_slice(spec, &outcome.theta)?;
    let params = scaled_params.rescale(spec.variant, scale);
    let eval = evaluate(spec, &params, returns).ok_or_else(|| VarError::ConvergenceFailure {
        iterations: outcome.iterations,
        reason: "optimum does not produce a valid variance path in original units".to_string(),
    })?;

    let mut fitted = FittedModel::assemble(*spec, params, eval, true, outcome.iterations);
    if opts.std_errors {
        fitted.std_errors = scaled_standard_errors(spec, &scaled, &outcome.theta, scale);
    }
    Ok(fitted)
}

fn best_start(
    spec: &ModelSpec,
    scaled_mean: f64,
    problem: &NegLogLikelihood<'_>,
) -> Result<StartCandidate, VarError> {
    let grid = start_grid(spec, scaled_mean);

    // Evaluate each start independently (parallel).
    let candidates: Vec<StartCandidate> = grid
        .par_iter()
        .enumerate()
        .map(|(idx, params)| {
            let theta = params.to_vec();
            let cost = problem.value(&theta);
            StartCandidate { idx, theta, cost }
        })
        .filter(|c| c.cost.is_finite() && c.cost < PENALTY_COST)
        .collect();

    // Deterministic selection: minimum cost; ties go to the earlier grid index.
    let mut iter = candidates.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(VarError::ConvergenceFailure {
            iterations: 0,
            reason: "no feasible starting point".to_string(),
        });
    };
    for c in iter {
        if c.cost < best.cost || (c.cost == best.cost && c.idx < best.idx) {
            best = c;
        }
    }
    Ok(best)
}

/// Standard errors computed in unit-variance space and mapped to original units.
///
/// The map is [`ModelParams::rescale`]: `mu` scales with the data, the GARCH / GJR
/// intercept with its square, and the EGARCH intercept shifts by
/// `ln(s²)(1 - Σβ)`. Its Jacobian carries the scaled covariance over (delta
/// method), so the EGARCH intercept picks up its covariance with `β`.
fn scaled_standard_errors(
    spec: &ModelSpec,
    scaled: &[f64],
    theta: &[f64],
    scale: f64,
) -> Option<Vec<f64>> {
    let loglik = |t: &[f64]| {
        ModelParams::from_slice(spec, t)
            .ok()
            .and_then(|p| evaluate(spec, &p, scaled))
            .map_or(f64::NAN, |e| e.log_likelihood)
    };
    let cov = covariance(loglik, theta)?;
    delta_standard_errors(&cov, &rescale_jacobian(spec, scale))
}

/// Jacobian of [`ModelParams::rescale`] with respect to the flat parameter vector.
fn rescale_jacobian(spec: &ModelSpec, scale: f64) -> DMatrix<f64> {
    let k = spec.param_count();
    let (p, q) = spec.mean_order;
    let (a, _) = spec.variance_order;
    let omega = 1 + p + q;
    let first_beta = omega + 1 + a + spec.gamma_len();
    let s2 = scale * scale;

    let mut jac = DMatrix::<f64>::identity(k, k);
    jac[(0, 0)] = scale;
    match spec.variant {
        Variant::Garch | Variant::Gjr => jac[(omega, omega)] = s2,
        Variant::Egarch => {
            for j in 0..spec.variance_order.1 {
                jac[(omega, first_beta + j)] = -s2.ln();
            }
        }
    }
    jac
}
