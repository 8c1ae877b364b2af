//! Mean filter, variance recursions and log-likelihoods.
//!
//! Every recursion returns a path of length `n + 1`: entries `0..n` are the
//! fitted conditional variances aligned with the input, entry `n` is the
//! one-step-ahead forecast obtained by running the recursion one step past the
//! end of the data. Fitting and forecasting therefore share one code path.
//!
//! Pre-sample values:
//! - mean equation: deviations and residuals before `t = 0` are zero
//! - GARCH / GJR: `e²` and `σ²` before `t = 0` equal the backcast; the threshold
//!   term uses half the backcast
//! - EGARCH: `ln σ²` before `t = 0` equals `ln(backcast)`; shock terms are zero

use std::f64::consts::PI;

use statrs::function::gamma::ln_gamma;

use crate::domain::{Distribution, ModelSpec, Variant};
use crate::math::stats::mean_square;
use crate::models::params::ModelParams;

/// Smallest conditional variance accepted anywhere on the path.
pub const MIN_VARIANCE: f64 = 1e-300;

/// Bound on `|ln σ²|` for EGARCH so that `exp` cannot overflow.
const MAX_LOG_VARIANCE: f64 = 600.0;

/// Residuals `e_t` of the ARMA(p, q) mean equation in deviation form.
pub fn mean_residuals(returns: &[f64], params: &ModelParams) -> Vec<f64> {
    let n = returns.len();
    let mut e = vec![0.0_f64; n];
    for t in 0..n {
        let mut fitted = 0.0;
        for (i, phi) in params.ar.iter().enumerate() {
            if t > i {
                fitted += phi * (returns[t - 1 - i] - params.mu);
            }
        }
        for (j, theta) in params.ma.iter().enumerate() {
            if t > j {
                fitted += theta * e[t - 1 - j];
            }
        }
        e[t] = returns[t] - params.mu - fitted;
    }
    e
}

/// `E|z|` for a unit-variance innovation of the given distribution.
pub fn expected_abs(distribution: Distribution, nu: Option<f64>) -> f64 {
    match (distribution, nu) {
        (Distribution::StudentT, Some(nu)) => {
            // 2 sqrt(ν-2) Γ((ν+1)/2) / (sqrt(π) (ν-1) Γ(ν/2))
            let log = 2f64.ln() + 0.5 * (nu - 2.0).ln() + ln_gamma(0.5 * (nu + 1.0))
                - 0.5 * PI.ln()
                - (nu - 1.0).ln()
                - ln_gamma(0.5 * nu);
            log.exp()
        }
        _ => (2.0 / PI).sqrt(),
    }
}

/// Conditional variance path of length `residuals.len() + 1`.
///
/// Returns `None` if the recursion leaves the positive finite range.
pub fn variance_path(
    spec: &ModelSpec,
    params: &ModelParams,
    residuals: &[f64],
    backcast: f64,
) -> Option<Vec<f64>> {
    match spec.variant {
        Variant::Garch | Variant::Gjr => garch_path(params, residuals, backcast),
        Variant::Egarch => egarch_path(spec, params, residuals, backcast),
    }
}

fn garch_path(params: &ModelParams, e: &[f64], backcast: f64) -> Option<Vec<f64>> {
    let n = e.len();
    let mut s2 = vec![0.0_f64; n + 1];
    for t in 0..=n {
        let mut v = params.omega;
        for (i, alpha) in params.alpha.iter().enumerate() {
            let e2 = if t > i { e[t - 1 - i] * e[t - 1 - i] } else { backcast };
            v += alpha * e2;
        }
        for (i, gamma) in params.gamma.iter().enumerate() {
            let term = if t > i {
                let lag = e[t - 1 - i];
                if lag < 0.0 { lag * lag } else { 0.0 }
            } else {
                0.5 * backcast
            };
            v += gamma * term;
        }
        for (j, beta) in params.beta.iter().enumerate() {
            let lag = if t > j { s2[t - 1 - j] } else { backcast };
            v += beta * lag;
        }
        if !(v.is_finite() && v > MIN_VARIANCE) {
            return None;
        }
        s2[t] = v;
    }
    Some(s2)
}

fn egarch_path(
    spec: &ModelSpec,
    params: &ModelParams,
    e: &[f64],
    backcast: f64,
) -> Option<Vec<f64>> {
    let n = e.len();
    let abs_mean = expected_abs(spec.distribution, params.nu);
    let ln_backcast = backcast.max(MIN_VARIANCE).ln();
    let mut ln_s2 = vec![0.0_f64; n + 1];
    let mut z = vec![0.0_f64; n];
    for t in 0..=n {
        let mut v = params.omega;
        for (i, alpha) in params.alpha.iter().enumerate() {
            if t > i {
                v += alpha * (z[t - 1 - i].abs() - abs_mean);
            }
        }
        for (i, gamma) in params.gamma.iter().enumerate() {
            if t > i {
                v += gamma * z[t - 1 - i];
            }
        }
        for (j, beta) in params.beta.iter().enumerate() {
            let lag = if t > j { ln_s2[t - 1 - j] } else { ln_backcast };
            v += beta * lag;
        }
        if !(v.is_finite() && v.abs() < MAX_LOG_VARIANCE) {
            return None;
        }
        ln_s2[t] = v;
        if t < n {
            z[t] = e[t] / (0.5 * v).exp();
        }
    }
    let s2: Vec<f64> = ln_s2.into_iter().map(f64::exp).collect();
    if s2.iter().all(|v| v.is_finite() && *v > MIN_VARIANCE) {
        Some(s2)
    } else {
        None
    }
}

/// Log-likelihood of `residuals` given conditional variances `variance[0..n]`.
pub fn log_likelihood(
    distribution: Distribution,
    nu: Option<f64>,
    residuals: &[f64],
    variance: &[f64],
) -> f64 {
    match (distribution, nu) {
        (Distribution::StudentT, Some(nu)) => {
            let c = ln_gamma(0.5 * (nu + 1.0)) - ln_gamma(0.5 * nu) - 0.5 * ((nu - 2.0) * PI).ln();
            residuals
                .iter()
                .zip(variance)
                .map(|(e, s2)| {
                    let z2 = e * e / s2;
                    c - 0.5 * s2.ln() - 0.5 * (nu + 1.0) * (1.0 + z2 / (nu - 2.0)).ln()
                })
                .sum()
        }
        _ => {
            let c = (2.0 * PI).ln();
            residuals
                .iter()
                .zip(variance)
                .map(|(e, s2)| -0.5 * (c + s2.ln() + e * e / s2))
                .sum()
        }
    }
}

/// Everything a fit needs from one parameter vector.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub residuals: Vec<f64>,
    /// Length `n + 1`; the last entry is the one-step-ahead forecast.
    pub variance: Vec<f64>,
    pub log_likelihood: f64,
}

/// Evaluate `params` on `returns`.
///
/// The backcast is the mean squared residual. Returns `None` for infeasible
/// parameters or numerically invalid paths.
pub fn evaluate(spec: &ModelSpec, params: &ModelParams, returns: &[f64]) -> Option<Evaluation> {
    if returns.is_empty() || !params.is_feasible(spec.variant) {
        return None;
    }
    let residuals = mean_residuals(returns, params);
    let backcast = mean_square(&residuals)?;
    if !(backcast.is_finite() && backcast > MIN_VARIANCE) {
        return None;
    }
    let variance = variance_path(spec, params, &residuals, backcast)?;
    let ll = log_likelihood(
        spec.distribution,
        params.nu,
        &residuals,
        &variance[..returns.len()],
    );
    if !ll.is_finite() {
        return None;
    }
    Some(Evaluation {
        residuals,
        variance,
        log_likelihood: ll,
    })
}
