//! Breach counting and coverage tests.
//!
//! A breach is `actual < threshold` (strict). Missing thresholds are excluded
//! from the denominator, never counted as non-breaches.
//!
//! Coverage is judged with the two-sided exact binomial test: the p-value is
//! the total probability of all breach counts no more likely than the observed
//! one under `Binomial(sample_size, expected_rate)`. The Kupiec
//! proportion-of-failures LR statistic is reported alongside.

use statrs::distribution::{Binomial, ChiSquared, ContinuousCDF, Discrete};
use tracing::debug;

use crate::domain::{BacktestResult, ReturnSeries};
use crate::error::VarError;
use crate::rolling::RollingRun;

/// Default confidence of the coverage test.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Relative slack when comparing binomial probabilities to the observed one.
const PMF_RELATIVE_TOLERANCE: f64 = 1e-7;

pub fn is_breach(actual: f64, threshold: f64) -> bool {
    actual < threshold
}

fn check_probability(p: f64) -> Result<(), VarError> {
    if p.is_finite() && p > 0.0 && p < 1.0 {
        Ok(())
    } else {
        Err(VarError::InvalidLevel(p))
    }
}

/// Two-sided exact binomial p-value of observing `breaches` out of `n`.
pub fn binomial_p_value(breaches: u64, n: u64, rate: f64) -> Result<f64, VarError> {
    check_probability(rate)?;
    let dist = Binomial::new(rate, n).map_err(|_| VarError::InvalidLevel(rate))?;
    let observed = dist.pmf(breaches);
    let cutoff = observed * (1.0 + PMF_RELATIVE_TOLERANCE);
    let p: f64 = (0..=n)
        .map(|k| dist.pmf(k))
        .filter(|&pk| pk <= cutoff)
        .sum();
    Ok(p.min(1.0))
}

/// Kupiec POF likelihood ratio `-2 ln(L(rate) / L(breaches / n))`.
pub fn kupiec_lr(breaches: u64, n: u64, rate: f64) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let x = breaches as f64;
    let n = n as f64;
    let observed = x / n;
    // x ln p + (n - x) ln(1 - p) with 0 ln 0 = 0
    let loglik = |p: f64| {
        let hits = if x > 0.0 { x * p.ln() } else { 0.0 };
        let misses = if n - x > 0.0 { (n - x) * (1.0 - p).ln() } else { 0.0 };
        hits + misses
    };
    (-2.0 * (loglik(rate) - loglik(observed))).max(0.0)
}

/// Compare realized returns with thresholds slot by slot.
pub fn evaluate(
    actual: &[f64],
    thresholds: &[Option<f64>],
    expected_rate: f64,
    confidence: f64,
) -> Result<BacktestResult, VarError> {
    check_probability(expected_rate)?;
    check_probability(confidence)?;
    if actual.len() != thresholds.len() {
        return Err(VarError::InvalidRange(format!(
            "{} realized returns but {} thresholds",
            actual.len(),
            thresholds.len()
        )));
    }

    let mut breach_count = 0usize;
    let mut sample_size = 0usize;
    for (&r, threshold) in actual.iter().zip(thresholds) {
        if let Some(t) = threshold {
            sample_size += 1;
            if is_breach(r, *t) {
                breach_count += 1;
            }
        }
    }
    let missing = thresholds.len() - sample_size;
    if sample_size == 0 {
        return Err(VarError::InsufficientSample(
            "no non-missing VaR estimates to backtest".to_string(),
        ));
    }

    let p_value = binomial_p_value(breach_count as u64, sample_size as u64, expected_rate)?;
    let lr = kupiec_lr(breach_count as u64, sample_size as u64, expected_rate);
    let kupiec_p_value = ChiSquared::new(1.0)
        .map(|chi2| 1.0 - chi2.cdf(lr))
        .unwrap_or(f64::NAN);

    let result = BacktestResult {
        breach_count,
        sample_size,
        breach_rate: breach_count as f64 / sample_size as f64,
        expected_rate,
        missing,
        p_value,
        kupiec_lr: lr,
        kupiec_p_value,
        within_tolerance: p_value >= 1.0 - confidence,
    };
    debug!(
        breaches = breach_count,
        sample_size,
        missing,
        p_value,
        "backtest evaluated"
    );
    Ok(result)
}

/// Backtest a rolling run against the realized returns of `series`.
///
/// Only steps that ran are considered; skipped steps of a truncated run are
/// neither breaches nor missing.
pub fn evaluate_run(
    series: &ReturnSeries,
    run: &RollingRun,
    expected_rate: f64,
    confidence: f64,
) -> Result<BacktestResult, VarError> {
    let mut actual = Vec::with_capacity(run.steps.len());
    let mut thresholds = Vec::with_capacity(run.steps.len());
    for (index, threshold) in run.thresholds() {
        let Some(&r) = series.values().get(index) else {
            return Err(VarError::InvalidRange(format!(
                "step index {index} outside series of length {}",
                series.len()
            )));
        };
        actual.push(r);
        thresholds.push(threshold);
    }
    evaluate(&actual, &thresholds, expected_rate, confidence)
}
