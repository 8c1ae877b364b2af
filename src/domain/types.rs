//! Forecast and backtest outputs.
//!
//! These types are kept lightweight and serializable so they can be exported to
//! CSV/JSON by the surrounding layer.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::VarError;

/// One-step-ahead conditional standard deviation for `as_of_index`, produced by a
/// model trained on observations `[0, as_of_index)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub as_of_index: usize,
    pub sigma: f64,
}

/// A VaR threshold for one evaluation date.
///
/// `threshold = quantile * sigma`; with a lower-tail quantile it is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub index: usize,
    pub timestamp: NaiveDate,
    pub quantile: f64,
    pub sigma: f64,
    pub threshold: f64,
}

impl VarEstimate {
    pub fn new(timestamp: NaiveDate, quantile: f64, forecast: ForecastPoint) -> Self {
        Self {
            index: forecast.as_of_index,
            timestamp,
            quantile,
            sigma: forecast.sigma,
            threshold: quantile * forecast.sigma,
        }
    }
}

/// Outcome of one rolling step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    Estimated(VarEstimate),
    /// The step ran but produced no estimate. Never treated as a non-breach.
    Missing {
        index: usize,
        timestamp: NaiveDate,
        reason: VarError,
    },
}

impl StepResult {
    pub fn index(&self) -> usize {
        match self {
            StepResult::Estimated(e) => e.index,
            StepResult::Missing { index, .. } => *index,
        }
    }

    pub fn timestamp(&self) -> NaiveDate {
        match self {
            StepResult::Estimated(e) => e.timestamp,
            StepResult::Missing { timestamp, .. } => *timestamp,
        }
    }

    pub fn estimate(&self) -> Option<&VarEstimate> {
        match self {
            StepResult::Estimated(e) => Some(e),
            StepResult::Missing { .. } => None,
        }
    }

    pub fn threshold(&self) -> Option<f64> {
        self.estimate().map(|e| e.threshold)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, StepResult::Missing { .. })
    }
}

/// Breach statistics for one model / level combination.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub breach_count: usize,
    /// Number of non-missing estimates (the breach-rate denominator).
    pub sample_size: usize,
    pub breach_rate: f64,
    pub expected_rate: f64,
    /// Estimates excluded because the step produced none.
    pub missing: usize,
    /// Two-sided exact binomial p-value of the breach count.
    pub p_value: f64,
    /// Kupiec proportion-of-failures likelihood ratio (chi-square, 1 dof).
    pub kupiec_lr: f64,
    pub kupiec_p_value: f64,
    pub within_tolerance: bool,
}
