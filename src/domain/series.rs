//! The return series consumed by the core.
//!
//! A `ReturnSeries` is built once (by ingest, simulation or tests) and never
//! mutated afterwards. Rolling steps only ever see `prefix(i)`, a borrowed
//! slice of the values strictly before `i`.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::VarError;

/// Immutable, strictly time-ordered univariate return series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSeries {
    timestamps: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl ReturnSeries {
    /// Build a series, checking lengths, ordering and finiteness.
    pub fn new(timestamps: Vec<NaiveDate>, values: Vec<f64>) -> Result<Self, VarError> {
        if timestamps.len() != values.len() {
            return Err(VarError::InvalidSeries(format!(
                "{} timestamps but {} values",
                timestamps.len(),
                values.len()
            )));
        }
        if let Some(w) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(VarError::InvalidSeries(format!(
                "timestamps not strictly increasing at position {} ({} -> {})",
                w + 1,
                timestamps[w],
                timestamps[w + 1]
            )));
        }
        if let Some(i) = values.iter().position(|v| !v.is_finite()) {
            return Err(VarError::InvalidSeries(format!(
                "non-finite value at position {i}"
            )));
        }
        Ok(Self { timestamps, values })
    }

    /// Build a series on consecutive calendar days starting at `start`.
    ///
    /// Handy for simulations and tests where the calendar carries no meaning.
    pub fn from_values(start: NaiveDate, values: Vec<f64>) -> Result<Self, VarError> {
        let timestamps = start
            .iter_days()
            .take(values.len())
            .collect::<Vec<_>>();
        Self::new(timestamps, values)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn timestamps(&self) -> &[NaiveDate] {
        &self.timestamps
    }

    pub fn timestamp(&self, index: usize) -> Option<NaiveDate> {
        self.timestamps.get(index).copied()
    }

    /// Values strictly before `index` (`values[0..index]`).
    ///
    /// `index` is clamped to the series length.
    pub fn prefix(&self, index: usize) -> &[f64] {
        &self.values[..index.min(self.values.len())]
    }

    /// Values in `[start, end]` (inclusive).
    pub fn slice(&self, start: usize, end: usize) -> Result<&[f64], VarError> {
        if start > end || end >= self.values.len() {
            return Err(VarError::InvalidRange(format!(
                "[{start}, {end}] outside series of length {}",
                self.values.len()
            )));
        }
        Ok(&self.values[start..=end])
    }

    /// Index of the first observation on or after `date`.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.timestamps.partition_point(|t| *t < date);
        (idx < self.timestamps.len()).then_some(idx)
    }
}
