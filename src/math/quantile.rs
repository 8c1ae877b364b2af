//! Empirical quantile calibration.
//!
//! The VaR multiplier is the empirical lower-tail quantile of a standardized
//! sample. Standardization uses the sample mean and the `n - 1` standard
//! deviation. Quantiles between order statistics use linear interpolation at
//! position `h = (n - 1) * level` on the ascending sort (Hyndman-Fan type 7,
//! the usual spreadsheet/NumPy default):
//!
//! ```text
//! q = x[floor(h)] + (h - floor(h)) * (x[floor(h) + 1] - x[floor(h)])
//! ```
//!
//! Ties need no special handling: equal values produce equal order statistics
//! and the interpolation is unaffected by which of them comes first.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::VarError;
use crate::math::stats::{mean, sample_std};

/// Standard deviations at or below this are treated as zero.
const MIN_STD: f64 = 1e-14;

/// Which sample the rolling engine standardizes to obtain the quantile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum QuantileSource {
    /// The raw expanding prefix of returns.
    #[default]
    RawPrefix,
    /// The fitted model's standardized residuals `e_t / sigma_t`.
    StandardizedResiduals,
}

/// Empirical `level`-quantile of the standardized `sample`.
pub fn calibrate(sample: &[f64], level: f64) -> Result<f64, VarError> {
    if !(level.is_finite() && level > 0.0 && level < 1.0) {
        return Err(VarError::InvalidLevel(level));
    }
    if sample.len() < 2 {
        return Err(VarError::InsufficientSample(format!(
            "need at least 2 observations, have {}",
            sample.len()
        )));
    }
    let (Some(m), Some(s)) = (mean(sample), sample_std(sample)) else {
        return Err(VarError::InsufficientSample("moments undefined".to_string()));
    };
    if !(s.is_finite() && s > MIN_STD) {
        return Err(VarError::InsufficientSample(
            "sample standard deviation is zero".to_string(),
        ));
    }

    let mut z: Vec<f64> = sample.iter().map(|v| (v - m) / s).collect();
    z.sort_by(f64::total_cmp);
    Ok(interpolated_quantile(&z, level))
}

/// Type-7 quantile of an ascending, non-empty slice.
pub fn interpolated_quantile(sorted: &[f64], level: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let h = (n as f64 - 1.0) * level.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    if lo + 1 >= n {
        return sorted[n - 1];
    }
    let frac = h - lo as f64;
    sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
}
