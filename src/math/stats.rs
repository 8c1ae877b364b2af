//! Sample moments.
//!
//! All functions return `None` on inputs too short for the statistic instead of
//! producing `NaN`.

/// Arithmetic mean.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Unbiased sample variance (divisor `n - 1`).
pub fn sample_variance(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    Some(ss / (values.len() as f64 - 1.0))
}

/// Sample standard deviation (divisor `n - 1`).
pub fn sample_std(values: &[f64]) -> Option<f64> {
    sample_variance(values).map(f64::sqrt)
}

/// Mean of squares (second raw moment), used as a variance backcast.
pub fn mean_square(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moments_of_small_sample() {
        let x = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&x).unwrap() - 2.5).abs() < 1e-12);
        assert!((sample_variance(&x).unwrap() - 5.0 / 3.0).abs() < 1e-12);
        assert!((mean_square(&x).unwrap() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn short_inputs_yield_none() {
        assert!(mean(&[]).is_none());
        assert!(sample_variance(&[1.0]).is_none());
        assert!(sample_std(&[]).is_none());
    }
}
