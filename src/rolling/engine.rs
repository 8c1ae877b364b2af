//! Walk-forward (expanding window) VaR forecasting.
//!
//! For every evaluation index `i` in `[start, finish]`:
//!
//! 1. slice `prefix = values[0..i]` (the only data the step sees)
//! 2. calibrate the empirical quantile `q` at `level`
//! 3. fit the model on `prefix`
//! 4. forecast sigma for `i` by running the variance recursion one step further
//! 5. emit `threshold = q * sigma`
//!
//! Steps share nothing but the immutable series, so they run on a dedicated
//! rayon pool. Results come back in index order whatever the worker count.

use std::time::Duration;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::{ForecastPoint, ModelSpec, ReturnSeries, StepResult, VarEstimate};
use crate::error::VarError;
use crate::fit::VolatilityFitter;
use crate::math::{QuantileSource, calibrate};
use crate::rolling::cancel::CancelToken;

/// Default tolerated share of failed steps before a run counts as degraded.
pub const DEFAULT_MAX_FAILURE_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RollingConfig {
    pub spec: ModelSpec,
    /// Lower-tail probability, e.g. `0.01` for 1% VaR.
    pub level: f64,
    /// Worker threads; `0` uses the available parallelism.
    pub workers: usize,
    pub quantile_source: QuantileSource,
    pub max_failure_fraction: f64,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
}

impl RollingConfig {
    pub fn new(spec: ModelSpec, level: f64) -> Self {
        Self {
            spec,
            level,
            workers: 0,
            quantile_source: QuantileSource::default(),
            max_failure_fraction: DEFAULT_MAX_FAILURE_FRACTION,
            deadline: None,
        }
    }

    pub fn validate(&self) -> Result<(), VarError> {
        self.spec.validate()?;
        if !(self.level.is_finite() && self.level > 0.0 && self.level < 1.0) {
            return Err(VarError::InvalidLevel(self.level));
        }
        if !(self.max_failure_fraction.is_finite() && (0.0..=1.0).contains(&self.max_failure_fraction)) {
            return Err(VarError::InvalidRange(format!(
                "max failure fraction {} outside [0, 1]",
                self.max_failure_fraction
            )));
        }
        Ok(())
    }

    fn worker_count(&self, steps: usize) -> usize {
        let workers = if self.workers == 0 {
            std::thread::available_parallelism().map_or(1, |n| n.get())
        } else {
            self.workers
        };
        workers.clamp(1, steps.max(1))
    }
}

/// Ordered output of a rolling run.
#[derive(Debug, Clone)]
pub struct RollingRun {
    pub spec: ModelSpec,
    pub level: f64,
    pub start: usize,
    pub finish: usize,
    /// One entry per step that ran, ascending by index.
    pub steps: Vec<StepResult>,
    /// Set when cancellation skipped some steps.
    pub truncated: bool,
}

impl RollingRun {
    pub fn requested(&self) -> usize {
        self.finish - self.start + 1
    }

    pub fn completed(&self) -> usize {
        self.steps.len()
    }

    pub fn failed(&self) -> usize {
        self.steps.iter().filter(|s| s.is_missing()).count()
    }

    pub fn estimates(&self) -> impl Iterator<Item = &VarEstimate> {
        self.steps.iter().filter_map(StepResult::estimate)
    }

    /// `(index, threshold)` for every step that ran; `None` marks a missing estimate.
    pub fn thresholds(&self) -> Vec<(usize, Option<f64>)> {
        self.steps.iter().map(|s| (s.index(), s.threshold())).collect()
    }
}

/// One walk-forward step on an already sliced prefix.
///
/// The step never receives the full series: everything it can see is `prefix`,
/// and the forecast applies to index `prefix.len()`.
pub fn forecast_step<F>(
    fitter: &F,
    prefix: &[f64],
    spec: &ModelSpec,
    level: f64,
    source: QuantileSource,
) -> Result<(f64, ForecastPoint), VarError>
where
    F: VolatilityFitter + ?Sized,
{
    let (quantile, model) = match source {
        QuantileSource::RawPrefix => {
            let q = calibrate(prefix, level)?;
            (q, fitter.fit(prefix, spec)?)
        }
        QuantileSource::StandardizedResiduals => {
            let model = fitter.fit(prefix, spec)?;
            (calibrate(&model.standardized_residuals(), level)?, model)
        }
    };
    let sigma = model.forecast_one_step();
    if !(sigma.is_finite() && sigma > 0.0) {
        return Err(VarError::DegenerateInput(format!(
            "volatility forecast {sigma} is not positive"
        )));
    }
    Ok((
        quantile,
        ForecastPoint {
            as_of_index: prefix.len(),
            sigma,
        },
    ))
}

/// Rolling VaR engine over an injected fitter.
pub struct RollingForecastEngine<F> {
    fitter: F,
    config: RollingConfig,
}

impl<F: VolatilityFitter> RollingForecastEngine<F> {
    pub fn new(fitter: F, config: RollingConfig) -> Result<Self, VarError> {
        config.validate()?;
        Ok(Self { fitter, config })
    }

    pub fn config(&self) -> &RollingConfig {
        &self.config
    }

    /// Run over `[start, finish]` (inclusive indices into `series`).
    pub fn run(
        &self,
        series: &ReturnSeries,
        start: usize,
        finish: usize,
    ) -> Result<RollingRun, VarError> {
        self.run_with_cancel(series, start, finish, &CancelToken::new())
    }

    /// Like [`run`](Self::run), stopping early once `cancel` trips.
    ///
    /// Steps already started finish normally. A run cut short reports only the
    /// completed indices and sets `truncated`.
    pub fn run_with_cancel(
        &self,
        series: &ReturnSeries,
        start: usize,
        finish: usize,
        cancel: &CancelToken,
    ) -> Result<RollingRun, VarError> {
        if start == 0 || start > finish || finish >= series.len() {
            return Err(VarError::InvalidRange(format!(
                "evaluation range [{start}, {finish}] must satisfy 1 <= start <= finish < {}",
                series.len()
            )));
        }
        let cfg = &self.config;
        let token = match cfg.deadline {
            Some(timeout) => cancel.with_timeout(timeout),
            None => cancel.clone(),
        };
        let requested = finish - start + 1;
        let workers = cfg.worker_count(requested);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(|e| VarError::WorkerPool(e.to_string()))?;

        info!(
            spec = %cfg.spec,
            level = cfg.level,
            start,
            finish,
            workers,
            "rolling run started"
        );

        // Indexed collect keeps slot order equal to index order.
        let slots: Vec<Option<StepResult>> = pool.install(|| {
            (start..=finish)
                .into_par_iter()
                .map(|i| {
                    if token.is_cancelled() {
                        return None;
                    }
                    Some(self.step(series, i))
                })
                .collect()
        });

        let truncated = slots.iter().any(Option::is_none);
        let steps: Vec<StepResult> = slots.into_iter().flatten().collect();
        let run = RollingRun {
            spec: cfg.spec,
            level: cfg.level,
            start,
            finish,
            steps,
            truncated,
        };
        let (completed, failed) = (run.completed(), run.failed());

        if truncated {
            warn!(completed, requested, "rolling run truncated by cancellation");
        }
        info!(completed, failed, truncated, "rolling run finished");

        if completed == 0 {
            return Err(VarError::Cancelled);
        }
        if failed as f64 / completed as f64 > cfg.max_failure_fraction {
            return Err(VarError::DegradedRun {
                failed,
                completed,
                max_fraction: cfg.max_failure_fraction,
            });
        }
        Ok(run)
    }

    fn step(&self, series: &ReturnSeries, index: usize) -> StepResult {
        let cfg = &self.config;
        let timestamp = series.timestamps()[index];
        let prefix = series.prefix(index);
        match forecast_step(&self.fitter, prefix, &cfg.spec, cfg.level, cfg.quantile_source) {
            Ok((quantile, forecast)) => {
                StepResult::Estimated(VarEstimate::new(timestamp, quantile, forecast))
            }
            Err(reason) => {
                debug!(index, %timestamp, error = %reason, "rolling step failed");
                StepResult::Missing {
                    index,
                    timestamp,
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Distribution, Variant};
    use crate::fit::FittedModel;
    use crate::models::ModelParams;
    use chrono::NaiveDate;

    fn constant_spec() -> ModelSpec {
        ModelSpec::new(Variant::Garch, (0, 0), (0, 0), Distribution::Normal)
    }

    /// Sigma forecast equal to the prefix length, so each step is traceable.
    struct LengthOracle;

    impl VolatilityFitter for LengthOracle {
        fn fit(&self, returns: &[f64], spec: &ModelSpec) -> Result<FittedModel, VarError> {
            let n = returns.len() as f64;
            let params = ModelParams::from_slice(spec, &[0.0, n * n])?;
            FittedModel::from_params(*spec, params, returns)
        }
    }

    /// Fails on every prefix whose length is a multiple of `every`.
    struct FailEvery(usize);

    impl VolatilityFitter for FailEvery {
        fn fit(&self, returns: &[f64], spec: &ModelSpec) -> Result<FittedModel, VarError> {
            if returns.len() % self.0 == 0 {
                return Err(VarError::ConvergenceFailure {
                    iterations: 0,
                    reason: "injected".to_string(),
                });
            }
            LengthOracle.fit(returns, spec)
        }
    }

    fn series(n: usize) -> ReturnSeries {
        let values = (0..n).map(|i| ((i * 37 % 17) as f64 - 8.0) / 100.0).collect();
        ReturnSeries::from_values(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), values).unwrap()
    }

    fn engine<F: VolatilityFitter>(fitter: F, workers: usize) -> RollingForecastEngine<F> {
        let mut cfg = RollingConfig::new(constant_spec(), 0.05);
        cfg.workers = workers;
        RollingForecastEngine::new(fitter, cfg).unwrap()
    }

    #[test]
    fn steps_are_ordered_and_use_only_the_prefix() {
        let s = series(120);
        let run = engine(LengthOracle, 4).run(&s, 20, 119).unwrap();
        assert_eq!(run.completed(), 100);
        assert!(!run.truncated);
        for (k, step) in run.steps.iter().enumerate() {
            let e = step.estimate().unwrap();
            assert_eq!(e.index, 20 + k);
            assert_eq!(e.timestamp, s.timestamp(20 + k).unwrap());
            assert_eq!(e.sigma, (20 + k) as f64);
            let q = calibrate(s.prefix(20 + k), 0.05).unwrap();
            assert_eq!(e.quantile, q);
            assert!(e.threshold < 0.0);
        }
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let s = series(50);
        let eng = engine(LengthOracle, 1);
        for (start, finish) in [(0, 10), (10, 5), (10, 50)] {
            assert!(matches!(
                eng.run(&s, start, finish),
                Err(VarError::InvalidRange(_))
            ));
        }
    }

    #[test]
    fn invalid_level_is_rejected_at_construction() {
        let cfg = RollingConfig::new(constant_spec(), 1.5);
        assert!(matches!(
            RollingForecastEngine::new(LengthOracle, cfg),
            Err(VarError::InvalidLevel(_))
        ));
    }

    #[test]
    fn short_prefix_becomes_a_missing_step() {
        let s = series(30);
        let mut cfg = RollingConfig::new(constant_spec(), 0.05);
        cfg.max_failure_fraction = 1.0;
        let run = RollingForecastEngine::new(LengthOracle, cfg)
            .unwrap()
            .run(&s, 1, 10)
            .unwrap();
        // a one-point prefix cannot be calibrated
        match &run.steps[0] {
            StepResult::Missing { index, reason, .. } => {
                assert_eq!(*index, 1);
                assert!(matches!(reason, VarError::InsufficientSample(_)));
            }
            other => panic!("expected missing step, got {other:?}"),
        }
        assert_eq!(run.failed(), 1);
    }

    #[test]
    fn failures_are_kept_as_missing_slots() {
        let s = series(200);
        let run = engine(FailEvery(10), 3).run(&s, 100, 199).unwrap();
        assert_eq!(run.completed(), 100);
        assert_eq!(run.failed(), 10);
        let thresholds = run.thresholds();
        assert_eq!(thresholds[0], (100, None));
        assert!(thresholds[1].1.is_some());
    }

    #[test]
    fn too_many_failures_degrade_the_run() {
        let s = series(200);
        let err = engine(FailEvery(2), 2).run(&s, 100, 199).unwrap_err();
        assert_eq!(
            err,
            VarError::DegradedRun {
                failed: 50,
                completed: 100,
                max_fraction: DEFAULT_MAX_FAILURE_FRACTION
            }
        );
    }

    #[test]
    fn pre_cancelled_run_reports_cancelled() {
        let s = series(60);
        let token = CancelToken::new();
        token.cancel();
        let err = engine(LengthOracle, 2)
            .run_with_cancel(&s, 10, 59, &token)
            .unwrap_err();
        assert_eq!(err, VarError::Cancelled);
    }

    /// Cancels the shared token once a given prefix length has been fitted.
    struct CancelAt {
        token: CancelToken,
        at: usize,
    }

    impl VolatilityFitter for CancelAt {
        fn fit(&self, returns: &[f64], spec: &ModelSpec) -> Result<FittedModel, VarError> {
            if returns.len() == self.at {
                self.token.cancel();
            }
            LengthOracle.fit(returns, spec)
        }
    }

    #[test]
    fn cancellation_keeps_completed_steps() {
        let s = series(100);
        let token = CancelToken::new();
        let fitter = CancelAt {
            token: token.clone(),
            at: 15,
        };
        let run = engine(fitter, 1).run_with_cancel(&s, 10, 99, &token).unwrap();
        assert!(run.truncated);
        // single worker: indices 10..=15 ran, the rest were skipped
        assert_eq!(run.completed(), 6);
        assert_eq!(run.steps.last().map(StepResult::index), Some(15));
        assert_eq!(run.failed(), 0);
    }

    #[test]
    fn zero_deadline_cancels_everything() {
        let s = series(60);
        let mut cfg = RollingConfig::new(constant_spec(), 0.05);
        cfg.deadline = Some(Duration::ZERO);
        let err = RollingForecastEngine::new(LengthOracle, cfg)
            .unwrap()
            .run(&s, 10, 59)
            .unwrap_err();
        assert_eq!(err, VarError::Cancelled);
    }

    #[test]
    fn expired_deadline_leaves_the_callers_token_usable() {
        let s = series(60);
        let token = CancelToken::new();
        let mut cfg = RollingConfig::new(constant_spec(), 0.05);
        cfg.deadline = Some(Duration::ZERO);
        let err = RollingForecastEngine::new(LengthOracle, cfg)
            .unwrap()
            .run_with_cancel(&s, 10, 59, &token)
            .unwrap_err();
        assert_eq!(err, VarError::Cancelled);
        assert!(!token.is_cancelled());

        let run = engine(LengthOracle, 2)
            .run_with_cancel(&s, 10, 59, &token)
            .unwrap();
        assert!(!run.truncated);
        assert_eq!(run.completed(), 50);
    }

    #[test]
    fn residual_quantile_source_calibrates_on_standardized_residuals() {
        let s = series(80);
        let prefix = s.prefix(60);
        let (q, point) = forecast_step(
            &LengthOracle,
            prefix,
            &constant_spec(),
            0.05,
            QuantileSource::StandardizedResiduals,
        )
        .unwrap();
        // constant sigma: standardized residuals are an affine map of the prefix
        let raw = calibrate(prefix, 0.05).unwrap();
        assert!((q - raw).abs() < 1e-12);
        assert_eq!(point.as_of_index, 60);
    }
}
