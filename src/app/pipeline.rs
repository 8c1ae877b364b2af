//! Shared workflows behind the `gv` subcommands.
//!
//! data (CSV or synthetic) -> optional selection on the pre-evaluation prefix
//! -> one rolling run per VaR level -> backtest per run
//!
//! The binary only prints and exports what these functions return.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::backtest::evaluate_run;
use crate::data::{SimulationConfig, simulate};
use crate::domain::{BacktestResult, Distribution, ModelSpec, ReturnSeries, Variant};
use crate::error::{AppError, VarError};
use crate::fit::{
    FitOptions, MleFitter, Selection, SelectionConfig, VolatilityFitter, fit_candidates, select,
};
use crate::io::ingest::{IngestOptions, IngestedSeries, load_return_series};
use crate::math::QuantileSource;
use crate::rolling::{CancelToken, RollingConfig, RollingForecastEngine, RollingRun};

/// Where the series comes from.
#[derive(Debug, Clone)]
pub enum DataSource {
    Csv(IngestOptions),
    /// Seeded GARCH(1,1) series of length `n`.
    Synthetic { n: usize, seed: u64 },
}

#[derive(Debug, Clone)]
pub struct LoadedData {
    pub series: ReturnSeries,
    /// Present for CSV input.
    pub ingest: Option<IngestedSeries>,
}

pub fn load_data(source: &DataSource) -> Result<LoadedData, AppError> {
    match source {
        DataSource::Csv(opts) => {
            let ingest = load_return_series(opts)?;
            info!(
                path = %opts.path.display(),
                rows = ingest.rows_used,
                skipped = ingest.row_errors.len(),
                "series loaded"
            );
            Ok(LoadedData {
                series: ingest.series.clone(),
                ingest: Some(ingest),
            })
        }
        DataSource::Synthetic { n, seed } => {
            let series = simulate(&SimulationConfig::garch11(*n, *seed))?;
            info!(n, seed, "synthetic series generated");
            Ok(LoadedData {
                series,
                ingest: None,
            })
        }
    }
}

/// Candidate specs plus ranking rules.
#[derive(Debug, Clone)]
pub struct SelectionPlan {
    pub specs: Vec<ModelSpec>,
    pub config: SelectionConfig,
}

/// Every combination of variant, distribution and orders up to the maxima.
///
/// Variance orders start at `(1, 0)`; asymmetric variants need a shock lag, and
/// pure-GARCH `(0, q)` specs are not identified.
pub fn candidate_specs(
    variants: &[Variant],
    dists: &[Distribution],
    max_arch: usize,
    max_garch: usize,
    max_ar: usize,
    max_ma: usize,
) -> Vec<ModelSpec> {
    let mut specs = Vec::new();
    for &variant in variants {
        for &dist in dists {
            for a in 1..=max_arch {
                for b in 0..=max_garch {
                    for p in 0..=max_ar {
                        for q in 0..=max_ma {
                            specs.push(ModelSpec::new(variant, (p, q), (a, b), dist));
                        }
                    }
                }
            }
        }
    }
    specs.sort();
    specs.dedup();
    specs
}

/// Outcome of ranking candidates on `[0, train_end)`.
#[derive(Debug, Clone)]
pub struct SelectionOutput {
    pub train_end: usize,
    pub selection: Selection,
    pub failures: Vec<(ModelSpec, VarError)>,
}

pub fn run_selection(
    series: &ReturnSeries,
    train_end: usize,
    plan: &SelectionPlan,
) -> Result<SelectionOutput, AppError> {
    if train_end == 0 || train_end > series.len() {
        return Err(VarError::InvalidRange(format!(
            "training end {train_end} outside (0, {}]",
            series.len()
        ))
        .into());
    }
    if plan.specs.is_empty() {
        return Err(AppError::new(2, "No candidate specs to select from."));
    }

    let fitter = MleFitter::new(FitOptions {
        std_errors: true,
        ..FitOptions::default()
    });
    let fits = fit_candidates(series.prefix(train_end), &plan.specs, &fitter);
    for (spec, err) in &fits.failures {
        warn!(spec = %spec, error = %err, "candidate could not be fitted");
    }
    if fits.candidates.is_empty() {
        return Err(AppError::new(
            4,
            format!("None of the {} candidate specs could be fitted.", plan.specs.len()),
        ));
    }

    let selection = select(fits.candidates, &plan.config)?;
    info!(selected = %selection.selected, train_end, "model selected");
    Ok(SelectionOutput {
        train_end,
        selection,
        failures: fits.failures,
    })
}

/// Resolved configuration of `gv run`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: DataSource,
    pub spec: ModelSpec,
    /// Replaces `spec` with the selected one when set.
    pub selection: Option<SelectionPlan>,
    pub start: Option<usize>,
    pub start_date: Option<NaiveDate>,
    pub finish: Option<usize>,
    pub levels: Vec<f64>,
    pub workers: usize,
    pub quantile_source: QuantileSource,
    pub max_failure_fraction: f64,
    pub timeout: Option<Duration>,
    pub confidence: f64,
    pub export_csv: Option<PathBuf>,
    pub export_json: Option<PathBuf>,
}

/// One rolling run and its backtest.
#[derive(Debug, Clone)]
pub struct LevelOutcome {
    pub run: RollingRun,
    /// `None` when no estimate survived to be tested.
    pub backtest: Option<BacktestResult>,
}

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub data: LoadedData,
    pub spec: ModelSpec,
    pub selection: Option<SelectionOutput>,
    pub levels: Vec<LevelOutcome>,
    /// Levels never run because cancellation stopped the run first.
    pub skipped_levels: Vec<f64>,
}

/// Evaluation range `[start, finish]` from explicit indices, a start date or defaults.
pub fn resolve_range(
    series: &ReturnSeries,
    start: Option<usize>,
    start_date: Option<NaiveDate>,
    finish: Option<usize>,
) -> Result<(usize, usize), AppError> {
    if series.len() < 2 {
        return Err(VarError::InsufficientData {
            required: 2,
            available: series.len(),
        }
        .into());
    }
    let last = series.len() - 1;
    let start = match (start, start_date) {
        (Some(i), _) => i,
        (None, Some(date)) => series.index_of(date).ok_or_else(|| {
            AppError::new(2, format!("No observation on or after {date}."))
        })?,
        (None, None) => (series.len() / 2).max(1),
    };
    let finish = finish.unwrap_or(last);
    if start == 0 || start > finish || finish > last {
        return Err(VarError::InvalidRange(format!(
            "evaluation range [{start}, {finish}] must satisfy 1 <= start <= finish <= {last}"
        ))
        .into());
    }
    Ok((start, finish))
}

/// Execute `gv run`: load, optionally select, then roll and backtest each level.
pub fn run_rolling(config: &RunConfig, cancel: &CancelToken) -> Result<RunOutput, AppError> {
    if config.levels.is_empty() {
        return Err(AppError::new(2, "At least one VaR level is required."));
    }
    let data = load_data(&config.source)?;
    let (start, finish) =
        resolve_range(&data.series, config.start, config.start_date, config.finish)?;

    let selection = match &config.selection {
        Some(plan) => Some(run_selection(&data.series, start, plan)?),
        None => None,
    };
    let spec = selection
        .as_ref()
        .map_or(config.spec, |s| s.selection.selected);

    let (levels, skipped_levels) = roll_levels(
        MleFitter::default(),
        &data.series,
        spec,
        (start, finish),
        config,
        cancel,
    )?;

    Ok(RunOutput {
        data,
        spec,
        selection,
        levels,
        skipped_levels,
    })
}

/// One rolling run and backtest per level of `config`, in order.
///
/// A level that cancellation stops before any step completes ends the loop:
/// the finished levels are returned with the remaining ones listed as
/// skipped. Only a cancelled first level is an error.
pub fn roll_levels<F: VolatilityFitter + Clone>(
    fitter: F,
    series: &ReturnSeries,
    spec: ModelSpec,
    (start, finish): (usize, usize),
    config: &RunConfig,
    cancel: &CancelToken,
) -> Result<(Vec<LevelOutcome>, Vec<f64>), AppError> {
    let mut levels = Vec::with_capacity(config.levels.len());
    for (k, &level) in config.levels.iter().enumerate() {
        let rolling = RollingConfig {
            workers: config.workers,
            quantile_source: config.quantile_source,
            max_failure_fraction: config.max_failure_fraction,
            deadline: config.timeout,
            ..RollingConfig::new(spec, level)
        };
        let engine = RollingForecastEngine::new(fitter.clone(), rolling)?;
        let run = match engine.run_with_cancel(series, start, finish, cancel) {
            Ok(run) => run,
            Err(VarError::Cancelled) if !levels.is_empty() => {
                let skipped = config.levels[k..].to_vec();
                warn!(?skipped, "cancelled; returning completed levels");
                return Ok((levels, skipped));
            }
            Err(e) => return Err(e.into()),
        };

        let backtest = match evaluate_run(series, &run, level, config.confidence) {
            Ok(bt) => Some(bt),
            Err(VarError::InsufficientSample(reason)) => {
                warn!(level, %reason, "backtest skipped");
                None
            }
            Err(e) => return Err(e.into()),
        };
        levels.push(LevelOutcome { run, backtest });
    }
    Ok((levels, Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::fit::FittedModel;
    use crate::models::ModelParams;

    /// Unit sigma; cancels `token` once a prefix of length `at` is fitted.
    #[derive(Clone)]
    struct CancelAt {
        token: CancelToken,
        at: usize,
    }

    impl VolatilityFitter for CancelAt {
        fn fit(&self, returns: &[f64], spec: &ModelSpec) -> Result<FittedModel, VarError> {
            if returns.len() == self.at {
                self.token.cancel();
            }
            let params = ModelParams::from_slice(spec, &[0.0, 1.0])?;
            FittedModel::from_params(*spec, params, returns)
        }
    }

    /// Never cancels on its own.
    fn fitter_for(token: &CancelToken) -> CancelAt {
        CancelAt {
            token: token.clone(),
            at: 0,
        }
    }

    fn level_config(levels: Vec<f64>, timeout: Option<Duration>) -> RunConfig {
        RunConfig {
            source: DataSource::Synthetic { n: 60, seed: 1 },
            spec: ModelSpec::new(Variant::Garch, (0, 0), (0, 0), Distribution::Normal),
            selection: None,
            start: None,
            start_date: None,
            finish: None,
            levels,
            workers: 1,
            quantile_source: QuantileSource::RawPrefix,
            max_failure_fraction: 0.25,
            timeout,
            confidence: 0.95,
            export_csv: None,
            export_json: None,
        }
    }

    #[test]
    fn cancelled_later_level_keeps_earlier_results() {
        let series = simulate(&SimulationConfig::garch11(60, 2)).unwrap();
        let config = level_config(vec![0.01, 0.05, 0.1], None);
        let token = CancelToken::new();
        let fitter = CancelAt {
            token: token.clone(),
            at: 25,
        };
        let (levels, skipped) =
            roll_levels(fitter, &series, config.spec, (20, 59), &config, &token).unwrap();

        assert_eq!(levels.len(), 1);
        let run = &levels[0].run;
        assert!(run.truncated);
        // single worker: indices 20..=25 ran
        assert_eq!(run.completed(), 6);
        assert_eq!(run.steps.last().map(|s| s.index()), Some(25));
        assert_eq!(skipped, vec![0.05, 0.1]);
    }

    #[test]
    fn cancelled_first_level_is_an_error() {
        let series = simulate(&SimulationConfig::garch11(60, 2)).unwrap();
        let config = level_config(vec![0.01, 0.05], None);
        let token = CancelToken::new();
        token.cancel();
        let err = roll_levels(fitter_for(&token), &series, config.spec, (20, 59), &config, &token)
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn level_timeout_leaves_the_shared_token_live() {
        let series = simulate(&SimulationConfig::garch11(60, 2)).unwrap();
        // every level times out before its first step
        let config = level_config(vec![0.01, 0.05], Some(Duration::ZERO));
        let token = CancelToken::new();
        let err = roll_levels(fitter_for(&token), &series, config.spec, (20, 59), &config, &token)
            .unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!token.is_cancelled());

        // the shared token is still live for a run without a deadline
        let config = level_config(vec![0.01, 0.05], None);
        let (levels, skipped) =
            roll_levels(fitter_for(&token), &series, config.spec, (20, 59), &config, &token)
                .unwrap();
        assert_eq!(levels.len(), 2);
        assert!(skipped.is_empty());
        assert!(levels.iter().all(|l| !l.run.truncated && l.run.completed() == 40));
    }

    #[test]
    fn candidate_grid_covers_every_combination_once() {
        let specs = candidate_specs(
            &[Variant::Garch, Variant::Egarch],
            &[Distribution::Normal, Distribution::StudentT],
            1,
            1,
            1,
            0,
        );
        // 2 variants x 2 dists x arch {1} x garch {0,1} x ar {0,1}
        assert_eq!(specs.len(), 16);
        assert!(specs.contains(&ModelSpec::garch11()));
        assert!(specs.iter().all(|s| s.variance_order.0 == 1));
        assert!(specs.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn range_defaults_and_validation() {
        let series = simulate(&SimulationConfig::garch11(100, 1)).unwrap();
        assert_eq!(resolve_range(&series, None, None, None).unwrap(), (50, 99));
        assert_eq!(resolve_range(&series, Some(10), None, Some(20)).unwrap(), (10, 20));
        let date = series.timestamp(30).unwrap();
        assert_eq!(resolve_range(&series, None, Some(date), None).unwrap(), (30, 99));
        assert_eq!(
            resolve_range(&series, Some(0), None, None).unwrap_err().exit_code(),
            2
        );
        assert_eq!(
            resolve_range(&series, Some(10), None, Some(100)).unwrap_err().exit_code(),
            2
        );
    }

    #[test]
    fn synthetic_run_produces_ordered_backtested_levels() {
        let config = RunConfig {
            source: DataSource::Synthetic { n: 400, seed: 11 },
            spec: ModelSpec::garch11(),
            selection: None,
            start: Some(380),
            start_date: None,
            finish: None,
            levels: vec![0.01, 0.05],
            workers: 2,
            quantile_source: QuantileSource::RawPrefix,
            max_failure_fraction: 1.0,
            timeout: None,
            confidence: 0.95,
            export_csv: None,
            export_json: None,
        };
        let out = run_rolling(&config, &CancelToken::new()).unwrap();
        assert_eq!(out.levels.len(), 2);
        assert!(out.skipped_levels.is_empty());
        for outcome in &out.levels {
            let idx: Vec<usize> = outcome.run.steps.iter().map(|s| s.index()).collect();
            assert_eq!(idx, (380..400).collect::<Vec<_>>());
            assert!(outcome.backtest.is_some());
        }
        // the 1% threshold sits below the 5% one
        let at_one: Vec<_> = out.levels[0].run.estimates().collect();
        for e5 in out.levels[1].run.estimates() {
            if let Some(e1) = at_one.iter().find(|e| e.index == e5.index) {
                assert!(e1.threshold < e5.threshold, "index {}", e5.index);
            }
        }
    }
}
