//! Export rolling results, run summaries and series to CSV/JSON.
//!
//! The CSV layouts are flat so they open cleanly in spreadsheets.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::NaiveDate;
use serde::Serialize;

use crate::backtest::is_breach;
use crate::domain::{BacktestResult, ModelSpec, ReturnSeries, StepResult};
use crate::error::{AppError, VarError};
use crate::fit::{CriteriaRow, FittedModel, Selection};
use crate::models::ModelParams;
use crate::rolling::RollingRun;

/// Per-run summary written to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub spec: ModelSpec,
    pub label: String,
    pub level: f64,
    pub start: usize,
    pub finish: usize,
    pub start_date: Option<NaiveDate>,
    pub finish_date: Option<NaiveDate>,
    pub requested: usize,
    pub completed: usize,
    pub failed: usize,
    pub truncated: bool,
    pub backtest: Option<BacktestResult>,
}

impl RunSummary {
    pub fn new(series: &ReturnSeries, run: &RollingRun, backtest: Option<BacktestResult>) -> Self {
        Self {
            spec: run.spec,
            label: run.spec.label(),
            level: run.level,
            start: run.start,
            finish: run.finish,
            start_date: series.timestamp(run.start),
            finish_date: series.timestamp(run.finish),
            requested: run.requested(),
            completed: run.completed(),
            failed: run.failed(),
            truncated: run.truncated,
            backtest,
        }
    }
}

/// Fitted parameters of the selected candidate, keyed by name.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedModel {
    pub label: String,
    pub spec: ModelSpec,
    pub params: Vec<(String, f64)>,
    pub std_errors: Option<Vec<f64>>,
    pub log_likelihood: f64,
    pub n_obs: usize,
}

impl SelectedModel {
    pub fn new(fit: &FittedModel) -> Self {
        let params = ModelParams::names(&fit.spec)
            .into_iter()
            .zip(fit.params.to_vec())
            .collect();
        Self {
            label: fit.spec.label(),
            spec: fit.spec,
            params,
            std_errors: fit.std_errors.clone(),
            log_likelihood: fit.log_likelihood,
            n_obs: fit.n_obs,
        }
    }
}

/// Selection output written to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct SelectionSummary {
    pub train_end: usize,
    pub selected: SelectedModel,
    pub table: Vec<CriteriaRow>,
    pub failures: Vec<(String, String)>,
}

impl SelectionSummary {
    pub fn new(
        selection: &Selection,
        train_end: usize,
        failures: &[(ModelSpec, VarError)],
    ) -> Result<Self, AppError> {
        let selected = selection
            .candidates
            .iter()
            .find(|c| c.spec == selection.selected)
            .ok_or_else(|| AppError::new(4, "Selected model missing from the candidate list."))?;
        Ok(Self {
            train_end,
            selected: SelectedModel::new(&selected.fit),
            table: selection.table.clone(),
            failures: failures
                .iter()
                .map(|(spec, err)| (spec.label(), err.to_string()))
                .collect(),
        })
    }
}

fn create(path: &Path, what: &str) -> Result<BufWriter<File>, AppError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))
}

fn write_err(what: &str) -> impl Fn(std::io::Error) -> AppError + '_ {
    move |e| AppError::new(2, format!("Failed to write {what}: {e}"))
}

/// One row per step: `index,date,return,threshold,sigma,quantile,breach,missing_reason`.
pub fn write_var_csv<W: Write>(
    out: &mut W,
    series: &ReturnSeries,
    run: &RollingRun,
) -> std::io::Result<()> {
    writeln!(out, "index,date,return,threshold,sigma,quantile,breach,missing_reason")?;
    for step in &run.steps {
        let index = step.index();
        let actual = series.values().get(index).copied();
        let actual_text = actual.map(|r| format!("{r:.10}")).unwrap_or_default();
        match step {
            StepResult::Estimated(e) => {
                let breach = actual.is_some_and(|r| is_breach(r, e.threshold));
                writeln!(
                    out,
                    "{},{},{},{:.10},{:.10},{:.10},{},",
                    index, e.timestamp, actual_text, e.threshold, e.sigma, e.quantile, breach
                )?;
            }
            StepResult::Missing {
                timestamp, reason, ..
            } => {
                writeln!(
                    out,
                    "{},{},{},,,,,{}",
                    index,
                    timestamp,
                    actual_text,
                    csv_field(&reason.to_string())
                )?;
            }
        }
    }
    Ok(())
}

pub fn export_var_csv(path: &Path, series: &ReturnSeries, run: &RollingRun) -> Result<(), AppError> {
    let mut file = create(path, "VaR CSV")?;
    write_var_csv(&mut file, series, run).map_err(write_err("VaR CSV"))?;
    file.flush().map_err(write_err("VaR CSV"))
}

/// `date,return` rows, readable back by ingest.
pub fn write_series_csv<W: Write>(out: &mut W, series: &ReturnSeries) -> std::io::Result<()> {
    writeln!(out, "date,return")?;
    for (date, value) in series.timestamps().iter().zip(series.values()) {
        writeln!(out, "{date},{value:.12}")?;
    }
    Ok(())
}

pub fn export_series_csv(path: &Path, series: &ReturnSeries) -> Result<(), AppError> {
    let mut file = create(path, "series CSV")?;
    write_series_csv(&mut file, series).map_err(write_err("series CSV"))?;
    file.flush().map_err(write_err("series CSV"))
}

/// Pretty-printed JSON of any serializable summary.
pub fn export_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut file = create(path, "JSON export")?;
    serde_json::to_writer_pretty(&mut file, value)
        .map_err(|e| AppError::new(2, format!("Failed to write JSON export: {e}")))?;
    writeln!(file).map_err(write_err("JSON export"))?;
    file.flush().map_err(write_err("JSON export"))
}

/// Quote a free-text field if it would break the row.
fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ForecastPoint, VarEstimate};
    use crate::io::ingest::{ValueKind, read_return_series};

    fn series() -> ReturnSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ReturnSeries::from_values(start, vec![0.01, -0.02, -0.05, 0.03]).unwrap()
    }

    fn run(series: &ReturnSeries) -> RollingRun {
        let est = |i: usize| {
            StepResult::Estimated(VarEstimate::new(
                series.timestamp(i).unwrap(),
                -2.0,
                ForecastPoint {
                    as_of_index: i,
                    sigma: 0.02,
                },
            ))
        };
        RollingRun {
            spec: ModelSpec::garch11(),
            level: 0.05,
            start: 1,
            finish: 3,
            steps: vec![
                est(1),
                est(2),
                StepResult::Missing {
                    index: 3,
                    timestamp: series.timestamp(3).unwrap(),
                    reason: VarError::DegenerateInput("flat, window".to_string()),
                },
            ],
            truncated: false,
        }
    }

    #[test]
    fn var_csv_marks_breaches_and_missing_rows() {
        let s = series();
        let mut buf = Vec::new();
        write_var_csv(&mut buf, &s, &run(&s)).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("1,2024-01-02,"));
        assert!(lines[1].ends_with(",false,"));
        // -0.05 < -0.04
        assert!(lines[2].ends_with(",true,"));
        assert_eq!(
            lines[3],
            "3,2024-01-04,0.0300000000,,,,,\"degenerate input: flat, window\""
        );
    }

    #[test]
    fn series_csv_reads_back() {
        let s = series();
        let mut buf = Vec::new();
        write_series_csv(&mut buf, &s).unwrap();
        let back = read_return_series(buf.as_slice(), ValueKind::Return, 1.0).unwrap();
        assert_eq!(back.series, s);
    }

    #[test]
    fn run_summary_counts() {
        let s = series();
        let summary = RunSummary::new(&s, &run(&s), None);
        assert_eq!(summary.requested, 3);
        assert_eq!(summary.completed, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.finish_date, s.timestamp(3));
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"label\""));
    }
}
