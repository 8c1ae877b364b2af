//! CSV ingest of a dated return (or price) column.
//!
//! - Headers are matched case-insensitively (BOM stripped).
//! - Bad rows are skipped and reported, never silently dropped.
//! - A price column is turned into log returns between consecutive valid rows.
//! - Ordering is not repaired: out-of-order or duplicate dates are an error.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::ValueEnum;
use csv::StringRecord;
use serde::Serialize;

use crate::domain::ReturnSeries;
use crate::error::AppError;
use crate::math::{mean, sample_std};

const DATE_COLUMNS: [&str; 3] = ["date", "timestamp", "time"];
const RETURN_COLUMNS: [&str; 3] = ["return", "returns", "ret"];
const PRICE_COLUMNS: [&str; 4] = ["price", "close", "adj_close", "adjclose"];

/// Which column holds the observations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// Returns if a return column exists, prices otherwise.
    Auto,
    Return,
    Price,
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub path: PathBuf,
    pub value_kind: ValueKind,
    /// Multiplier applied to every return (100 for percent).
    pub scale: f64,
}

impl IngestOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            value_kind: ValueKind::Auto,
            scale: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesStats {
    pub n: usize,
    pub first: NaiveDate,
    pub last: NaiveDate,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone)]
pub struct IngestedSeries {
    pub series: ReturnSeries,
    /// Resolved kind (never `Auto`).
    pub kind: ValueKind,
    pub stats: SeriesStats,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

pub fn load_return_series(opts: &IngestOptions) -> Result<IngestedSeries, AppError> {
    let file = File::open(&opts.path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open CSV '{}': {e}", opts.path.display()),
        )
    })?;
    read_return_series(file, opts.value_kind, opts.scale)
        .map_err(|e| with_path(e, &opts.path))
}

fn with_path(err: AppError, path: &Path) -> AppError {
    AppError::new(err.exit_code(), format!("{}: {err}", path.display()))
}

/// Read a return series from any CSV source.
pub fn read_return_series<R: Read>(
    source: R,
    value_kind: ValueKind,
    scale: f64,
) -> Result<IngestedSeries, AppError> {
    if !(scale.is_finite() && scale > 0.0) {
        return Err(AppError::new(2, format!("Invalid scale {scale}: must be finite and > 0.")));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(source);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let date_col = find_column(&header_map, &DATE_COLUMNS).ok_or_else(|| {
        AppError::new(2, "Missing required column: `date` (or `timestamp`).")
    })?;
    let (kind, value_col) = resolve_value_column(value_kind, &header_map)?;

    let mut dates = Vec::new();
    let mut raw = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // header is line 1
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, date_col, value_col, kind) {
            Ok((date, value)) => {
                dates.push(date);
                raw.push(value);
            }
            Err(message) => row_errors.push(RowError { line, message }),
        }
    }

    let (dates, values) = match kind {
        ValueKind::Price => log_returns(&dates, &raw, scale),
        _ => (dates, raw.into_iter().map(|r| r * scale).collect()),
    };

    if values.len() < 2 {
        return Err(AppError::new(
            3,
            format!("Only {} usable observation(s) after ingest.", values.len()),
        ));
    }

    let stats = compute_stats(&dates, &values)
        .ok_or_else(|| AppError::new(3, "No usable observations after ingest."))?;
    let rows_used = values.len();
    let series = ReturnSeries::new(dates, values)?;

    Ok(IngestedSeries {
        series,
        kind,
        stats,
        row_errors,
        rows_read,
        rows_used,
    })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn resolve_value_column(
    value_kind: ValueKind,
    header_map: &HashMap<String, usize>,
) -> Result<(ValueKind, usize), AppError> {
    let returns = find_column(header_map, &RETURN_COLUMNS);
    let prices = find_column(header_map, &PRICE_COLUMNS);
    match (value_kind, returns, prices) {
        (ValueKind::Return | ValueKind::Auto, Some(c), _) => Ok((ValueKind::Return, c)),
        (ValueKind::Price | ValueKind::Auto, _, Some(c)) => Ok((ValueKind::Price, c)),
        (ValueKind::Return, None, _) => Err(AppError::new(
            2,
            "Missing required column for `--value return`: `return`",
        )),
        (ValueKind::Price, _, None) => Err(AppError::new(
            2,
            "Missing required column for `--value price`: `price` (or `close`)",
        )),
        (ValueKind::Auto, None, None) => Err(AppError::new(
            2,
            "Could not resolve `--value auto`: neither a `return` nor a `price` column was found.",
        )),
    }
}

fn parse_row(
    record: &StringRecord,
    date_col: usize,
    value_col: usize,
    kind: ValueKind,
) -> Result<(NaiveDate, f64), String> {
    let date = get_required(record, date_col, "date")?;
    let date = parse_date(date)?;
    let text = get_required(record, value_col, "value")?;
    let value = text
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid numeric value '{text}'."))?;
    if kind == ValueKind::Price && value <= 0.0 {
        return Err(format!("Non-positive price {value}."));
    }
    Ok((date, value))
}

fn get_required<'a>(record: &'a StringRecord, idx: usize, name: &str) -> Result<&'a str, String> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

pub fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const FMTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, DD/MM/YYYY, DD-MM-YYYY, YYYY/MM/DD."
    ))
}

/// `scale * ln(P_t / P_{t-1})`, dated at `t`.
fn log_returns(dates: &[NaiveDate], prices: &[f64], scale: f64) -> (Vec<NaiveDate>, Vec<f64>) {
    let values = prices.windows(2).map(|w| scale * (w[1] / w[0]).ln()).collect();
    let dates = dates.iter().skip(1).copied().collect();
    (dates, values)
}

fn compute_stats(dates: &[NaiveDate], values: &[f64]) -> Option<SeriesStats> {
    let (min, max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    Some(SeriesStats {
        n: values.len(),
        first: *dates.first()?,
        last: *dates.last()?,
        mean: mean(values)?,
        std: sample_std(values)?,
        min,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(csv: &str, kind: ValueKind) -> Result<IngestedSeries, AppError> {
        read_return_series(csv.as_bytes(), kind, 1.0)
    }

    #[test]
    fn reads_returns_and_reports_bad_rows() {
        let csv = "\u{feff}Date,Return\n2024-01-02,0.01\n2024-01-03,abc\n2024-01-04,-0.02\n,0.5\n05/01/2024,0.003\n";
        let out = read(csv, ValueKind::Auto).unwrap();
        assert_eq!(out.kind, ValueKind::Return);
        assert_eq!(out.rows_read, 5);
        assert_eq!(out.rows_used, 3);
        assert_eq!(out.row_errors.len(), 2);
        assert_eq!(out.row_errors[0].line, 3);
        assert_eq!(out.series.values(), &[0.01, -0.02, 0.003]);
        assert_eq!(
            out.series.timestamp(2),
            NaiveDate::from_ymd_opt(2024, 1, 5)
        );
    }

    #[test]
    fn prices_become_scaled_log_returns() {
        let csv = "date,close\n2024-01-02,100\n2024-01-03,110\n2024-01-04,99\n";
        let out = read_return_series(csv.as_bytes(), ValueKind::Auto, 100.0).unwrap();
        assert_eq!(out.kind, ValueKind::Price);
        assert_eq!(out.series.len(), 2);
        assert!((out.series.values()[0] - 100.0 * (1.1f64).ln()).abs() < 1e-12);
        assert!((out.series.values()[1] - 100.0 * (99.0f64 / 110.0).ln()).abs() < 1e-12);
        assert_eq!(out.stats.first, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
    }

    #[test]
    fn non_positive_price_is_a_row_error() {
        let csv = "date,price\n2024-01-02,100\n2024-01-03,0\n2024-01-04,101\n2024-01-05,102\n";
        let out = read(csv, ValueKind::Price).unwrap();
        assert_eq!(out.row_errors.len(), 1);
        assert_eq!(out.series.len(), 2);
    }

    #[test]
    fn explicit_kind_requires_its_column() {
        let csv = "date,price\n2024-01-02,100\n";
        let err = read(csv, ValueKind::Return).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        let err = read("when,x\n", ValueKind::Auto).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn unordered_dates_are_rejected() {
        let csv = "date,return\n2024-01-03,0.01\n2024-01-02,0.02\n2024-01-04,0.03\n";
        let err = read(csv, ValueKind::Auto).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn too_few_rows_is_insufficient_data() {
        let csv = "date,return\n2024-01-02,0.01\n";
        assert_eq!(read(csv, ValueKind::Auto).unwrap_err().exit_code(), 3);
    }
}
