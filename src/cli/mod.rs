//! Command-line parsing for the `gv` binary.
//!
//! Argument parsing and dispatch stay separate from the numeric code: the
//! structs here are converted into plain config structs in `app`.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::{Distribution, Variant};
use crate::fit::Criterion;
use crate::io::ingest::{ValueKind, parse_date};
use crate::math::QuantileSource;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "gv", version, about = "GARCH-family rolling VaR estimation and backtesting")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Walk-forward VaR forecasts over an evaluation range, then backtest them.
    Run(RunArgs),
    /// Fit candidate specs on a training prefix and rank them.
    Select(SelectArgs),
    /// Write a synthetic return series from a known process.
    Simulate(SimulateArgs),
}

/// Where the return series comes from.
#[derive(Debug, Args, Clone)]
pub struct DataArgs {
    /// CSV with a `date` column and a `return` (or `price`) column.
    #[arg(short = 'i', long, value_name = "CSV")]
    pub input: Option<PathBuf>,

    /// Which column holds the observations.
    #[arg(long = "value", value_enum, default_value_t = ValueKind::Auto)]
    pub value_kind: ValueKind,

    /// Multiplier applied to returns (100 for percent).
    #[arg(long, default_value_t = 1.0)]
    pub scale: f64,

    /// Length of the synthetic GARCH(1,1) series used without `--input`.
    #[arg(long = "synthetic-n", default_value_t = 1000)]
    pub synthetic_n: usize,

    /// Seed of the synthetic series.
    #[arg(long, default_value_t = 7)]
    pub seed: u64,
}

/// A single model spec.
#[derive(Debug, Args, Clone)]
pub struct ModelArgs {
    #[arg(long, value_enum, default_value_t = Variant::Garch)]
    pub variant: Variant,

    /// Shock (ARCH) order.
    #[arg(long, default_value_t = 1)]
    pub arch: usize,

    /// Persistence (GARCH) order.
    #[arg(long, default_value_t = 1)]
    pub garch: usize,

    /// Autoregressive order of the mean.
    #[arg(long, default_value_t = 0)]
    pub ar: usize,

    /// Moving-average order of the mean.
    #[arg(long, default_value_t = 0)]
    pub ma: usize,

    #[arg(long, value_enum, default_value_t = Distribution::Normal)]
    pub dist: Distribution,
}

/// Candidate grid and ranking rules for model selection.
#[derive(Debug, Args, Clone)]
pub struct CandidateArgs {
    /// Variants to try.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Variant::Garch, Variant::Gjr, Variant::Egarch])]
    pub variants: Vec<Variant>,

    /// Innovation distributions to try.
    #[arg(long, value_enum, value_delimiter = ',', default_values_t = [Distribution::Normal, Distribution::StudentT])]
    pub dists: Vec<Distribution>,

    #[arg(long, default_value_t = 1)]
    pub max_arch: usize,

    #[arg(long, default_value_t = 1)]
    pub max_garch: usize,

    #[arg(long, default_value_t = 0)]
    pub max_ar: usize,

    #[arg(long, default_value_t = 0)]
    pub max_ma: usize,

    #[arg(long, value_enum, default_value_t = Criterion::Bic)]
    pub criterion: Criterion,

    /// A simpler adequate model within this criterion distance of the best wins.
    #[arg(long, default_value_t = 0.0)]
    pub margin: f64,

    /// Largest share of insignificant parameters for an adequate model.
    #[arg(long, default_value_t = 0.5)]
    pub max_insignificant: f64,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Pick the spec by ranking candidates on the data before `--start`.
    #[arg(long)]
    pub select: bool,

    #[command(flatten)]
    pub candidates: CandidateArgs,

    /// First evaluation index (defaults to half the series).
    #[arg(long, conflicts_with = "start_date")]
    pub start: Option<usize>,

    /// First evaluation date (first observation on or after it).
    #[arg(long, value_parser = parse_date_arg)]
    pub start_date: Option<NaiveDate>,

    /// Last evaluation index (defaults to the last observation).
    #[arg(long)]
    pub finish: Option<usize>,

    /// Lower-tail VaR levels.
    #[arg(long = "level", value_delimiter = ',', default_values_t = [0.01, 0.05])]
    pub levels: Vec<f64>,

    /// Worker threads for the rolling run (0 = all cores).
    #[arg(long, env = "GV_WORKERS", default_value_t = 0)]
    pub workers: usize,

    /// Sample the empirical quantile is calibrated on.
    #[arg(long, value_enum, default_value_t = QuantileSource::RawPrefix)]
    pub quantile_source: QuantileSource,

    /// Largest tolerated share of failed steps.
    #[arg(long, default_value_t = 0.25)]
    pub max_failure_fraction: f64,

    /// Wall-clock budget per level; unfinished steps are dropped.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Confidence of the breach-count test.
    #[arg(long, default_value_t = 0.95)]
    pub confidence: f64,

    /// Write the VaR stream to CSV (one file per level when several are given).
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,

    /// Write run summaries to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SelectArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub candidates: CandidateArgs,

    /// Training window is `[0, train_end)` (defaults to the whole series).
    #[arg(long)]
    pub train_end: Option<usize>,

    /// Write the ranked table and the selected fit to JSON.
    #[arg(long, value_name = "JSON")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    #[arg(short = 'n', long, default_value_t = 1000)]
    pub n: usize,

    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = Variant::Garch)]
    pub variant: Variant,

    #[arg(long, value_enum, default_value_t = Distribution::Normal)]
    pub dist: Distribution,

    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub mu: f64,

    #[arg(long, default_value_t = 0.02)]
    pub omega: f64,

    #[arg(long, default_value_t = 0.08)]
    pub alpha: f64,

    /// Asymmetry coefficient (GJR / EGARCH only).
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub gamma: f64,

    #[arg(long, default_value_t = 0.9)]
    pub beta: f64,

    /// Student-t degrees of freedom.
    #[arg(long, default_value_t = 8.0)]
    pub nu: f64,

    #[arg(long, default_value_t = crate::data::DEFAULT_BURN_IN)]
    pub burn_in: usize,

    #[arg(long, value_parser = parse_date_arg)]
    pub start_date: Option<NaiveDate>,

    /// Output CSV (stdout when omitted).
    #[arg(short = 'o', long, value_name = "CSV")]
    pub output: Option<PathBuf>,
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s.trim())
}
