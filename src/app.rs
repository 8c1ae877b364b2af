//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module is the real entry point that:
//! - loads `.env` and installs the log subscriber
//! - parses CLI arguments into config structs
//! - runs the selected workflow (`pipeline`)
//! - prints reports and writes optional exports

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{CandidateArgs, Command, DataArgs, RunArgs, SelectArgs, SimulateArgs};
use crate::data::{SimulationConfig, default_start_date, simulate};
use crate::domain::{Distribution, ModelSpec};
use crate::error::AppError;
use crate::fit::{Criterion, SelectionConfig};
use crate::io::export::{
    RunSummary, SelectionSummary, export_json, export_series_csv, export_var_csv, write_series_csv,
};
use crate::io::ingest::IngestOptions;
use crate::models::ModelParams;
use crate::report;
use crate::rolling::CancelToken;

pub mod pipeline;

use pipeline::{DataSource, RunConfig, SelectionPlan};

/// Row errors echoed to the terminal before the rest are summarized.
const MAX_ROW_ERRORS_SHOWN: usize = 5;

/// Entry point for the `gv` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = crate::cli::Cli::parse();
    match cli.command {
        Command::Run(args) => handle_run(&args),
        Command::Select(args) => handle_select(&args),
        Command::Simulate(args) => handle_simulate(&args),
    }
}

/// Logs go to stderr so stdout stays clean for reports and piped CSV.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("garch_var=info"));
    // A subscriber may already be installed (tests, embedding).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn handle_run(args: &RunArgs) -> Result<(), AppError> {
    let config = run_config_from_args(args);
    let output = pipeline::run_rolling(&config, &CancelToken::new())?;

    if let Some(ingest) = &output.data.ingest {
        print!("{}", report::format_ingest_summary(ingest, MAX_ROW_ERRORS_SHOWN));
    }
    if let Some(sel) = &output.selection {
        println!("{}", report::format_selection(&sel.selection, config_primary(&config)));
    }

    let series = &output.data.series;
    let many = output.levels.len() > 1;
    let mut summaries = Vec::with_capacity(output.levels.len());
    for outcome in &output.levels {
        println!(
            "{}",
            report::format_run_summary(series, &outcome.run, outcome.backtest.as_ref())
        );
        if let Some(path) = &config.export_csv {
            let path = level_path(path, outcome.run.level, many);
            export_var_csv(&path, series, &outcome.run)?;
        }
        summaries.push(RunSummary::new(series, &outcome.run, outcome.backtest));
    }
    for level in &output.skipped_levels {
        println!("  (skipped level {level}) cancelled before it started");
    }

    if let Some(path) = &config.export_json {
        export_json(path, &summaries)?;
    }
    Ok(())
}

fn handle_select(args: &SelectArgs) -> Result<(), AppError> {
    let source = data_source_from_args(&args.data);
    let data = pipeline::load_data(&source)?;
    if let Some(ingest) = &data.ingest {
        print!("{}", report::format_ingest_summary(ingest, MAX_ROW_ERRORS_SHOWN));
    }

    let plan = selection_plan_from_args(&args.candidates);
    let train_end = args.train_end.unwrap_or(data.series.len());
    let out = pipeline::run_selection(&data.series, train_end, &plan)?;

    println!("{}", report::format_selection(&out.selection, plan.config.primary));
    if let Some(chosen) = out
        .selection
        .candidates
        .iter()
        .find(|c| c.spec == out.selection.selected)
    {
        println!("Selected:\n{}", report::format_fit(&chosen.fit));
    }
    for (spec, err) in &out.failures {
        println!("  (failed {spec}) {err}");
    }

    if let Some(path) = &args.export_json {
        let summary = SelectionSummary::new(&out.selection, out.train_end, &out.failures)?;
        export_json(path, &summary)?;
    }
    Ok(())
}

fn handle_simulate(args: &SimulateArgs) -> Result<(), AppError> {
    let cfg = simulation_config_from_args(args)?;
    let series = simulate(&cfg)?;
    match &args.output {
        Some(path) => export_series_csv(path, &series),
        None => {
            let mut stdout = std::io::stdout().lock();
            write_series_csv(&mut stdout, &series)
                .and_then(|_| stdout.flush())
                .map_err(|e| AppError::new(2, format!("Failed to write series: {e}")))
        }
    }
}

pub fn data_source_from_args(args: &DataArgs) -> DataSource {
    match &args.input {
        Some(path) => DataSource::Csv(IngestOptions {
            path: path.clone(),
            value_kind: args.value_kind,
            scale: args.scale,
        }),
        None => DataSource::Synthetic {
            n: args.synthetic_n,
            seed: args.seed,
        },
    }
}

pub fn selection_plan_from_args(args: &CandidateArgs) -> SelectionPlan {
    SelectionPlan {
        specs: pipeline::candidate_specs(
            &args.variants,
            &args.dists,
            args.max_arch,
            args.max_garch,
            args.max_ar,
            args.max_ma,
        ),
        config: SelectionConfig {
            primary: args.criterion,
            max_insignificant_fraction: args.max_insignificant,
            simplicity_margin: args.margin,
            ..SelectionConfig::default()
        },
    }
}

pub fn run_config_from_args(args: &RunArgs) -> RunConfig {
    let m = &args.model;
    RunConfig {
        source: data_source_from_args(&args.data),
        spec: ModelSpec::new(m.variant, (m.ar, m.ma), (m.arch, m.garch), m.dist),
        selection: args
            .select
            .then(|| selection_plan_from_args(&args.candidates)),
        start: args.start,
        start_date: args.start_date,
        finish: args.finish,
        levels: args.levels.clone(),
        workers: args.workers,
        quantile_source: args.quantile_source,
        max_failure_fraction: args.max_failure_fraction,
        timeout: args.timeout_secs.map(Duration::from_secs),
        confidence: args.confidence,
        export_csv: args.export.clone(),
        export_json: args.export_json.clone(),
    }
}

/// Single-lag GARCH / GJR / EGARCH process from the simulate flags.
pub fn simulation_config_from_args(args: &SimulateArgs) -> Result<SimulationConfig, AppError> {
    let spec = ModelSpec::new(args.variant, (0, 0), (1, 1), args.dist);
    let mut theta = vec![args.mu, args.omega, args.alpha];
    if args.variant.is_asymmetric() {
        theta.push(args.gamma);
    }
    theta.push(args.beta);
    if args.dist == Distribution::StudentT {
        theta.push(args.nu);
    }
    let params = ModelParams::from_slice(&spec, &theta)?;
    Ok(SimulationConfig {
        spec,
        params,
        n: args.n,
        burn_in: args.burn_in,
        seed: args.seed,
        start: args.start_date.unwrap_or_else(default_start_date),
    })
}

fn config_primary(config: &RunConfig) -> Criterion {
    config
        .selection
        .as_ref()
        .map_or(SelectionConfig::default().primary, |p| p.config.primary)
}

/// `var.csv` -> `var_0.01.csv` when several levels share one export path.
fn level_path(path: &Path, level: f64, many: bool) -> PathBuf {
    if !many {
        return path.to_path_buf();
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem}_{level}.{}", ext.to_string_lossy()),
        None => format!("{stem}_{level}"),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::Variant;

    fn parse(argv: &[&str]) -> Command {
        Cli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn level_paths_are_suffixed_only_for_several_levels() {
        let p = Path::new("out/var.csv");
        assert_eq!(level_path(p, 0.01, false), PathBuf::from("out/var.csv"));
        assert_eq!(level_path(p, 0.01, true), PathBuf::from("out/var_0.01.csv"));
    }

    #[test]
    fn run_args_map_to_config() {
        let Command::Run(args) = parse(&[
            "gv", "run", "--variant", "gjr", "--dist", "t", "--ar", "1", "--timeout-secs", "5",
        ]) else {
            panic!("expected run");
        };
        let cfg = run_config_from_args(&args);
        assert_eq!(
            cfg.spec,
            ModelSpec::new(Variant::Gjr, (1, 0), (1, 1), Distribution::StudentT)
        );
        assert_eq!(cfg.timeout, Some(Duration::from_secs(5)));
        assert!(cfg.selection.is_none());
        assert!(matches!(cfg.source, DataSource::Synthetic { n: 1000, seed: 7 }));
    }

    #[test]
    fn simulate_args_build_matching_params() {
        let Command::Simulate(args) = parse(&[
            "gv", "simulate", "--variant", "egarch", "--dist", "t", "--gamma=-0.05",
            "--beta", "0.95", "--omega", "0.0", "--alpha", "0.1",
        ]) else {
            panic!("expected simulate");
        };
        let cfg = simulation_config_from_args(&args).unwrap();
        assert_eq!(cfg.params.gamma, vec![-0.05]);
        assert_eq!(cfg.params.nu, Some(8.0));
        assert_eq!(cfg.spec.param_count(), cfg.params.to_vec().len());
    }
}
