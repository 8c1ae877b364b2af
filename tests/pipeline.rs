//! Workflow tests: CSV round trip into a rolling run, and model selection.

use std::path::PathBuf;

use garch_var::app::pipeline::{
    DataSource, RunConfig, SelectionPlan, candidate_specs, load_data, run_rolling, run_selection,
};
use garch_var::data::{SimulationConfig, simulate};
use garch_var::domain::{Distribution, ModelSpec, Variant};
use garch_var::fit::{Criterion, SelectionConfig};
use garch_var::io::{IngestOptions, export_series_csv};
use garch_var::math::QuantileSource;
use garch_var::rolling::CancelToken;

fn temp_csv(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("garch_var_{}_{name}.csv", std::process::id()))
}

#[test]
fn csv_series_feeds_a_rolling_run() {
    let series = simulate(&SimulationConfig::garch11(300, 5)).unwrap();
    let path = temp_csv("roundtrip");
    export_series_csv(&path, &series).unwrap();

    let config = RunConfig {
        source: DataSource::Csv(IngestOptions::new(&path)),
        spec: ModelSpec::garch11(),
        selection: None,
        start: None,
        start_date: series.timestamp(290),
        finish: None,
        levels: vec![0.05],
        workers: 2,
        quantile_source: QuantileSource::StandardizedResiduals,
        max_failure_fraction: 1.0,
        timeout: None,
        confidence: 0.95,
        export_csv: None,
        export_json: None,
    };
    let out = run_rolling(&config, &CancelToken::new()).unwrap();
    std::fs::remove_file(&path).ok();

    let ingest = out.data.ingest.as_ref().unwrap();
    assert_eq!(ingest.rows_used, 300);
    assert!(ingest.row_errors.is_empty());
    assert_eq!(out.spec, ModelSpec::garch11());

    let run = &out.levels[0].run;
    assert_eq!((run.start, run.finish), (290, 299));
    assert_eq!(run.completed(), 10);
}

#[test]
fn selection_ranks_every_fitted_candidate() {
    let data = load_data(&DataSource::Synthetic { n: 600, seed: 17 }).unwrap();
    let plan = SelectionPlan {
        specs: candidate_specs(
            &[Variant::Garch, Variant::Gjr],
            &[Distribution::Normal],
            1,
            1,
            0,
            0,
        ),
        config: SelectionConfig {
            primary: Criterion::Bic,
            ..SelectionConfig::default()
        },
    };
    assert_eq!(plan.specs.len(), 4);

    let out = run_selection(&data.series, 500, &plan).unwrap();
    let table = &out.selection.table;
    assert_eq!(table.len() + out.failures.len(), 4);
    assert!(table.iter().enumerate().all(|(i, row)| row.rank == i + 1));
    assert!(table.iter().all(|row| row.n_obs == 500));
    assert!(table.iter().any(|row| row.spec == out.selection.selected));
}

#[test]
fn selection_then_roll_uses_the_selected_spec() {
    let config = RunConfig {
        source: DataSource::Synthetic { n: 420, seed: 23 },
        spec: ModelSpec::new(Variant::Egarch, (0, 0), (1, 1), Distribution::StudentT),
        selection: Some(SelectionPlan {
            specs: vec![
                ModelSpec::garch11(),
                ModelSpec::new(Variant::Garch, (0, 0), (1, 0), Distribution::Normal),
            ],
            config: SelectionConfig::default(),
        }),
        start: Some(410),
        start_date: None,
        finish: None,
        levels: vec![0.01],
        workers: 1,
        quantile_source: QuantileSource::RawPrefix,
        max_failure_fraction: 1.0,
        timeout: None,
        confidence: 0.95,
        export_csv: None,
        export_json: None,
    };
    let out = run_rolling(&config, &CancelToken::new()).unwrap();
    let selected = out.selection.as_ref().unwrap().selection.selected;
    assert_eq!(out.spec, selected);
    assert_eq!(out.levels[0].run.spec, selected);
    assert_ne!(out.spec.variant, Variant::Egarch);
}
