//! Formatted terminal output for runs, backtests and model selection.
//!
//! Formatting lives here so the numeric code stays free of presentation
//! concerns and output changes stay localized.

use crate::domain::{BacktestResult, ReturnSeries};
use crate::fit::{Criterion, FittedModel, Selection};
use crate::io::ingest::IngestedSeries;
use crate::models::ModelParams;
use crate::rolling::RollingRun;

/// Dataset line plus the first few skipped rows.
pub fn format_ingest_summary(ingest: &IngestedSeries, max_errors: usize) -> String {
    let s = &ingest.stats;
    let mut out = String::new();
    out.push_str(&format!(
        "Data: n={} ({:?}) | {} .. {} | mean={:.6} std={:.6} | range=[{:.6}, {:.6}]\n",
        s.n, ingest.kind, s.first, s.last, s.mean, s.std, s.min, s.max
    ));
    out.push_str(&format!(
        "Rows: read={} used={} skipped={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len()
    ));
    for e in ingest.row_errors.iter().take(max_errors) {
        out.push_str(&format!("  line {}: {}\n", e.line, e.message));
    }
    if ingest.row_errors.len() > max_errors {
        out.push_str(&format!(
            "  ... {} more\n",
            ingest.row_errors.len() - max_errors
        ));
    }
    out
}

/// Summary of one rolling run (and its backtest, if any).
pub fn format_run_summary(
    series: &ReturnSeries,
    run: &RollingRun,
    backtest: Option<&BacktestResult>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== {} | VaR level {:.2}% ===\n",
        run.spec.label(),
        run.level * 100.0
    ));
    let date = |i: usize| {
        series
            .timestamp(i)
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".to_string())
    };
    out.push_str(&format!(
        "Range: [{}, {}] ({} .. {})\n",
        run.start,
        run.finish,
        date(run.start),
        date(run.finish)
    ));
    out.push_str(&format!(
        "Steps: requested={} completed={} missing={}{}\n",
        run.requested(),
        run.completed(),
        run.failed(),
        if run.truncated { " (truncated)" } else { "" }
    ));

    let thresholds: Vec<f64> = run.estimates().map(|e| e.threshold).collect();
    if let (Some(lo), Some(hi)) = (
        thresholds.iter().copied().reduce(f64::min),
        thresholds.iter().copied().reduce(f64::max),
    ) {
        out.push_str(&format!("Threshold: [{lo:.6}, {hi:.6}]\n"));
    }

    if let Some(bt) = backtest {
        out.push_str(&format_backtest(bt));
    }
    out
}

pub fn format_backtest(bt: &BacktestResult) -> String {
    let verdict = if bt.within_tolerance { "PASS" } else { "FAIL" };
    format!(
        "Backtest: breaches={}/{} rate={:.4}% expected={:.4}% missing={} | binom p={:.4} | kupiec LR={:.3} p={:.4} | {verdict}\n",
        bt.breach_count,
        bt.sample_size,
        bt.breach_rate * 100.0,
        bt.expected_rate * 100.0,
        bt.missing,
        bt.p_value,
        bt.kupiec_lr,
        bt.kupiec_p_value,
    )
}

/// Information-criteria table, best first; `*` marks the selected spec.
pub fn format_selection(selection: &Selection, primary: Criterion) -> String {
    let mut out = String::new();
    out.push_str(&format!("Model ranking (primary: {}):\n", primary.display_name()));
    out.push_str(
        format!(
            "  {:>4} {:<28} {:>4} {:>14} {:>12} {:>12} {:>12} {:>7} {:>5}",
            "rank", "model", "k", "loglik", "AIC", "BIC", "HQIC", "insig", "ok"
        )
        .trim_end(),
    );
    out.push('\n');
    for row in &selection.table {
        let chosen = if row.spec == selection.selected { "*" } else { " " };
        out.push_str(
            format!(
                "{chosen} {:>4} {:<28} {:>4} {:>14.4} {:>12.4} {:>12.4} {:>12.4} {:>6.0}% {:>5}",
                row.rank,
                truncate(&row.label, 28),
                row.param_count,
                row.log_likelihood,
                row.criteria.aic,
                row.criteria.bic,
                row.criteria.hqic,
                row.insignificant_fraction * 100.0,
                if row.adequate { "yes" } else { "no" },
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Parameter table with standard errors and t-ratios when available.
pub fn format_fit(fit: &FittedModel) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: loglik={:.4} n={} iterations={}\n",
        fit.spec.label(),
        fit.log_likelihood,
        fit.n_obs,
        fit.iterations
    ));
    let names = ModelParams::names(&fit.spec);
    let values = fit.params.to_vec();
    for (i, (name, value)) in names.iter().zip(&values).enumerate() {
        let se = fit.std_errors.as_ref().and_then(|se| se.get(i)).copied();
        match se {
            Some(se) if se > 0.0 => out.push_str(&format!(
                "  {name:<10} {value:>12.6}  se={se:>10.6}  t={:>8.2}\n",
                value / se
            )),
            _ => out.push_str(&format!("  {name:<10} {value:>12.6}\n")),
        }
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
