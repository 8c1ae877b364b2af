//! Model selection across candidate specs using information criteria with
//! adequacy guardrails.
//!
//! For every candidate fit we compute:
//! - AIC  = 2k - 2L
//! - BIC  = k ln(n) - 2L
//! - HQIC = 2k ln(ln(n)) - 2L
//!
//! Selection rules:
//! 1. Adequate candidates rank before inadequate ones. A candidate is adequate
//!    when its share of insignificant parameters is within the configured limit
//!    and its externally supplied residual diagnostics did not fail.
//! 2. Within each group, rank by the primary criterion (lower is better), then
//!    fewer parameters, then the remaining criteria in fixed priority order,
//!    then the spec ordering. The ranking is total and deterministic.
//! 3. If a simpler adequate candidate is within `simplicity_margin` of the
//!    leader on the primary criterion, pick the simpler one.

use std::cmp::Ordering;

use clap::ValueEnum;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ModelSpec;
use crate::error::VarError;
use crate::fit::fitter::{FittedModel, VolatilityFitter};

/// Two-sided 5% critical value of the standard normal.
pub const DEFAULT_T_CRITICAL: f64 = 1.96;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Aic,
    Bic,
    Hqic,
}

impl Criterion {
    /// Fixed priority used after the primary criterion.
    pub const PRIORITY: [Criterion; 3] = [Criterion::Bic, Criterion::Aic, Criterion::Hqic];

    pub fn display_name(self) -> &'static str {
        match self {
            Criterion::Aic => "AIC",
            Criterion::Bic => "BIC",
            Criterion::Hqic => "HQIC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InformationCriteria {
    pub aic: f64,
    pub bic: f64,
    pub hqic: f64,
}

impl InformationCriteria {
    pub fn new(log_likelihood: f64, k: usize, n: usize) -> Self {
        let k = k as f64;
        let n = n as f64;
        Self {
            aic: 2.0 * k - 2.0 * log_likelihood,
            bic: k * n.ln() - 2.0 * log_likelihood,
            hqic: 2.0 * k * n.ln().ln() - 2.0 * log_likelihood,
        }
    }

    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Aic => self.aic,
            Criterion::Bic => self.bic,
            Criterion::Hqic => self.hqic,
        }
    }
}

/// A fitted candidate offered to the selector.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub spec: ModelSpec,
    pub fit: FittedModel,
    /// Residual-diagnostic verdict from an external check; `None` = not supplied.
    pub diagnostics_passed: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    pub primary: Criterion,
    /// Largest tolerated share of parameters with `|estimate / se| < t_critical`.
    pub max_insignificant_fraction: f64,
    pub t_critical: f64,
    /// A simpler adequate candidate within this distance of the leader wins.
    pub simplicity_margin: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            primary: Criterion::Bic,
            max_insignificant_fraction: 0.5,
            t_critical: DEFAULT_T_CRITICAL,
            simplicity_margin: 0.0,
        }
    }
}

/// One row of the information-criteria table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriteriaRow {
    pub rank: usize,
    pub spec: ModelSpec,
    pub label: String,
    pub log_likelihood: f64,
    pub param_count: usize,
    pub n_obs: usize,
    pub criteria: InformationCriteria,
    pub insignificant_fraction: f64,
    pub diagnostics_passed: Option<bool>,
    pub adequate: bool,
}

/// Output of ranking + selection.
#[derive(Debug, Clone)]
pub struct Selection {
    pub selected: ModelSpec,
    /// Ranked table, best first.
    pub table: Vec<CriteriaRow>,
    /// Candidates in ranked order (same order as `table`).
    pub candidates: Vec<Candidate>,
}

impl Selection {
    pub fn selected_row(&self) -> Option<&CriteriaRow> {
        self.table.iter().find(|row| row.spec == self.selected)
    }
}

/// Share of parameters whose t-ratio is below `t_critical`.
///
/// Missing standard errors count every parameter as insignificant.
pub fn insignificant_fraction(fit: &FittedModel, t_critical: f64) -> f64 {
    let estimates = fit.params.to_vec();
    if estimates.is_empty() {
        return 0.0;
    }
    let Some(se) = fit.std_errors.as_ref() else {
        return 1.0;
    };
    let insignificant = estimates
        .iter()
        .zip(se)
        .filter(|(est, se)| {
            let t = *est / *se;
            !(t.is_finite() && t.abs() >= t_critical)
        })
        .count();
    insignificant as f64 / estimates.len() as f64
}

fn build_row(candidate: &Candidate, config: &SelectionConfig) -> CriteriaRow {
    let fit = &candidate.fit;
    let k = candidate.spec.param_count();
    let criteria = InformationCriteria::new(fit.log_likelihood, k, fit.n_obs);
    let insignificant = insignificant_fraction(fit, config.t_critical);
    let adequate = insignificant <= config.max_insignificant_fraction
        && candidate.diagnostics_passed != Some(false);
    CriteriaRow {
        rank: 0,
        spec: candidate.spec,
        label: candidate.spec.label(),
        log_likelihood: fit.log_likelihood,
        param_count: k,
        n_obs: fit.n_obs,
        criteria,
        insignificant_fraction: insignificant,
        diagnostics_passed: candidate.diagnostics_passed,
        adequate,
    }
}

fn compare_rows(a: &CriteriaRow, b: &CriteriaRow, primary: Criterion) -> Ordering {
    b.adequate
        .cmp(&a.adequate)
        .then_with(|| a.criteria.get(primary).total_cmp(&b.criteria.get(primary)))
        .then_with(|| a.param_count.cmp(&b.param_count))
        .then_with(|| {
            Criterion::PRIORITY
                .iter()
                .filter(|c| **c != primary)
                .map(|c| a.criteria.get(*c).total_cmp(&b.criteria.get(*c)))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.spec.cmp(&b.spec))
}

/// Rank `candidates` and pick the production spec.
pub fn select(candidates: Vec<Candidate>, config: &SelectionConfig) -> Result<Selection, VarError> {
    if candidates.is_empty() {
        return Err(VarError::InsufficientData {
            required: 1,
            available: 0,
        });
    }

    let mut paired: Vec<(CriteriaRow, Candidate)> = candidates
        .into_iter()
        .map(|c| (build_row(&c, config), c))
        .collect();
    paired.sort_by(|(a, _), (b, _)| compare_rows(a, b, config.primary));

    let (mut table, candidates): (Vec<CriteriaRow>, Vec<Candidate>) = paired.into_iter().unzip();
    for (rank, row) in table.iter_mut().enumerate() {
        row.rank = rank + 1;
    }

    let leader = &table[0];
    let mut selected = leader;
    if leader.adequate {
        let limit = leader.criteria.get(config.primary) + config.simplicity_margin;
        // `table` is ranked, so the first simpler row found is the best simpler one.
        let simpler = table
            .iter()
            .filter(|row| row.adequate && row.criteria.get(config.primary) <= limit)
            .min_by_key(|row| row.param_count);
        if let Some(row) = simpler {
            if row.param_count < leader.param_count {
                selected = row;
            }
        }
    }
    debug!(
        selected = %selected.spec,
        leader = %leader.spec,
        candidates = table.len(),
        "model selection finished"
    );

    Ok(Selection {
        selected: selected.spec,
        table,
        candidates,
    })
}

/// Fits for a set of specs; failures are kept per spec instead of aborting.
#[derive(Debug, Clone, Default)]
pub struct CandidateFits {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<(ModelSpec, VarError)>,
}

/// Fit every spec on the same training prefix (parallel, order preserving).
pub fn fit_candidates<F>(returns: &[f64], specs: &[ModelSpec], fitter: &F) -> CandidateFits
where
    F: VolatilityFitter + ?Sized,
{
    let results: Vec<(ModelSpec, Result<FittedModel, VarError>)> = specs
        .par_iter()
        .map(|spec| (*spec, fitter.fit(returns, spec)))
        .collect();

    let mut out = CandidateFits::default();
    for (spec, result) in results {
        match result {
            Ok(fit) => out.candidates.push(Candidate {
                spec,
                fit,
                diagnostics_passed: None,
            }),
            Err(err) => {
                debug!(spec = %spec, error = %err, "candidate fit failed");
                out.failures.push((spec, err));
            }
        }
    }
    out
}
