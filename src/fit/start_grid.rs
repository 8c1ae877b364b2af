//! Starting-point grids for the likelihood search.
//!
//! Nelder-Mead is local, so we first evaluate the likelihood on a small,
//! deterministic grid of shock / persistence levels and start the simplex from
//! the best grid point. All grids are built for returns scaled to unit variance,
//! so the same grid works for any input units.

use crate::domain::{Distribution, ModelSpec, Variant};
use crate::models::ModelParams;

/// Total shock loadings tried (split evenly over the shock lags).
const SHOCK_LEVELS: [f64; 3] = [0.05, 0.10, 0.20];
/// Total persistence loadings tried (split evenly over the persistence lags).
const PERSISTENCE_LEVELS: [f64; 3] = [0.60, 0.80, 0.90];
/// Grid points above this persistence are dropped.
const MAX_START_PERSISTENCE: f64 = 0.98;
/// Initial Student-t degrees of freedom.
const START_NU: f64 = 8.0;
/// Initial EGARCH asymmetry (leverage) per lag.
const START_EGARCH_GAMMA: f64 = -0.05;

/// Candidate starting points for `spec`, given the mean of the unit-variance data.
///
/// The first point is always the constant-variance start (all dynamics off), so
/// the grid is never empty.
pub fn start_grid(spec: &ModelSpec, mean: f64) -> Vec<ModelParams> {
    let (p, q) = spec.mean_order;
    let (a, b) = spec.variance_order;
    let nu = match spec.distribution {
        Distribution::Normal => None,
        Distribution::StudentT => Some(START_NU),
    };

    let make = |shock: f64, persistence: f64| -> ModelParams {
        let alpha_i = if a > 0 { shock / a as f64 } else { 0.0 };
        let beta_j = if b > 0 { persistence / b as f64 } else { 0.0 };
        let (omega, alpha, gamma) = match spec.variant {
            Variant::Garch => (
                (1.0 - shock - persistence).max(0.01),
                vec![alpha_i; a],
                Vec::new(),
            ),
            Variant::Gjr => (
                // half the shock loading goes to the threshold term
                (1.0 - shock - persistence).max(0.01),
                vec![0.5 * alpha_i; a],
                vec![alpha_i; a],
            ),
            // unit variance => ln σ² ≈ 0 => omega ≈ 0
            Variant::Egarch => (0.0, vec![alpha_i; a], vec![START_EGARCH_GAMMA; a]),
        };
        ModelParams {
            mu: mean,
            ar: vec![0.0; p],
            ma: vec![0.0; q],
            omega,
            alpha,
            gamma,
            beta: vec![beta_j; b],
            nu,
        }
    };

    let mut grid = vec![make(0.0, 0.0)];
    let shocks: &[f64] = if a > 0 { &SHOCK_LEVELS } else { &[0.0] };
    let persistences: &[f64] = if b > 0 { &PERSISTENCE_LEVELS } else { &[0.0] };
    for &shock in shocks {
        for &persistence in persistences {
            if shock == 0.0 && persistence == 0.0 {
                continue;
            }
            if shock + persistence <= MAX_START_PERSISTENCE {
                grid.push(make(shock, persistence));
            }
        }
    }
    grid
}

/// Initial simplex around `x0`: the point itself plus one vertex per coordinate.
///
/// Coordinates with magnitude above `0.05` shrink by 10% toward zero (keeps
/// positivity-constrained terms feasible and lowers persistence); small ones
/// move up by `0.05`.
pub fn initial_simplex(x0: &[f64]) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(x0.len() + 1);
    simplex.push(x0.to_vec());
    for i in 0..x0.len() {
        let mut v = x0.to_vec();
        v[i] = if v[i].abs() > 0.05 { 0.9 * v[i] } else { v[i] + 0.05 };
        simplex.push(v);
    }
    simplex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_points_have_the_spec_layout_and_are_feasible() {
        for spec in [
            ModelSpec::garch11(),
            ModelSpec::new(Variant::Gjr, (1, 0), (1, 1), Distribution::StudentT),
            ModelSpec::new(Variant::Egarch, (0, 1), (2, 1), Distribution::Normal),
            ModelSpec::new(Variant::Garch, (0, 0), (0, 0), Distribution::Normal),
        ] {
            let grid = start_grid(&spec, 0.01);
            assert!(!grid.is_empty());
            for point in &grid {
                assert_eq!(point.to_vec().len(), spec.param_count(), "{spec}");
                assert!(point.is_feasible(spec.variant), "{spec}: {point:?}");
            }
        }
    }

    #[test]
    fn constant_variance_spec_has_single_start() {
        let spec = ModelSpec::new(Variant::Garch, (0, 0), (0, 0), Distribution::Normal);
        assert_eq!(start_grid(&spec, 0.0).len(), 1);
    }

    #[test]
    fn garch_grid_respects_persistence_cap() {
        let grid = start_grid(&ModelSpec::garch11(), 0.0);
        // constant start + 3x3 levels minus (0.10, 0.90), (0.20, 0.80), (0.20, 0.90)
        assert_eq!(grid.len(), 1 + 9 - 3);
        for p in &grid {
            assert!(p.persistence(Variant::Garch) <= MAX_START_PERSISTENCE + 1e-12);
        }
    }

    #[test]
    fn simplex_has_one_vertex_per_dimension() {
        let s = initial_simplex(&[0.0, 0.1, 0.05, 0.9]);
        assert_eq!(s.len(), 5);
        assert!((s[1][0] - 0.05).abs() < 1e-15);
        assert!((s[4][3] - 0.81).abs() < 1e-12);
    }
}
