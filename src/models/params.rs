//! Named parameters for the GARCH family.
//!
//! The optimizer works on a flat `Vec<f64>`; everything else uses
//! [`ModelParams`]. The flat layout is
//!
//! ```text
//! [mu, ar_1..ar_p, ma_1..ma_q, omega, alpha_1..alpha_a, gamma_1..gamma_a, beta_1..beta_b, nu]
//! ```
//!
//! where `gamma` is present only for asymmetric variants and `nu` only for
//! Student-t innovations.

use serde::{Deserialize, Serialize};

use crate::domain::{Distribution, ModelSpec, Variant};
use crate::error::VarError;

/// Student-t degrees of freedom must stay above this for finite variance.
pub const MIN_NU: f64 = 2.0;

/// Mean-equation coefficient sums must stay below this (stationarity/invertibility).
const MAX_ARMA_SUM: f64 = 0.999;

/// Persistence must stay below this for covariance stationarity.
const MAX_PERSISTENCE: f64 = 0.9999;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub mu: f64,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    pub omega: f64,
    pub alpha: Vec<f64>,
    pub gamma: Vec<f64>,
    pub beta: Vec<f64>,
    pub nu: Option<f64>,
}

impl ModelParams {
    /// Split a flat vector according to `spec`.
    pub fn from_slice(spec: &ModelSpec, theta: &[f64]) -> Result<Self, VarError> {
        if theta.len() != spec.param_count() {
            return Err(VarError::InvalidSpec(format!(
                "{}: expected {} parameters, got {}",
                spec.label(),
                spec.param_count(),
                theta.len()
            )));
        }
        let (p, q) = spec.mean_order;
        let (a, b) = spec.variance_order;
        let g = spec.gamma_len();

        let mut rest = theta;
        let mut take = |n: usize| {
            let current: &[f64] = rest;
            let (head, tail) = current.split_at(n);
            rest = tail;
            head.to_vec()
        };
        let mu = take(1)[0];
        let ar = take(p);
        let ma = take(q);
        let omega = take(1)[0];
        let alpha = take(a);
        let gamma = take(g);
        let beta = take(b);
        let nu = match spec.distribution {
            Distribution::Normal => None,
            Distribution::StudentT => Some(take(1)[0]),
        };

        Ok(Self {
            mu,
            ar,
            ma,
            omega,
            alpha,
            gamma,
            beta,
            nu,
        })
    }

    /// Flatten back into the optimizer layout.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(
            3 + self.ar.len() + self.ma.len() + self.alpha.len() + self.gamma.len() + self.beta.len(),
        );
        out.push(self.mu);
        out.extend_from_slice(&self.ar);
        out.extend_from_slice(&self.ma);
        out.push(self.omega);
        out.extend_from_slice(&self.alpha);
        out.extend_from_slice(&self.gamma);
        out.extend_from_slice(&self.beta);
        if let Some(nu) = self.nu {
            out.push(nu);
        }
        out
    }

    /// Parameter names in flat-layout order (for tables and exports).
    pub fn names(spec: &ModelSpec) -> Vec<String> {
        let (p, q) = spec.mean_order;
        let (a, b) = spec.variance_order;
        let mut names = vec!["mu".to_string()];
        names.extend((1..=p).map(|i| format!("ar[{i}]")));
        names.extend((1..=q).map(|i| format!("ma[{i}]")));
        names.push("omega".to_string());
        names.extend((1..=a).map(|i| format!("alpha[{i}]")));
        names.extend((1..=spec.gamma_len()).map(|i| format!("gamma[{i}]")));
        names.extend((1..=b).map(|i| format!("beta[{i}]")));
        if spec.distribution == Distribution::StudentT {
            names.push("nu".to_string());
        }
        names
    }

    /// Variance persistence for the given variant.
    ///
    /// - GARCH: `Σα + Σβ`
    /// - GJR: `Σα + Σγ/2 + Σβ` (symmetric innovations hit the threshold half the time)
    /// - EGARCH: `Σ|β|` (persistence of the log variance)
    pub fn persistence(&self, variant: Variant) -> f64 {
        let sa: f64 = self.alpha.iter().sum();
        let sb: f64 = self.beta.iter().sum();
        match variant {
            Variant::Garch => sa + sb,
            Variant::Gjr => sa + 0.5 * self.gamma.iter().sum::<f64>() + sb,
            Variant::Egarch => self.beta.iter().map(|b| b.abs()).sum(),
        }
    }

    /// Stationarity and positivity constraints intrinsic to `variant`.
    pub fn is_feasible(&self, variant: Variant) -> bool {
        let finite = self.to_vec().iter().all(|v| v.is_finite());
        if !finite {
            return false;
        }
        if self.ar.iter().map(|v| v.abs()).sum::<f64>() >= MAX_ARMA_SUM
            || self.ma.iter().map(|v| v.abs()).sum::<f64>() >= MAX_ARMA_SUM
        {
            return false;
        }
        if let Some(nu) = self.nu {
            if nu <= MIN_NU {
                return false;
            }
        }
        let variance_ok = match variant {
            Variant::Garch => {
                self.omega > 0.0
                    && self.alpha.iter().all(|&a| a >= 0.0)
                    && self.beta.iter().all(|&b| b >= 0.0)
            }
            Variant::Gjr => {
                self.omega > 0.0
                    && self.alpha.iter().all(|&a| a >= 0.0)
                    && self
                        .alpha
                        .iter()
                        .zip(self.gamma.iter())
                        .all(|(&a, &g)| a + g >= 0.0)
                    && self.beta.iter().all(|&b| b >= 0.0)
            }
            Variant::Egarch => true,
        };
        variance_ok && self.persistence(variant) < MAX_PERSISTENCE
    }

    /// Map parameters estimated on `returns / scale` back to the original units.
    ///
    /// ARMA, shock, asymmetry, persistence and shape coefficients are scale free.
    /// The level and the variance intercept are not:
    ///
    /// - `mu -> scale * mu`
    /// - GARCH / GJR: `omega -> scale^2 * omega`
    /// - EGARCH: `omega -> omega + ln(scale^2) * (1 - Σβ)`
    pub fn rescale(&self, variant: Variant, scale: f64) -> Self {
        let mut out = self.clone();
        out.mu = self.mu * scale;
        let s2 = scale * scale;
        out.omega = match variant {
            Variant::Garch | Variant::Gjr => self.omega * s2,
            Variant::Egarch => {
                let sb: f64 = self.beta.iter().sum();
                self.omega + s2.ln() * (1.0 - sb)
            }
        };
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_layout_round_trips_through_named_view() {
        let spec = ModelSpec::new(Variant::Gjr, (1, 1), (1, 1), Distribution::StudentT);
        let theta = vec![0.01, 0.2, -0.1, 0.05, 0.04, 0.08, 0.85, 7.0];
        let p = ModelParams::from_slice(&spec, &theta).unwrap();
        assert_eq!(p.ar, vec![0.2]);
        assert_eq!(p.ma, vec![-0.1]);
        assert_eq!(p.gamma, vec![0.08]);
        assert_eq!(p.nu, Some(7.0));
        assert_eq!(p.to_vec(), theta);
        assert_eq!(ModelParams::names(&spec).len(), theta.len());
    }

    #[test]
    fn wrong_length_is_rejected() {
        let err = ModelParams::from_slice(&ModelSpec::garch11(), &[0.0, 1.0]).unwrap_err();
        assert!(matches!(err, VarError::InvalidSpec(_)));
    }

    #[test]
    fn garch_feasibility() {
        let spec = ModelSpec::garch11();
        let ok = ModelParams::from_slice(&spec, &[0.0, 0.1, 0.05, 0.9]).unwrap();
        assert!(ok.is_feasible(Variant::Garch));

        let explosive = ModelParams::from_slice(&spec, &[0.0, 0.1, 0.2, 0.85]).unwrap();
        assert!(!explosive.is_feasible(Variant::Garch));

        let negative = ModelParams::from_slice(&spec, &[0.0, -0.1, 0.05, 0.9]).unwrap();
        assert!(!negative.is_feasible(Variant::Garch));
    }

    #[test]
    fn gjr_allows_negative_gamma_while_alpha_plus_gamma_is_non_negative() {
        let spec = ModelSpec::new(Variant::Gjr, (0, 0), (1, 1), Distribution::Normal);
        let p = ModelParams::from_slice(&spec, &[0.0, 0.1, 0.1, -0.05, 0.8]).unwrap();
        assert!(p.is_feasible(Variant::Gjr));
        let p = ModelParams::from_slice(&spec, &[0.0, 0.1, 0.1, -0.15, 0.8]).unwrap();
        assert!(!p.is_feasible(Variant::Gjr));
    }

    #[test]
    fn rescale_maps_garch_intercept_by_variance() {
        let spec = ModelSpec::garch11();
        let p = ModelParams::from_slice(&spec, &[0.1, 0.05, 0.1, 0.85]).unwrap();
        let r = p.rescale(Variant::Garch, 0.01);
        assert!((r.mu - 0.001).abs() < 1e-15);
        assert!((r.omega - 0.05e-4).abs() < 1e-15);
        assert_eq!(r.alpha, p.alpha);
        assert_eq!(r.beta, p.beta);
    }
}
