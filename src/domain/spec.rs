//! Model specifications.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::VarError;

/// Largest lag accepted for any mean or variance order.
pub const MAX_ORDER: usize = 5;

/// Observations required per estimated coefficient (plus one for the level).
pub const OBS_PER_PARAM: usize = 10;

/// Volatility model family.
///
/// The set is closed; each variant owns its variance recursion in
/// `models::recursion`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Plain GARCH: shocks enter the variance symmetrically.
    Garch,
    /// Exponential GARCH on the log variance (Nelson).
    Egarch,
    /// Threshold GARCH (Glosten-Jagannathan-Runkle): negative shocks add `gamma`.
    Gjr,
}

impl Variant {
    pub fn display_name(self) -> &'static str {
        match self {
            Variant::Garch => "GARCH",
            Variant::Egarch => "EGARCH",
            Variant::Gjr => "GJR-GARCH",
        }
    }

    /// Whether the variant carries one asymmetry coefficient per shock lag.
    pub fn is_asymmetric(self) -> bool {
        matches!(self, Variant::Egarch | Variant::Gjr)
    }
}

/// Innovation distribution used by the likelihood.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    Normal,
    /// Student-t standardized to unit variance.
    #[value(name = "t")]
    #[serde(rename = "t")]
    StudentT,
}

impl Distribution {
    pub fn short_name(self) -> &'static str {
        match self {
            Distribution::Normal => "N",
            Distribution::StudentT => "t",
        }
    }

    /// Extra shape parameters estimated alongside the model.
    pub fn shape_len(self) -> usize {
        match self {
            Distribution::Normal => 0,
            Distribution::StudentT => 1,
        }
    }
}

/// A candidate model: variant, ARMA mean orders, variance orders and distribution.
///
/// `mean_order = (p, q)` are the AR / MA orders; `variance_order = (a, b)` are the
/// shock (ARCH) and persistence (GARCH) orders. Ordering is derived field by field
/// so collections of specs iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelSpec {
    pub variant: Variant,
    pub mean_order: (usize, usize),
    pub variance_order: (usize, usize),
    pub distribution: Distribution,
}

impl ModelSpec {
    pub fn new(
        variant: Variant,
        mean_order: (usize, usize),
        variance_order: (usize, usize),
        distribution: Distribution,
    ) -> Self {
        Self {
            variant,
            mean_order,
            variance_order,
            distribution,
        }
    }

    /// Zero-mean-order GARCH(1,1) with normal innovations.
    pub fn garch11() -> Self {
        Self::new(Variant::Garch, (0, 0), (1, 1), Distribution::Normal)
    }

    /// Number of asymmetry coefficients (`gamma`) for this spec.
    pub fn gamma_len(&self) -> usize {
        if self.variant.is_asymmetric() {
            self.variance_order.0
        } else {
            0
        }
    }

    /// Total number of estimated parameters.
    ///
    /// Layout: `mu, ar[p], ma[q], omega, alpha[a], gamma[a or 0], beta[b], shape`.
    pub fn param_count(&self) -> usize {
        let (p, q) = self.mean_order;
        let (a, b) = self.variance_order;
        1 + p + q + 1 + a + self.gamma_len() + b + self.distribution.shape_len()
    }

    /// Minimum prefix length accepted by the fitter.
    pub fn minimum_observations(&self) -> usize {
        let (p, q) = self.mean_order;
        let (a, b) = self.variance_order;
        OBS_PER_PARAM * (p + q + a + b + 1)
    }

    /// Structural checks only; never touches data.
    pub fn validate(&self) -> Result<(), VarError> {
        let (p, q) = self.mean_order;
        let (a, b) = self.variance_order;
        if [p, q, a, b].iter().any(|&o| o > MAX_ORDER) {
            return Err(VarError::InvalidSpec(format!(
                "{}: orders must not exceed {MAX_ORDER}",
                self.label()
            )));
        }
        if self.variant.is_asymmetric() && a == 0 {
            return Err(VarError::InvalidSpec(format!(
                "{}: asymmetric variants need at least one shock term",
                self.label()
            )));
        }
        Ok(())
    }

    /// Compact label, e.g. `GARCH(1,1) ARMA(0,0) N`.
    pub fn label(&self) -> String {
        format!(
            "{}({},{}) ARMA({},{}) {}",
            self.variant.display_name(),
            self.variance_order.0,
            self.variance_order.1,
            self.mean_order.0,
            self.mean_order.1,
            self.distribution.short_name()
        )
    }
}

impl std::fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn param_count_follows_layout() {
        assert_eq!(ModelSpec::garch11().param_count(), 4);

        let gjr = ModelSpec::new(Variant::Gjr, (1, 0), (1, 1), Distribution::StudentT);
        // mu, ar1, omega, alpha1, gamma1, beta1, nu
        assert_eq!(gjr.param_count(), 7);

        let egarch = ModelSpec::new(Variant::Egarch, (1, 1), (2, 1), Distribution::Normal);
        // mu, ar1, ma1, omega, alpha1..2, gamma1..2, beta1
        assert_eq!(egarch.param_count(), 9);
    }

    #[test]
    fn minimum_observations_scales_with_orders() {
        assert_eq!(ModelSpec::garch11().minimum_observations(), 30);
        let spec = ModelSpec::new(Variant::Garch, (1, 1), (1, 1), Distribution::Normal);
        assert_eq!(spec.minimum_observations(), 50);
    }

    #[test]
    fn validate_rejects_malformed_specs() {
        let too_deep = ModelSpec::new(Variant::Garch, (0, 0), (MAX_ORDER + 1, 1), Distribution::Normal);
        assert!(matches!(too_deep.validate(), Err(VarError::InvalidSpec(_))));

        let no_shock = ModelSpec::new(Variant::Gjr, (0, 0), (0, 1), Distribution::Normal);
        assert!(matches!(no_shock.validate(), Err(VarError::InvalidSpec(_))));

        let constant = ModelSpec::new(Variant::Garch, (0, 0), (0, 0), Distribution::Normal);
        assert!(constant.validate().is_ok());
    }

    #[test]
    fn ordering_is_stable() {
        let mut specs = vec![
            ModelSpec::new(Variant::Gjr, (0, 0), (1, 1), Distribution::Normal),
            ModelSpec::new(Variant::Garch, (1, 0), (1, 1), Distribution::Normal),
            ModelSpec::garch11(),
        ];
        specs.sort();
        assert_eq!(specs[0], ModelSpec::garch11());
        assert_eq!(specs[2].variant, Variant::Gjr);
    }

    #[test]
    fn label_is_compact() {
        assert_eq!(ModelSpec::garch11().label(), "GARCH(1,1) ARMA(0,0) N");
    }
}
