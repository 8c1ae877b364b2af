//! Synthetic return series from known GARCH-family processes.
//!
//! The simulator runs the same recursions the fitter estimates, forward in
//! time, with seeded innovations. Output is reproducible for a given seed.

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution as _, Normal, StudentT};

use crate::domain::{Distribution, ModelSpec, ReturnSeries, Variant};
use crate::error::VarError;
use crate::models::{ModelParams, expected_abs};

/// Observations discarded before the returned sample starts.
pub const DEFAULT_BURN_IN: usize = 500;

/// Default first date of synthetic series.
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 3).unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub spec: ModelSpec,
    pub params: ModelParams,
    pub n: usize,
    pub burn_in: usize,
    pub seed: u64,
    pub start: NaiveDate,
}

impl SimulationConfig {
    /// GARCH(1,1) with daily returns in percent: unconditional variance 1.
    pub fn garch11(n: usize, seed: u64) -> Self {
        Self {
            spec: ModelSpec::garch11(),
            params: ModelParams {
                mu: 0.0,
                ar: Vec::new(),
                ma: Vec::new(),
                omega: 0.02,
                alpha: vec![0.08],
                gamma: Vec::new(),
                beta: vec![0.9],
                nu: None,
            },
            n,
            burn_in: DEFAULT_BURN_IN,
            seed,
            start: default_start_date(),
        }
    }
}

/// Standardized innovation sampler (unit variance).
enum Innovation {
    Normal(Normal<f64>),
    StudentT(StudentT<f64>, f64),
}

impl Innovation {
    fn new(distribution: Distribution, nu: Option<f64>) -> Result<Self, VarError> {
        match (distribution, nu) {
            (Distribution::Normal, _) => Normal::new(0.0, 1.0)
                .map(Innovation::Normal)
                .map_err(|e| VarError::InvalidSpec(format!("normal innovations: {e}"))),
            (Distribution::StudentT, Some(nu)) if nu > 2.0 => StudentT::new(nu)
                .map(|t| Innovation::StudentT(t, ((nu - 2.0) / nu).sqrt()))
                .map_err(|e| VarError::InvalidSpec(format!("student-t innovations: {e}"))),
            (Distribution::StudentT, nu) => Err(VarError::InvalidSpec(format!(
                "student-t innovations need nu > 2, got {nu:?}"
            ))),
        }
    }

    fn draw(&self, rng: &mut StdRng) -> f64 {
        match self {
            Innovation::Normal(d) => d.sample(rng),
            Innovation::StudentT(d, scale) => scale * d.sample(rng),
        }
    }
}

/// Simulate `cfg.n` returns after a burn-in.
pub fn simulate(cfg: &SimulationConfig) -> Result<ReturnSeries, VarError> {
    let spec = &cfg.spec;
    let p = &cfg.params;
    spec.validate()?;
    if p.to_vec().len() != spec.param_count() {
        return Err(VarError::InvalidSpec(format!(
            "{}: parameters do not match the spec layout",
            spec.label()
        )));
    }
    if !p.is_feasible(spec.variant) {
        return Err(VarError::InvalidSpec(format!(
            "{}: parameters are not stationary",
            spec.label()
        )));
    }

    let innovation = Innovation::new(spec.distribution, p.nu)?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let abs_mean = expected_abs(spec.distribution, p.nu);
    let sb: f64 = p.beta.iter().sum();

    // Pre-sample state at the unconditional level.
    let (init_s2, init_ln_s2) = match spec.variant {
        Variant::Garch | Variant::Gjr => {
            let s2 = p.omega / (1.0 - p.persistence(spec.variant));
            (s2, s2.ln())
        }
        Variant::Egarch => {
            let ln_s2 = p.omega / (1.0 - sb);
            (ln_s2.exp(), ln_s2)
        }
    };

    let total = cfg.burn_in + cfg.n;
    let mut r = Vec::with_capacity(total);
    let mut e: Vec<f64> = Vec::with_capacity(total);
    let mut z: Vec<f64> = Vec::with_capacity(total);
    let mut s2: Vec<f64> = Vec::with_capacity(total);

    for t in 0..total {
        let lag = |v: &[f64], k: usize, default: f64| if t > k { v[t - 1 - k] } else { default };

        let variance = match spec.variant {
            Variant::Garch | Variant::Gjr => {
                let mut v = p.omega;
                for (i, a) in p.alpha.iter().enumerate() {
                    let ei = lag(&e, i, 0.0);
                    v += a * if t > i { ei * ei } else { init_s2 };
                }
                for (i, g) in p.gamma.iter().enumerate() {
                    let ei = lag(&e, i, 0.0);
                    v += g * if t > i {
                        if ei < 0.0 { ei * ei } else { 0.0 }
                    } else {
                        0.5 * init_s2
                    };
                }
                for (j, b) in p.beta.iter().enumerate() {
                    v += b * lag(&s2, j, init_s2);
                }
                v
            }
            Variant::Egarch => {
                let mut v = p.omega;
                for (i, a) in p.alpha.iter().enumerate() {
                    if t > i {
                        v += a * (z[t - 1 - i].abs() - abs_mean);
                    }
                }
                for (i, g) in p.gamma.iter().enumerate() {
                    v += g * lag(&z, i, 0.0);
                }
                for (j, b) in p.beta.iter().enumerate() {
                    let ln_lag = if t > j { s2[t - 1 - j].ln() } else { init_ln_s2 };
                    v += b * ln_lag;
                }
                v.exp()
            }
        };
        if !(variance.is_finite() && variance > 0.0) {
            return Err(VarError::DegenerateInput(format!(
                "simulated variance left the positive range at step {t}"
            )));
        }

        let zt = innovation.draw(&mut rng);
        let et = variance.sqrt() * zt;
        let mut rt = p.mu + et;
        for (i, phi) in p.ar.iter().enumerate() {
            rt += phi * (lag(&r, i, p.mu) - p.mu);
        }
        for (j, theta) in p.ma.iter().enumerate() {
            rt += theta * lag(&e, j, 0.0);
        }

        s2.push(variance);
        z.push(zt);
        e.push(et);
        r.push(rt);
    }

    let values = r.split_off(cfg.burn_in);
    ReturnSeries::from_values(cfg.start, values)
}

/// Gaussian white noise with standard deviation `sigma`.
pub fn white_noise(n: usize, sigma: f64, seed: u64) -> Result<ReturnSeries, VarError> {
    let normal = Normal::new(0.0, sigma)
        .map_err(|e| VarError::InvalidSpec(format!("white noise sigma {sigma}: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let values = (0..n).map(|_| normal.sample(&mut rng)).collect();
    ReturnSeries::from_values(default_start_date(), values)
}
