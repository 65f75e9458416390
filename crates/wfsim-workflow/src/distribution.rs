//! Random delay generators.

use std::fmt;

use log::warn;
use rand::distributions::Uniform;
use rand::prelude::Distribution;
use rand_distr::{Exp, Gamma, LogNormal, Normal, Weibull};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Statistical family of a delay distribution with its parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum DistributionFamily {
    Deterministic { value: f64 },
    Uniform { min: f64, max: f64 },
    Exponential { mean: f64 },
    /// Normal distribution truncated at zero.
    Normal { mean: f64, std_dev: f64 },
    LogNormal { mu: f64, sigma: f64 },
    Weibull { scale: f64, shape: f64 },
    Gamma { shape: f64, scale: f64 },
}

impl DistributionFamily {
    /// Constant zero delay.
    pub fn zero() -> Self {
        DistributionFamily::Deterministic { value: 0. }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DistributionFamily::Deterministic { .. } => "deterministic",
            DistributionFamily::Uniform { .. } => "uniform",
            DistributionFamily::Exponential { .. } => "exponential",
            DistributionFamily::Normal { .. } => "normal",
            DistributionFamily::LogNormal { .. } => "lognormal",
            DistributionFamily::Weibull { .. } => "weibull",
            DistributionFamily::Gamma { .. } => "gamma",
        }
    }

    fn params(&self) -> Vec<f64> {
        match *self {
            DistributionFamily::Deterministic { value } => vec![value],
            DistributionFamily::Uniform { min, max } => vec![min, max],
            DistributionFamily::Exponential { mean } => vec![mean],
            DistributionFamily::Normal { mean, std_dev } => vec![mean, std_dev],
            DistributionFamily::LogNormal { mu, sigma } => vec![mu, sigma],
            DistributionFamily::Weibull { scale, shape } => vec![scale, shape],
            DistributionFamily::Gamma { shape, scale } => vec![shape, scale],
        }
    }

    /// Checks that parameters describe a distribution of non-negative values.
    pub fn validate(&self) -> Result<()> {
        if self.params().iter().any(|p| !p.is_finite()) {
            return Err(Error::InvalidParameter(format!("{}: parameters must be finite", self)));
        }
        let valid = match *self {
            DistributionFamily::Deterministic { value } => value >= 0.,
            DistributionFamily::Uniform { min, max } => min >= 0. && min <= max,
            DistributionFamily::Exponential { mean } => mean > 0.,
            DistributionFamily::Normal { std_dev, .. } => std_dev >= 0.,
            DistributionFamily::LogNormal { sigma, .. } => sigma > 0.,
            DistributionFamily::Weibull { scale, shape } => scale > 0. && shape > 0.,
            DistributionFamily::Gamma { shape, scale } => shape > 0. && scale > 0.,
        };
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!("{}: parameters out of range", self)))
        }
    }

    /// Mean of the untruncated distribution.
    pub fn mean(&self) -> f64 {
        match *self {
            DistributionFamily::Deterministic { value } => value,
            DistributionFamily::Uniform { min, max } => (min + max) / 2.,
            DistributionFamily::Exponential { mean } => mean,
            DistributionFamily::Normal { mean, .. } => mean,
            DistributionFamily::LogNormal { mu, sigma } => (mu + sigma * sigma / 2.).exp(),
            DistributionFamily::Weibull { scale, shape } => scale * libm::tgamma(1. + 1. / shape),
            DistributionFamily::Gamma { shape, scale } => shape * scale,
        }
    }
}

impl fmt::Display for DistributionFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let params = self.params().iter().map(|p| p.to_string()).collect::<Vec<_>>();
        write!(f, "{}({})", self.name(), params.join(", "))
    }
}

enum Sampler {
    Constant(f64),
    Uniform(Uniform<f64>),
    Exponential(Exp<f64>),
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Weibull(Weibull<f64>),
    Gamma(Gamma<f64>),
}

impl Sampler {
    fn new(family: &DistributionFamily) -> Result<Self> {
        let invalid = |msg: String| Error::InvalidParameter(format!("{}: {}", family, msg));
        Ok(match *family {
            DistributionFamily::Deterministic { value } => Sampler::Constant(value),
            DistributionFamily::Uniform { min, max } => Sampler::Uniform(Uniform::new_inclusive(min, max)),
            DistributionFamily::Exponential { mean } => {
                Sampler::Exponential(Exp::new(1. / mean).map_err(|e| invalid(e.to_string()))?)
            }
            DistributionFamily::Normal { mean, std_dev } => {
                Sampler::Normal(Normal::new(mean, std_dev).map_err(|e| invalid(e.to_string()))?)
            }
            DistributionFamily::LogNormal { mu, sigma } => {
                Sampler::LogNormal(LogNormal::new(mu, sigma).map_err(|e| invalid(e.to_string()))?)
            }
            DistributionFamily::Weibull { scale, shape } => {
                Sampler::Weibull(Weibull::new(scale, shape).map_err(|e| invalid(e.to_string()))?)
            }
            DistributionFamily::Gamma { shape, scale } => {
                Sampler::Gamma(Gamma::new(shape, scale).map_err(|e| invalid(e.to_string()))?)
            }
        })
    }

    fn sample(&self, rng: &mut Pcg64) -> f64 {
        match self {
            Sampler::Constant(value) => *value,
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Normal(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Weibull(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
        }
    }
}

/// Infinite, restartable sequence of non-negative samples from a distribution.
///
/// Each generator owns a PCG stream selected by `(seed, stream)`, so generators built from the same seed but
/// different streams are independent, and [`reset`](Self::reset) replays exactly the same sequence.
pub struct DistributionGenerator {
    family: DistributionFamily,
    sampler: Sampler,
    seed: u64,
    stream: u64,
    rng: Pcg64,
}

impl DistributionGenerator {
    pub fn new(family: DistributionFamily, seed: u64, stream: u64) -> Result<Self> {
        family.validate()?;
        let sampler = Sampler::new(&family)?;
        Ok(Self {
            family,
            sampler,
            seed,
            stream,
            rng: Self::make_rng(seed, stream),
        })
    }

    fn make_rng(seed: u64, stream: u64) -> Pcg64 {
        Pcg64::new(
            (seed as u128) << 64 | 0xcafe_f00d_d15e_a5e5,
            stream as u128,
        )
    }

    pub fn family(&self) -> &DistributionFamily {
        &self.family
    }

    /// Draws the next sample.
    ///
    /// Negative normal samples are truncated to zero. Any other invalid value is logged and replaced by zero.
    pub fn sample(&mut self) -> f64 {
        let value = self.sampler.sample(&mut self.rng);
        if value.is_finite() && value >= 0. {
            return value;
        }
        if matches!(self.family, DistributionFamily::Normal { .. }) && value < 0. {
            return 0.;
        }
        let err = Error::Sampling {
            family: self.family.to_string(),
            value,
        };
        warn!("{}, using 0", err);
        0.
    }

    /// Restarts the sequence from the beginning.
    pub fn reset(&mut self) {
        self.rng = Self::make_rng(self.seed, self.stream);
    }
}

impl Iterator for DistributionGenerator {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        Some(self.sample())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_parameters_are_rejected() {
        let invalid = [
            DistributionFamily::Deterministic { value: -1. },
            DistributionFamily::Uniform { min: 2., max: 1. },
            DistributionFamily::Exponential { mean: 0. },
            DistributionFamily::Normal { mean: 1., std_dev: -1. },
            DistributionFamily::LogNormal { mu: 0., sigma: 0. },
            DistributionFamily::Weibull { scale: 1., shape: 0. },
            DistributionFamily::Weibull { scale: -1., shape: 1. },
            DistributionFamily::Gamma { shape: 0., scale: 1. },
            DistributionFamily::Gamma { shape: 1., scale: f64::NAN },
        ];
        for family in invalid {
            assert!(matches!(
                DistributionGenerator::new(family, 1, 0),
                Err(Error::InvalidParameter(_))
            ));
        }
    }

    #[test]
    fn same_seed_and_stream_reproduce_sequence() {
        let family = DistributionFamily::Weibull { scale: 10., shape: 1. };
        let a: Vec<f64> = DistributionGenerator::new(family.clone(), 7, 3).unwrap().take(20).collect();
        let b: Vec<f64> = DistributionGenerator::new(family.clone(), 7, 3).unwrap().take(20).collect();
        let c: Vec<f64> = DistributionGenerator::new(family, 7, 4).unwrap().take(20).collect();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut gen = DistributionGenerator::new(DistributionFamily::Exponential { mean: 2. }, 1, 1).unwrap();
        let first: Vec<f64> = gen.by_ref().take(5).collect();
        gen.reset();
        let second: Vec<f64> = gen.take(5).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn samples_are_non_negative() {
        let families = [
            DistributionFamily::Uniform { min: 0., max: 5. },
            DistributionFamily::Exponential { mean: 1. },
            DistributionFamily::Normal { mean: 0., std_dev: 3. },
            DistributionFamily::LogNormal { mu: 0., sigma: 1. },
            DistributionFamily::Weibull { scale: 1., shape: 0.5 },
            DistributionFamily::Gamma { shape: 2., scale: 2. },
        ];
        for family in families {
            let gen = DistributionGenerator::new(family, 42, 0).unwrap();
            assert!(gen.take(1000).all(|x| x >= 0. && x.is_finite()));
        }
    }

    #[test]
    fn weibull_mean() {
        let mean = DistributionFamily::Weibull { scale: 2., shape: 2. }.mean();
        assert!((mean - std::f64::consts::PI.sqrt()).abs() < 1e-12);
        assert!((DistributionFamily::Weibull { scale: 3., shape: 0.5 }.mean() - 6.).abs() < 1e-12);
    }

    #[test]
    fn sample_mean_is_close_to_analytic_mean() {
        let families = [
            DistributionFamily::Deterministic { value: 3. },
            DistributionFamily::Uniform { min: 1., max: 3. },
            DistributionFamily::Exponential { mean: 2. },
            DistributionFamily::Weibull { scale: 10., shape: 1. },
            DistributionFamily::Weibull { scale: 4., shape: 2.5 },
            DistributionFamily::Gamma { shape: 2., scale: 1.5 },
        ];
        for family in families {
            let expected = family.mean();
            let n = 20000;
            let mean = DistributionGenerator::new(family, 5, 0).unwrap().take(n).sum::<f64>() / n as f64;
            assert!((mean - expected).abs() < expected * 0.05, "{} vs {}", mean, expected);
        }
    }
}
