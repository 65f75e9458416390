//! Stochastic overheads injected at the stages of job processing.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::distribution::{DistributionFamily, DistributionGenerator};
use crate::error::{Error, Result};

/// Pipeline point where a delay is applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayClass {
    /// Between dependency satisfaction and job formation.
    Clustering,
    /// Between the job becoming ready and its submission to a VM.
    Queue,
    /// Between the end of execution and job completion.
    PostScript,
    /// Engine-side dispatch latency.
    Engine,
}

impl DelayClass {
    fn index(&self) -> u64 {
        match self {
            DelayClass::Clustering => 0,
            DelayClass::Queue => 1,
            DelayClass::PostScript => 2,
            DelayClass::Engine => 3,
        }
    }
}

/// Delay distributions of one class keyed by job depth.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayTable {
    pub per_level: BTreeMap<usize, DistributionFamily>,
    /// Used for depths without their own entry. No delay if unset.
    pub default: Option<DistributionFamily>,
}

impl DelayTable {
    pub fn constant(family: DistributionFamily) -> Self {
        Self {
            per_level: BTreeMap::new(),
            default: Some(family),
        }
    }

    /// Same distribution for depths `0..levels`, as experiment drivers usually configure it.
    pub fn for_levels(levels: usize, family: DistributionFamily) -> Self {
        Self {
            per_level: (0..levels).map(|l| (l, family.clone())).collect(),
            default: None,
        }
    }

    pub fn lookup(&self, depth: usize) -> Option<&DistributionFamily> {
        self.per_level.get(&depth).or(self.default.as_ref())
    }

    fn validate(&self, class: &str) -> Result<()> {
        for family in self.per_level.values().chain(self.default.iter()) {
            family
                .validate()
                .map_err(|e| Error::InvalidParameter(format!("{} delay: {}", class, e)))?;
        }
        Ok(())
    }
}

/// Overhead configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverheadParameters {
    /// Scheduling interval of the engine. Zero means scheduling on every change of the ready set.
    pub interval: f64,
    pub clustering_delay: DelayTable,
    pub queue_delay: DelayTable,
    pub post_delay: DelayTable,
    pub engine_delay: DelayTable,
}

impl OverheadParameters {
    pub fn table(&self, class: DelayClass) -> &DelayTable {
        match class {
            DelayClass::Clustering => &self.clustering_delay,
            DelayClass::Queue => &self.queue_delay,
            DelayClass::PostScript => &self.post_delay,
            DelayClass::Engine => &self.engine_delay,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.interval.is_finite() || self.interval < 0. {
            return Err(Error::InvalidParameter(format!(
                "scheduling interval must be a non-negative number, got {}",
                self.interval
            )));
        }
        self.clustering_delay.validate("clustering")?;
        self.queue_delay.validate("queue")?;
        self.post_delay.validate("post-script")?;
        self.engine_delay.validate("engine")?;
        Ok(())
    }
}

/// Samples job delays.
///
/// Every (class, depth) pair gets its own generator on a separate stream of the run seed, so the delays of one
/// class do not depend on how many samples were drawn for another.
pub struct OverheadInjector {
    params: OverheadParameters,
    seed: u64,
    generators: HashMap<(DelayClass, usize), Option<DistributionGenerator>>,
}

impl OverheadInjector {
    pub fn new(params: OverheadParameters, seed: u64) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            seed,
            generators: HashMap::new(),
        })
    }

    pub fn params(&self) -> &OverheadParameters {
        &self.params
    }

    pub fn interval(&self) -> f64 {
        self.params.interval
    }

    /// Draws a delay of the given class for a job at the given depth.
    pub fn sample(&mut self, class: DelayClass, depth: usize) -> f64 {
        let params = &self.params;
        let seed = self.seed;
        let generator = self.generators.entry((class, depth)).or_insert_with(|| {
            let stream = (class.index() << 32) | depth as u64;
            params
                .table(class)
                .lookup(depth)
                .and_then(|family| DistributionGenerator::new(family.clone(), seed, stream).ok())
        });
        generator.as_mut().map_or(0., |g| g.sample())
    }

    pub fn clustering_delay(&mut self, depth: usize) -> f64 {
        self.sample(DelayClass::Clustering, depth)
    }

    pub fn queue_delay(&mut self, depth: usize) -> f64 {
        self.sample(DelayClass::Queue, depth)
    }

    pub fn post_delay(&mut self, depth: usize) -> f64 {
        self.sample(DelayClass::PostScript, depth)
    }

    pub fn engine_delay(&mut self, depth: usize) -> f64 {
        self.sample(DelayClass::Engine, depth)
    }

    /// Restarts all delay sequences.
    pub fn reset(&mut self) {
        for generator in self.generators.values_mut().flatten() {
            generator.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_entry_overrides_default() {
        let mut params = OverheadParameters::default();
        params.queue_delay = DelayTable::constant(DistributionFamily::Deterministic { value: 1. });
        params
            .queue_delay
            .per_level
            .insert(2, DistributionFamily::Deterministic { value: 5. });
        let mut injector = OverheadInjector::new(params, 1).unwrap();
        assert_eq!(injector.queue_delay(0), 1.);
        assert_eq!(injector.queue_delay(2), 5.);
        assert_eq!(injector.post_delay(2), 0.);
    }

    #[test]
    fn classes_use_independent_streams() {
        let family = DistributionFamily::Exponential { mean: 3. };
        let mut params = OverheadParameters::default();
        params.queue_delay = DelayTable::constant(family.clone());
        params.engine_delay = DelayTable::constant(family);
        let mut a = OverheadInjector::new(params.clone(), 9).unwrap();
        let mut b = OverheadInjector::new(params, 9).unwrap();
        let queue_a: Vec<f64> = (0..5).map(|_| a.queue_delay(1)).collect();
        for _ in 0..7 {
            b.engine_delay(1);
        }
        let queue_b: Vec<f64> = (0..5).map(|_| b.queue_delay(1)).collect();
        assert_eq!(queue_a, queue_b);
        a.reset();
        assert_eq!(a.queue_delay(1), queue_a[0]);
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let mut params = OverheadParameters::default();
        params.interval = -1.;
        assert!(matches!(OverheadInjector::new(params, 1), Err(Error::InvalidParameter(_))));

        let mut params = OverheadParameters::default();
        params.post_delay = DelayTable::for_levels(3, DistributionFamily::Weibull { scale: 0., shape: 1. });
        assert!(matches!(OverheadInjector::new(params, 1), Err(Error::InvalidParameter(_))));
    }
}
