use std::collections::BTreeMap;
use std::str::FromStr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scheduler::Scheduler;
use crate::schedulers::{FcfsScheduler, MaxMinScheduler, MctScheduler, MinMinScheduler, RoundRobinScheduler};

/// Scheduler name with optional parameters, written as `Name` or `Name[key=value,...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerParams {
    name: String,
    params: BTreeMap<String, String>,
}

impl SchedulerParams {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get<T: FromStr, K: AsRef<str>>(&self, name: K) -> Option<T> {
        self.params.get(name.as_ref()).and_then(|s| s.parse().ok())
    }
}

impl FromStr for SchedulerParams {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidParameter(format!("malformed scheduler string `{}`", s));
        let Some(open) = s.find('[') else {
            return Ok(Self::new(s.trim()));
        };
        if !s.ends_with(']') {
            return Err(invalid());
        }
        let mut params = BTreeMap::new();
        for param in s[open + 1..s.len() - 1].split(',').filter(|p| !p.is_empty()) {
            let pos = param.find('=').ok_or_else(invalid)?;
            params.insert(param[..pos].trim().to_string(), param[pos + 1..].trim().to_string());
        }
        Ok(Self {
            name: s[..open].trim().to_string(),
            params,
        })
    }
}

impl std::fmt::Display for SchedulerParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(
                f,
                "{}[{}]",
                self.name,
                self.params.iter().map(|(k, v)| format!("{k}={v}")).join(",")
            )
        }
    }
}

/// Built-in scheduling heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SchedulingAlgorithm {
    #[default]
    MinMin,
    MaxMin,
    Mct,
    Fcfs,
    RoundRobin,
}

impl SchedulingAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::MinMin => "MinMin",
            Self::MaxMin => "MaxMin",
            Self::Mct => "Mct",
            Self::Fcfs => "Fcfs",
            Self::RoundRobin => "RoundRobin",
        }
    }
}

impl FromStr for SchedulingAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let params: SchedulerParams = s.parse()?;
        let normalized = params.name().to_lowercase().replace(['_', '-'], "");
        match normalized.as_str() {
            "minmin" => Ok(Self::MinMin),
            "maxmin" => Ok(Self::MaxMin),
            "mct" => Ok(Self::Mct),
            "fcfs" => Ok(Self::Fcfs),
            "roundrobin" => Ok(Self::RoundRobin),
            _ => Err(Error::InvalidParameter(format!("unknown scheduler `{}`", params.name()))),
        }
    }
}

impl std::fmt::Display for SchedulingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn scheduler_resolver(algorithm: SchedulingAlgorithm) -> Box<dyn Scheduler> {
    match algorithm {
        SchedulingAlgorithm::MinMin => Box::new(MinMinScheduler::new()),
        SchedulingAlgorithm::MaxMin => Box::new(MaxMinScheduler::new()),
        SchedulingAlgorithm::Mct => Box::new(MctScheduler::new()),
        SchedulingAlgorithm::Fcfs => Box::new(FcfsScheduler::new()),
        SchedulingAlgorithm::RoundRobin => Box::new(RoundRobinScheduler::new()),
    }
}

/// Resolves a scheduler from its string form, returns `None` for unknown names.
pub fn default_scheduler_resolver(params: &SchedulerParams) -> Option<Box<dyn Scheduler>> {
    params
        .name()
        .parse::<SchedulingAlgorithm>()
        .ok()
        .map(scheduler_resolver)
}
