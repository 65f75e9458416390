use std::fs::File;
use std::io::Write;

use serde::Serialize;

use crate::error::Result;
use crate::job::Job;

/// VM description recorded at the start of a run.
#[derive(Serialize, Clone, Debug)]
pub struct VmRecord {
    pub id: u32,
    pub mips: f64,
    pub pes: u32,
}

/// Job graph recorded at the start of a run.
#[derive(Serialize, Clone, Debug)]
pub struct JobRecord {
    pub id: usize,
    pub tasks: Vec<usize>,
    pub depth: usize,
    pub length: f64,
    pub parents: Vec<usize>,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEvent {
    JobReleased { time: f64, job: usize },
    JobQueued { time: f64, job: usize, queue_delay: f64 },
    JobAssigned { time: f64, job: usize, vm: u32, estimated_finish: f64 },
    JobStarted { time: f64, job: usize, vm: u32, host: u32 },
    JobFinished { time: f64, job: usize, vm: u32, cost: f64 },
    JobFailed { time: f64, job: usize, reason: String },
}

impl TraceEvent {
    pub fn time(&self) -> f64 {
        match self {
            TraceEvent::JobReleased { time, .. }
            | TraceEvent::JobQueued { time, .. }
            | TraceEvent::JobAssigned { time, .. }
            | TraceEvent::JobStarted { time, .. }
            | TraceEvent::JobFinished { time, .. }
            | TraceEvent::JobFailed { time, .. } => *time,
        }
    }
}

/// Record of everything that happened to jobs during a run, can be saved as JSON.
#[derive(Serialize, Clone, Debug, Default)]
pub struct TraceLog {
    pub vms: Vec<VmRecord>,
    pub jobs: Vec<JobRecord>,
    pub events: Vec<TraceEvent>,
}

impl TraceLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_event(&mut self, event: TraceEvent) {
        self.events.push(event);
    }

    pub fn log_jobs(&mut self, jobs: &[Job]) {
        self.jobs = jobs
            .iter()
            .map(|job| JobRecord {
                id: job.id,
                tasks: job.task_ids.clone(),
                depth: job.depth,
                length: job.length,
                parents: job.parents.iter().copied().collect(),
            })
            .collect();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, filename: &str) -> Result<()> {
        let mut file = File::create(filename)?;
        file.write_all(self.to_json()?.as_bytes())?;
        Ok(())
    }
}
