//! Job-to-VM scheduling policy interface.

use serde::Serialize;

/// Job whose dependencies are satisfied and which waits for a VM.
#[derive(Clone, Debug, Serialize)]
pub struct ReadyJob {
    pub id: usize,
    pub length: f64,
    pub pes: u32,
    pub depth: usize,
    /// Queue delay the job will spend before reaching the VM.
    pub queue_delay: f64,
}

/// State of a VM as seen by the scheduler at a tick.
#[derive(Clone, Debug, Serialize)]
pub struct VmSnapshot {
    pub id: u32,
    pub mips: f64,
    pub pes: u32,
    /// Earliest time the VM is expected to be free, never earlier than the tick time.
    pub available_at: f64,
}

impl VmSnapshot {
    /// Returns `false` if the VM will never be able to run the job.
    pub fn can_serve(&self, job: &ReadyJob) -> bool {
        self.mips > 0. && self.pes > 0 && self.pes >= job.pes
    }

    /// Processing rate the job gets on this VM.
    pub fn rate(&self, job: &ReadyJob) -> f64 {
        self.mips * job.pes.min(self.pes) as f64
    }
}

/// Decision to run a job on a VM.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assignment {
    pub job: usize,
    pub vm: u32,
    pub estimated_finish: f64,
}

/// Estimated completion time of the job on the VM scheduled at `now`.
///
/// The job reaches the VM after its queue delay and starts once the VM is free, so the queue delay only counts
/// where it extends past the VM availability. On an idle VM this is `now + queue delay + execution time`.
/// Returns `None` if the VM can not serve the job.
pub fn estimate_completion(job: &ReadyJob, vm: &VmSnapshot, now: f64) -> Option<f64> {
    if !vm.can_serve(job) {
        return None;
    }
    Some(vm.available_at.max(now + job.queue_delay) + job.length / vm.rate(job))
}

/// Scheduling heuristic.
///
/// Called at every scheduling tick with the ready jobs (in increasing id order) and the VM snapshot. Returns the
/// assignments for this tick in the order they were decided. Jobs left unassigned stay in the ready set.
pub trait Scheduler {
    fn name(&self) -> &str;

    fn select(&mut self, ready: &[ReadyJob], vms: &[VmSnapshot], now: f64) -> Vec<Assignment>;
}

/// Picks the best VM for the job: minimal estimated completion, ties broken by lower VM id.
pub(crate) fn best_vm(job: &ReadyJob, vms: &[VmSnapshot], now: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, vm) in vms.iter().enumerate() {
        if let Some(finish) = estimate_completion(job, vm, now) {
            let better = match best {
                None => true,
                Some((best_idx, best_finish)) => {
                    finish < best_finish || (finish == best_finish && vm.id < vms[best_idx].id)
                }
            };
            if better {
                best = Some((idx, finish));
            }
        }
    }
    best
}
