//! Datacenter events.

use serde::Serialize;

use crate::cloudlet::Cloudlet;

/// Request to run a cloudlet on its VM.
#[derive(Clone, Serialize)]
pub struct CloudletSubmit {
    pub cloudlet: Cloudlet,
}

/// Cloudlet got PEs and started staging its input files.
#[derive(Clone, Serialize)]
pub struct CloudletStarted {
    pub id: u64,
    pub vm_id: u32,
    pub host_id: u32,
}

/// Cloudlet completed successfully.
#[derive(Clone, Serialize)]
pub struct CloudletReturned {
    pub id: u64,
    pub vm_id: u32,
    pub host_id: u32,
    pub exec_start_time: f64,
    pub finish_time: f64,
    /// Time spent computing, excluding stage-in.
    pub cpu_time: f64,
    pub file_transfer_time: f64,
    /// Megabytes staged in.
    pub transferred: f64,
    pub cost: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FailReason {
    /// VM is unknown, was not allocated or has been destroyed.
    VmUnavailable,
    /// VM has no compute capacity or fewer PEs than the cloudlet needs.
    NotEnoughResources,
}

#[derive(Clone, Serialize)]
pub struct CloudletFailed {
    pub id: u64,
    pub vm_id: u32,
    pub reason: FailReason,
}

#[derive(Clone, Serialize)]
pub struct VmDestroyRequest {
    pub vm_id: u32,
}

#[derive(Clone, Serialize)]
pub struct VmDestroyed {
    pub vm_id: u32,
}

#[derive(Clone, Serialize)]
pub(crate) struct StageInFinished {
    pub vm_id: u32,
    pub cloudlet_id: u64,
}

#[derive(Clone, Serialize)]
pub(crate) struct ExecutionFinished {
    pub vm_id: u32,
    pub cloudlet_id: u64,
}
