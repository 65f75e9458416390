//! Virtual machines.

use serde::{Deserialize, Serialize};

use crate::allocation::AllocationVerdict;

/// Policy for sharing VM PEs between cloudlets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudletScheduler {
    /// Cloudlets hold PEs exclusively, the rest wait in FIFO order.
    SpaceShared,
    /// All cloudlets run at once and share the VM throughput equally.
    TimeShared,
}

impl Default for CloudletScheduler {
    fn default() -> Self {
        CloudletScheduler::SpaceShared
    }
}

/// Requested VM properties.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VmSpec {
    /// Owner (broker) of the VM.
    #[serde(default)]
    pub user_id: u32,
    /// Speed of a single PE in MIPS.
    pub mips: f64,
    pub pes: u32,
    /// Memory in MB.
    pub ram: u64,
    pub bw: u64,
    /// Image size in MB.
    pub size: u64,
    #[serde(default = "default_vmm")]
    pub vmm: String,
    #[serde(default)]
    pub cloudlet_scheduler: CloudletScheduler,
}

fn default_vmm() -> String {
    "Xen".to_string()
}

impl VmSpec {
    /// Rate at which a cloudlet occupying `pes` PEs is processed on an idle VM.
    pub fn rate(&self, pes: u32) -> f64 {
        self.mips * pes.min(self.pes) as f64
    }

    /// VM with no compute capacity can not run anything.
    pub fn has_capacity(&self) -> bool {
        self.mips > 0. && self.pes > 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub enum VmStatus {
    Created,
    FailedToAllocate(AllocationVerdict),
    Destroyed,
}

/// VM known to the datacenter.
#[derive(Clone, Debug, Serialize)]
pub struct Vm {
    pub id: u32,
    pub spec: VmSpec,
    /// Host the VM is placed on.
    pub host: Option<u32>,
    pub status: VmStatus,
}

impl Vm {
    pub fn is_running(&self) -> bool {
        self.status == VmStatus::Created
    }
}
