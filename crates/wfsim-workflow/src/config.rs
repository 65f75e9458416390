//! Simulation configuration, loadable from YAML.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use wfsim_cloud::allocation::VmAllocationPolicyKind;
use wfsim_cloud::{CloudletScheduler, DatacenterCharacteristics, FileSystem, Host, Storage, VmScheduler, VmSpec};

use crate::clustering::ClusteringParameters;
use crate::error::{Error, Result};
use crate::overhead::OverheadParameters;
use crate::scheduler_resolver::SchedulingAlgorithm;

fn default_count() -> u32 {
    1
}

fn default_seed() -> u64 {
    123
}

fn default_vmm() -> String {
    "Xen".to_string()
}

/// Group of identical hosts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_count")]
    pub count: u32,
    pub pes: u32,
    /// Speed of a single PE in MIPS.
    pub pe_mips: f64,
    /// Memory in MB.
    pub ram: u64,
    pub bw: u64,
    /// Disk size in MB.
    pub storage: u64,
    #[serde(default)]
    pub vm_scheduler: VmScheduler,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            count: 1,
            pes: 2,
            pe_mips: 2000.,
            ram: 2048,
            bw: 10000,
            storage: 1000000,
            vm_scheduler: VmScheduler::TimeShared,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub name: String,
    /// Capacity in MB.
    pub capacity: f64,
    /// Maximum transfer rate in MB/s.
    pub max_transfer_rate: f64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            name: "san".to_string(),
            capacity: 1e12,
            max_transfer_rate: 15.,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatacenterConfig {
    pub hosts: Vec<HostConfig>,
    pub characteristics: DatacenterCharacteristics,
    pub storage: StorageConfig,
    pub vm_allocation: VmAllocationPolicyKind,
}

impl Default for DatacenterConfig {
    fn default() -> Self {
        Self {
            hosts: vec![HostConfig {
                count: 20,
                ..Default::default()
            }],
            characteristics: DatacenterCharacteristics::default(),
            storage: StorageConfig::default(),
            vm_allocation: VmAllocationPolicyKind::default(),
        }
    }
}

impl DatacenterConfig {
    pub fn host_count(&self) -> u32 {
        self.hosts.iter().map(|h| h.count).sum()
    }

    /// Expands host groups into hosts with sequential ids.
    pub fn build_hosts(&self) -> Vec<Host> {
        self.hosts
            .iter()
            .flat_map(|h| std::iter::repeat(h).take(h.count as usize))
            .enumerate()
            .map(|(id, h)| Host::new(id as u32, h.pes, h.pe_mips, h.ram, h.bw, h.storage, h.vm_scheduler))
            .collect()
    }

    pub fn build_storage(&self) -> Storage {
        Storage::new(&self.storage.name, self.storage.capacity, self.storage.max_transfer_rate)
    }
}

/// Group of identical VMs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VmConfig {
    #[serde(default = "default_count")]
    pub count: u32,
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

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            count: 1,
            mips: 1000.,
            pes: 1,
            ram: 512,
            bw: 1000,
            size: 10000,
            vmm: default_vmm(),
            cloudlet_scheduler: CloudletScheduler::SpaceShared,
        }
    }
}

impl VmConfig {
    pub fn spec(&self, user_id: u32) -> VmSpec {
        VmSpec {
            user_id,
            mips: self.mips,
            pes: self.pes,
            ram: self.ram,
            bw: self.bw,
            size: self.size,
            vmm: self.vmm.clone(),
            cloudlet_scheduler: self.cloudlet_scheduler,
        }
    }
}

/// Complete description of a simulation run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    pub clustering: ClusteringParameters,
    pub overhead: OverheadParameters,
    pub file_system: FileSystem,
    pub scheduler: SchedulingAlgorithm,
    pub datacenter: DatacenterConfig,
    pub vms: Vec<VmConfig>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            clustering: ClusteringParameters::default(),
            overhead: OverheadParameters::default(),
            file_system: FileSystem::default(),
            scheduler: SchedulingAlgorithm::default(),
            datacenter: DatacenterConfig::default(),
            vms: vec![VmConfig {
                count: 5,
                ..Default::default()
            }],
        }
    }
}

impl SimulationConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::read_to_string(path)?.parse()
    }

    pub fn vm_count(&self) -> u32 {
        self.vms.iter().map(|vm| vm.count).sum()
    }

    pub fn validate(&self) -> Result<()> {
        self.clustering.validate()?;
        self.overhead.validate()?;
        let invalid = |msg: String| Err(Error::InvalidParameter(msg));

        for (idx, vm) in self.vms.iter().enumerate() {
            if !vm.mips.is_finite() || vm.mips < 0. {
                return invalid(format!("vm group {}: mips must be non-negative, got {}", idx, vm.mips));
            }
        }
        if self.vm_count() > 0 && self.datacenter.host_count() == 0 {
            return invalid("vms are declared but the datacenter has no hosts".to_string());
        }
        for (idx, host) in self.datacenter.hosts.iter().enumerate() {
            if !host.pe_mips.is_finite() || host.pe_mips < 0. {
                return invalid(format!("host group {}: pe mips must be non-negative, got {}", idx, host.pe_mips));
            }
        }
        let c = &self.datacenter.characteristics;
        for (name, value) in [
            ("cost_per_sec", c.cost_per_sec),
            ("cost_per_mem", c.cost_per_mem),
            ("cost_per_storage", c.cost_per_storage),
            ("cost_per_bw", c.cost_per_bw),
        ] {
            if !value.is_finite() || value < 0. {
                return invalid(format!("{} must be non-negative, got {}", name, value));
            }
        }
        let storage = &self.datacenter.storage;
        if !storage.max_transfer_rate.is_finite() || storage.max_transfer_rate < 0. {
            return invalid(format!(
                "storage transfer rate must be non-negative, got {}",
                storage.max_transfer_rate
            ));
        }
        if storage.capacity < 0. {
            return invalid(format!("storage capacity must be non-negative, got {}", storage.capacity));
        }
        Ok(())
    }
}

impl FromStr for SimulationConfig {
    type Err = Error;

    /// Parses and validates a YAML config.
    fn from_str(s: &str) -> Result<Self> {
        let config: SimulationConfig = serde_yaml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
