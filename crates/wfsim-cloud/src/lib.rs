//! Simulated cloud resources: datacenter, hosts, processing elements, virtual machines, storage and the
//! replica catalog that tracks where workflow files live.

pub mod allocation;
pub mod cloudlet;
pub mod datacenter;
pub mod events;
pub mod file;
pub mod host;
pub mod replica_catalog;
pub mod storage;
pub mod throughput;
pub mod vm;

pub use allocation::{AllocationVerdict, VmAllocationPolicy};
pub use cloudlet::Cloudlet;
pub use datacenter::{Datacenter, DatacenterCharacteristics};
pub use file::{FileItem, FileKind};
pub use host::{Host, Pe, VmScheduler};
pub use replica_catalog::{FileSystem, Location, ReplicaCatalog};
pub use storage::Storage;
pub use vm::{CloudletScheduler, Vm, VmSpec, VmStatus};
