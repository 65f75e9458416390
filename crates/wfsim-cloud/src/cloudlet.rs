//! Units of work executed on VMs.

use serde::Serialize;

use crate::file::FileItem;

/// Computation submitted to a VM: a workflow job seen from the datacenter side.
#[derive(Clone, Debug, Serialize)]
pub struct Cloudlet {
    pub id: u64,
    /// Length in millions of instructions.
    pub length: f64,
    pub pes: u32,
    pub vm_id: u32,
    pub input_files: Vec<FileItem>,
    pub output_files: Vec<FileItem>,
}

impl Cloudlet {
    pub fn new(id: u64, length: f64, pes: u32, vm_id: u32) -> Self {
        Self {
            id,
            length,
            pes,
            vm_id,
            input_files: Vec::new(),
            output_files: Vec::new(),
        }
    }
}
