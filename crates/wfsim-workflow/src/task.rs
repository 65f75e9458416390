//! Workflow task.

use std::collections::BTreeSet;

use serde::Serialize;

use wfsim_cloud::FileItem;

/// Indivisible unit of workflow computation.
///
/// Tasks are created by [`Workflow`](crate::workflow::Workflow) and reference their neighbours by index,
/// so the graph has no back-pointers.
#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub id: usize,
    pub name: String,
    /// Amount of computation in millions of instructions.
    pub length: f64,
    pub input_files: Vec<FileItem>,
    pub output_files: Vec<FileItem>,
    pub parents: BTreeSet<usize>,
    pub children: BTreeSet<usize>,
    /// Length of the longest path from a root task, roots have depth 0.
    pub depth: usize,
}

impl Task {
    pub(crate) fn new(id: usize, name: &str, length: f64) -> Self {
        Self {
            id,
            name: name.to_string(),
            length,
            input_files: Vec::new(),
            output_files: Vec::new(),
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            depth: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}
