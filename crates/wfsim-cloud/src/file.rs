//! Workflow files.

use serde::{Deserialize, Serialize};

/// Role of a file with respect to the task that references it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Input,
    Output,
}

/// Named piece of data consumed or produced by a task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileItem {
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    pub kind: FileKind,
}

impl FileItem {
    pub fn new(name: &str, size: u64, kind: FileKind) -> Self {
        Self {
            name: name.to_string(),
            size,
            kind,
        }
    }

    pub fn input(name: &str, size: u64) -> Self {
        Self::new(name, size, FileKind::Input)
    }

    pub fn output(name: &str, size: u64) -> Self {
        Self::new(name, size, FileKind::Output)
    }

    /// Size in megabytes, the unit of storage transfer rates and bandwidth costs.
    pub fn size_mb(&self) -> f64 {
        self.size as f64 / 1e6
    }
}
