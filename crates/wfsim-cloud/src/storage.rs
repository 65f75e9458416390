//! Datacenter storage.

use serde::{Deserialize, Serialize};

/// Shared datacenter storage holding workflow input files and, in shared file system mode, every output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Storage {
    pub name: String,
    /// Capacity in MB.
    pub capacity: f64,
    /// Maximum transfer rate in MB/s.
    pub max_transfer_rate: f64,
    #[serde(skip)]
    used: f64,
}

impl Storage {
    pub fn new(name: &str, capacity: f64, max_transfer_rate: f64) -> Self {
        Self {
            name: name.to_string(),
            capacity,
            max_transfer_rate,
            used: 0.,
        }
    }

    /// Time needed to move `size_mb` megabytes to or from this storage.
    ///
    /// A non-positive transfer rate is treated as instantaneous transfer.
    pub fn transfer_time(&self, size_mb: f64) -> f64 {
        if self.max_transfer_rate > 0. {
            size_mb / self.max_transfer_rate
        } else {
            0.
        }
    }

    /// Accounts the file in used space. Returns `false` if it does not fit.
    pub fn reserve(&mut self, size_mb: f64) -> bool {
        if self.used + size_mb > self.capacity {
            return false;
        }
        self.used += size_mb;
        true
    }

    pub fn used(&self) -> f64 {
        self.used
    }

    pub fn available(&self) -> f64 {
        self.capacity - self.used
    }
}
