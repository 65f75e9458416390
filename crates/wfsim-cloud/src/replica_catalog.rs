//! Registry of file replicas.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// How files are shared between VMs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileSystem {
    /// Each VM has its own disk: a file must be staged to the VM before use unless a replica is already there.
    Local,
    /// All VMs read and write a single shared storage.
    Shared,
}

impl Default for FileSystem {
    fn default() -> Self {
        FileSystem::Shared
    }
}

/// Place holding a file replica.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    Storage(String),
    Vm(u32),
}

/// Maps file names to the locations of their replicas.
///
/// Files and locations keep insertion order, so lookups are deterministic.
pub struct ReplicaCatalog {
    file_system: FileSystem,
    replicas: IndexMap<String, Vec<Location>>,
}

impl ReplicaCatalog {
    pub fn new(file_system: FileSystem) -> Self {
        Self {
            file_system,
            replicas: IndexMap::new(),
        }
    }

    pub fn file_system(&self) -> FileSystem {
        self.file_system
    }

    /// Registers a replica. Returns `false` if it was already registered.
    pub fn add_replica(&mut self, file: &str, location: Location) -> bool {
        let locations = self.replicas.entry(file.to_string()).or_default();
        if locations.contains(&location) {
            return false;
        }
        locations.push(location);
        true
    }

    /// Unregisters a replica. Returns `false` if there was no such replica.
    pub fn remove_replica(&mut self, file: &str, location: &Location) -> bool {
        let Some(locations) = self.replicas.get_mut(file) else {
            return false;
        };
        let before = locations.len();
        locations.retain(|l| l != location);
        let removed = locations.len() != before;
        if locations.is_empty() {
            self.replicas.shift_remove(file);
        }
        removed
    }

    pub fn locations(&self, file: &str) -> &[Location] {
        self.replicas.get(file).map(|l| l.as_slice()).unwrap_or(&[])
    }

    pub fn contains(&self, file: &str) -> bool {
        self.replicas.contains_key(file)
    }

    pub fn has_replica_at(&self, file: &str, location: &Location) -> bool {
        self.locations(file).contains(location)
    }

    /// Drops every replica stored on the VM, e.g. when the VM is destroyed.
    pub fn remove_vm(&mut self, vm_id: u32) {
        let location = Location::Vm(vm_id);
        for locations in self.replicas.values_mut() {
            locations.retain(|l| *l != location);
        }
        self.replicas.retain(|_, locations| !locations.is_empty());
    }

    pub fn file_count(&self) -> usize {
        self.replicas.len()
    }

    /// Location where an output produced on the VM is registered.
    pub fn output_location(&self, vm_id: u32, storage: &str) -> Location {
        match self.file_system {
            FileSystem::Local => Location::Vm(vm_id),
            FileSystem::Shared => Location::Storage(storage.to_string()),
        }
    }

    /// Returns `true` if reading the file on the VM requires a transfer.
    pub fn needs_transfer(&self, file: &str, vm_id: u32) -> bool {
        match self.file_system {
            FileSystem::Shared => true,
            FileSystem::Local => !self.has_replica_at(file, &Location::Vm(vm_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_remove_replicas() {
        let mut catalog = ReplicaCatalog::new(FileSystem::Local);
        assert!(catalog.add_replica("a.dat", Location::Storage("local".into())));
        assert!(!catalog.add_replica("a.dat", Location::Storage("local".into())));
        assert!(catalog.add_replica("a.dat", Location::Vm(3)));
        assert_eq!(catalog.locations("a.dat").len(), 2);
        assert!(catalog.remove_replica("a.dat", &Location::Vm(3)));
        assert!(!catalog.remove_replica("a.dat", &Location::Vm(3)));
        assert!(catalog.remove_replica("a.dat", &Location::Storage("local".into())));
        assert!(!catalog.contains("a.dat"));
        assert!(catalog.locations("a.dat").is_empty());
    }

    #[test]
    fn removing_vm_drops_its_replicas() {
        let mut catalog = ReplicaCatalog::new(FileSystem::Local);
        catalog.add_replica("a", Location::Vm(1));
        catalog.add_replica("b", Location::Vm(1));
        catalog.add_replica("b", Location::Vm(2));
        catalog.remove_vm(1);
        assert!(!catalog.contains("a"));
        assert_eq!(catalog.locations("b"), &[Location::Vm(2)]);
        assert_eq!(catalog.file_count(), 1);
    }

    #[test]
    fn transfer_need_depends_on_file_system() {
        let mut local = ReplicaCatalog::new(FileSystem::Local);
        local.add_replica("a", Location::Vm(0));
        assert!(!local.needs_transfer("a", 0));
        assert!(local.needs_transfer("a", 1));
        assert_eq!(local.output_location(1, "st"), Location::Vm(1));

        let mut shared = ReplicaCatalog::new(FileSystem::Shared);
        shared.add_replica("a", Location::Vm(0));
        assert!(shared.needs_transfer("a", 0));
        assert_eq!(shared.output_location(1, "st"), Location::Storage("st".into()));
    }
}
