//! Bookkeeping for discovered plugin files and started components
//!
//! The manager keeps every map behind one lock; this type owns the maps and
//! keeps them consistent with each other.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use imehub_ipc::{ComponentId, ComponentInfo};

/// Cheap change detector for a plugin file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl Fingerprint {
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        }
    }
}

/// A plugin file known to export components
#[derive(Debug, Clone)]
pub struct PluginInfo {
    pub path: PathBuf,
    /// Every component this file exports, in declaration order, including
    /// ids currently owned by another file
    pub components: Vec<ComponentInfo>,
    pub fingerprint: Fingerprint,
}

impl PluginInfo {
    pub fn exports(&self, string_id: &str) -> bool {
        self.components.iter().any(|c| c.string_id == string_id)
    }

    fn component(&self, string_id: &str) -> Option<&ComponentInfo> {
        self.components.iter().find(|c| c.string_id == string_id)
    }
}

#[derive(Debug, Default)]
pub(crate) struct PluginTable {
    files: BTreeMap<PathBuf, PluginInfo>,
    /// string id to the file currently providing it
    owners: BTreeMap<String, PathBuf>,
    /// string id to host id of the running stub
    started: BTreeMap<String, ComponentId>,
}

impl PluginTable {
    /// Record a newly discovered file.
    ///
    /// A string id already owned by another file keeps its owner; the new
    /// file stays on record as a fallback exporter. Shadowed ids, and ids the
    /// file repeats, are returned.
    pub fn insert(&mut self, mut info: PluginInfo) -> Vec<String> {
        let mut shadowed = Vec::new();
        let mut seen = BTreeSet::new();
        info.components.retain(|component| {
            if seen.insert(component.string_id.clone()) {
                true
            } else {
                shadowed.push(component.string_id.clone());
                false
            }
        });
        for component in &info.components {
            if self.owners.contains_key(&component.string_id) {
                shadowed.push(component.string_id.clone());
            } else {
                self.owners
                    .insert(component.string_id.clone(), info.path.clone());
            }
        }
        self.files.insert(info.path.clone(), info);
        shadowed
    }

    /// Forget a file. Started entries it owns must have been removed first.
    ///
    /// Each string id it owned passes to the next file, in walk order, that
    /// also exports it. Returns the ids handed over that way, with their new
    /// owner.
    pub fn remove(&mut self, path: &Path) -> Option<Vec<(String, PathBuf)>> {
        let info = self.files.remove(path)?;
        let mut handed_over = Vec::new();
        for component in &info.components {
            let string_id = &component.string_id;
            if self.owners.get(string_id).is_none_or(|owner| owner != path) {
                continue;
            }
            debug_assert!(!self.started.contains_key(string_id));
            let heir = self
                .files
                .values()
                .find(|other| other.exports(string_id))
                .map(|other| other.path.clone());
            match heir {
                Some(heir) => {
                    self.owners.insert(string_id.clone(), heir.clone());
                    handed_over.push((string_id.clone(), heir));
                }
                None => {
                    self.owners.remove(string_id);
                }
            }
        }
        Some(handed_over)
    }

    pub fn file(&self, path: &Path) -> Option<&PluginInfo> {
        self.files.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.keys()
    }

    /// Owning file of an available component
    pub fn owner(&self, string_id: &str) -> Option<&Path> {
        self.owners.get(string_id).map(PathBuf::as_path)
    }

    /// Every available component, ordered by string id, as its owner
    /// describes it
    pub fn components(&self) -> Vec<ComponentInfo> {
        self.owners
            .iter()
            .filter_map(|(string_id, path)| self.files.get(path)?.component(string_id))
            .cloned()
            .collect()
    }

    pub fn available_ids(&self) -> Vec<String> {
        self.owners.keys().cloned().collect()
    }

    pub fn is_started(&self, string_id: &str) -> bool {
        self.started.contains_key(string_id)
    }

    pub fn mark_started(&mut self, string_id: &str, id: ComponentId) {
        debug_assert!(self.owners.contains_key(string_id));
        self.started.insert(string_id.to_string(), id);
    }

    pub fn mark_stopped(&mut self, string_id: &str) -> Option<ComponentId> {
        self.started.remove(string_id)
    }

    pub fn started(&self) -> Vec<String> {
        self.started.keys().cloned().collect()
    }

    /// Started components owned by `path`
    pub fn started_in(&self, path: &Path) -> Vec<String> {
        self.owners
            .iter()
            .filter(|(string_id, owner)| *owner == path && self.started.contains_key(*string_id))
            .map(|(string_id, _)| string_id.clone())
            .collect()
    }

    /// Drain every started entry
    pub fn take_started(&mut self) -> Vec<(String, ComponentId)> {
        std::mem::take(&mut self.started).into_iter().collect()
    }
}
