//! PluginManager - keeps the host's plugin components in line with the disk
//!
//! Every operation runs under one lock for its whole duration, so a rescan
//! on a monitor thread can never interleave with a start or unload issued
//! from the dispatch thread.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use imehub_ipc::{ComponentHost, ComponentInfo};
use walkdir::WalkDir;

use super::error::{MonitorError, PluginManagerError};
use super::loader::{DylibLoader, PluginLoader};
use super::monitor::{PluginMonitor, PluginMonitorDelegate};
use super::stub::PluginComponentStub;
use super::table::{Fingerprint, PluginInfo, PluginTable};

/// Configuration for PluginManager
#[derive(Debug, Clone)]
pub struct PluginManagerConfig {
    /// Directory scanned recursively for plugin files
    pub root: PathBuf,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            root: imehub_paths::plugin_dir(),
        }
    }
}

/// Owner-side notification that the available component set was touched
pub trait PluginManagerDelegate: Send + Sync {
    fn plugin_components_changed(&self);
}

/// What one scan did to the file table
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub added: Vec<PathBuf>,
    pub removed: Vec<PathBuf>,
    pub changed: Vec<PathBuf>,
    /// Files that failed to open; retried on the next scan
    pub failed: Vec<PathBuf>,
}

impl ScanSummary {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.changed.is_empty()
            && self.failed.is_empty()
    }
}

/// Discovers, starts, stops and unloads plugin-provided components
pub struct PluginManager {
    root: PathBuf,
    host: Arc<dyn ComponentHost>,
    delegate: Arc<dyn PluginManagerDelegate>,
    loader: Arc<dyn PluginLoader>,
    table: Mutex<PluginTable>,
    monitors: Mutex<Vec<Box<dyn PluginMonitor>>>,
}

impl PluginManager {
    /// Create a manager loading native plugin libraries
    pub fn new(
        config: PluginManagerConfig,
        host: Arc<dyn ComponentHost>,
        delegate: Arc<dyn PluginManagerDelegate>,
    ) -> Self {
        Self::with_loader(config, host, delegate, Arc::new(DylibLoader))
    }

    pub fn with_loader(
        config: PluginManagerConfig,
        host: Arc<dyn ComponentHost>,
        delegate: Arc<dyn PluginManagerDelegate>,
        loader: Arc<dyn PluginLoader>,
    ) -> Self {
        Self {
            root: config.root,
            host,
            delegate,
            loader,
            table: Mutex::new(PluginTable::default()),
            monitors: Mutex::new(Vec::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn table(&self) -> MutexGuard<'_, PluginTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn monitors(&self) -> MutexGuard<'_, Vec<Box<dyn PluginMonitor>>> {
        self.monitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Scan the root, then start every discovered component
    pub fn init(&self) -> Result<ScanSummary, PluginManagerError> {
        let mut table = self.table();
        let summary = self.scan_locked(&mut table)?;
        self.auto_start_locked(&mut table);
        tracing::info!(
            root = %self.root.display(),
            plugins = table.paths().count(),
            started = table.started().len(),
            "Plugin manager initialised"
        );
        Ok(summary)
    }

    /// Reconcile the file table with the plugin root without starting anything
    pub fn scan_all_plugin_files(&self) -> Result<ScanSummary, PluginManagerError> {
        let mut table = self.table();
        self.scan_locked(&mut table)
    }

    /// Every available component, started or not
    pub fn components(&self) -> Vec<ComponentInfo> {
        self.table().components()
    }

    /// String ids of the components currently registered with the host
    pub fn started_components(&self) -> Vec<String> {
        self.table().started()
    }

    pub fn is_started(&self, string_id: &str) -> bool {
        self.table().is_started(string_id)
    }

    /// File currently providing `string_id`
    pub fn owner(&self, string_id: &str) -> Option<PathBuf> {
        self.table().owner(string_id).map(Path::to_path_buf)
    }

    /// Known plugin files and everything they export
    pub fn plugins(&self) -> Vec<PluginInfo> {
        let table = self.table();
        table
            .paths()
            .filter_map(|path| table.file(path).cloned())
            .collect()
    }

    /// Start an available component. Starting a started one is a no-op.
    pub fn start_component(&self, string_id: &str) -> Result<(), PluginManagerError> {
        let mut table = self.table();
        let path = table
            .owner(string_id)
            .ok_or_else(|| PluginManagerError::UnknownComponent {
                string_id: string_id.to_string(),
            })?
            .to_path_buf();
        if table.is_started(string_id) {
            return Ok(());
        }
        self.start_locked(&mut table, &path, string_id)
    }

    /// Stop a started component. Stopping a stopped one is a no-op.
    pub fn stop_component(&self, string_id: &str) -> Result<(), PluginManagerError> {
        let mut table = self.table();
        if table.owner(string_id).is_none() {
            return Err(PluginManagerError::UnknownComponent {
                string_id: string_id.to_string(),
            });
        }
        self.stop_locked(&mut table, string_id);
        Ok(())
    }

    /// Stop every component of the file at `path` and forget the file.
    ///
    /// The file is picked up again by the next rescan if it is still there.
    pub fn unload_plugin(&self, path: &Path) -> Result<(), PluginManagerError> {
        {
            let mut table = self.table();
            if table.file(path).is_none() {
                return Err(PluginManagerError::UnknownPlugin {
                    path: path.to_path_buf(),
                });
            }
            self.drop_plugin_locked(&mut table, path);
        }
        tracing::info!(path = %path.display(), "Plugin unloaded");
        self.delegate.plugin_components_changed();
        Ok(())
    }

    /// Rescan, start whatever is new, then notify the delegate once
    pub fn plugin_changed(&self) {
        {
            let mut table = self.table();
            match self.scan_locked(&mut table) {
                Ok(summary) if !summary.is_empty() => {
                    tracing::info!(
                        added = summary.added.len(),
                        removed = summary.removed.len(),
                        changed = summary.changed.len(),
                        failed = summary.failed.len(),
                        "Plugin set rescanned"
                    );
                }
                Ok(_) => tracing::debug!("Plugin rescan found no differences"),
                Err(e) => tracing::error!(error = %e, "Plugin rescan failed"),
            }
            self.auto_start_locked(&mut table);
        }
        self.delegate.plugin_components_changed();
    }

    /// Start `monitor` and keep it until the manager drops.
    ///
    /// A monitor that fails to start is discarded.
    pub fn add_monitor(
        self: &Arc<Self>,
        mut monitor: Box<dyn PluginMonitor>,
    ) -> Result<(), MonitorError> {
        let this: Arc<dyn PluginMonitorDelegate> = self.clone();
        let delegate: Weak<dyn PluginMonitorDelegate> = Arc::downgrade(&this);
        if let Err(e) = monitor.start(delegate) {
            tracing::error!(error = %e, "Error starting plugin monitor");
            return Err(e);
        }
        self.monitors().push(monitor);
        Ok(())
    }

    fn list_plugin_files(&self) -> Result<BTreeMap<PathBuf, Fingerprint>, PluginManagerError> {
        let mut found = BTreeMap::new();
        if !self.root.exists() {
            tracing::debug!(root = %self.root.display(), "Plugin directory does not exist");
            return Ok(found);
        }

        for entry in WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(PluginManagerError::ListRoot {
                        path: self.root.clone(),
                        source: e,
                    });
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable plugin entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() || !self.loader.is_plugin_file(entry.path()) {
                continue;
            }
            match entry.metadata() {
                Ok(metadata) => {
                    found.insert(entry.into_path(), Fingerprint::from_metadata(&metadata));
                }
                Err(e) => {
                    tracing::debug!(path = %entry.path().display(), error = %e, "Skipping plugin file");
                }
            }
        }
        Ok(found)
    }

    fn scan_locked(&self, table: &mut PluginTable) -> Result<ScanSummary, PluginManagerError> {
        let found = self.list_plugin_files()?;
        let mut summary = ScanSummary::default();

        let vanished: Vec<PathBuf> = table
            .paths()
            .filter(|path| !found.contains_key(*path))
            .cloned()
            .collect();
        for path in vanished {
            tracing::info!(path = %path.display(), "Plugin file removed");
            self.drop_plugin_locked(table, &path);
            summary.removed.push(path);
        }

        for (path, fingerprint) in found {
            let known = table.file(&path).map(|info| info.fingerprint);
            let changed = match known {
                Some(known) if known == fingerprint => continue,
                Some(_) => {
                    tracing::info!(path = %path.display(), "Plugin file changed");
                    self.drop_plugin_locked(table, &path);
                    true
                }
                None => false,
            };

            let components = match self.loader.open(&path) {
                Ok(instance) => instance.components(),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to load plugin");
                    summary.failed.push(path);
                    continue;
                }
            };
            if components.is_empty() {
                tracing::debug!(path = %path.display(), "Plugin exports no components");
                continue;
            }

            let shadowed = table.insert(PluginInfo {
                path: path.clone(),
                components,
                fingerprint,
            });
            for string_id in shadowed {
                tracing::warn!(
                    component = %string_id,
                    path = %path.display(),
                    "Duplicate component string id, keeping the first"
                );
            }

            if changed {
                summary.changed.push(path);
            } else {
                tracing::debug!(path = %path.display(), "Plugin file discovered");
                summary.added.push(path);
            }
        }

        Ok(summary)
    }

    fn auto_start_locked(&self, table: &mut PluginTable) {
        for string_id in table.available_ids() {
            if table.is_started(&string_id) {
                continue;
            }
            let Some(path) = table.owner(&string_id).map(Path::to_path_buf) else {
                continue;
            };
            if let Err(e) = self.start_locked(table, &path, &string_id) {
                tracing::error!(component = %string_id, error = %e, "Error starting component");
            }
        }
    }

    fn start_locked(
        &self,
        table: &mut PluginTable,
        path: &Path,
        string_id: &str,
    ) -> Result<(), PluginManagerError> {
        let stub = PluginComponentStub::start(self.loader.as_ref(), path, string_id).map_err(
            |source| PluginManagerError::StartFailed {
                string_id: string_id.to_string(),
                path: path.to_path_buf(),
                source,
            },
        )?;
        let id = self.host.add_component(Arc::new(stub))?;
        table.mark_started(string_id, id);
        tracing::info!(component = %string_id, id, "Plugin component started");
        Ok(())
    }

    fn stop_locked(&self, table: &mut PluginTable, string_id: &str) {
        let Some(id) = table.mark_stopped(string_id) else {
            return;
        };
        match self.host.remove_component(id) {
            Ok(()) => tracing::info!(component = %string_id, id, "Plugin component stopped"),
            Err(e) => {
                tracing::warn!(component = %string_id, id, error = %e, "Component already gone from host");
            }
        }
    }

    fn drop_plugin_locked(&self, table: &mut PluginTable, path: &Path) {
        for string_id in table.started_in(path) {
            self.stop_locked(table, &string_id);
        }
        for (string_id, heir) in table.remove(path).unwrap_or_default() {
            tracing::info!(
                component = %string_id,
                path = %heir.display(),
                "Component now provided by another plugin"
            );
        }
    }
}

impl PluginMonitorDelegate for PluginManager {
    fn plugin_changed(&self) {
        PluginManager::plugin_changed(self);
    }
}

impl Drop for PluginManager {
    fn drop(&mut self) {
        // Monitors stop before any component is removed
        for mut monitor in self.monitors().drain(..) {
            monitor.stop();
        }

        let started = self.table().take_started();
        for (string_id, id) in started {
            if let Err(e) = self.host.remove_component(id) {
                tracing::debug!(component = %string_id, error = %e, "Component already gone from host");
            }
        }
    }
}
