//! Shared fixtures for plugin manager tests
//!
//! Plugins are plain `*.plugin.toml` manifests listing the components they
//! export, opened by [`ManifestLoader`] instead of a dynamic library loader.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use imehub_components::plugin_manager::{
    PluginInstance, PluginLoadError, PluginLoader, PluginManager, PluginManagerConfig,
    PluginManagerDelegate,
};
use imehub_ipc::{
    Component, ComponentContext, ComponentHost, ComponentId, ComponentInfo, HostError, Message,
};
use imehub_plugin_api::{PluginComponent, PluginError};
use serde::Deserialize;

pub const PLUGIN_SUFFIX: &str = ".plugin.toml";

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    component: Vec<ComponentInfo>,
}

/// Opens manifest files and counts how often it did
#[derive(Default)]
pub struct ManifestLoader {
    pub opens: AtomicUsize,
}

impl ManifestLoader {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PluginLoader for ManifestLoader {
    fn is_plugin_file(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(PLUGIN_SUFFIX))
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn PluginInstance>, PluginLoadError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let text = std::fs::read_to_string(path)?;
        let manifest: Manifest = toml::from_str(&text).map_err(|e| PluginLoadError::Invalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Arc::new(ManifestInstance {
            path: path.to_path_buf(),
            components: manifest.component,
        }))
    }
}

struct ManifestInstance {
    path: PathBuf,
    components: Vec<ComponentInfo>,
}

impl PluginInstance for ManifestInstance {
    fn path(&self) -> &Path {
        &self.path
    }

    fn components(&self) -> Vec<ComponentInfo> {
        self.components.clone()
    }

    fn create_component(
        &self,
        string_id: &str,
    ) -> Result<Box<dyn PluginComponent>, PluginLoadError> {
        let info = self
            .components
            .iter()
            .find(|c| c.string_id == string_id)
            .cloned()
            .ok_or_else(|| PluginError::unknown_component(string_id))?;
        Ok(Box::new(ManifestComponent { info }))
    }
}

/// Plugin component that does nothing but exist
struct ManifestComponent {
    info: ComponentInfo,
}

impl PluginComponent for ManifestComponent {
    fn info(&self) -> ComponentInfo {
        self.info.clone()
    }

    fn handle(&mut self, _message: Message, _ctx: &ComponentContext) {}
}

/// Write a manifest exporting `ids` at `root/relative`
pub fn write_plugin(root: &Path, relative: &str, ids: &[&str]) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut text = String::new();
    for id in ids {
        text.push_str(&format!("[[component]]\nstring_id = \"{id}\"\nname = \"{id}\"\n\n"));
    }
    std::fs::write(&path, text).unwrap();
    path
}

/// Host that only records registrations
#[derive(Default)]
pub struct MockHost {
    components: Mutex<BTreeMap<ComponentId, Arc<dyn Component>>>,
    next_id: AtomicUsize,
    pub adds: AtomicUsize,
    pub removes: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicUsize::new(1),
            ..Default::default()
        })
    }

    pub fn count(&self) -> usize {
        self.components.lock().unwrap().len()
    }

    pub fn string_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .components
            .lock()
            .unwrap()
            .values()
            .map(|c| c.info().string_id)
            .collect();
        ids.sort();
        ids
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }
}

impl ComponentHost for MockHost {
    fn add_component(&self, component: Arc<dyn Component>) -> Result<ComponentId, HostError> {
        let info = component.info();
        let mut components = self.components.lock().unwrap();
        if components
            .values()
            .any(|c| c.info().string_id == info.string_id)
        {
            return Err(HostError::DuplicateComponent {
                string_id: info.string_id,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) as ComponentId;
        components.insert(id, component);
        self.adds.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn remove_component(&self, id: ComponentId) -> Result<(), HostError> {
        let removed = self.components.lock().unwrap().remove(&id);
        match removed {
            Some(component) => {
                component.on_deregistered();
                self.removes.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(HostError::UnknownComponent(id)),
        }
    }

    fn send(&self, _source: ComponentId, _message: Message) -> Result<u32, HostError> {
        Ok(0)
    }

    fn send_with_reply(
        &self,
        _source: ComponentId,
        message: Message,
        _timeout: Option<Duration>,
    ) -> Result<Message, HostError> {
        Err(HostError::Disconnected {
            serial: message.serial,
        })
    }

    fn pause_message_handling(&self, _id: ComponentId) -> Result<(), HostError> {
        Ok(())
    }

    fn resume_message_handling(&self, _id: ComponentId) -> Result<(), HostError> {
        Ok(())
    }

    fn query_component(&self, string_id: &str) -> Option<ComponentInfo> {
        self.components
            .lock()
            .unwrap()
            .iter()
            .map(|(id, c)| ComponentInfo { id: *id, ..c.info() })
            .find(|info| info.string_id == string_id)
    }

    fn components(&self) -> Vec<ComponentInfo> {
        self.components
            .lock()
            .unwrap()
            .values()
            .map(|c| c.info())
            .collect()
    }
}

/// Counts change notifications
#[derive(Default)]
pub struct RecordingDelegate {
    pub changes: AtomicUsize,
}

impl RecordingDelegate {
    pub fn changes(&self) -> usize {
        self.changes.load(Ordering::SeqCst)
    }
}

impl PluginManagerDelegate for RecordingDelegate {
    fn plugin_components_changed(&self) {
        self.changes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Fixture {
    pub root: tempfile::TempDir,
    pub host: Arc<MockHost>,
    pub delegate: Arc<RecordingDelegate>,
    pub loader: Arc<ManifestLoader>,
    pub manager: Arc<PluginManager>,
}

impl Fixture {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let host = MockHost::new();
        let delegate = Arc::new(RecordingDelegate::default());
        let loader = Arc::new(ManifestLoader::default());
        let manager = Arc::new(PluginManager::with_loader(
            PluginManagerConfig {
                root: root.path().to_path_buf(),
            },
            host.clone(),
            delegate.clone(),
            loader.clone(),
        ));
        Self {
            root,
            host,
            delegate,
            loader,
            manager,
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn component_ids(&self) -> Vec<String> {
        self.manager
            .components()
            .into_iter()
            .map(|c| c.string_id)
            .collect()
    }
}

