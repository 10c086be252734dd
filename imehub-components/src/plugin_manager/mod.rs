//! Plugin lifecycle management
//!
//! Plugin files live below one root directory. The [`PluginManager`] scans
//! that root, records which components each file exports and keeps a
//! [`PluginComponentStub`] registered with the host for every started one.
//! Monitors ask for a rescan; the manager never learns what changed.

mod component;
mod error;
mod loader;
mod manager;
mod monitor;
mod stub;
mod table;

pub use component::{PLUGIN_MANAGER_STRING_ID, PluginManagerComponent};
pub use error::{MonitorError, PluginLoadError, PluginManagerError};
pub use loader::{DylibLoader, PluginInstance, PluginLoader};
pub use manager::{PluginManager, PluginManagerConfig, PluginManagerDelegate, ScanSummary};
pub use monitor::{DirectoryMonitor, PluginMonitor, PluginMonitorDelegate};
pub use stub::PluginComponentStub;
pub use table::{Fingerprint, PluginInfo};
