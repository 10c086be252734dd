//! Plugin manager error types

use std::path::PathBuf;

use imehub_ipc::HostError;
use imehub_plugin_api::PluginError;
use thiserror::Error;

/// Errors raised while opening a plugin file
#[derive(Error, Debug)]
pub enum PluginLoadError {
    /// Failed to load dynamic library
    #[error("Failed to load plugin library: {0}")]
    LibraryLoad(#[from] libloading::Error),

    /// API version mismatch between the hub and the plugin
    #[error("API version mismatch: imehub expects {expected}, plugin has {found}")]
    ApiVersionMismatch { expected: u32, found: u32 },

    /// Plugin was compiled against a different plugin API build
    #[error("ABI mismatch: imehub expects {expected}, plugin has {found}")]
    AbiMismatch { expected: String, found: String },

    /// The module refused to create a component
    #[error("Plugin failed: {0}")]
    Plugin(#[from] PluginError),

    /// A created component described itself under another string id
    #[error("Component '{requested}' reports string id '{found}'")]
    IdMismatch { requested: String, found: String },

    /// File content is not a usable plugin
    #[error("Invalid plugin {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by [`PluginManager`](super::PluginManager) operations
#[derive(Error, Debug)]
pub enum PluginManagerError {
    /// No discovered plugin exports this string id
    #[error("Component '{string_id}' is not available")]
    UnknownComponent { string_id: String },

    /// No loaded plugin lives at this path
    #[error("Plugin not loaded: {path}")]
    UnknownPlugin { path: PathBuf },

    /// The plugin root exists but cannot be listed
    #[error("Cannot list plugin root {path}: {source}")]
    ListRoot {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    /// Opening the plugin file or creating the component failed
    #[error("Failed to start '{string_id}' from {path}: {source}")]
    StartFailed {
        string_id: String,
        path: PathBuf,
        #[source]
        source: PluginLoadError,
    },

    /// The component host rejected the operation
    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Errors raised by a plugin monitor
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The watched directory does not exist
    #[error("Watched directory not found: {path}")]
    DirNotFound { path: PathBuf },

    /// File watcher could not be created or attached
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Monitor was started twice
    #[error("Monitor is already running")]
    AlreadyStarted,
}
