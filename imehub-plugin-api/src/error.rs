//! Error types for plugin authors

use thiserror::Error;

/// Reasons a plugin module can refuse to create a component
#[derive(Error, Debug)]
pub enum PluginError {
    /// The module does not export a component with this string id
    #[error("Unknown component: {0}")]
    UnknownComponent(String),

    /// The component exists but could not set itself up
    #[error("Component '{string_id}' failed to initialize: {reason}")]
    InitFailed { string_id: String, reason: String },

    /// Reading data the component depends on failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub fn unknown_component(string_id: impl Into<String>) -> Self {
        Self::UnknownComponent(string_id.into())
    }

    pub fn init_failed(string_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InitFailed {
            string_id: string_id.into(),
            reason: reason.into(),
        }
    }
}
