//! imehub-components: built-in components for the imehub message bus
//!
//! - [`plugin_manager`] - discovers plugin files, keeps their components
//!   registered with the host and reloads them when the plugin root changes
//! - [`frontend`] - sends keys to an engine and defers the engine's
//!   re-entrant updates until each key's reply has been processed
//!
//! # Example
//!
//! ```ignore
//! use imehub_components::plugin_manager::{
//!     PluginManager, PluginManagerComponent, PluginManagerConfig,
//! };
//! use imehub_ipc::{ComponentHost, MultiComponentHost};
//!
//! let host = MultiComponentHost::new()?;
//! let front_door = PluginManagerComponent::new();
//! let manager = Arc::new(PluginManager::new(
//!     PluginManagerConfig::default(),
//!     host.clone(),
//!     front_door.clone(),
//! ));
//! front_door.attach(&manager);
//! host.add_component(front_door)?;
//! manager.init()?;
//! ```

pub mod frontend;
pub mod plugin_manager;

pub use frontend::{FrontendComponent, FrontendDelegate};
pub use plugin_manager::{PluginManager, PluginManagerComponent, PluginManagerConfig};
