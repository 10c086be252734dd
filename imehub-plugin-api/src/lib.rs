//! imehub-plugin-api - Plugin API for imehub input method components
//!
//! A plugin is a native Rust dynamic library exporting one module. The module
//! lists the components it provides and creates any of them on demand. The
//! hub wraps each created component so it can sit on the message bus next to
//! built-in components.
//!
//! # Example
//!
//! ```ignore
//! use imehub_plugin_api::{
//!     ComponentContext, ComponentInfo, Message, PluginComponent, PluginError, PluginModule,
//!     export_plugin,
//! };
//!
//! #[derive(Default)]
//! pub struct MyModule;
//!
//! impl PluginModule for MyModule {
//!     fn components(&self) -> Vec<ComponentInfo> {
//!         vec![ComponentInfo::new("com.example.engine")]
//!     }
//!
//!     fn create(&self, string_id: &str) -> Result<Box<dyn PluginComponent>, PluginError> {
//!         match string_id {
//!             "com.example.engine" => Ok(Box::new(Engine::default())),
//!             other => Err(PluginError::unknown_component(other)),
//!         }
//!     }
//! }
//!
//! export_plugin!(MyModule);
//! ```

pub mod error;

pub use error::PluginError;
pub use imehub_ipc::{ComponentContext, ComponentInfo, Message, MessagePayload, message_types};

/// Current plugin API version. Plugins must match this exactly.
/// This is checked when a plugin file is opened.
pub const API_VERSION: u32 = 1;

/// Version of this crate a plugin was compiled against. Trait object layout
/// is only stable within one version, so a mismatch refuses the file.
pub const ABI_TAG: &str = concat!("imehub-plugin-api/", env!("CARGO_PKG_VERSION"));

/// Name of the static every plugin library exports
pub const DECLARATION_SYMBOL: &[u8] = b"IMEHUB_PLUGIN_DECLARATION\0";

/// Versioned entry table exported by [`export_plugin!`]
#[repr(C)]
pub struct PluginDeclaration {
    /// Always first so any loader can read it
    pub api_version: u32,
    pub abi_tag: &'static str,
    /// Creates the module instance
    pub create: fn() -> *mut dyn PluginModule,
    /// Destroys an instance returned by `create`, inside the plugin
    pub destroy: fn(*mut dyn PluginModule),
}

/// Entry point of a plugin library
pub trait PluginModule: Send + Sync {
    /// Describe every component this module can create.
    ///
    /// An empty list means the file provides nothing and is ignored.
    fn components(&self) -> Vec<ComponentInfo>;

    /// Create a fresh instance of the component named `string_id`
    fn create(&self, string_id: &str) -> Result<Box<dyn PluginComponent>, PluginError>;
}

/// A component implemented inside a plugin.
///
/// The hub serialises calls into one instance, so methods take `&mut self`.
pub trait PluginComponent: Send {
    /// Return component metadata
    fn info(&self) -> ComponentInfo;

    /// Handle one inbound message
    fn handle(&mut self, message: Message, ctx: &ComponentContext);

    /// Called once the hub has registered the component on the bus
    fn on_registered(&mut self, _ctx: &ComponentContext) {}

    /// Called after the component was removed from the bus
    fn on_deregistered(&mut self) {}
}

/// Export a plugin module type for dynamic loading.
///
/// # Usage
///
/// ```ignore
/// imehub_plugin_api::export_plugin!(MyModule);
/// ```
///
/// The module type must implement `Default`. The macro emits the
/// `IMEHUB_PLUGIN_DECLARATION` static pointing at generated create and
/// destroy functions.
#[macro_export]
macro_rules! export_plugin {
    ($module_type:ty) => {
        fn _imehub_plugin_create() -> *mut dyn $crate::PluginModule {
            let module: Box<dyn $crate::PluginModule> = Box::new(<$module_type>::default());
            Box::into_raw(module)
        }

        fn _imehub_plugin_destroy(ptr: *mut dyn $crate::PluginModule) {
            if !ptr.is_null() {
                unsafe {
                    drop(Box::from_raw(ptr));
                }
            }
        }

        #[unsafe(no_mangle)]
        pub static IMEHUB_PLUGIN_DECLARATION: $crate::PluginDeclaration =
            $crate::PluginDeclaration {
                api_version: $crate::API_VERSION,
                abi_tag: $crate::ABI_TAG,
                create: _imehub_plugin_create,
                destroy: _imehub_plugin_destroy,
            };
    };
}
