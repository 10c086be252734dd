//! Opening plugin files
//!
//! [`PluginLoader`] is the seam between the manager and the platform's
//! dynamic library facility. [`DylibLoader`] is the real implementation;
//! tests substitute loaders that read plain files.

use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use imehub_ipc::ComponentInfo;
use imehub_plugin_api::{
    ABI_TAG, API_VERSION, DECLARATION_SYMBOL, PluginComponent, PluginDeclaration, PluginModule,
};
use libloading::Library;

use super::error::PluginLoadError;

/// An opened plugin file
pub trait PluginInstance: Send + Sync {
    fn path(&self) -> &Path;

    /// Components exported by this file, in declaration order
    fn components(&self) -> Vec<ComponentInfo>;

    fn create_component(
        &self,
        string_id: &str,
    ) -> Result<Box<dyn PluginComponent>, PluginLoadError>;
}

/// Recognises and opens plugin files
pub trait PluginLoader: Send + Sync {
    /// Whether a discovered file should be opened at all
    fn is_plugin_file(&self, path: &Path) -> bool;

    fn open(&self, path: &Path) -> Result<Arc<dyn PluginInstance>, PluginLoadError>;
}

/// Loads plugins as native dynamic libraries (`.so`, `.dylib`, `.dll`)
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

impl PluginLoader for DylibLoader {
    fn is_plugin_file(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext == std::env::consts::DLL_EXTENSION)
    }

    fn open(&self, path: &Path) -> Result<Arc<dyn PluginInstance>, PluginLoadError> {
        // SAFETY: Loading runs the library's initialisers. Only files placed
        // under the plugin root are opened.
        let library = unsafe { Library::new(path)? };

        // SAFETY: The symbol is the static emitted by `export_plugin!`.
        let declaration: PluginDeclaration = unsafe {
            let symbol = library.get::<*const PluginDeclaration>(DECLARATION_SYMBOL)?;
            let decl = &**symbol;

            if decl.api_version != API_VERSION {
                return Err(PluginLoadError::ApiVersionMismatch {
                    expected: API_VERSION,
                    found: decl.api_version,
                });
            }
            if decl.abi_tag != ABI_TAG {
                return Err(PluginLoadError::AbiMismatch {
                    expected: ABI_TAG.to_string(),
                    found: decl.abi_tag.to_string(),
                });
            }

            PluginDeclaration {
                api_version: decl.api_version,
                abi_tag: ABI_TAG,
                create: decl.create,
                destroy: decl.destroy,
            }
        };

        // SAFETY: `create` hands over a pointer from `Box::into_raw`, which is
        // returned to the plugin's own `destroy` when the instance drops.
        let module = unsafe { Box::from_raw((declaration.create)()) };

        tracing::debug!(path = %path.display(), "Plugin library opened");
        Ok(Arc::new(NativeInstance {
            path: path.to_path_buf(),
            module: ManuallyDrop::new(module),
            destroy: declaration.destroy,
            _library: library,
        }))
    }
}

/// A loaded library plus the module it created
struct NativeInstance {
    path: PathBuf,
    module: ManuallyDrop<Box<dyn PluginModule>>,
    destroy: fn(*mut dyn PluginModule),
    /// Keep the library loaded; dropped last
    _library: Library,
}

impl PluginInstance for NativeInstance {
    fn path(&self) -> &Path {
        &self.path
    }

    fn components(&self) -> Vec<ComponentInfo> {
        self.module.components()
    }

    fn create_component(
        &self,
        string_id: &str,
    ) -> Result<Box<dyn PluginComponent>, PluginLoadError> {
        Ok(self.module.create(string_id)?)
    }
}

impl Drop for NativeInstance {
    fn drop(&mut self) {
        // SAFETY: The module is not touched again and the library is still
        // loaded until this struct's fields drop.
        let module = unsafe { ManuallyDrop::take(&mut self.module) };
        (self.destroy)(Box::into_raw(module));
        tracing::debug!(path = %self.path.display(), "Plugin library released");
    }
}
