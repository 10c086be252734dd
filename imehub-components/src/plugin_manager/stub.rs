//! PluginComponentStub - a plugin-provided component on the message bus

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

use imehub_ipc::{Component, ComponentContext, ComponentInfo, Message};
use imehub_plugin_api::PluginComponent;

use super::error::PluginLoadError;
use super::loader::{PluginInstance, PluginLoader};

/// Adapts one component created by a plugin module to [`Component`].
///
/// The stub opens its own instance of the plugin file, so the library stays
/// loaded exactly as long as some started component needs it.
pub struct PluginComponentStub {
    path: PathBuf,
    info: ComponentInfo,
    inner: Mutex<Box<dyn PluginComponent>>,
    /// Deliveries that arrived while `inner` was busy higher up the stack
    pending: Mutex<VecDeque<Message>>,
    /// Deregistered while `inner` was busy; the busy handler finishes it
    deregister_pending: AtomicBool,
    /// Declared after `inner` so the component drops before its library
    _instance: Arc<dyn PluginInstance>,
}

impl PluginComponentStub {
    /// Open `path` and create the component named `string_id`
    pub fn start(
        loader: &dyn PluginLoader,
        path: &Path,
        string_id: &str,
    ) -> Result<Self, PluginLoadError> {
        let instance = loader.open(path)?;
        let component = instance.create_component(string_id)?;
        let info = component.info();
        if info.string_id != string_id {
            return Err(PluginLoadError::IdMismatch {
                requested: string_id.to_string(),
                found: info.string_id,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            info,
            inner: Mutex::new(component),
            pending: Mutex::new(VecDeque::new()),
            deregister_pending: AtomicBool::new(false),
            _instance: instance,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn string_id(&self) -> &str {
        &self.info.string_id
    }

    fn inner(&self) -> MutexGuard<'_, Box<dyn PluginComponent>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a deregistration that found `inner` busy, unless someone else
    /// already holds `inner` and will see the flag after releasing it
    fn finish_deferred_deregistration(&self) {
        if !self.deregister_pending.load(Ordering::SeqCst) {
            return;
        }
        if let Ok(mut inner) = self.inner.try_lock()
            && self.deregister_pending.swap(false, Ordering::SeqCst)
        {
            inner.on_deregistered();
        }
    }
}

impl Component for PluginComponentStub {
    fn info(&self) -> ComponentInfo {
        self.info.clone()
    }

    fn handle(&self, message: Message, ctx: &ComponentContext) {
        let mut inner = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                // Re-entered while the plugin is waiting on a call of its own
                tracing::trace!(
                    component = %self.info.string_id,
                    msg_type = message.msg_type,
                    "Queueing re-entrant delivery"
                );
                self.pending().push_back(message);
                return;
            }
        };

        inner.handle(message, ctx);
        loop {
            if self.deregister_pending.swap(false, Ordering::SeqCst) {
                inner.on_deregistered();
                return;
            }
            let next = self.pending().pop_front();
            let Some(message) = next else { break };
            inner.handle(message, ctx);
        }
        drop(inner);
        self.finish_deferred_deregistration();
    }

    fn on_registered(&self, ctx: &ComponentContext) {
        tracing::debug!(
            component = %self.info.string_id,
            id = ctx.id(),
            path = %self.path.display(),
            "Plugin component started"
        );
        self.inner().on_registered(ctx);
    }

    fn on_deregistered(&self) {
        let dropped = {
            let mut pending = self.pending();
            let dropped = pending.len();
            pending.clear();
            dropped
        };
        // The handler holding `inner` may be waiting on whoever removes us
        match self.inner.try_lock() {
            Ok(mut inner) => inner.on_deregistered(),
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().on_deregistered(),
            Err(TryLockError::WouldBlock) => {
                self.deregister_pending.store(true, Ordering::SeqCst);
                self.finish_deferred_deregistration();
            }
        }
        tracing::debug!(component = %self.info.string_id, dropped, "Plugin component stopped");
    }
}
