//! PluginManagerComponent - the plugin manager's presence on the message bus

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};

use imehub_ipc::message_types::{
    MSG_PLUGIN_CHANGED, MSG_PLUGIN_INSTALLED, MSG_PLUGIN_QUERY_COMPONENTS,
    MSG_PLUGIN_START_COMPONENTS, MSG_PLUGIN_STOP_COMPONENTS, MSG_PLUGIN_UNLOAD,
};
use imehub_ipc::{Component, ComponentContext, ComponentInfo, Message, MessagePayload};

use super::manager::{PluginManager, PluginManagerDelegate};

/// Stable string id of the plugin manager component
pub const PLUGIN_MANAGER_STRING_ID: &str = "com.imehub.plugin_manager";

/// Answers plugin requests from other components and broadcasts
/// `MSG_PLUGIN_CHANGED` whenever its manager reports a change.
///
/// Build it first, hand it to [`PluginManager::new`] as the delegate, then
/// [`attach`](Self::attach) the manager and register it with the host.
#[derive(Default)]
pub struct PluginManagerComponent {
    manager: OnceLock<Weak<PluginManager>>,
    context: Mutex<Option<ComponentContext>>,
}

impl PluginManagerComponent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind the manager this component fronts. Later calls are ignored.
    pub fn attach(&self, manager: &Arc<PluginManager>) {
        if self.manager.set(Arc::downgrade(manager)).is_err() {
            tracing::warn!("Plugin manager component is already attached");
        }
    }

    fn manager(&self) -> Option<Arc<PluginManager>> {
        self.manager.get()?.upgrade()
    }

    fn context(&self) -> Option<ComponentContext> {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn answer(&self, request: &Message, ctx: &ComponentContext, payload: MessagePayload) {
        if !request.needs_reply() {
            return;
        }
        if let Err(e) = ctx.reply(request, payload) {
            tracing::warn!(
                msg_type = request.msg_type,
                error = %e,
                "Failed to reply to plugin request"
            );
        }
    }
}

impl Component for PluginManagerComponent {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(PLUGIN_MANAGER_STRING_ID)
            .with_name("Plugin Manager")
            .consumes_messages([
                MSG_PLUGIN_QUERY_COMPONENTS,
                MSG_PLUGIN_START_COMPONENTS,
                MSG_PLUGIN_STOP_COMPONENTS,
                MSG_PLUGIN_UNLOAD,
                MSG_PLUGIN_INSTALLED,
            ])
            .produces_messages([MSG_PLUGIN_CHANGED])
    }

    fn handle(&self, message: Message, ctx: &ComponentContext) {
        let Some(manager) = self.manager() else {
            tracing::warn!(msg_type = message.msg_type, "No plugin manager attached");
            self.answer(&message, ctx, MessagePayload::new());
            return;
        };

        match message.msg_type {
            MSG_PLUGIN_QUERY_COMPONENTS => {
                let mut payload = MessagePayload::new();
                for info in manager.components() {
                    payload.push(info);
                }
                self.answer(&message, ctx, payload);
            }
            MSG_PLUGIN_START_COMPONENTS => {
                let mut payload = MessagePayload::new();
                for string_id in message.payload.strings() {
                    let result = manager.start_component(string_id);
                    if let Err(e) = &result {
                        tracing::warn!(component = %string_id, error = %e, "Start request failed");
                    }
                    payload.push(result.is_ok());
                }
                self.answer(&message, ctx, payload);
            }
            MSG_PLUGIN_STOP_COMPONENTS => {
                let mut payload = MessagePayload::new();
                for string_id in message.payload.strings() {
                    payload.push(manager.stop_component(string_id).is_ok());
                }
                self.answer(&message, ctx, payload);
            }
            MSG_PLUGIN_UNLOAD => {
                let unloaded = match message.payload.string(0) {
                    Some(path) => manager.unload_plugin(Path::new(path)).is_ok(),
                    None => false,
                };
                self.answer(&message, ctx, MessagePayload::new().with(unloaded));
            }
            MSG_PLUGIN_INSTALLED => {
                tracing::info!(
                    files = message.payload.strings().count(),
                    "Plugin installation reported"
                );
                manager.plugin_changed();
                self.answer(&message, ctx, MessagePayload::new());
            }
            other => {
                tracing::debug!(msg_type = other, "Ignoring unexpected message");
            }
        }
    }

    fn on_registered(&self, ctx: &ComponentContext) {
        *self.context.lock().unwrap_or_else(PoisonError::into_inner) = Some(ctx.clone());
    }

    fn on_deregistered(&self) {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl PluginManagerDelegate for PluginManagerComponent {
    fn plugin_components_changed(&self) {
        let Some(ctx) = self.context() else {
            tracing::debug!("Plugin set changed before registration");
            return;
        };
        if let Err(e) = ctx.send(Message::broadcast(MSG_PLUGIN_CHANGED)) {
            tracing::warn!(error = %e, "Failed to broadcast plugin change");
        }
    }
}
