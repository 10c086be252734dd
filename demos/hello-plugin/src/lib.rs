//! Hello Plugin - A simple example plugin for imehub
//!
//! This plugin demonstrates:
//! - Exporting a module with the `export_plugin!` macro
//! - Providing more than one component from one file
//! - Answering key events and pushing composition updates to the caller
//!
//! ## Building
//!
//! ```bash
//! cargo build --release
//! ```
//!
//! ## Installing
//!
//! ```bash
//! mkdir -p ~/.config/imehub/plugins/hello
//! cp target/release/libhello_plugin.so ~/.config/imehub/plugins/hello/
//! imehub run --engine com.imehub.demo.shout
//! ```

use imehub_plugin_api::message_types::{
    MSG_CANDIDATE_LIST_CHANGED, MSG_COMPOSITION_CHANGED, MSG_INSERT_TEXT, MSG_PLUGIN_CHANGED,
    MSG_SEND_KEY_EVENT,
};
use imehub_plugin_api::{
    ComponentContext, ComponentInfo, Message, MessagePayload, PluginComponent, PluginError,
    PluginModule, export_plugin,
};

const SHOUT_ID: &str = "com.imehub.demo.shout";
const WATCHER_ID: &str = "com.imehub.demo.watcher";

const KEY_RETURN: i64 = 0x0d;
const KEY_BACKSPACE: i64 = 0x08;

/// Module exporting both demo components
#[derive(Default)]
pub struct HelloModule;

impl PluginModule for HelloModule {
    fn components(&self) -> Vec<ComponentInfo> {
        vec![Shout::default().info(), Watcher::default().info()]
    }

    fn create(&self, string_id: &str) -> Result<Box<dyn PluginComponent>, PluginError> {
        match string_id {
            SHOUT_ID => Ok(Box::new(Shout::default())),
            WATCHER_ID => Ok(Box::new(Watcher::default())),
            other => Err(PluginError::unknown_component(other)),
        }
    }
}

/// Engine that composes typed letters and offers them shouted or not
#[derive(Default)]
pub struct Shout {
    composition: String,
}

impl Shout {
    fn push_to(
        &self,
        ctx: &ComponentContext,
        request: &Message,
        msg_type: u32,
        payload: MessagePayload,
    ) {
        let message = Message::new(msg_type, request.source)
            .with_icid(request.icid)
            .with_payload(payload);
        if let Err(e) = ctx.send(message) {
            eprintln!("hello-plugin: failed to notify frontend: {e}");
        }
    }

    fn key(&mut self, request: &Message, ctx: &ComponentContext) -> bool {
        let keycode = request.payload.integer(0).unwrap_or_default();
        match keycode {
            KEY_RETURN if !self.composition.is_empty() => {
                let text = self.composition.to_uppercase();
                self.composition.clear();
                self.push_to(ctx, request, MSG_INSERT_TEXT, MessagePayload::new().with(text));
                true
            }
            KEY_BACKSPACE if !self.composition.is_empty() => {
                self.composition.pop();
                self.update(request, ctx);
                true
            }
            code => match u32::try_from(code).ok().and_then(char::from_u32) {
                Some(ch) if ch.is_alphabetic() => {
                    self.composition.push(ch);
                    self.update(request, ctx);
                    true
                }
                _ => false,
            },
        }
    }

    fn update(&self, request: &Message, ctx: &ComponentContext) {
        self.push_to(
            ctx,
            request,
            MSG_COMPOSITION_CHANGED,
            MessagePayload::new().with(self.composition.as_str()),
        );
        let candidates = MessagePayload::new()
            .with(self.composition.to_uppercase())
            .with(self.composition.to_lowercase());
        self.push_to(ctx, request, MSG_CANDIDATE_LIST_CHANGED, candidates);
    }
}

impl PluginComponent for Shout {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(SHOUT_ID)
            .with_name("Shout")
            .consumes_messages([MSG_SEND_KEY_EVENT])
            .produces_messages([
                MSG_COMPOSITION_CHANGED,
                MSG_CANDIDATE_LIST_CHANGED,
                MSG_INSERT_TEXT,
            ])
    }

    fn handle(&mut self, message: Message, ctx: &ComponentContext) {
        if message.msg_type != MSG_SEND_KEY_EVENT {
            return;
        }
        let handled = self.key(&message, ctx);
        if message.needs_reply()
            && let Err(e) = ctx.reply(&message, MessagePayload::new().with(handled))
        {
            eprintln!("hello-plugin: failed to reply: {e}");
        }
    }

    fn on_deregistered(&mut self) {
        self.composition.clear();
    }
}

/// Counts plugin set changes announced on the bus
#[derive(Default)]
pub struct Watcher {
    changes: u32,
}

impl PluginComponent for Watcher {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(WATCHER_ID)
            .with_name("Plugin Watcher")
            .consumes_messages([MSG_PLUGIN_CHANGED])
    }

    fn handle(&mut self, message: Message, _ctx: &ComponentContext) {
        if message.msg_type == MSG_PLUGIN_CHANGED {
            self.changes += 1;
            println!("hello-plugin: plugin set changed ({} so far)", self.changes);
        }
    }
}

export_plugin!(HelloModule);
