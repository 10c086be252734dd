//! Component capability contract
//!
//! A [`Component`] is an addressable unit of behavior. It describes itself
//! with a [`ComponentInfo`], receives messages through [`Component::handle`]
//! and talks back to the bus through the [`ComponentContext`] handed to it.

use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::host::ComponentHost;
use crate::message::{ComponentId, Message, MessagePayload, MessageType};

/// Self-description of a component
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    /// Name that stays stable across restarts and reloads
    pub string_id: String,
    /// Human-readable name
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Message types this component sends
    #[serde(default)]
    pub produce_message: Vec<MessageType>,
    /// Message types this component accepts
    #[serde(default)]
    pub consume_message: Vec<MessageType>,
    /// Languages served, e.g. `zh-CN`
    #[serde(default)]
    pub language: Vec<String>,
    /// Numeric handle assigned by the host; reassigned on every (re)start
    #[serde(default)]
    pub id: ComponentId,
}

impl ComponentInfo {
    pub fn new(string_id: impl Into<String>) -> Self {
        Self {
            string_id: string_id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn produces_messages(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.produce_message.extend(types);
        self
    }

    pub fn consumes_messages(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.consume_message.extend(types);
        self
    }

    pub fn consumes(&self, msg_type: MessageType) -> bool {
        self.consume_message.contains(&msg_type)
    }

    pub fn produces(&self, msg_type: MessageType) -> bool {
        self.produce_message.contains(&msg_type)
    }
}

/// A unit of behavior registered with a [`ComponentHost`].
///
/// `handle` always runs on the host's dispatch thread. It may be entered
/// again while an earlier invocation is still blocked in
/// [`ComponentContext::send_with_reply`], so implementations keep their
/// state behind interior mutability and never hold a lock across a call.
pub trait Component: Send + Sync {
    /// Describe this component. Called once at registration.
    fn info(&self) -> ComponentInfo;

    /// Handle one inbound message. Ownership of the message moves here.
    fn handle(&self, message: Message, ctx: &ComponentContext);

    /// Called after the host has assigned an id
    fn on_registered(&self, _ctx: &ComponentContext) {}

    /// Called after the component has been removed from the host
    fn on_deregistered(&self) {}
}

/// A registered component's handle to its host
#[derive(Clone)]
pub struct ComponentContext {
    id: ComponentId,
    host: Weak<dyn ComponentHost>,
}

impl std::fmt::Debug for ComponentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentContext")
            .field("id", &self.id)
            .field("host_alive", &(self.host.strong_count() > 0))
            .finish()
    }
}

impl ComponentContext {
    pub fn new(id: ComponentId, host: Weak<dyn ComponentHost>) -> Self {
        Self { id, host }
    }

    /// Id assigned to this component for the current host session
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Upgrade to the owning host
    pub fn host(&self) -> Result<Arc<dyn ComponentHost>, HostError> {
        self.host.upgrade().ok_or(HostError::HostShutdown)
    }

    /// One-way send; returns the serial stamped on the message
    pub fn send(&self, message: Message) -> Result<u32, HostError> {
        self.host()?.send(self.id, message)
    }

    /// Blocking request/reply. `None` waits without a deadline.
    pub fn send_with_reply(
        &self,
        message: Message,
        timeout: Option<Duration>,
    ) -> Result<Message, HostError> {
        self.host()?.send_with_reply(self.id, message, timeout)
    }

    /// Answer `request` with `payload`
    pub fn reply(&self, request: &Message, payload: MessagePayload) -> Result<u32, HostError> {
        self.send(request.reply().with_payload(payload))
    }

    pub fn pause_message_handling(&self) -> Result<(), HostError> {
        self.host()?.pause_message_handling(self.id)
    }

    pub fn resume_message_handling(&self) -> Result<(), HostError> {
        self.host()?.resume_message_handling(self.id)
    }

    /// Look up a registered component by its stable string id
    pub fn query_component(&self, string_id: &str) -> Option<ComponentInfo> {
        self.host.upgrade()?.query_component(string_id)
    }

    /// Deregister this component from its host
    pub fn remove_from_host(&self) -> Result<(), HostError> {
        self.host()?.remove_component(self.id)
    }
}
