//! The routing contract components are registered with

use std::sync::Arc;
use std::time::Duration;

use crate::component::{Component, ComponentInfo};
use crate::error::HostError;
use crate::message::{ComponentId, Message};

/// Registry and router for components.
///
/// Implementations assign ids, route messages by target and type, correlate
/// request/reply pairs and report the disappearance of an awaited
/// component as a disconnection.
pub trait ComponentHost: Send + Sync {
    /// Register a component and return its newly assigned id.
    ///
    /// Ids are never reused within one host session.
    fn add_component(&self, component: Arc<dyn Component>) -> Result<ComponentId, HostError>;

    /// Deregister a component.
    ///
    /// Undelivered messages addressed to it are dropped and every call
    /// waiting on it resolves as disconnected.
    fn remove_component(&self, id: ComponentId) -> Result<(), HostError>;

    /// Route a message without waiting; returns the serial it was stamped with
    fn send(&self, source: ComponentId, message: Message) -> Result<u32, HostError>;

    /// Route a message and block until its reply arrives.
    ///
    /// While blocked on the dispatch thread, other deliveries keep flowing,
    /// including reentrant deliveries to the caller itself.
    fn send_with_reply(
        &self,
        source: ComponentId,
        message: Message,
        timeout: Option<Duration>,
    ) -> Result<Message, HostError>;

    /// Hold new deliveries to `id` until a matching resume. Nests.
    fn pause_message_handling(&self, id: ComponentId) -> Result<(), HostError>;

    fn resume_message_handling(&self, id: ComponentId) -> Result<(), HostError>;

    /// Look up a registered component by its stable string id
    fn query_component(&self, string_id: &str) -> Option<ComponentInfo>;

    /// All registered components, in registration order
    fn components(&self) -> Vec<ComponentInfo>;
}
