//! Error types for message routing

use std::time::Duration;

use thiserror::Error;

use crate::message::{ComponentId, MessageType};

/// Errors surfaced by a component host
///
/// Every variant is recovered by the caller; none of them means the host
/// itself is broken except [`HostError::HostShutdown`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    /// A component with the same string id is already registered
    #[error("Component '{string_id}' is already registered")]
    DuplicateComponent { string_id: String },

    /// Component info carried an empty string id
    #[error("Component info has an empty string id")]
    EmptyStringId,

    /// No registered component has this id
    #[error("Unknown component: {0}")]
    UnknownComponent(ComponentId),

    /// The addressed component is not registered
    #[error("Target component {target} is unreachable")]
    UnreachableTarget { target: ComponentId },

    /// The addressed component does not consume this message type
    #[error("Component {target} does not consume message type {msg_type:#06x}")]
    NotConsumed {
        target: ComponentId,
        msg_type: MessageType,
    },

    /// A broadcast cannot be answered by a single reply
    #[error("Broadcast message type {msg_type:#06x} cannot request a reply")]
    BroadcastWithReply { msg_type: MessageType },

    /// No reply arrived before the deadline
    #[error("No reply for serial {serial} within {timeout:?}")]
    Timeout { serial: u32, timeout: Duration },

    /// The other end went away while a call was outstanding
    #[error("Channel disconnected while waiting for reply to serial {serial}")]
    Disconnected { serial: u32 },

    /// The host has been shut down or dropped
    #[error("Component host has shut down")]
    HostShutdown,
}

impl HostError {
    /// Whether a caller must discard its session-scoped state.
    ///
    /// A timeout is cleaned up exactly like a disconnection.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Disconnected { .. } | Self::HostShutdown
        )
    }
}
