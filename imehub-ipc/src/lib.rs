//! imehub-ipc - typed message bus for input method components
//!
//! Components register with a [`ComponentHost`], receive an id and exchange
//! [`Message`]s routed by target id and message type. A message either flows
//! one way, asks for a reply, or answers an earlier request.
//!
//! ```ignore
//! use imehub_ipc::{ComponentHost, MultiComponentHost};
//!
//! let host = MultiComponentHost::new()?;
//! let id = host.add_component(my_component)?;
//! ```

pub mod component;
pub mod error;
pub mod host;
pub mod message;
pub mod message_cache;
pub mod message_types;
pub mod multi_host;

pub use component::{Component, ComponentContext, ComponentInfo};
pub use error::HostError;
pub use host::ComponentHost;
pub use message::{
    COMPONENT_BROADCAST, COMPONENT_DEFAULT, ComponentId, INPUT_CONTEXT_NONE, InputContextId,
    Message, MessagePayload, MessageType, ReplyMode, Variable,
};
pub use message_cache::{Admission, MessageCache};
pub use multi_host::MultiComponentHost;
