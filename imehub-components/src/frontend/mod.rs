//! Frontend component
//!
//! The frontend sends each key to an engine with a blocking call. While it
//! waits, the engine may already push composition and candidate updates for
//! that key; those are held in a [`MessageCache`](imehub_ipc::MessageCache)
//! and handled after the reply, in arrival order.

mod component;

pub use component::{FRONTEND_STRING_ID, FrontendComponent, FrontendDelegate, MSG_FRONTEND_KEY_EVENT};
