//! Message value type
//!
//! A [`Message`] is moved at every hand-off: the sender gives it to the host,
//! the host queues it and finally moves it into the receiver's `handle`.
//! Broadcast is the only place a message is cloned (once per recipient).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::component::ComponentInfo;

/// Numeric handle of a registered component, valid for one host session only
pub type ComponentId = u32;

/// Open integer tag identifying what a message means
pub type MessageType = u32;

/// Correlation key grouping the messages of one input context
pub type InputContextId = u32;

/// Reserved id that is never assigned to a registered component
pub const COMPONENT_DEFAULT: ComponentId = 0;

/// Target sentinel: deliver to every component consuming the message type
pub const COMPONENT_BROADCAST: ComponentId = u32::MAX;

/// Message is not bound to any input context
pub const INPUT_CONTEXT_NONE: InputContextId = 0;

/// How a message participates in request/reply correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    /// Fire-and-forget
    #[default]
    NoReply,
    /// The sender expects an `IsReply` message carrying the same serial
    NeedReply,
    /// Answer to an earlier `NeedReply` message
    IsReply,
}

/// A single payload value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Variable {
    String(String),
    Boolean(bool),
    Integer(i64),
    /// Nested structured record
    Record(BTreeMap<String, Variable>),
    ComponentInfo(ComponentInfo),
}

impl From<&str> for Variable {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Variable {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for Variable {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Variable {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<ComponentInfo> for Variable {
    fn from(value: ComponentInfo) -> Self {
        Self::ComponentInfo(value)
    }
}

/// Ordered list of payload values
///
/// The typed accessors index within one kind: `string(1)` is the second
/// string in the payload regardless of what sits between the strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessagePayload {
    values: Vec<Variable>,
}

impl MessagePayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, builder style
    pub fn with(mut self, value: impl Into<Variable>) -> Self {
        self.values.push(value.into());
        self
    }

    pub fn push(&mut self, value: impl Into<Variable>) {
        self.values.push(value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Variable] {
        &self.values
    }

    pub fn strings(&self) -> impl Iterator<Item = &str> {
        self.values.iter().filter_map(|v| match v {
            Variable::String(s) => Some(s.as_str()),
            _ => None,
        })
    }

    pub fn booleans(&self) -> impl Iterator<Item = bool> + '_ {
        self.values.iter().filter_map(|v| match v {
            Variable::Boolean(b) => Some(*b),
            _ => None,
        })
    }

    pub fn integers(&self) -> impl Iterator<Item = i64> + '_ {
        self.values.iter().filter_map(|v| match v {
            Variable::Integer(i) => Some(*i),
            _ => None,
        })
    }

    pub fn records(&self) -> impl Iterator<Item = &BTreeMap<String, Variable>> {
        self.values.iter().filter_map(|v| match v {
            Variable::Record(r) => Some(r),
            _ => None,
        })
    }

    pub fn component_infos(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.values.iter().filter_map(|v| match v {
            Variable::ComponentInfo(info) => Some(info),
            _ => None,
        })
    }

    pub fn string(&self, index: usize) -> Option<&str> {
        self.strings().nth(index)
    }

    pub fn boolean(&self, index: usize) -> Option<bool> {
        self.booleans().nth(index)
    }

    pub fn integer(&self, index: usize) -> Option<i64> {
        self.integers().nth(index)
    }

    pub fn record(&self, index: usize) -> Option<&BTreeMap<String, Variable>> {
        self.records().nth(index)
    }
}

/// A typed message routed by a component host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub msg_type: MessageType,
    /// Stamped by the host from the sending component's context
    pub source: ComponentId,
    /// A registered component id or [`COMPONENT_BROADCAST`]
    pub target: ComponentId,
    pub icid: InputContextId,
    pub reply_mode: ReplyMode,
    /// Correlation number; for `IsReply` it echoes the request's serial
    pub serial: u32,
    pub payload: MessagePayload,
}

impl Message {
    /// Create a fire-and-forget message with no input context and empty payload
    pub fn new(msg_type: MessageType, target: ComponentId) -> Self {
        Self {
            msg_type,
            source: COMPONENT_DEFAULT,
            target,
            icid: INPUT_CONTEXT_NONE,
            reply_mode: ReplyMode::NoReply,
            serial: 0,
            payload: MessagePayload::default(),
        }
    }

    /// Create a message addressed to every consumer of `msg_type`
    pub fn broadcast(msg_type: MessageType) -> Self {
        Self::new(msg_type, COMPONENT_BROADCAST)
    }

    pub fn with_icid(mut self, icid: InputContextId) -> Self {
        self.icid = icid;
        self
    }

    pub fn with_payload(mut self, payload: MessagePayload) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_reply_mode(mut self, reply_mode: ReplyMode) -> Self {
        self.reply_mode = reply_mode;
        self
    }

    /// Build the `IsReply` answer to this message.
    ///
    /// Source and target are swapped, type, icid and serial are kept and
    /// the payload starts empty.
    pub fn reply(&self) -> Message {
        Self {
            msg_type: self.msg_type,
            source: self.target,
            target: self.source,
            icid: self.icid,
            reply_mode: ReplyMode::IsReply,
            serial: self.serial,
            payload: MessagePayload::default(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.target == COMPONENT_BROADCAST
    }

    pub fn needs_reply(&self) -> bool {
        self.reply_mode == ReplyMode::NeedReply
    }

    pub fn is_reply(&self) -> bool {
        self.reply_mode == ReplyMode::IsReply
    }
}
