//! Deferral of messages that arrive during an outstanding call
//!
//! While a component waits for a reply it can still receive messages from
//! the component it is waiting on. Some of those only make sense after the
//! reply has been processed, so they are queued here and released in
//! arrival order once the call completes.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::message::{Message, MessageType};

/// What to do with an inbound message
#[derive(Debug, PartialEq)]
pub enum Admission {
    /// Handle it now
    Dispatch(Message),
    /// Queued until the outstanding call finishes
    Deferred,
    /// A session-ending message arrived while others were queued. Handle
    /// `drained` first, then `message`. During a call, queued call types
    /// are not drained and stay queued.
    Flush {
        drained: Vec<Message>,
        message: Message,
    },
}

#[derive(Default)]
struct CacheState {
    /// Calls in flight; nested calls stack
    outstanding: usize,
    queue: VecDeque<Message>,
}

/// Per-component deferral queue
pub struct MessageCache {
    deferred: HashSet<MessageType>,
    session_end: HashSet<MessageType>,
    call_types: HashSet<MessageType>,
    state: Mutex<CacheState>,
}

impl MessageCache {
    /// Defer messages of the given types while a call is outstanding
    pub fn new(deferred: impl IntoIterator<Item = MessageType>) -> Self {
        Self {
            deferred: deferred.into_iter().collect(),
            session_end: HashSet::new(),
            call_types: HashSet::new(),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Types that close a session. Arriving with a non-empty queue they
    /// release everything queued ahead of themselves.
    pub fn with_session_end(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.session_end.extend(types);
        self
    }

    /// Types whose handling starts a call of its own. A flush during an
    /// outstanding call leaves them queued for the drain after the reply.
    pub fn with_call_types(mut self, types: impl IntoIterator<Item = MessageType>) -> Self {
        self.call_types.extend(types);
        self
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Decide whether `message` is handled now or queued
    pub fn admit(&self, message: Message) -> Admission {
        let mut state = self.lock();

        if self.session_end.contains(&message.msg_type) && !state.queue.is_empty() {
            let queued = std::mem::take(&mut state.queue);
            let (kept, drained): (VecDeque<_>, VecDeque<_>) = if state.outstanding > 0 {
                queued
                    .into_iter()
                    .partition(|m| self.call_types.contains(&m.msg_type))
            } else {
                (VecDeque::new(), queued)
            };
            state.queue = kept;
            return Admission::Flush {
                drained: drained.into(),
                message,
            };
        }

        if self.deferred.contains(&message.msg_type)
            && (state.outstanding > 0 || !state.queue.is_empty())
        {
            tracing::trace!(msg_type = message.msg_type, "Deferring message");
            state.queue.push_back(message);
            return Admission::Deferred;
        }

        Admission::Dispatch(message)
    }

    /// Mark a call as outstanding
    pub fn begin_call(&self) {
        self.lock().outstanding += 1;
    }

    /// Mark the innermost call finished. Deferred messages stay queued until
    /// taken with [`next_deferred`](Self::next_deferred).
    pub fn finish_call(&self) {
        let mut state = self.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
    }

    /// Take the oldest deferred message.
    ///
    /// Returns `None` while a call is outstanding, so a call started from a
    /// drained message leaves the rest of the queue to its own drain and
    /// arrival order is kept.
    pub fn next_deferred(&self) -> Option<Message> {
        let mut state = self.lock();
        if state.outstanding > 0 {
            return None;
        }
        state.queue.pop_front()
    }

    /// Discard all deferred messages. Returns how many were dropped.
    pub fn reset(&self) -> usize {
        let mut state = self.lock();
        state.outstanding = 0;
        let dropped = state.queue.len();
        state.queue.clear();
        dropped
    }

    pub fn is_outstanding(&self) -> bool {
        self.lock().outstanding > 0
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
