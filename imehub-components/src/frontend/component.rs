//! FrontendComponent - forwards keys to an engine and tracks its output

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use imehub_ipc::message_types::{
    MSG_CANDIDATE_LIST_CHANGED, MSG_COMPOSITION_CHANGED, MSG_INSERT_TEXT, MSG_SEND_KEY_EVENT,
    MSG_USER_DEFINED_START,
};
use imehub_ipc::{
    Admission, Component, ComponentContext, ComponentInfo, HostError, INPUT_CONTEXT_NONE,
    InputContextId, Message, MessageCache, MessagePayload, MessageType,
};

/// Stable string id of the frontend component
pub const FRONTEND_STRING_ID: &str = "com.imehub.frontend";

/// Self-addressed key event; payload is one integer key code
pub const MSG_FRONTEND_KEY_EVENT: MessageType = MSG_USER_DEFINED_START + 0x0100;

/// Receives what the frontend would show to the user.
///
/// Every callback runs on the host's dispatch thread.
pub trait FrontendDelegate: Send + Sync {
    fn composition_changed(&self, composition: &str);

    fn candidates_changed(&self, candidates: &[String]);

    fn insert_text(&self, text: &str);

    /// The engine answered the key event
    fn key_processed(&self, keycode: i64, handled: bool);

    /// The session was dropped after a timeout or disconnection
    fn session_reset(&self);
}

#[derive(Debug, Default)]
struct Session {
    icid: InputContextId,
    composition: String,
    candidates: Vec<String>,
}

/// Frontend bound to one engine, identified by string id
pub struct FrontendComponent {
    engine: String,
    call_timeout: Option<Duration>,
    delegate: Arc<dyn FrontendDelegate>,
    cache: MessageCache,
    session: Mutex<Session>,
    next_icid: Mutex<InputContextId>,
    context: Mutex<Option<ComponentContext>>,
}

impl FrontendComponent {
    pub fn new(engine: impl Into<String>, delegate: Arc<dyn FrontendDelegate>) -> Self {
        Self {
            engine: engine.into(),
            call_timeout: None,
            delegate,
            cache: MessageCache::new([
                MSG_COMPOSITION_CHANGED,
                MSG_CANDIDATE_LIST_CHANGED,
                MSG_FRONTEND_KEY_EVENT,
            ])
            .with_session_end([MSG_INSERT_TEXT])
            .with_call_types([MSG_FRONTEND_KEY_EVENT]),
            session: Mutex::new(Session::default()),
            next_icid: Mutex::new(1),
            context: Mutex::new(None),
        }
    }

    /// Give up on a key round trip after `timeout`
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn context(&self) -> Result<ComponentContext, HostError> {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(HostError::HostShutdown)
    }

    /// Queue a key for processing on the dispatch thread
    pub fn inject_key(&self, keycode: i64) -> Result<(), HostError> {
        let ctx = self.context()?;
        let message = Message::new(MSG_FRONTEND_KEY_EVENT, ctx.id())
            .with_payload(MessagePayload::new().with(keycode));
        ctx.send(message)?;
        Ok(())
    }

    /// Current input context, or `INPUT_CONTEXT_NONE` between sessions
    pub fn icid(&self) -> InputContextId {
        self.session().icid
    }

    pub fn composition(&self) -> String {
        self.session().composition.clone()
    }

    pub fn candidates(&self) -> Vec<String> {
        self.session().candidates.clone()
    }

    /// Whether a key round trip is in flight
    pub fn is_waiting(&self) -> bool {
        self.cache.is_outstanding()
    }

    fn ensure_session(&self) -> InputContextId {
        let mut session = self.session();
        if session.icid == INPUT_CONTEXT_NONE {
            let mut next = self.next_icid.lock().unwrap_or_else(PoisonError::into_inner);
            session.icid = *next;
            *next += 1;
            tracing::debug!(icid = session.icid, "Input session started");
        }
        session.icid
    }

    fn is_current(&self, icid: InputContextId) -> bool {
        let current = self.session().icid;
        current != INPUT_CONTEXT_NONE && current == icid
    }

    fn process_key(&self, keycode: i64, ctx: &ComponentContext) {
        let Some(engine) = ctx.query_component(&self.engine) else {
            tracing::warn!(engine = %self.engine, keycode, "No engine registered");
            self.delegate.key_processed(keycode, false);
            return;
        };

        let icid = self.ensure_session();
        let request = Message::new(MSG_SEND_KEY_EVENT, engine.id)
            .with_icid(icid)
            .with_payload(MessagePayload::new().with(keycode));

        self.cache.begin_call();
        match ctx.send_with_reply(request, self.call_timeout) {
            Ok(reply) => {
                self.cache.finish_call();
                let handled = reply.payload.boolean(0).unwrap_or(false);
                self.delegate.key_processed(keycode, handled);
                self.drain(ctx);
            }
            Err(e) if e.is_disconnect() => {
                tracing::warn!(engine = %self.engine, error = %e, "Engine went away during key event");
                self.reset();
            }
            Err(e) => {
                tracing::warn!(engine = %self.engine, error = %e, "Key event not delivered");
                self.cache.finish_call();
                self.delegate.key_processed(keycode, false);
                self.drain(ctx);
            }
        }
    }

    fn drain(&self, ctx: &ComponentContext) {
        while let Some(message) = self.cache.next_deferred() {
            self.dispatch(message, ctx);
        }
    }

    /// Back to baseline; nothing from the dead session is replayed
    fn reset(&self) {
        let dropped = self.cache.reset();
        *self.session() = Session::default();
        tracing::info!(dropped, "Frontend session reset");
        self.delegate.session_reset();
    }

    fn dispatch(&self, message: Message, ctx: &ComponentContext) {
        match message.msg_type {
            MSG_FRONTEND_KEY_EVENT => {
                let keycode = message.payload.integer(0).unwrap_or_default();
                self.process_key(keycode, ctx);
            }
            MSG_COMPOSITION_CHANGED if self.is_current(message.icid) => {
                let composition = message.payload.string(0).unwrap_or_default().to_string();
                self.session().composition = composition.clone();
                self.delegate.composition_changed(&composition);
            }
            MSG_CANDIDATE_LIST_CHANGED if self.is_current(message.icid) => {
                let candidates: Vec<String> =
                    message.payload.strings().map(str::to_string).collect();
                self.session().candidates = candidates.clone();
                self.delegate.candidates_changed(&candidates);
            }
            MSG_INSERT_TEXT if self.is_current(message.icid) => {
                let text = message.payload.string(0).unwrap_or_default().to_string();
                {
                    let mut session = self.session();
                    session.composition.clear();
                    session.candidates.clear();
                }
                self.delegate.insert_text(&text);
            }
            MSG_COMPOSITION_CHANGED | MSG_CANDIDATE_LIST_CHANGED | MSG_INSERT_TEXT => {
                tracing::debug!(
                    msg_type = message.msg_type,
                    icid = message.icid,
                    "Ignoring message for another session"
                );
            }
            other => tracing::debug!(msg_type = other, "Ignoring unexpected message"),
        }
    }
}

impl Component for FrontendComponent {
    fn info(&self) -> ComponentInfo {
        ComponentInfo::new(FRONTEND_STRING_ID)
            .with_name("Frontend")
            .produces_messages([MSG_SEND_KEY_EVENT, MSG_FRONTEND_KEY_EVENT])
            .consumes_messages([
                MSG_FRONTEND_KEY_EVENT,
                MSG_COMPOSITION_CHANGED,
                MSG_CANDIDATE_LIST_CHANGED,
                MSG_INSERT_TEXT,
            ])
    }

    fn handle(&self, message: Message, ctx: &ComponentContext) {
        match self.cache.admit(message) {
            Admission::Dispatch(message) => self.dispatch(message, ctx),
            Admission::Deferred => {}
            Admission::Flush { drained, message } => {
                for earlier in drained {
                    self.dispatch(earlier, ctx);
                }
                self.dispatch(message, ctx);
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
        self.cache.reset();
        *self.session() = Session::default();
    }
}
