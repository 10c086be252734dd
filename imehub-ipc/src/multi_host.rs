//! MultiComponentHost - in-process registry and router
//!
//! Every delivery goes through one FIFO queue drained by a single dispatch
//! thread. A reply or a disconnection is queued like any other delivery, so
//! a caller always sees the messages sent to it before its reply arrived.
//!
//! A call to [`ComponentHost::send_with_reply`] made on the dispatch thread
//! keeps draining the queue while it waits. That is what lets an engine
//! message the frontend that is currently blocked on a call to the engine.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::component::{Component, ComponentContext, ComponentInfo};
use crate::error::HostError;
use crate::host::ComponentHost;
use crate::message::{ComponentId, Message, ReplyMode};

struct Registered {
    component: Arc<dyn Component>,
    info: ComponentInfo,
    context: ComponentContext,
    /// Nesting depth of pause requests
    paused: u32,
    /// Deliveries received while paused, in arrival order
    held: VecDeque<Message>,
}

enum Delivery {
    Message { to: ComponentId, message: Message },
    Reply(Message),
    Disconnect { serial: u32 },
}

enum CallState {
    Waiting,
    Replied(Message),
    Disconnected,
}

struct PendingCall {
    caller: ComponentId,
    target: ComponentId,
    state: CallState,
}

struct HostState {
    /// Keyed by id; ids only grow so iteration is registration order
    components: BTreeMap<ComponentId, Registered>,
    string_ids: HashMap<String, ComponentId>,
    next_id: ComponentId,
    queue: VecDeque<Delivery>,
    pending: HashMap<u32, PendingCall>,
    /// Handlers currently executing
    active: usize,
    running: bool,
}

struct Dispatch {
    component: Arc<dyn Component>,
    context: ComponentContext,
    message: Message,
}

struct HostCore {
    state: Mutex<HostState>,
    wakeup: Condvar,
    next_serial: AtomicU32,
    dispatch_thread: OnceLock<ThreadId>,
}

impl HostCore {
    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(
        &self,
        guard: MutexGuard<'a, HostState>,
        deadline: Option<Instant>,
    ) -> MutexGuard<'a, HostState> {
        match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                self.wakeup
                    .wait_timeout(guard, remaining)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .wakeup
                .wait(guard)
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn on_dispatch_thread(&self) -> bool {
        self.dispatch_thread.get() == Some(&std::thread::current().id())
    }

    fn next_serial(&self) -> u32 {
        // Zero is left for messages that were never routed
        loop {
            let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
            if serial != 0 {
                return serial;
            }
        }
    }

    /// Validate and queue a non-reply message. Returns its serial.
    fn enqueue(
        &self,
        state: &mut HostState,
        source: ComponentId,
        mut message: Message,
    ) -> Result<u32, HostError> {
        if !state.running {
            return Err(HostError::HostShutdown);
        }
        if !state.components.contains_key(&source) {
            return Err(HostError::UnknownComponent(source));
        }
        message.source = source;

        if message.is_reply() {
            if !state.components.contains_key(&message.target) {
                return Err(HostError::UnreachableTarget {
                    target: message.target,
                });
            }
            let serial = message.serial;
            state.queue.push_back(Delivery::Reply(message));
            self.wakeup.notify_all();
            return Ok(serial);
        }

        if message.is_broadcast() {
            if message.needs_reply() {
                return Err(HostError::BroadcastWithReply {
                    msg_type: message.msg_type,
                });
            }
            message.serial = self.next_serial();
            let serial = message.serial;
            let recipients: Vec<ComponentId> = state
                .components
                .iter()
                .filter(|(id, reg)| **id != source && reg.info.consumes(message.msg_type))
                .map(|(id, _)| *id)
                .collect();
            if recipients.is_empty() {
                tracing::debug!(msg_type = message.msg_type, "Broadcast has no consumers");
            }
            for to in recipients {
                state.queue.push_back(Delivery::Message {
                    to,
                    message: message.clone(),
                });
            }
            self.wakeup.notify_all();
            return Ok(serial);
        }

        let target = state
            .components
            .get(&message.target)
            .ok_or(HostError::UnreachableTarget {
                target: message.target,
            })?;
        if !target.info.consumes(message.msg_type) {
            return Err(HostError::NotConsumed {
                target: message.target,
                msg_type: message.msg_type,
            });
        }

        message.serial = self.next_serial();
        let serial = message.serial;
        state.queue.push_back(Delivery::Message {
            to: message.target,
            message,
        });
        self.wakeup.notify_all();
        Ok(serial)
    }

    /// Apply one delivery to the routing state. Returns the handler call to
    /// make, if any, once the lock is released.
    fn prepare(&self, state: &mut HostState, delivery: Delivery) -> Option<Dispatch> {
        let (to, message) = match delivery {
            Delivery::Message { to, message } => (to, message),
            Delivery::Reply(message) => {
                if let Some(call) = state.pending.get_mut(&message.serial)
                    && call.caller == message.target
                    && call.target == message.source
                    && matches!(call.state, CallState::Waiting)
                {
                    call.state = CallState::Replied(message);
                    self.wakeup.notify_all();
                    return None;
                }
                // Nobody is waiting any more; hand it over as an ordinary message
                (message.target, message)
            }
            Delivery::Disconnect { serial } => {
                if let Some(call) = state.pending.get_mut(&serial)
                    && matches!(call.state, CallState::Waiting)
                {
                    call.state = CallState::Disconnected;
                    self.wakeup.notify_all();
                }
                return None;
            }
        };

        let Some(reg) = state.components.get_mut(&to) else {
            tracing::debug!(
                target_id = to,
                msg_type = message.msg_type,
                "Dropping message for deregistered component"
            );
            return None;
        };
        if reg.paused > 0 {
            reg.held.push_back(message);
            return None;
        }
        state.active += 1;
        Some(Dispatch {
            component: Arc::clone(&reg.component),
            context: reg.context.clone(),
            message,
        })
    }

    fn run(&self, dispatch: Dispatch) {
        let Dispatch {
            component,
            context,
            message,
        } = dispatch;
        let msg_type = message.msg_type;
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            component.handle(message, &context);
        }));
        if result.is_err() {
            tracing::error!(
                component_id = context.id(),
                msg_type,
                "Component panicked while handling message"
            );
        }

        let mut state = self.lock();
        state.active -= 1;
        self.wakeup.notify_all();
    }

    /// Body of the dispatch thread
    fn dispatch_loop(&self) {
        tracing::debug!("Dispatch thread started");
        loop {
            let mut state = self.lock();
            let delivery = loop {
                if !state.running {
                    tracing::debug!("Dispatch thread stopped");
                    return;
                }
                if let Some(delivery) = state.queue.pop_front() {
                    break delivery;
                }
                state = self.wait(state, None);
            };
            let dispatch = self.prepare(&mut state, delivery);
            drop(state);
            if let Some(dispatch) = dispatch {
                self.run(dispatch);
            }
        }
    }

    fn await_reply(
        &self,
        serial: u32,
        timeout: Option<Duration>,
    ) -> Result<Message, HostError> {
        let pump = self.on_dispatch_thread();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        loop {
            let waiting = matches!(
                state.pending.get(&serial).map(|call| &call.state),
                Some(CallState::Waiting)
            );
            if !waiting {
                return match state.pending.remove(&serial) {
                    Some(PendingCall {
                        state: CallState::Replied(reply),
                        ..
                    }) => Ok(reply),
                    _ => Err(HostError::Disconnected { serial }),
                };
            }

            if !state.running {
                state.pending.remove(&serial);
                return Err(HostError::HostShutdown);
            }
            if let (Some(deadline), Some(timeout)) = (deadline, timeout)
                && Instant::now() >= deadline
            {
                state.pending.remove(&serial);
                return Err(HostError::Timeout { serial, timeout });
            }

            if pump && let Some(delivery) = state.queue.pop_front() {
                let dispatch = self.prepare(&mut state, delivery);
                drop(state);
                if let Some(dispatch) = dispatch {
                    self.run(dispatch);
                }
                state = self.lock();
                continue;
            }

            state = self.wait(state, deadline);
        }
    }
}

/// Host running every registered component on one dispatch thread
pub struct MultiComponentHost {
    core: Arc<HostCore>,
    thread: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<MultiComponentHost>,
}

impl MultiComponentHost {
    /// Create a host and start its dispatch thread
    pub fn new() -> std::io::Result<Arc<Self>> {
        let core = Arc::new(HostCore {
            state: Mutex::new(HostState {
                components: BTreeMap::new(),
                string_ids: HashMap::new(),
                next_id: 1,
                queue: VecDeque::new(),
                pending: HashMap::new(),
                active: 0,
                running: true,
            }),
            wakeup: Condvar::new(),
            next_serial: AtomicU32::new(1),
            dispatch_thread: OnceLock::new(),
        });

        let worker = Arc::clone(&core);
        let handle = std::thread::Builder::new()
            .name("imehub-dispatch".to_string())
            .spawn(move || worker.dispatch_loop())?;
        let _ = core.dispatch_thread.set(handle.thread().id());

        Ok(Arc::new_cyclic(|self_ref| Self {
            core,
            thread: Mutex::new(Some(handle)),
            self_ref: self_ref.clone(),
        }))
    }

    /// Number of deliveries queued but not yet dispatched
    pub fn queued(&self) -> usize {
        self.core.lock().queue.len()
    }

    /// Block until the queue is empty and no handler is running.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.core.lock();
        loop {
            if state.queue.is_empty() && state.active == 0 {
                return true;
            }
            if Instant::now() >= deadline || !state.running {
                return false;
            }
            state = self.core.wait(state, Some(deadline));
        }
    }

    /// Stop dispatching. Outstanding calls fail with [`HostError::HostShutdown`].
    pub fn shutdown(&self) {
        {
            let mut state = self.core.lock();
            if !state.running {
                return;
            }
            state.running = false;
            let dropped = state.queue.len();
            state.queue.clear();
            self.core.wakeup.notify_all();
            tracing::debug!(dropped, "Component host shutting down");
        }

        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            // The last reference can be released from inside a handler
            if self.core.on_dispatch_thread() {
                return;
            }
            if handle.join().is_err() {
                tracing::error!("Dispatch thread panicked");
            }
        }
    }
}

impl ComponentHost for MultiComponentHost {
    fn add_component(&self, component: Arc<dyn Component>) -> Result<ComponentId, HostError> {
        let mut info = component.info();
        if info.string_id.is_empty() {
            return Err(HostError::EmptyStringId);
        }

        let context = {
            let mut state = self.core.lock();
            if !state.running {
                return Err(HostError::HostShutdown);
            }
            if state.string_ids.contains_key(&info.string_id) {
                return Err(HostError::DuplicateComponent {
                    string_id: info.string_id,
                });
            }

            let id = state.next_id;
            state.next_id += 1;
            info.id = id;

            let host: Weak<dyn ComponentHost> = self.self_ref.clone();
            let context = ComponentContext::new(id, host);
            state.string_ids.insert(info.string_id.clone(), id);
            tracing::info!(component = %info.string_id, id, "Component registered");
            state.components.insert(
                id,
                Registered {
                    component: Arc::clone(&component),
                    info,
                    context: context.clone(),
                    paused: 0,
                    held: VecDeque::new(),
                },
            );
            context
        };

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            component.on_registered(&context);
        }));
        if result.is_err() {
            tracing::error!(id = context.id(), "Component panicked in on_registered");
        }
        Ok(context.id())
    }

    fn remove_component(&self, id: ComponentId) -> Result<(), HostError> {
        let reg = {
            let mut state = self.core.lock();
            let reg = state
                .components
                .remove(&id)
                .ok_or(HostError::UnknownComponent(id))?;
            state.string_ids.remove(&reg.info.string_id);

            state.queue.retain(|delivery| match delivery {
                Delivery::Message { to, .. } => *to != id,
                Delivery::Reply(message) => message.target != id,
                Delivery::Disconnect { .. } => true,
            });

            let mut disconnected = Vec::new();
            for (serial, call) in state.pending.iter_mut() {
                if !matches!(call.state, CallState::Waiting) {
                    continue;
                }
                if call.caller == id {
                    call.state = CallState::Disconnected;
                } else if call.target == id {
                    disconnected.push(*serial);
                }
            }
            disconnected.sort_unstable();
            for serial in disconnected {
                state.queue.push_back(Delivery::Disconnect { serial });
            }
            self.core.wakeup.notify_all();
            reg
        };

        tracing::info!(
            component = %reg.info.string_id,
            id,
            held = reg.held.len(),
            "Component deregistered"
        );
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            reg.component.on_deregistered();
        }));
        if result.is_err() {
            tracing::error!(id, "Component panicked in on_deregistered");
        }
        Ok(())
    }

    fn send(&self, source: ComponentId, message: Message) -> Result<u32, HostError> {
        let mut state = self.core.lock();
        self.core.enqueue(&mut state, source, message)
    }

    fn send_with_reply(
        &self,
        source: ComponentId,
        message: Message,
        timeout: Option<Duration>,
    ) -> Result<Message, HostError> {
        if message.is_broadcast() {
            return Err(HostError::BroadcastWithReply {
                msg_type: message.msg_type,
            });
        }
        let message = message.with_reply_mode(ReplyMode::NeedReply);
        let target = message.target;

        let serial = {
            let mut state = self.core.lock();
            let serial = self.core.enqueue(&mut state, source, message)?;
            state.pending.insert(
                serial,
                PendingCall {
                    caller: source,
                    target,
                    state: CallState::Waiting,
                },
            );
            serial
        };
        tracing::trace!(source, target, serial, "Waiting for reply");
        self.core.await_reply(serial, timeout)
    }

    fn pause_message_handling(&self, id: ComponentId) -> Result<(), HostError> {
        let mut state = self.core.lock();
        let reg = state
            .components
            .get_mut(&id)
            .ok_or(HostError::UnknownComponent(id))?;
        reg.paused += 1;
        Ok(())
    }

    fn resume_message_handling(&self, id: ComponentId) -> Result<(), HostError> {
        let mut state = self.core.lock();
        let reg = state
            .components
            .get_mut(&id)
            .ok_or(HostError::UnknownComponent(id))?;
        if reg.paused == 0 {
            tracing::debug!(id, "Resume without matching pause");
            return Ok(());
        }
        reg.paused -= 1;
        if reg.paused > 0 {
            return Ok(());
        }

        let held = std::mem::take(&mut reg.held);
        for message in held.into_iter().rev() {
            state.queue.push_front(Delivery::Message { to: id, message });
        }
        self.core.wakeup.notify_all();
        Ok(())
    }

    fn query_component(&self, string_id: &str) -> Option<ComponentInfo> {
        let state = self.core.lock();
        let id = state.string_ids.get(string_id)?;
        state.components.get(id).map(|reg| reg.info.clone())
    }

    fn components(&self) -> Vec<ComponentInfo> {
        let state = self.core.lock();
        state
            .components
            .values()
            .map(|reg| reg.info.clone())
            .collect()
    }
}

impl Drop for MultiComponentHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
