//! Observer fan-out
//!
//! One typed topic per event kind. Observers register a [`Listener`]; the
//! variant picks the topic, so a callback can only ever see the payload type
//! of the kind it subscribed to.

use apolo_core::models::{
    ActiveCall, CallAction, CallEvent, CommandResponse, ConnectionStatus, ErrorNotice,
    SystemStatus,
};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error};

/// Event kinds observers can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CallEvent,
    ActiveCalls,
    SystemStatus,
    CallControlResponse,
    ConnectionStatus,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::CallEvent => "call-event",
            EventKind::ActiveCalls => "active-calls",
            EventKind::SystemStatus => "system-status",
            EventKind::CallControlResponse => "call-control-response",
            EventKind::ConnectionStatus => "connection-status",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observer callback for payload `T`
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A registered (or registrable) observer
///
/// Identity is the callback allocation: registering a clone of the same
/// `Listener` twice is a no-op, and `off` with any clone removes it.
#[derive(Clone)]
pub enum Listener {
    CallEvent(Callback<CallEvent>),
    ActiveCalls(Callback<[ActiveCall]>),
    SystemStatus(Callback<SystemStatus>),
    CallControlResponse(Callback<CommandResponse>),
    ConnectionStatus(Callback<ConnectionStatus>),
    Error(Callback<ErrorNotice>),
}

impl Listener {
    pub fn call_event(f: impl Fn(&CallEvent) + Send + Sync + 'static) -> Self {
        Listener::CallEvent(Arc::new(f))
    }

    pub fn active_calls(f: impl Fn(&[ActiveCall]) + Send + Sync + 'static) -> Self {
        Listener::ActiveCalls(Arc::new(f))
    }

    pub fn system_status(f: impl Fn(&SystemStatus) + Send + Sync + 'static) -> Self {
        Listener::SystemStatus(Arc::new(f))
    }

    pub fn command_response(f: impl Fn(&CommandResponse) + Send + Sync + 'static) -> Self {
        Listener::CallControlResponse(Arc::new(f))
    }

    pub fn connection_status(f: impl Fn(&ConnectionStatus) + Send + Sync + 'static) -> Self {
        Listener::ConnectionStatus(Arc::new(f))
    }

    pub fn error(f: impl Fn(&ErrorNotice) + Send + Sync + 'static) -> Self {
        Listener::Error(Arc::new(f))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Listener::CallEvent(_) => EventKind::CallEvent,
            Listener::ActiveCalls(_) => EventKind::ActiveCalls,
            Listener::SystemStatus(_) => EventKind::SystemStatus,
            Listener::CallControlResponse(_) => EventKind::CallControlResponse,
            Listener::ConnectionStatus(_) => EventKind::ConnectionStatus,
            Listener::Error(_) => EventKind::Error,
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Listener({})", self.kind())
    }
}

struct Topic<T: ?Sized> {
    kind: EventKind,
    listeners: RwLock<Vec<Callback<T>>>,
}

// Compare the allocation only; vtable pointers are not stable across codegen units
fn same_callback<T: ?Sized>(a: &Callback<T>, b: &Callback<T>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T: ?Sized> Topic<T> {
    fn new(kind: EventKind) -> Self {
        Self {
            kind,
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn add(&self, callback: &Callback<T>) -> bool {
        let mut listeners = self.listeners.write();
        if listeners.iter().any(|l| same_callback(l, callback)) {
            return false;
        }
        listeners.push(callback.clone());
        true
    }

    fn remove(&self, callback: &Callback<T>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !same_callback(l, callback));
        listeners.len() != before
    }

    fn len(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver to every listener; returns how many returned normally
    fn emit(&self, payload: &T) -> usize {
        // Snapshot so callbacks may subscribe/unsubscribe while being called
        let listeners: Vec<Callback<T>> = self.listeners.read().clone();
        let mut delivered = 0;
        for listener in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        kind = %self.kind,
                        panic = %panic_message(&panic),
                        "Observer callback panicked"
                    );
                }
            }
        }
        delivered
    }
}

/// Fan-out of engine events to any number of observers
pub struct SubscriptionHub {
    call_event: Topic<CallEvent>,
    active_calls: Topic<[ActiveCall]>,
    system_status: Topic<SystemStatus>,
    command_response: Topic<CommandResponse>,
    connection_status: Topic<ConnectionStatus>,
    error: Topic<ErrorNotice>,
}

impl Default for SubscriptionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self {
            call_event: Topic::new(EventKind::CallEvent),
            active_calls: Topic::new(EventKind::ActiveCalls),
            system_status: Topic::new(EventKind::SystemStatus),
            command_response: Topic::new(EventKind::CallControlResponse),
            connection_status: Topic::new(EventKind::ConnectionStatus),
            error: Topic::new(EventKind::Error),
        }
    }

    /// Register a listener; returns false if it was already registered
    pub fn on(&self, listener: &Listener) -> bool {
        let added = match listener {
            Listener::CallEvent(cb) => self.call_event.add(cb),
            Listener::ActiveCalls(cb) => self.active_calls.add(cb),
            Listener::SystemStatus(cb) => self.system_status.add(cb),
            Listener::CallControlResponse(cb) => self.command_response.add(cb),
            Listener::ConnectionStatus(cb) => self.connection_status.add(cb),
            Listener::Error(cb) => self.error.add(cb),
        };
        debug!(kind = %listener.kind(), added, "Listener registered");
        added
    }

    /// Remove a listener; returns false if it was not registered
    pub fn off(&self, listener: &Listener) -> bool {
        match listener {
            Listener::CallEvent(cb) => self.call_event.remove(cb),
            Listener::ActiveCalls(cb) => self.active_calls.remove(cb),
            Listener::SystemStatus(cb) => self.system_status.remove(cb),
            Listener::CallControlResponse(cb) => self.command_response.remove(cb),
            Listener::ConnectionStatus(cb) => self.connection_status.remove(cb),
            Listener::Error(cb) => self.error.remove(cb),
        }
    }

    /// Listen for responses to one call and action only
    ///
    /// Responses carry no request id, so this is a filter over the broadcast:
    /// two in-flight commands with the same call and action both match.
    pub fn on_command_response_for(
        &self,
        call_id: impl Into<String>,
        action: CallAction,
        f: impl Fn(&CommandResponse) + Send + Sync + 'static,
    ) -> Listener {
        let call_id = call_id.into();
        let listener = Listener::command_response(move |resp| {
            if resp.matches(&call_id, action) {
                f(resp)
            }
        });
        self.on(&listener);
        listener
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        match kind {
            EventKind::CallEvent => self.call_event.len(),
            EventKind::ActiveCalls => self.active_calls.len(),
            EventKind::SystemStatus => self.system_status.len(),
            EventKind::CallControlResponse => self.command_response.len(),
            EventKind::ConnectionStatus => self.connection_status.len(),
            EventKind::Error => self.error.len(),
        }
    }

    pub(crate) fn emit_call_event(&self, event: &CallEvent) -> usize {
        self.call_event.emit(event)
    }

    pub(crate) fn emit_active_calls(&self, calls: &[ActiveCall]) -> usize {
        self.active_calls.emit(calls)
    }

    pub(crate) fn emit_system_status(&self, status: &SystemStatus) -> usize {
        self.system_status.emit(status)
    }

    pub(crate) fn emit_command_response(&self, response: &CommandResponse) -> usize {
        self.command_response.emit(response)
    }

    pub(crate) fn emit_connection_status(&self, status: &ConnectionStatus) -> usize {
        self.connection_status.emit(status)
    }

    pub(crate) fn emit_error(&self, notice: &ErrorNotice) -> usize {
        self.error.emit(notice)
    }
}
