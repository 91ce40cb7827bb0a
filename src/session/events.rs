//! Session lifecycle events.
//!
//! The session owns one [`LifecycleEvents`] multicaster. Every event is
//! delivered to the synchronous listeners first, in registration order, and
//! then published on a broadcast channel for async consumers.
//!
//! Events are always emitted *after* the session state lock is released,
//! so a listener may call back into the session.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::broadcast;

use super::lock::{read_ignore_poison, write_ignore_poison};
use crate::RpcError;

/// Capacity of the broadcast stream returned by `Session::events()`.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Something that happened to a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    // ---
    /// A link opened.
    Connected,

    /// A link closed.
    Disconnected { code: u16, reason: String },

    /// A transport failure, a malformed inbound message, or a notification
    /// listener that could not decode its payload.
    Error(Arc<RpcError>),

    /// A reconnect attempt was scheduled.
    Reconnecting { attempt: u32 },

    /// A scheduled reconnect attempt failed.
    ReconnectFailed(Arc<RpcError>),

    /// The reconnect bound was reached; no further attempt is scheduled.
    MaxReconnectAttemptsReached,

    /// A request envelope was handed to the transport.
    MessageSent(Value),

    /// A notification arrived (emitted before the named listeners run).
    Notification {
        method: String,
        params: Option<Value>,
    },
}

impl SessionEvent {
    /// Conventional event name.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::Disconnected { .. } => "disconnected",
            SessionEvent::Error(_) => "error",
            SessionEvent::Reconnecting { .. } => "reconnecting",
            SessionEvent::ReconnectFailed(_) => "reconnectFailed",
            SessionEvent::MaxReconnectAttemptsReached => "maxReconnectAttemptsReached",
            SessionEvent::MessageSent(_) => "messageSent",
            SessionEvent::Notification { .. } => "notification",
        }
    }
}

/// Lifecycle listener.
pub(crate) type EventListener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Lifecycle-event multicaster.
pub(crate) struct LifecycleEvents {
    listeners: RwLock<Vec<EventListener>>,
    stream: broadcast::Sender<SessionEvent>,
}

impl LifecycleEvents {
    pub(crate) fn new() -> Self {
        // ---
        let (stream, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            listeners: RwLock::new(Vec::new()),
            stream,
        }
    }

    pub(crate) fn add(&self, listener: EventListener) {
        write_ignore_poison(&self.listeners).push(listener);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.stream.subscribe()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        // ---
        let snapshot: Vec<EventListener> = read_ignore_poison(&self.listeners).clone();
        for listener in &snapshot {
            listener(&event);
        }

        // No receivers is fine.
        let _ = self.stream.send(event);
    }
}
