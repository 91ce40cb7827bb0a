// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the contract between the session engine and the
//! underlying bidirectional, message-oriented connection primitive. It
//! intentionally avoids any reference to concrete protocols or client
//! libraries.
//!
//! The transport layer is responsible only for moving opaque text messages
//! and reporting lifecycle events. Higher-level semantics such as request
//! correlation, timeouts, notifications and reconnection are handled by the
//! session.
//!
//! Concrete implementations of this interface live under `src/transport/`.
use crate::Result;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Close code used for a normal, locally requested closure.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when a connection ends without a close handshake.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// A transport address (e.g. `"ws://localhost:25585"`).
///
/// Its interpretation is transport-specific; the domain layer treats it as
/// an opaque identifier. Addresses are immutable and cheap to clone.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address(pub Arc<str>);

impl Address {
    /// Borrow the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Address
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Address(value.into())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of a single link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadyState {
    // ---
    /// Opening handshake in progress.
    Connecting,

    /// Messages may be sent and received.
    Open,

    /// Close requested, waiting for the peer.
    Closing,

    /// Link is gone; nothing more will be delivered.
    Closed,
}

impl ReadyState {
    fn to_u8(self) -> u8 {
        match self {
            ReadyState::Connecting => 0,
            ReadyState::Open => 1,
            ReadyState::Closing => 2,
            ReadyState::Closed => 3,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Lock-free cell holding a [`ReadyState`], shared between a link handle
/// and the task driving it.
#[derive(Debug)]
pub struct ReadyStateCell(AtomicU8);

impl ReadyStateCell {
    /// Create a cell in the given state.
    pub fn new(state: ReadyState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    /// Current state.
    pub fn get(&self) -> ReadyState {
        ReadyState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Overwrite the state.
    pub fn set(&self, state: ReadyState) {
        self.0.store(state.to_u8(), Ordering::Release);
    }

    /// Move to `next` only if the cell currently holds `current`.
    pub fn transition(&self, current: ReadyState, next: ReadyState) -> bool {
        self.0
            .compare_exchange(
                current.to_u8(),
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Mark the link closed, returning `false` if it already was.
    pub fn close(&self) -> bool {
        self.0.swap(ReadyState::Closed.to_u8(), Ordering::AcqRel) != ReadyState::Closed.to_u8()
    }
}

/// Lifecycle and data events fired by a link.
///
/// For every link the binding fires at most one `Opened`, any number of
/// `Message`s while open, and exactly one `Closed` as the final event, even
/// when the connection failed (`Errored` then `Closed`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    // ---
    /// The opening handshake completed.
    Opened,

    /// A text message arrived.
    Message(String),

    /// The link closed with the given code and reason.
    Closed {
        /// Close code (see [`NORMAL_CLOSURE`], [`ABNORMAL_CLOSURE`]).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },

    /// The link failed; a `Closed` event follows.
    Errored(String),
}

/// Receiving side of a link's event stream.
pub type EventStream = mpsc::UnboundedReceiver<TransportEvent>;

/// Handle to one open (or opening) connection.
///
/// `send` and `close` never block: they enqueue work for whatever drives
/// the underlying connection and report the outcome through the event
/// stream.
pub trait Link: Send + Sync {
    // ---
    /// Current lifecycle status.
    fn ready_state(&self) -> ReadyState;

    /// Queue a text message. Fails unless the link is [`ReadyState::Open`].
    fn send(&self, text: String) -> Result<()>;

    /// Begin the closing handshake. Idempotent.
    fn close(&self, code: u16, reason: &str);
}

/// Shared link pointer.
pub type LinkPtr = Arc<dyn Link>;

/// A freshly opened link together with its event stream.
pub struct Connection {
    // ---
    /// Handle used to send and close.
    pub link: LinkPtr,

    /// Events fired by the link, ending with [`TransportEvent::Closed`].
    pub events: EventStream,
}

/// Transport binding abstraction.
///
/// A `Transport` is a factory for links: each call to [`open`](Self::open)
/// starts a new connection attempt. The returned link is usually still
/// [`ReadyState::Connecting`]; success or failure of the handshake is
/// reported through the event stream.
///
/// The in-memory transport serves as the reference implementation of these
/// semantics.
///
/// # Available Implementations
///
/// - `MemoryHub::transport` - In-memory transport (always available)
/// - `create_websocket_transport` - WebSocket (`transport_websocket` feature)
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Short name of the binding, used for logging.
    fn transport_id(&self) -> &str;

    /// Start a connection to `address` offering the given sub-protocols.
    ///
    /// An `Err` means the attempt could not even be started (for example a
    /// malformed address); handshake failures arrive as events instead.
    async fn open(&self, address: &Address, protocols: &[String]) -> Result<Connection>;
}

/// Shared transport pointer.
///
/// This is an `Arc<dyn Transport>`, which means:
/// - `.clone()` is cheap (only increments a reference count)
/// - Used to erase concrete transport types behind a stable domain interface.
pub type TransportPtr = Arc<dyn Transport>;
