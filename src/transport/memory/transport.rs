// src/transport/memory/transport.rs

//! In-memory transport implementation.
//!
//! This file contains the concrete implementation of the domain-level
//! `Transport` trait using in-process channels only.
//!
//! A [`MemoryHub`] plays the role of the network: servers register a
//! [`MemoryListener`] for an address, and every link opened to that address
//! is handed to the listener as a [`MemoryPeer`], the server end of the
//! connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

#[allow(unused_imports)]
use crate::{
    // ---
    log_debug,
    log_error,
    log_info,
    log_warn,
    Address,
    Connection,
    Link,
    NotificationEnvelope,
    ReadyState,
    ReadyStateCell,
    RequestId,
    ResponseEnvelope,
    ResponseError,
    Result,
    RpcError,
    Transport,
    TransportEvent,
    TransportPtr,
    ABNORMAL_CLOSURE,
};

/// Frames travelling from a link to its peer.
#[derive(Debug)]
enum PeerFrame {
    Text(String),
    Close { code: u16, reason: String },
}

/// State shared by both ends of one in-memory connection.
struct Shared {
    // ---
    state: ReadyStateCell,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn fire(&self, event: TransportEvent) {
        // The session may already have stopped listening.
        let _ = self.events.send(event);
    }

    /// Close both ends, firing `Closed` once.
    fn close(&self, code: u16, reason: String) -> bool {
        // ---
        if self.state.close() {
            self.fire(TransportEvent::Closed { code, reason });
            true
        } else {
            false
        }
    }
}

/// In-process stand-in for the network.
///
/// # ⚠️  Testing Only - Subject to Change
///
/// **This type is exposed for integration tests and local experiments.**
/// Production code should use a network binding such as
/// `create_websocket_transport`.
///
/// # Usage in Integration Tests
///
/// Construct one hub per test so that parallel tests stay isolated:
///
/// ```
/// # use smp_rpc::{MemoryHub, Session, SessionConfig};
/// # async fn example() -> smp_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let mut listener = hub.listen("memory://server");
///
/// let session = Session::new(SessionConfig::new("memory://server"), hub.transport());
/// session.connect().await?;
///
/// let peer = listener.accept().await.expect("peer");
/// assert!(peer.is_open());
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    listeners: Mutex<HashMap<Address, mpsc::UnboundedSender<MemoryPeer>>>,
}

/// Process-global hub used by [`create_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
        })
    }

    /// Process-global hub shared by every `create_memory_transport()`.
    pub fn global() -> Arc<Self> {
        GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
    }

    /// Accept connections for `address`.
    ///
    /// Replaces any previous listener for the same address. Dropping the
    /// returned listener makes later attempts for the address fail.
    pub fn listen(&self, address: impl Into<Address>) -> MemoryListener {
        // ---
        let address = address.into();
        let (tx, rx) = mpsc::unbounded_channel();

        log_debug!("memory: listening on {address}");
        self.lock().insert(address.clone(), tx);

        MemoryListener {
            address,
            accepted: rx,
        }
    }

    /// Stop accepting connections for `address`.
    ///
    /// Existing links are unaffected.
    pub fn unlisten(&self, address: &str) -> bool {
        self.lock().remove(&Address::from(address)).is_some()
    }

    /// A transport whose links are routed through this hub.
    pub fn transport(self: &Arc<Self>) -> TransportPtr {
        Arc::new(MemoryTransport { hub: self.clone() })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Address, mpsc::UnboundedSender<MemoryPeer>>> {
        // ---
        match self.listeners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Sender for a live listener on `address`, if any.
    fn acceptor(&self, address: &Address) -> Option<mpsc::UnboundedSender<MemoryPeer>> {
        // ---
        let mut listeners = self.lock();
        match listeners.get(address) {
            Some(tx) if !tx.is_closed() => Some(tx.clone()),
            Some(_) => {
                listeners.remove(address);
                None
            }
            None => None,
        }
    }
}

/// Server side of an address: yields one [`MemoryPeer`] per accepted link.
pub struct MemoryListener {
    address: Address,
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next incoming link.
    ///
    /// Returns `None` once the hub has dropped this listener.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Address this listener accepts on.
    pub fn address(&self) -> &Address {
        &self.address
    }
}

/// Server end of one in-memory connection.
///
/// Dropping the peer while the link is open closes it abnormally, which the
/// session treats as an unexpected close.
pub struct MemoryPeer {
    // ---
    shared: Arc<Shared>,
    inbox: mpsc::UnboundedReceiver<PeerFrame>,
    protocols: Vec<String>,
    close_frame: Option<(u16, String)>,
}

impl MemoryPeer {
    /// Sub-protocols offered by the client.
    pub fn protocols(&self) -> &[String] {
        &self.protocols
    }

    /// True until either side closes the link.
    pub fn is_open(&self) -> bool {
        self.shared.state.get() == ReadyState::Open
    }

    /// Close code and reason received from the client, once it closed.
    pub fn close_frame(&self) -> Option<(u16, &str)> {
        self.close_frame
            .as_ref()
            .map(|(code, reason)| (*code, reason.as_str()))
    }

    /// Receive the next text message sent by the client.
    ///
    /// Returns `None` once the client closed the link.
    pub async fn recv_text(&mut self) -> Option<String> {
        // ---
        match self.inbox.recv().await? {
            PeerFrame::Text(text) => Some(text),
            PeerFrame::Close { code, reason } => {
                self.close_frame = Some((code, reason));
                None
            }
        }
    }

    /// Receive the next client message parsed as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        // ---
        let text = self.recv_text().await?;
        serde_json::from_str(&text).ok()
    }

    /// Send raw text to the client.
    ///
    /// # Errors
    ///
    /// Returns `RpcError::Transport` if the link is no longer open.
    pub fn send(&self, text: impl Into<String>) -> Result<()> {
        // ---
        if !self.is_open() {
            return Err(RpcError::Transport("memory link is not open".into()));
        }
        self.shared.fire(TransportEvent::Message(text.into()));
        Ok(())
    }

    /// Serialize `message` and send it to the client.
    pub fn send_json<T: Serialize>(&self, message: &T) -> Result<()> {
        self.send(serde_json::to_string(message)?)
    }

    /// Answer request `id` with `result`.
    pub fn respond(&self, id: u64, result: Value) -> Result<()> {
        self.send_json(&ResponseEnvelope::success(RequestId::from(id), result))
    }

    /// Answer request `id` with an error object.
    pub fn respond_error(&self, id: u64, code: i64, message: impl Into<String>) -> Result<()> {
        // ---
        let error = ResponseError {
            code,
            message: Some(message.into()),
            data: None,
        };
        self.send_json(&ResponseEnvelope::failure(RequestId::from(id), error))
    }

    /// Push a notification to the client.
    pub fn notify(&self, method: &str, params: Option<Value>) -> Result<()> {
        self.send_json(&NotificationEnvelope::new(method, params))
    }

    /// Close the link from the server side.
    pub fn close(&self, code: u16, reason: &str) {
        log_debug!("memory: peer closing ({code})");
        self.shared.close(code, reason.to_string());
    }

    /// Fail the link: fires an error followed by an abnormal close.
    pub fn fail(&self, reason: &str) {
        // ---
        if self.shared.state.get() != ReadyState::Closed {
            self.shared.fire(TransportEvent::Errored(reason.to_string()));
            self.shared.close(ABNORMAL_CLOSURE, String::new());
        }
    }
}

impl Drop for MemoryPeer {
    fn drop(&mut self) {
        self.shared.close(ABNORMAL_CLOSURE, String::new());
    }
}

/// Client end of one in-memory connection.
struct MemoryLink {
    // ---
    shared: Arc<Shared>,
    to_peer: mpsc::UnboundedSender<PeerFrame>,
}

impl Link for MemoryLink {
    // ---
    fn ready_state(&self) -> ReadyState {
        self.shared.state.get()
    }

    fn send(&self, text: String) -> Result<()> {
        // ---
        if self.ready_state() != ReadyState::Open {
            return Err(RpcError::Transport("memory link is not open".into()));
        }
        self.to_peer
            .send(PeerFrame::Text(text))
            .map_err(|_| RpcError::Transport("memory peer is gone".into()))
    }

    /// The closing handshake completes immediately.
    fn close(&self, code: u16, reason: &str) {
        // ---
        if self.shared.close(code, reason.to_string()) {
            let _ = self.to_peer.send(PeerFrame::Close {
                code,
                reason: reason.to_string(),
            });
        }
    }
}

/// In-memory transport.
///
/// Routes each opened link to the [`MemoryListener`] registered for its
/// address on the shared [`MemoryHub`].
struct MemoryTransport {
    hub: Arc<MemoryHub>,
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn transport_id(&self) -> &str {
        "memory"
    }

    /// Open a link through the hub.
    ///
    /// The outcome is already queued on the event stream when this returns:
    /// `Opened` if a listener accepted the link, otherwise `Errored` followed
    /// by `Closed`.
    async fn open(&self, address: &Address, protocols: &[String]) -> Result<Connection> {
        // ---
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            state: ReadyStateCell::new(ReadyState::Connecting),
            events: events_tx,
        });

        let link = Arc::new(MemoryLink {
            shared: shared.clone(),
            to_peer: peer_tx,
        });

        match self.hub.acceptor(address) {
            Some(acceptor) => {
                log_debug!("memory: link to {address} accepted");

                shared.state.set(ReadyState::Open);
                shared.fire(TransportEvent::Opened);

                let peer = MemoryPeer {
                    shared,
                    inbox: peer_rx,
                    protocols: protocols.to_vec(),
                    close_frame: None,
                };

                // A listener dropped in between closes the link via the
                // returned peer's Drop.
                let _ = acceptor.send(peer);
            }
            None => {
                log_debug!("memory: nothing listening on {address}");

                shared.fire(TransportEvent::Errored(format!(
                    "connection refused: {address}"
                )));
                shared.close(ABNORMAL_CLOSURE, String::new());
            }
        }

        Ok(Connection {
            link,
            events: events_rx,
        })
    }
}

/// Create an in-memory transport on the process-global hub.
///
/// For isolated parallel testing, create a dedicated [`MemoryHub`] and use
/// [`MemoryHub::transport`] instead.
pub fn create_transport() -> TransportPtr {
    // ---
    MemoryHub::global().transport()
}
