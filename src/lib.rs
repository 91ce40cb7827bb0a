//! Persistent-connection JSON-RPC 2.0 client.
//!
//! This library keeps one logical connection to a JSON-RPC server open,
//! multiplexes concurrent requests over it, delivers server notifications to
//! registered listeners and reconnects after unexpected closes. It handles
//! request id generation, response correlation, per-request timeouts and
//! failing outstanding requests when the connection goes away.
//!
//! The connection primitive is pluggable through the [`Transport`] trait.
//! A WebSocket binding (`transport_websocket` feature, on by default) and an
//! in-memory binding ([`MemoryHub`]) are provided.
//!
//! ```no_run
//! use smp_rpc::SessionBuilder;
//! use serde_json::json;
//!
//! # async fn example() -> smp_rpc::Result<()> {
//! let session = SessionBuilder::new()
//!     .address("ws://localhost:25585")
//!     .build()?;
//!
//! session.connect().await?;
//! let status = session.request("minecraft:server/status", None).await?;
//! let kicked = session
//!     .request("minecraft:players/kick", Some(json!([{ "name": "Steve" }])))
//!     .await?;
//! session.disconnect();
//! # Ok(())
//! # }
//! ```

// Import all sub modules once...
mod correlation;
mod domain;
mod error;
mod macros;
mod protocol;
mod reconnect;
mod session;
mod session_builder;
mod session_config;
mod transport;

#[allow(unused_imports)]
pub(crate) use macros::{log_debug, log_error, log_info, log_warn};

// Re-export main types
pub use session::{ConnectionState, Session, SessionEvent};
pub use session_builder::SessionBuilder;
pub use session_config::{
    //
    SessionConfig,
    DEFAULT_CLOSE_REASON,
    DEFAULT_MAX_RECONNECT_ATTEMPTS,
    DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_REQUEST_TIMEOUT,
};

pub use correlation::RequestId;
pub use error::{Result, RpcError};
pub use reconnect::{ReconnectPolicy, ReconnectState, ReconnectStep};

pub use transport::{create_memory_transport, MemoryHub, MemoryListener, MemoryPeer};

#[cfg(feature = "transport_websocket")]
pub use transport::create_websocket_transport;

// --- public re-exports
pub use domain::{
    //
    Address,
    Connection,
    EventStream,
    Link,
    LinkPtr,
    ReadyState,
    ReadyStateCell,
    Transport,
    TransportEvent,
    TransportPtr,
    ABNORMAL_CLOSURE,
    NORMAL_CLOSURE,
};

pub use protocol::{
    //
    classify,
    Inbound,
    NotificationEnvelope,
    RequestEnvelope,
    ResponseEnvelope,
    ResponseError,
    JSONRPC_VERSION,
};
