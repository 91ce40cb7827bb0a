//! Domain layer.
//!
//! Connection abstractions shared by the session engine and the transport
//! bindings. Nothing here knows about WebSocket, channels or JSON-RPC.
//!
//! Import these symbols through this module (or the crate root), never from
//! the individual files.

mod transport;

pub use transport::{
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
