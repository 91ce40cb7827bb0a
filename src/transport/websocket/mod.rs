// src/transport/websocket/mod.rs

//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Each opened link is driven by its own actor task that owns the socket.
//! The [`Link`](crate::Link) handle only enqueues commands, so `send` and
//! `close` never block the caller.
//!
//! Binary frames carrying valid UTF-8 are delivered as text; other binary
//! frames are dropped. Ping frames are answered by tungstenite itself.

mod transport;

pub use transport::create_transport;
