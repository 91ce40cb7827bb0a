//! Transport implementations.
//!
//! This module provides concrete implementations of the domain-level
//! `Transport` trait. Network transports are hidden behind feature flags
//! and exposed only through constructor functions.
//!
//! Domain code must not depend on transport-specific types.

mod memory;

#[cfg(feature = "transport_websocket")]
mod websocket;

pub use memory::{create_transport as create_memory_transport, MemoryHub, MemoryListener, MemoryPeer};

#[cfg(feature = "transport_websocket")]
pub use websocket::create_transport as create_websocket_transport;
