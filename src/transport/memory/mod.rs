// src/transport/memory/mod.rs

//! In-process transport binding.
//!
//! Links are plain channel pairs routed through a [`MemoryHub`]. The binding
//! needs no network and no runtime beyond tokio, which makes it the scripted
//! server of the test-suite and the yardstick for other bindings.
//!
//! ## Reference Semantics
//!
//! Every other binding should behave like this one where its underlying
//! protocol allows, and document where it cannot:
//!
//! - A link fires at most one `Opened`, then messages, and `Closed` exactly
//!   once as its final event.
//! - An attempt that reaches no listener fires `Errored`, then `Closed` with
//!   the abnormal closure code, and never `Opened`.
//! - Messages arrive in the order they were sent and are never dropped
//!   while the link is open.
//!
//! Framing, buffering limits and network failure modes are not emulated;
//! [`MemoryPeer::fail`] and dropping a peer cover the failures the session
//! has to handle.

mod transport;

pub use transport::{create_transport, MemoryHub, MemoryListener, MemoryPeer};
