//! Protocol types for JSON-RPC envelopes and inbound classification.
//!
//! This module defines the wire format for request, response and
//! notification messages.
mod message;

pub use message::{
    //
    classify,
    Inbound,
    NotificationEnvelope,
    RequestEnvelope,
    ResponseEnvelope,
    ResponseError,
    JSONRPC_VERSION,
};
