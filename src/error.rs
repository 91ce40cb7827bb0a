use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during session and request operations
#[derive(Error, Debug)]
pub enum RpcError {
    /// `request()` was called while the session is not OPEN
    #[error("not connected")]
    NotConnected,

    /// No response arrived within the request timeout
    #[error("request timeout for method: {method}")]
    Timeout {
        /// Method of the abandoned request.
        method: String,
    },

    /// The remote peer answered with a JSON-RPC error object
    #[error("JSON-RPC error {code}: {}", message.as_deref().unwrap_or("<no message>"))]
    Remote {
        /// Error code reported by the peer.
        code: i64,
        /// Optional human readable message.
        message: Option<String>,
        /// Optional structured error data.
        data: Option<Value>,
    },

    /// The transport binding failed to open or send
    #[error("transport error: {0}")]
    Transport(String),

    /// An inbound message could not be parsed
    #[error("failed to parse JSON-RPC message: {0}")]
    MalformedMessage(String),

    /// The connection was closed while the request was outstanding
    #[error("connection closed")]
    ConnectionClosed,

    /// Request params must be an array, an object or absent
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// A typed notification listener could not decode its payload
    #[error("notification decode error: {0}")]
    Notification(String),

    /// Required configuration is missing
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration values conflict with each other
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RpcError {
    /// True for failures that a caller may reasonably retry after reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RpcError::Timeout { .. } | RpcError::Transport(_) | RpcError::ConnectionClosed
        )
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, RpcError>;
