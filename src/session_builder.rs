//! Session builder.
//!
//! Provides a fluent builder API for configuring sessions, with clear
//! separation between required and optional configuration.

use std::time::Duration;

use crate::{
    // ---
    Result,
    RpcError,
    Session,
    SessionConfig,
    TransportPtr,
};

/// Builder for creating [`Session`] instances.
///
/// Only the address is required. Every other setting falls back to the
/// defaults documented on [`SessionConfig`].
///
/// # Examples
///
/// ## WebSocket session with reconnection
/// ```no_run
/// use smp_rpc::SessionBuilder;
/// use std::time::Duration;
///
/// # async fn example() -> smp_rpc::Result<()> {
/// let session = SessionBuilder::new()
///     .address("ws://localhost:25585")
///     .protocols(["minecraft-v1"])
///     .auto_reconnect(true)
///     .reconnect_interval(Duration::from_secs(2))
///     .max_reconnect_attempts(5)
///     .build()?;
///
/// session.connect().await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Session over an explicit transport
/// ```
/// use smp_rpc::{MemoryHub, SessionBuilder};
///
/// # fn example() -> smp_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let session = SessionBuilder::new()
///     .address("memory://server")
///     .transport(hub.transport())
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    // ---
    address: Option<String>,
    protocols: Vec<String>,

    // Reconnection (all optional)
    auto_reconnect: Option<bool>,
    reconnect_interval: Option<Duration>,
    max_reconnect_attempts: Option<u32>,

    // Request timeout (optional, default: 30s)
    request_timeout: Option<Duration>,

    // Close frame sent by disconnect() (optional, default: 1000)
    close: Option<(u16, String)>,

    // Transport selection: explicit instance or by name, never both
    transport: Option<TransportPtr>,
    transport_type: Option<String>,
}

impl SessionBuilder {
    /// Create a new session builder.
    pub fn new() -> Self {
        Self {
            address: None,
            protocols: Vec::new(),
            auto_reconnect: None,
            reconnect_interval: None,
            max_reconnect_attempts: None,
            request_timeout: None,
            close: None,
            transport: None,
            transport_type: None,
        }
    }

    /// Set the server address (required).
    ///
    /// Examples:
    /// - `"ws://localhost:25585"`
    /// - `"wss://example.net/rpc"` (requires the `tls` feature)
    /// - `"memory://server"` (in-memory transport)
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Add a sub-protocol offered during the opening handshake.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocols.push(protocol.into());
        self
    }

    /// Set all sub-protocols offered during the opening handshake.
    pub fn protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable automatic reconnection.
    ///
    /// Default: disabled.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    /// Set the fixed delay before each reconnect attempt.
    ///
    /// Default: 5s.
    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = Some(interval);
        self
    }

    /// Set the bound on consecutive reconnect attempts.
    ///
    /// Default: 10.
    pub fn max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = Some(attempts);
        self
    }

    /// Set the per-request timeout.
    ///
    /// Default: 30s.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the close code and reason sent by `disconnect()`.
    ///
    /// Default: 1000, `"Client disconnecting"`.
    pub fn close_frame(mut self, code: u16, reason: impl Into<String>) -> Self {
        self.close = Some((code, reason.into()));
        self
    }

    /// Use an explicit transport instance.
    ///
    /// Cannot be combined with [`transport_type`](Self::transport_type).
    pub fn transport(mut self, transport: TransportPtr) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Select the transport by name.
    ///
    /// Valid values: `"memory"` (process-global hub), `"websocket"`
    ///
    /// If not specified, the WebSocket transport is used when the
    /// `transport_websocket` feature is enabled.
    pub fn transport_type(mut self, name: impl Into<String>) -> Self {
        self.transport_type = Some(name.into());
        self
    }

    /// Build the session (consumes self).
    ///
    /// No connection is opened; call [`Session::connect`] afterwards.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `address` is missing (`MissingConfig`)
    /// - both `transport()` and `transport_type()` were used (`ConfigConflict`)
    /// - the transport type is unknown or its feature is disabled (`Transport`)
    /// - no transport was given and no default binding is compiled in
    ///   (`MissingConfig`)
    pub fn build(self) -> Result<Session> {
        // ---
        let address = self
            .address
            .ok_or_else(|| RpcError::MissingConfig("address".into()))?;

        let transport = match (self.transport, self.transport_type.as_deref()) {
            (Some(_), Some(_)) => {
                return Err(RpcError::ConfigConflict(
                    "Cannot use both transport() and transport_type()".into(),
                ))
            }
            (Some(transport), None) => transport,
            (None, Some(name)) => transport_by_name(name)?,
            (None, None) => default_transport()?,
        };

        let mut config = SessionConfig::new(address).with_protocols(self.protocols);

        if let Some(enabled) = self.auto_reconnect {
            config = config.with_auto_reconnect(enabled);
        }
        if let Some(interval) = self.reconnect_interval {
            config = config.with_reconnect_interval(interval);
        }
        if let Some(attempts) = self.max_reconnect_attempts {
            config = config.with_max_reconnect_attempts(attempts);
        }
        if let Some(timeout) = self.request_timeout {
            config = config.with_request_timeout(timeout);
        }
        if let Some((code, reason)) = self.close {
            config = config.with_close(code, reason);
        }

        Ok(Session::new(config, transport))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_by_name(name: &str) -> Result<TransportPtr> {
    // ---
    match name {
        "memory" => Ok(crate::create_memory_transport()),

        #[cfg(feature = "transport_websocket")]
        "websocket" => Ok(crate::create_websocket_transport()),

        #[cfg(not(feature = "transport_websocket"))]
        "websocket" => Err(RpcError::Transport(
            "transport_type websocket requires the transport_websocket feature".into(),
        )),

        other => Err(RpcError::Transport(format!(
            "unrecognized transport_type: {other}, valid values: memory, websocket"
        ))),
    }
}

fn default_transport() -> Result<TransportPtr> {
    // ---
    #[cfg(feature = "transport_websocket")]
    {
        Ok(crate::create_websocket_transport())
    }

    #[cfg(not(feature = "transport_websocket"))]
    {
        Err(RpcError::MissingConfig(
            "transport (enable transport_websocket or call transport())".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::MemoryHub;

    #[test]
    fn test_missing_address() {
        // ---
        let result = SessionBuilder::new()
            .transport(MemoryHub::new().transport())
            .build();
        assert!(matches!(result, Err(RpcError::MissingConfig(ref what)) if what == "address"));
    }

    #[test]
    fn test_transport_conflict() {
        // ---
        let result = SessionBuilder::new()
            .address("memory://x")
            .transport(MemoryHub::new().transport())
            .transport_type("memory")
            .build();
        assert!(matches!(result, Err(RpcError::ConfigConflict(_))));
    }

    #[test]
    fn test_unknown_transport_type() {
        // ---
        let result = SessionBuilder::new()
            .address("memory://x")
            .transport_type("carrier-pigeon")
            .build();
        assert!(matches!(result, Err(RpcError::Transport(_))));
    }

    #[test]
    fn test_settings_reach_config() {
        // ---
        let session = SessionBuilder::new()
            .address("memory://x")
            .transport_type("memory")
            .protocol("minecraft-v1")
            .auto_reconnect(true)
            .reconnect_interval(Duration::from_millis(250))
            .max_reconnect_attempts(3)
            .request_timeout(Duration::from_secs(2))
            .close_frame(4000, "bye")
            .build()
            .unwrap();

        let config = session.config();
        assert_eq!(config.address.as_str(), "memory://x");
        assert_eq!(config.protocols, vec!["minecraft-v1".to_string()]);
        assert!(config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(250));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.request_timeout, Duration::from_secs(2));
        assert_eq!(config.close_code, 4000);
        assert_eq!(config.close_reason, "bye");
    }

    #[test]
    fn test_defaults() {
        // ---
        let session = SessionBuilder::new()
            .address("memory://x")
            .transport_type("memory")
            .build()
            .unwrap();

        let config = session.config();
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_millis(5_000));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.request_timeout, Duration::from_millis(30_000));
        assert_eq!(config.close_code, 1000);
        assert_eq!(config.close_reason, "Client disconnecting");
    }
}
