//! Public, transport-agnostic session configuration.
//!
//! Transport details stay out of this type; the address is opaque here.
//! Transport bindings are responsible for interpreting the address and
//! sub-protocol list into concrete connection settings.

use std::time::Duration;

use crate::reconnect::ReconnectPolicy;
use crate::{Address, NORMAL_CLOSURE};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Default delay between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5_000);

/// Default bound on consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Reason sent with the close frame of a local `disconnect()`.
pub const DEFAULT_CLOSE_REASON: &str = "Client disconnecting";

/// Session connection parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    // ---
    /// Target address (e.g. `"ws://localhost:25585"`).
    pub address: Address,

    /// Sub-protocols offered during the opening handshake.
    pub protocols: Vec<String>,

    /// Schedule reconnect attempts after an unexpected close.
    ///
    /// Default: false
    pub auto_reconnect: bool,

    /// Delay before each reconnect attempt.
    ///
    /// Default: 5 seconds
    pub reconnect_interval: Duration,

    /// Consecutive reconnect attempts allowed before giving up.
    ///
    /// Default: 10
    pub max_reconnect_attempts: u32,

    /// How long a request waits for its response.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,

    /// Close code sent by `disconnect()`.
    pub close_code: u16,

    /// Close reason sent by `disconnect()`.
    pub close_reason: String,
}

impl SessionConfig {
    /// Create a config for `address` with every other setting at its default.
    pub fn new(address: impl Into<Address>) -> Self {
        Self {
            address: address.into(),
            protocols: Vec::new(),
            auto_reconnect: false,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            close_code: NORMAL_CLOSURE,
            close_reason: DEFAULT_CLOSE_REASON.to_string(),
        }
    }

    /// Set the sub-protocols offered to the server.
    pub fn with_protocols<I, S>(mut self, protocols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protocols = protocols.into_iter().map(Into::into).collect();
        self
    }

    /// Enable or disable automatic reconnection.
    ///
    /// # Example
    ///
    /// ```
    /// use smp_rpc::SessionConfig;
    /// use std::time::Duration;
    ///
    /// let config = SessionConfig::new("ws://localhost:25585")
    ///     .with_auto_reconnect(true)
    ///     .with_reconnect_interval(Duration::from_secs(2))
    ///     .with_max_reconnect_attempts(5);
    /// assert!(config.auto_reconnect);
    /// ```
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the delay before each reconnect attempt.
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval;
        self
    }

    /// Set the bound on consecutive reconnect attempts.
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the close code and reason used by `disconnect()`.
    pub fn with_close(mut self, code: u16, reason: impl Into<String>) -> Self {
        self.close_code = code;
        self.close_reason = reason.into();
        self
    }

    pub(crate) fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.auto_reconnect,
            interval: self.reconnect_interval,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_defaults() {
        // ---
        let config = SessionConfig::new("ws://localhost:25585");

        assert!(config.protocols.is_empty());
        assert!(!config.auto_reconnect);
        assert_eq!(config.reconnect_interval, Duration::from_secs(5));
        assert_eq!(config.max_reconnect_attempts, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.close_code, 1000);
        assert_eq!(config.close_reason, "Client disconnecting");
    }

    #[test]
    fn test_reconnect_policy_mirrors_fields() {
        // ---
        let config = SessionConfig::new("memory://a")
            .with_auto_reconnect(true)
            .with_reconnect_interval(Duration::from_millis(250))
            .with_max_reconnect_attempts(3);

        let policy = config.reconnect_policy();
        assert!(policy.enabled);
        assert_eq!(policy.interval, Duration::from_millis(250));
        assert_eq!(policy.max_attempts, 3);
    }
}
