//! Reconnection policy and attempt bookkeeping.
//!
//! This module provides the [`ReconnectPolicy`] type and the
//! [`ReconnectState`] state machine used by [`Session`](crate::Session)
//! after a link closes unexpectedly.
//!
//! # Strategy
//!
//! - Only unexpected closes start a retry; a local `disconnect()` never does
//! - Every retry is scheduled after the same fixed interval
//! - The attempt counter increases by one per scheduled retry and is reset
//!   only when a connection opens successfully
//! - Once the counter reaches `max_attempts` no further retry is scheduled
//!   until a manual `connect()` succeeds

use std::time::Duration;

/// Reconnection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Whether unexpected closes schedule a reconnect at all.
    pub enabled: bool,

    /// Fixed delay before each reconnect attempt.
    pub interval: Duration,

    /// Upper bound on consecutive attempts without a successful open.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    /// Reasonable default reconnect policy.
    ///
    /// - `enabled`: false
    /// - `interval`: 5s
    /// - `max_attempts`: 10
    fn default() -> Self {
        // ---
        Self {
            enabled: false,
            interval: Duration::from_millis(5_000),
            max_attempts: 10,
        }
    }
}

/// What to do after an unexpected close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectStep {
    // ---
    /// Reconnection is disabled; stay idle.
    Disabled,

    /// Schedule attempt number `attempt` after `delay`.
    Schedule { attempt: u32, delay: Duration },

    /// The bound was reached; stop until a manual connect succeeds.
    Exhausted,
}

/// Attempt counter driven by the session.
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of attempts scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Decide the next step after an unexpected close.
    pub fn on_unexpected_close(&mut self, policy: &ReconnectPolicy) -> ReconnectStep {
        // ---
        if !policy.enabled {
            return ReconnectStep::Disabled;
        }

        if self.attempts >= policy.max_attempts {
            crate::log_debug!(
                "reconnect exhausted after {} attempts",
                policy.max_attempts
            );
            return ReconnectStep::Exhausted;
        }

        self.attempts += 1;

        ReconnectStep::Schedule {
            attempt: self.attempts,
            delay: policy.interval,
        }
    }

    /// A connection opened; start counting from zero again.
    pub fn on_opened(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: true,
            interval: Duration::from_millis(10),
            max_attempts,
        }
    }

    #[test]
    fn test_disabled_never_schedules() {
        // ---
        let mut state = ReconnectState::new();
        let policy = ReconnectPolicy::default();

        assert_eq!(state.on_unexpected_close(&policy), ReconnectStep::Disabled);
        assert_eq!(state.attempts(), 0);
    }

    #[test]
    fn test_schedules_up_to_bound_then_exhausts() {
        // ---
        let mut state = ReconnectState::new();
        let policy = policy(3);

        for expected in 1..=3 {
            assert_eq!(
                state.on_unexpected_close(&policy),
                ReconnectStep::Schedule {
                    attempt: expected,
                    delay: Duration::from_millis(10),
                }
            );
        }

        assert_eq!(state.on_unexpected_close(&policy), ReconnectStep::Exhausted);
        // Exhaustion is sticky.
        assert_eq!(state.on_unexpected_close(&policy), ReconnectStep::Exhausted);
        assert_eq!(state.attempts(), 3);
    }

    #[test]
    fn test_open_resets_counter() {
        // ---
        let mut state = ReconnectState::new();
        let policy = policy(2);

        state.on_unexpected_close(&policy);
        state.on_unexpected_close(&policy);
        assert_eq!(state.on_unexpected_close(&policy), ReconnectStep::Exhausted);

        state.on_opened();
        assert_eq!(state.attempts(), 0);
        assert!(matches!(
            state.on_unexpected_close(&policy),
            ReconnectStep::Schedule { attempt: 1, .. }
        ));
    }

    #[test]
    fn test_zero_bound_exhausts_immediately() {
        // ---
        let mut state = ReconnectState::new();
        assert_eq!(state.on_unexpected_close(&policy(0)), ReconnectStep::Exhausted);
    }
}
