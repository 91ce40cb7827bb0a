use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier used to match a JSON-RPC response to its request.
///
/// Ids are carried *in-band* as the `id` member of the envelope. They are
/// positive, strictly increasing for the lifetime of a session and never
/// reset on reconnect, so an id can never be reused while a request with
/// the same id is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Raw numeric value.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pre-increment id source. The first id handed out is `1`.
#[derive(Debug, Default)]
pub(crate) struct RequestIdGenerator {
    last: AtomicU64,
}

impl RequestIdGenerator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_id(&self) -> RequestId {
        // ---
        RequestId(self.last.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
