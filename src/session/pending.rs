use crate::{RequestId, Result, RpcError};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;

/// Completion channel of one in-flight request.
pub(crate) type Completion = oneshot::Sender<Result<Value>>;

/// One in-flight request.
struct Waiter {
    // ---
    method: String,
    tx: Completion,
}

/// Tracks pending requests waiting for responses.
///
/// Maps request ids to oneshot channels. When a response arrives, the
/// channel is used to deliver the outcome to the waiting future. At most
/// one waiter exists per id.
///
/// The deadline timer itself is owned by the waiting future
/// (`tokio::time::timeout_at`), so settling an entry cancels the timer by
/// completing that future. On expiry the future calls
/// [`expire`](Self::expire) to remove its entry.
#[derive(Default)]
pub(crate) struct CorrelationTable {
    // ---
    waiters: HashMap<RequestId, Waiter>,
}

impl CorrelationTable {
    // ---

    /// Register a pending request
    ///
    /// Returns the receiver that will carry the outcome. Ids come from a
    /// counter that never repeats, so `id` is never already outstanding.
    pub fn register(
        &mut self,
        id: RequestId,
        method: impl Into<String>,
    ) -> oneshot::Receiver<Result<Value>> {
        // ---
        debug_assert!(
            !self.waiters.contains_key(&id),
            "request id {id} is already outstanding"
        );

        let (tx, rx) = oneshot::channel();
        self.waiters.insert(
            id,
            Waiter {
                method: method.into(),
                tx,
            },
        );
        rx
    }

    /// Complete a pending request with its outcome
    ///
    /// Returns true if the id was found. Unknown ids (already answered,
    /// timed out, or spurious) are not an error.
    pub fn settle(&mut self, id: RequestId, outcome: Result<Value>) -> bool {
        // ---
        if let Some(waiter) = self.waiters.remove(&id) {
            // Receiver may be gone if the caller stopped waiting.
            let _ = waiter.tx.send(outcome);
            true
        } else {
            false
        }
    }

    /// Remove an entry whose deadline elapsed and fail it with a timeout
    ///
    /// Returns the timeout error if the entry was still present.
    pub fn expire(&mut self, id: RequestId) -> Option<RpcError> {
        // ---
        self.waiters.remove(&id).map(|waiter| RpcError::Timeout {
            method: waiter.method,
        })
    }

    /// Remove an entry without delivering anything
    ///
    /// Used when the caller abandons the request or the send failed.
    pub fn remove(&mut self, id: RequestId) -> bool {
        // ---
        self.waiters.remove(&id).is_some()
    }

    /// Fail every pending request and empty the table
    ///
    /// Returns the number of requests that were failed.
    pub fn drain(&mut self, reason: impl Fn() -> RpcError) -> usize {
        // ---
        let count = self.waiters.len();
        for (_id, waiter) in self.waiters.drain() {
            let _ = waiter.tx.send(Err(reason()));
        }
        count
    }

    /// Get the number of pending requests
    pub fn len(&self) -> usize {
        // ---
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_settle() {
        // ---
        let mut table = CorrelationTable::default();
        let id = RequestId::from(1);

        let rx = table.register(id, "ping");
        assert_eq!(table.len(), 1);

        assert!(table.settle(id, Ok(json!("pong"))));

        // Should be removed after completion
        assert_eq!(table.len(), 0);

        let received = rx.blocking_recv().unwrap().unwrap();
        assert_eq!(received, json!("pong"));
    }

    #[test]
    fn test_settle_unknown_id() {
        // ---
        let mut table = CorrelationTable::default();
        assert!(!table.settle(RequestId::from(9), Ok(Value::Null)));
    }

    #[test]
    fn test_expire_names_method_and_removes() {
        // ---
        let mut table = CorrelationTable::default();
        let id = RequestId::from(2);
        let _rx = table.register(id, "minecraft:server/status");

        let err = table.expire(id).unwrap();
        assert!(matches!(err, RpcError::Timeout { ref method } if method == "minecraft:server/status"));
        assert_eq!(table.len(), 0);

        // A late response for the expired id is dropped.
        assert!(!table.settle(id, Ok(Value::Null)));
        assert!(table.expire(id).is_none());
    }

    #[test]
    fn test_drain_fails_everything() {
        // ---
        let mut table = CorrelationTable::default();
        let receivers: Vec<_> = (1..=3)
            .map(|n| table.register(RequestId::from(n), "m"))
            .collect();

        assert_eq!(table.drain(|| RpcError::ConnectionClosed), 3);
        assert_eq!(table.len(), 0);

        for rx in receivers {
            let outcome = rx.blocking_recv().unwrap();
            assert!(matches!(outcome, Err(RpcError::ConnectionClosed)));
        }
    }

    #[test]
    fn test_remove() {
        // ---
        let mut table = CorrelationTable::default();
        let id = RequestId::from(5);

        let rx = table.register(id, "m");
        assert!(table.remove(id));
        assert!(!table.remove(id));

        // The sender went with the entry.
        assert!(rx.blocking_recv().is_err());
    }
}
