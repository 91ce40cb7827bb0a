//! Notification fan-out.
//!
//! Listeners are keyed by exact notification method name and run in
//! registration order. Payloads are passed through untouched: the router
//! only decides *how many* positional arguments a listener sees.
//!
//! | `params`            | listener arguments       |
//! |---------------------|--------------------------|
//! | `["a", "b"]`        | `["a", "b"]`             |
//! | `{"k": 1}`          | `[{"k": 1}]`             |
//! | absent              | `[]`                     |

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::lock::{read_ignore_poison, write_ignore_poison};
use crate::RpcError;

/// Type-erased notification listener.
///
/// Receives the positional arguments of one notification. An `Err` is
/// reported through the session's `error` event; it never reaches the peer.
pub(crate) type NotificationListener = Arc<dyn Fn(&[Value]) -> Result<(), RpcError> + Send + Sync>;

/// Registry of notification listeners.
///
/// Key: notification method name, Value: listeners in registration order.
#[derive(Default)]
pub(crate) struct NotificationRouter {
    listeners: RwLock<HashMap<String, Vec<NotificationListener>>>,
}

impl NotificationRouter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a raw listener receiving the positional arguments.
    pub(crate) fn add<F>(&self, method: impl Into<String>, listener: F)
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.insert(
            method.into(),
            Arc::new(move |args: &[Value]| {
                listener(args);
                Ok(())
            }),
        );
    }

    /// Register a typed listener.
    ///
    /// The payload is decoded from no argument as `null`, from a single
    /// argument as that argument, and from several as an array.
    pub(crate) fn add_typed<T, F>(&self, method: impl Into<String>, listener: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let method = method.into();
        let name = method.clone();

        self.insert(
            method,
            Arc::new(move |args: &[Value]| {
                let payload = match args {
                    [] => Value::Null,
                    [single] => single.clone(),
                    many => Value::Array(many.to_vec()),
                };
                let typed: T = serde_json::from_value(payload)
                    .map_err(|err| RpcError::Notification(format!("{name}: {err}")))?;
                listener(typed);
                Ok(())
            }),
        );
    }

    fn insert(&self, method: String, listener: NotificationListener) {
        // ---
        let mut listeners = write_ignore_poison(&self.listeners);
        listeners.entry(method).or_default().push(listener);
    }

    /// Number of listeners registered for `method`.
    pub(crate) fn listener_count(&self, method: &str) -> usize {
        read_ignore_poison(&self.listeners)
            .get(method)
            .map_or(0, Vec::len)
    }

    /// Invoke every listener registered for `method`.
    ///
    /// Listeners are snapshotted first so a listener may register further
    /// listeners without deadlocking. Returns the listener errors, if any.
    pub(crate) fn dispatch(&self, method: &str, params: Option<&Value>) -> Vec<RpcError> {
        // ---
        let snapshot = {
            let listeners = read_ignore_poison(&self.listeners);
            match listeners.get(method) {
                Some(list) => list.clone(),
                None => return Vec::new(),
            }
        };

        let args = positional_args(params);

        snapshot
            .iter()
            .filter_map(|listener| listener(&args).err())
            .collect()
    }
}

/// Spread `params` into positional listener arguments.
pub(crate) fn positional_args(params: Option<&Value>) -> Vec<Value> {
    match params {
        Some(Value::Array(items)) => items.clone(),
        Some(other) => vec![other.clone()],
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_spreads_array_params() {
        // ---
        let router = NotificationRouter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        router.add("x", move |args| sink.lock().unwrap().push(args.to_vec()));

        router.dispatch("x", Some(&json!(["a", "b"])));
        router.dispatch("x", Some(&json!({"k": 1})));
        router.dispatch("x", None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], vec![json!("a"), json!("b")]);
        assert_eq!(seen[1], vec![json!({"k": 1})]);
        assert!(seen[2].is_empty());
    }

    #[test]
    fn test_registration_order_and_exact_match() {
        // ---
        let router = NotificationRouter::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = order.clone();
            router.add("notification:server/saved", move |_| {
                order.lock().unwrap().push(tag)
            });
        }
        let other = order.clone();
        router.add("notification:server/saving", move |_| {
            other.lock().unwrap().push("wrong")
        });

        router.dispatch("notification:server/saved", None);

        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
        assert_eq!(router.listener_count("notification:server/saved"), 3);
        assert_eq!(router.listener_count("unknown"), 0);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Player {
        name: String,
        id: String,
    }

    #[test]
    fn test_typed_listener_decodes_single_argument() {
        // ---
        let router = NotificationRouter::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();

        router.add_typed("notification:players/joined", move |player: Player| {
            *sink.lock().unwrap() = Some(player);
        });

        let errors = router.dispatch(
            "notification:players/joined",
            Some(&json!([{"name": "Steve", "id": "853c80ef"}])),
        );

        assert!(errors.is_empty());
        assert_eq!(
            *seen.lock().unwrap(),
            Some(Player {
                name: "Steve".into(),
                id: "853c80ef".into(),
            })
        );
    }

    #[test]
    fn test_typed_listener_reports_decode_error() {
        // ---
        let router = NotificationRouter::new();
        router.add_typed("n", |_: Player| panic!("must not be called"));

        let errors = router.dispatch("n", Some(&json!([42])));
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], RpcError::Notification(_)));
    }

    #[test]
    fn test_typed_unit_listener_without_params() {
        // ---
        let router = NotificationRouter::new();
        let hits = Arc::new(Mutex::new(0));
        let sink = hits.clone();

        router.add_typed("notification:server/started", move |(): ()| {
            *sink.lock().unwrap() += 1;
        });

        assert!(router.dispatch("notification:server/started", None).is_empty());
        assert_eq!(*hits.lock().unwrap(), 1);
    }
}
