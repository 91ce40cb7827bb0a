//! JSON-RPC 2.0 envelopes.
//!
//! The three envelope shapes are told apart structurally, never by a tag:
//! anything carrying `result` or `error` is a response, anything with a
//! `method` and no `id` is a notification, everything else is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{RequestId, Result, RpcError};

/// Value of the mandatory `jsonrpc` member.
pub const JSONRPC_VERSION: &str = "2.0";

/// Outgoing request envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl RequestEnvelope {
    /// Build a request envelope.
    ///
    /// `params` must be an array, an object, or absent (`None` / `Null`).
    ///
    /// # Errors
    ///
    /// Returns [`RpcError::InvalidParams`] for scalar params.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Result<Self> {
        // ---
        let params = match params {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Array(_) | Value::Object(_))) => Some(p),
            Some(other) => {
                return Err(RpcError::InvalidParams(format!(
                    "expected array or object, got {other}"
                )))
            }
        };

        Ok(Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        })
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ResponseError {
    /// Code reported when the peer's error member has no integer `code`.
    pub const FALLBACK_CODE: i64 = -32603;

    /// Read whatever a peer put in a response's `error` member.
    ///
    /// A bare string becomes the message; an object missing its `code`
    /// gets [`FALLBACK_CODE`](Self::FALLBACK_CODE).
    pub fn lenient(error: Value) -> Self {
        // ---
        match error {
            Value::Object(mut obj) => Self {
                code: obj
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or(Self::FALLBACK_CODE),
                message: match obj.remove("message") {
                    Some(Value::String(message)) => Some(message),
                    Some(Value::Null) | None => None,
                    Some(other) => Some(other.to_string()),
                },
                data: obj.remove("data"),
            },
            Value::String(message) => Self {
                code: Self::FALLBACK_CODE,
                message: Some(message),
                data: None,
            },
            other => Self {
                code: Self::FALLBACK_CODE,
                message: None,
                data: Some(other),
            },
        }
    }
}

impl From<ResponseError> for RpcError {
    fn from(err: ResponseError) -> Self {
        RpcError::Remote {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Response envelope, as produced by a server.
///
/// The session never sends these; they exist so peers and tests can build
/// well-formed replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    pub id: Value,
}

impl ResponseEnvelope {
    /// Successful response to `id`.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Value::from(id.get()),
        }
    }

    /// Failed response to `id`.
    pub fn failure(id: RequestId, error: ResponseError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id: Value::from(id.get()),
        }
    }
}

/// Notification envelope (no `id`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl NotificationEnvelope {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Classification of one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    // ---
    /// Response to a request. `id` is `None` when the peer sent a null,
    /// string or missing id; such responses cannot match anything.
    Response {
        id: Option<RequestId>,
        outcome: std::result::Result<Value, ResponseError>,
    },

    /// Server-initiated push message.
    Notification {
        method: String,
        params: Option<Value>,
    },

    /// Valid JSON that is neither a response nor a notification.
    Ignored,
}

/// Parse and classify an inbound text message.
///
/// # Errors
///
/// Returns [`RpcError::MalformedMessage`] if the text is not JSON.
pub fn classify(text: &str) -> Result<Inbound> {
    // ---
    let value: Value =
        serde_json::from_str(text).map_err(|err| RpcError::MalformedMessage(err.to_string()))?;

    let Value::Object(mut obj) = value else {
        return Ok(Inbound::Ignored);
    };

    if obj.contains_key("result") || obj.contains_key("error") {
        return classify_response(obj);
    }

    if obj.contains_key("id") {
        return Ok(Inbound::Ignored);
    }

    match obj.remove("method") {
        Some(Value::String(method)) => Ok(Inbound::Notification {
            method,
            params: obj.remove("params"),
        }),
        _ => Ok(Inbound::Ignored),
    }
}

fn classify_response(mut obj: Map<String, Value>) -> Result<Inbound> {
    // ---
    let id = obj.get("id").and_then(Value::as_u64).map(RequestId::from);

    let outcome = match obj.remove("error") {
        Some(Value::Null) | None => Ok(obj.remove("result").unwrap_or(Value::Null)),
        Some(error) => Err(ResponseError::lenient(error)),
    };

    Ok(Inbound::Response { id, outcome })
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_envelope_wire_shape() {
        // ---
        let env = RequestEnvelope::new(RequestId::from(3), "minecraft:players", Some(json!([])))
            .unwrap();
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(
            wire,
            json!({"jsonrpc": "2.0", "method": "minecraft:players", "params": [], "id": 3})
        );
    }

    #[test]
    fn test_request_envelope_omits_absent_params() {
        // ---
        let env = RequestEnvelope::new(RequestId::from(1), "rpc.discover", None).unwrap();
        let wire = serde_json::to_value(&env).unwrap();
        assert!(wire.get("params").is_none());
    }

    #[test]
    fn test_request_envelope_rejects_scalar_params() {
        // ---
        let err = RequestEnvelope::new(RequestId::from(1), "x", Some(json!(5))).unwrap_err();
        assert!(matches!(err, RpcError::InvalidParams(_)));
    }

    #[test]
    fn test_classify_success_response() {
        // ---
        let inbound = classify(r#"{"jsonrpc":"2.0","result":{"ok":true},"id":7}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Response {
                id: Some(RequestId::from(7)),
                outcome: Ok(json!({"ok": true})),
            }
        );
    }

    #[test]
    fn test_classify_error_response() {
        // ---
        let inbound =
            classify(r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"nope"},"id":2}"#)
                .unwrap();
        let Inbound::Response { id, outcome } = inbound else {
            panic!("expected response");
        };
        assert_eq!(id, Some(RequestId::from(2)));
        let err = outcome.unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.message.as_deref(), Some("nope"));
    }

    #[test]
    fn test_error_without_code_still_settles() {
        // ---
        let inbound = classify(r#"{"jsonrpc":"2.0","error":{"message":"no code"},"id":1}"#).unwrap();
        let Inbound::Response { id, outcome } = inbound else {
            panic!("expected response");
        };
        assert_eq!(id, Some(RequestId::from(1)));
        let err = outcome.unwrap_err();
        assert_eq!(err.code, ResponseError::FALLBACK_CODE);
        assert_eq!(err.message.as_deref(), Some("no code"));

        let inbound = classify(r#"{"jsonrpc":"2.0","error":"boom","id":4}"#).unwrap();
        let Inbound::Response { outcome, .. } = inbound else {
            panic!("expected response");
        };
        assert_eq!(outcome.unwrap_err().message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_result_wins_over_method() {
        // ---
        // Has method and no id, but result makes it a response.
        let inbound = classify(r#"{"method":"x","params":[],"result":1}"#).unwrap();
        assert!(matches!(inbound, Inbound::Response { id: None, .. }));
    }

    #[test]
    fn test_classify_notification_variants() {
        // ---
        let with_array = classify(r#"{"jsonrpc":"2.0","method":"x","params":["a","b"]}"#).unwrap();
        assert_eq!(
            with_array,
            Inbound::Notification {
                method: "x".into(),
                params: Some(json!(["a", "b"])),
            }
        );

        let bare = classify(r#"{"jsonrpc":"2.0","method":"x"}"#).unwrap();
        assert_eq!(
            bare,
            Inbound::Notification {
                method: "x".into(),
                params: None,
            }
        );
    }

    #[test]
    fn test_request_from_peer_is_ignored() {
        // ---
        let inbound = classify(r#"{"jsonrpc":"2.0","method":"x","params":[],"id":1}"#).unwrap();
        assert_eq!(inbound, Inbound::Ignored);
        assert_eq!(classify("[1,2,3]").unwrap(), Inbound::Ignored);
    }

    #[test]
    fn test_string_id_does_not_correlate() {
        // ---
        let inbound = classify(r#"{"jsonrpc":"2.0","result":1,"id":"1"}"#).unwrap();
        assert!(matches!(inbound, Inbound::Response { id: None, .. }));
    }

    #[test]
    fn test_unparseable_text_is_malformed() {
        // ---
        let err = classify("{not json").unwrap_err();
        assert!(matches!(err, RpcError::MalformedMessage(_)));
    }
}
