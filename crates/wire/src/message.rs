//! JSON-RPC message model.
//!
//! A single [`Message`] type covers requests, notifications and responses.
//! Only the well-known fields are typed; anything else a peer puts on the
//! object is kept in [`Message::extra`] and written back untouched.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Protocol version stamped by the [`Message`] constructors.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC message as carried over the transport.
///
/// `id` and `result` distinguish an absent key (`None`) from an explicit
/// JSON `null` (`Some(Value::Null)`), so both survive a round trip exactly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Caller-chosen request identifier, echoed back on the response.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub id: Option<Value>,

    /// Method name, set on requests and notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,

    /// Successful result, set on responses.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present"
    )]
    pub result: Option<Value>,

    /// Error payload, set on failed responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,

    /// Every other field, e.g. `"jsonrpc": "2.0"`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Coarse classification of a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Has a `method` and an `id`.
    Request,
    /// Has a `method` and no `id`.
    Notification,
    /// Has a `result` or an `error`.
    Response,
    /// None of the above.
    Invalid,
}

/// Maps a present key to `Some`, even when its value is `null`.
fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

fn versioned() -> Map<String, Value> {
    let mut extra = Map::new();
    extra.insert("jsonrpc".to_string(), Value::from(JSONRPC_VERSION));
    extra
}

impl Message {
    /// Build a request with the given id.
    pub fn request(id: impl Into<Value>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id: Some(id.into()),
            method: Some(method.into()),
            params,
            extra: versioned(),
            ..Default::default()
        }
    }

    /// Build a notification (a request without an id).
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: Some(method.into()),
            params,
            extra: versioned(),
            ..Default::default()
        }
    }

    /// Build a successful response.
    pub fn response(id: impl Into<Value>, result: Value) -> Self {
        Self {
            id: Some(id.into()),
            result: Some(result),
            extra: versioned(),
            ..Default::default()
        }
    }

    /// Build a failed response.
    pub fn error_response(id: impl Into<Value>, error: RemoteError) -> Self {
        Self {
            id: Some(id.into()),
            error: Some(error.into_value()),
            extra: versioned(),
            ..Default::default()
        }
    }

    /// Classify by which keys are present.
    pub fn kind(&self) -> MessageKind {
        if self.result.is_some() || self.error.is_some() {
            MessageKind::Response
        } else if self.method.is_some() {
            if self.id.is_some() {
                MessageKind::Request
            } else {
                MessageKind::Notification
            }
        } else {
            MessageKind::Invalid
        }
    }

    /// Convert a response into its result, or the remote error it carries.
    ///
    /// A response without a `result` key yields `Value::Null`.
    pub fn into_result(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(error) => Err(RemoteError::from_value(error)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("remote error {code}: {message}")]
pub struct RemoteError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RemoteError {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// An error without `data`.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// The standard `-32601` error for an unknown method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            Self::METHOD_NOT_FOUND,
            format!("method not found: {method}"),
        )
    }

    /// Interpret an arbitrary error payload.
    ///
    /// Payloads that are not shaped like an error object are kept whole in
    /// `data` with code 0.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<RemoteError>(value.clone()) {
            Ok(error) => error,
            Err(_) => Self {
                code: 0,
                message: match &value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
                data: Some(value),
            },
        }
    }

    /// The JSON error object, as written into a response.
    pub fn into_value(self) -> Value {
        let mut object = Map::new();
        object.insert("code".to_string(), Value::from(self.code));
        object.insert("message".to_string(), Value::from(self.message));
        if let Some(data) = self.data {
            object.insert("data".to_string(), data);
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absent_and_null_ids_are_distinct() {
        let absent: Message = serde_json::from_str(r#"{"method":"ping"}"#).unwrap();
        assert_eq!(absent.id, None);

        let null: Message = serde_json::from_str(r#"{"id":null,"method":"ping"}"#).unwrap();
        assert_eq!(null.id, Some(Value::Null));

        let json = serde_json::to_value(&null).unwrap();
        assert_eq!(json, json!({"id": null, "method": "ping"}));

        let json = serde_json::to_value(&absent).unwrap();
        assert_eq!(json, json!({"method": "ping"}));
    }

    #[test]
    fn null_result_is_a_response() {
        let msg: Message = serde_json::from_str(r#"{"id":3,"result":null}"#).unwrap();
        assert_eq!(msg.result, Some(Value::Null));
        assert_eq!(msg.kind(), MessageKind::Response);
    }

    #[test]
    fn unknown_fields_pass_through() {
        let raw = json!({
            "jsonrpc": "2.0",
            "id": "abc",
            "method": "eth_chainId",
            "origin": "https://example.org",
            "meta": {"tab": 4}
        });
        let msg: Message = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(msg.extra.get("origin"), Some(&json!("https://example.org")));
        assert_eq!(serde_json::to_value(&msg).unwrap(), raw);
    }

    #[test]
    fn classify() {
        assert_eq!(
            Message::request(1, "a", None).kind(),
            MessageKind::Request
        );
        assert_eq!(
            Message::notification("a", None).kind(),
            MessageKind::Notification
        );
        assert_eq!(
            Message::response(1, json!(true)).kind(),
            MessageKind::Response
        );
        assert_eq!(
            Message::error_response(1, RemoteError::new(1, "x")).kind(),
            MessageKind::Response
        );
        assert_eq!(Message::default().kind(), MessageKind::Invalid);
    }

    #[test]
    fn into_result_maps_error_objects() {
        let ok = Message::response(1, json!({"balance": "0x0"}));
        assert_eq!(ok.into_result().unwrap(), json!({"balance": "0x0"}));

        let err = Message::error_response(1, RemoteError::method_not_found("nope"));
        let err = err.into_result().unwrap_err();
        assert_eq!(err.code, RemoteError::METHOD_NOT_FOUND);
        assert!(err.message.contains("nope"));
    }

    #[test]
    fn odd_error_payloads_are_preserved() {
        let mut msg = Message::response(1, Value::Null);
        msg.result = None;
        msg.error = Some(json!("user rejected"));

        let err = msg.into_result().unwrap_err();
        assert_eq!(err.code, 0);
        assert_eq!(err.message, "user rejected");
        assert_eq!(err.data, Some(json!("user rejected")));
    }
}
