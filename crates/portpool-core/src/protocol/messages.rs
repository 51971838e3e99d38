//! The portpool protocol message type.
//!
//! Every frame on the wire carries exactly one [`Message`] serialized as a
//! JSON object:
//!
//! ```text
//! { "action": "echo", "payload": { "text": "ping" } }
//! ```
//!
//! The payload is opaque to the framing layer.  Each action handler is
//! responsible for validating the keys it expects.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Largest body a frame may carry, in bytes (1 MiB).
///
/// Frames whose length prefix exceeds this value are rejected before the body
/// is read.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Size of the big-endian length prefix in front of every body.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Action names understood by the built-in handlers.
pub mod actions {
    pub const HELLO: &str = "hello";
    pub const HELLO_RESPONSE: &str = "hello_response";
    pub const ECHO: &str = "echo";
    pub const ECHO_RESPONSE: &str = "echo_response";
    pub const ERROR: &str = "error";
}

/// Greeting carried in the `message` key of every `hello_response`.
pub const HELLO_GREETING: &str = "Hello, client!";

/// Key used by `hello_response` and `error` payloads for their text.
pub const MESSAGE_KEY: &str = "message";

/// A JSON object mapping string keys to arbitrary JSON values.
///
/// Equality is structural and independent of key order.
pub type Payload = serde_json::Map<String, Value>;

// ── Message ───────────────────────────────────────────────────────────────────

/// The unit of protocol exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Short string identifying intent, e.g. `"hello"` or `"echo_response"`.
    pub action: String,
    /// Action-specific data.  Always present on the wire; an absent or `null`
    /// payload decodes as an empty object.
    #[serde(default, deserialize_with = "deserialize_payload")]
    pub payload: Payload,
}

impl Message {
    /// Creates a message with the given action and payload.
    pub fn new(action: impl Into<String>, payload: Payload) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }

    /// Creates a message with an empty payload.
    pub fn empty(action: impl Into<String>) -> Self {
        Self::new(action, Payload::new())
    }

    /// Creates an `error` message whose payload is `{"message": description}`.
    pub fn error(description: impl Into<String>) -> Self {
        let mut payload = Payload::new();
        payload.insert(MESSAGE_KEY.to_string(), Value::String(description.into()));
        Self::new(actions::ERROR, payload)
    }

    /// Returns `true` if this is an `error` message.
    pub fn is_error(&self) -> bool {
        self.action == actions::ERROR
    }

    /// Returns the `message` string of the payload, if present.
    ///
    /// Used to read the greeting of a `hello_response` or the description of
    /// an `error`.
    pub fn message_text(&self) -> Option<&str> {
        self.payload.get(MESSAGE_KEY).and_then(Value::as_str)
    }
}

/// Accepts a JSON object or `null` for the payload field.
fn deserialize_payload<'de, D>(deserializer: D) -> Result<Payload, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Payload>::deserialize(deserializer)?.unwrap_or_default())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_message_carries_description_under_message_key() {
        // Arrange / Act
        let msg = Message::error("unknown action: frobnicate");

        // Assert
        assert_eq!(msg.action, "error");
        assert!(msg.is_error());
        assert_eq!(msg.message_text(), Some("unknown action: frobnicate"));
    }

    #[test]
    fn test_missing_payload_deserializes_as_empty_object() {
        let msg: Message = serde_json::from_str(r#"{"action":"hello"}"#).unwrap();
        assert_eq!(msg.action, "hello");
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_null_payload_deserializes_as_empty_object() {
        let msg: Message = serde_json::from_str(r#"{"action":"hello","payload":null}"#).unwrap();
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_empty_payload_serializes_as_object_not_null() {
        let msg = Message::empty("hello");
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"action":"hello","payload":{}}"#);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let result: Result<Message, _> =
            serde_json::from_str(r#"{"action":"echo","payload":[1,2,3]}"#);
        assert!(result.is_err(), "array payload must not deserialize");
    }

    #[test]
    fn test_payload_equality_ignores_key_order() {
        // Arrange
        let a: Message =
            serde_json::from_str(r#"{"action":"echo","payload":{"a":1,"b":[true,null]}}"#).unwrap();
        let b: Message =
            serde_json::from_str(r#"{"payload":{"b":[true,null],"a":1},"action":"echo"}"#).unwrap();

        // Assert
        assert_eq!(a, b);
    }

    #[test]
    fn test_message_text_is_none_for_non_string_value() {
        let mut payload = Payload::new();
        payload.insert(MESSAGE_KEY.to_string(), json!(42));
        let msg = Message::new("hello_response", payload);
        assert_eq!(msg.message_text(), None);
    }
}
