//! Message Codec
//!
//! JSON text encoding for the application protocol. The transport below is
//! message-oriented, so one JSON document maps to one transport message.
//!
//! # Limits
//!
//! - Inbound messages larger than the configured limit are rejected before
//!   parsing
//! - A message without a string `type` field is malformed
//! - Unknown `type` values are not errors; they decode to
//!   [`ServerMessage::Unknown`] carrying the raw payload

use serde_json::Value;

use super::TransportError;
use crate::messages::{ClientMessage, ServerMessage};

/// Encode an outbound message to JSON text
///
/// # Errors
///
/// Returns `TransportError::Serialization` if JSON encoding fails.
pub fn encode_client_message(message: &ClientMessage) -> Result<String, TransportError> {
    serde_json::to_string(message).map_err(|e| TransportError::Serialization(e.to_string()))
}

/// Decode an inbound JSON text message
///
/// # Errors
///
/// - `TransportError::MessageTooLarge` if `text` exceeds `max_bytes`
/// - `TransportError::Malformed` if the text is not a JSON object with a
///   string `type`, or a known kind is missing required fields
pub fn decode_server_message(text: &str, max_bytes: usize) -> Result<ServerMessage, TransportError> {
    if text.len() > max_bytes {
        return Err(TransportError::MessageTooLarge {
            size: text.len(),
            max: max_bytes,
        });
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| TransportError::Malformed(e.to_string()))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| TransportError::Malformed("missing string `type` field".into()))?
        .to_owned();

    if !ServerMessage::is_known_kind(&kind) {
        return Ok(ServerMessage::Unknown {
            kind,
            payload: value,
        });
    }

    serde_json::from_value(value)
        .map_err(|e| TransportError::Malformed(format!("invalid `{kind}` message: {e}")))
}
