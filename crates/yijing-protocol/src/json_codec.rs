//! JSON encoding/decoding for both transports.
//!
//! This module converts between:
//! - UTF-8 text frames (`&str`)
//! - high-level `yijing_core` messages
//!
//! Frame model (one JSON object per WebSocket text frame):
//!
//! ```text
//! Generic transport (both directions)
//! -----------------------------------
//! { "type": "connect" | "disconnect" | "divine" | "heartbeat" | "error",
//!   "data": <payload> }            // missing or null data reads as {}
//!
//! Bot transport, client -> server
//! -------------------------------
//! { "action": <non-empty string>, "params": {...}?, "echo": <any>? }
//!
//! Bot transport, server -> client
//! -------------------------------
//! ActionResponse { "status", "retcode", "data"?, "message"?, "wording"?, "echo"? }
//! Event          { "time", "self_id", "post_type", ... }
//! ```
//!
//! Decoding is strict about the discriminators and lenient about
//! optional fields. A frame that fails to decode is meant to be logged
//! and dropped by the caller.

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use yijing_core::{Action, ActionResponse, BotFrame, Envelope, Event};

use crate::wire_types::{validate_frame_len, MAX_FRAME_LEN};

/// Envelope kinds accepted on the generic transport.
const ENVELOPE_KINDS: [&str; 5] = ["connect", "disconnect", "divine", "heartbeat", "error"];

/// Errors that can arise when encoding/decoding a text frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("empty frame")]
    Empty,

    #[error("frame of {0} bytes exceeds limit of {1}")]
    FrameTooLarge(usize, usize),

    #[error("malformed JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,

    #[error("missing or invalid field: {0}")]
    MissingField(&'static str),

    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
}

// -----------------------------------------------------------------------------
// Decoding
// -----------------------------------------------------------------------------

/// Decode a generic-transport envelope.
pub fn decode_envelope(text: &str) -> Result<Envelope, ProtocolError> {
    let mut obj = parse_object(text)?;

    let kind = match obj.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(ProtocolError::MissingField("type")),
    };
    if !ENVELOPE_KINDS.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownMessageType(kind));
    }

    match obj.get("data") {
        None | Some(Value::Null) => {
            obj.insert("data".to_string(), Value::Object(Map::new()));
        }
        Some(_) => {}
    }

    serde_json::from_value(Value::Object(obj))
        .map_err(|source| ProtocolError::InvalidPayload { kind, source })
}

/// Decode a bot-protocol action request.
pub fn decode_action(text: &str) -> Result<Action, ProtocolError> {
    let mut obj = parse_object(text)?;

    match obj.get("action") {
        Some(Value::String(name)) if !name.is_empty() => {}
        _ => return Err(ProtocolError::MissingField("action")),
    }
    if let Some(Value::Null) = obj.get("params") {
        obj.remove("params");
    }

    serde_json::from_value(Value::Object(obj)).map_err(|source| ProtocolError::InvalidPayload {
        kind: "action".to_string(),
        source,
    })
}

fn parse_object(text: &str) -> Result<Map<String, Value>, ProtocolError> {
    if text.is_empty() {
        return Err(ProtocolError::Empty);
    }
    if !validate_frame_len(text.len()) {
        return Err(ProtocolError::FrameTooLarge(text.len(), MAX_FRAME_LEN));
    }

    match serde_json::from_str::<Value>(text).map_err(ProtocolError::Malformed)? {
        Value::Object(obj) => Ok(obj),
        _ => Err(ProtocolError::NotAnObject),
    }
}

// -----------------------------------------------------------------------------
// Encoding
// -----------------------------------------------------------------------------

pub fn encode_envelope(envelope: &Envelope) -> Result<String, ProtocolError> {
    encode(envelope)
}

pub fn encode_response(response: &ActionResponse) -> Result<String, ProtocolError> {
    encode(response)
}

pub fn encode_event(event: &Event) -> Result<String, ProtocolError> {
    encode(event)
}

pub fn encode_bot_frame(frame: &BotFrame) -> Result<String, ProtocolError> {
    encode(frame)
}

fn encode<T: Serialize>(value: &T) -> Result<String, ProtocolError> {
    serde_json::to_string(value).map_err(ProtocolError::Encode)
}
