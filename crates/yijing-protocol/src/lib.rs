//! yijing-protocol
//!
//! Wire-level encoding/decoding for the divination hub.
//!
//! This crate turns logical messages (`yijing_core::Envelope`,
//! `Action`, `ActionResponse`, `Event`) into JSON text frames and
//! back again.
//!
//! - [`wire_types`] : protocol constants (action names, post types, limits)
//! - [`json_codec`] : decode/encode of text frames

pub mod wire_types;
pub mod json_codec;

pub use json_codec::{
    ProtocolError,
    decode_action,
    decode_envelope,
    encode_bot_frame,
    encode_envelope,
    encode_event,
    encode_response,
};
