//! Wire envelope encoding and decoding.
//!
//! A transport message travels as a single self-describing JSON blob holding
//! the header map and a base64-armored body, so arbitrary binary bodies
//! survive the queue service's textual payload format. Unknown envelope
//! fields are tolerated on decode for forward compatibility.

use crate::error::SerializationError;
use crate::message::TransportMessage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Serialized form of a transport message as written to the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEnvelope {
    /// Header map, passed through verbatim.
    pub headers: HashMap<String, String>,
    /// Message body, base64-encoded.
    pub body: String,
}

/// Encode a transport message into its wire payload.
pub fn encode(message: &TransportMessage) -> Result<String, SerializationError> {
    let envelope = WireEnvelope {
        headers: message.headers().clone(),
        body: STANDARD.encode(message.body()),
    };

    Ok(serde_json::to_string(&envelope)?)
}

/// Decode a wire payload back into a transport message.
///
/// Malformed payloads fail loudly with [`SerializationError`]; the caller
/// decides what to do with the still-leased message.
pub fn decode(payload: &str) -> Result<TransportMessage, SerializationError> {
    let envelope: WireEnvelope = serde_json::from_str(payload)?;

    let body = STANDARD
        .decode(envelope.body.as_bytes())
        .map_err(SerializationError::Body)?;

    Ok(TransportMessage::new(envelope.headers, Bytes::from(body)))
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
