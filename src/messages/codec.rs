use crate::messages::MessageEnvelope;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

/// Largest inbound text frame the codec will attempt to parse
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Failed to encode outbound payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Frame is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("Frame is not a JSON object")]
    NotAnObject,

    #[error("Frame has no string \"type\" field")]
    MissingType,

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge { size: usize, max: usize },
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Serialize any outbound object as a JSON text frame.
///
/// No envelope is imposed and the payload shape is not checked.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    serde_json::to_string(payload).map_err(CodecError::Encode)
}

/// Parse an inbound text frame into an envelope.
///
/// Never panics; every malformed input comes back as a [`CodecError`].
pub fn decode(raw: &str) -> Result<MessageEnvelope> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: raw.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let value: Value = serde_json::from_str(raw).map_err(CodecError::InvalidJson)?;
    let Value::Object(mut object) = value else {
        return Err(CodecError::NotAnObject);
    };

    let message_type = match object.remove("type") {
        Some(Value::String(tag)) => tag,
        _ => return Err(CodecError::MissingType),
    };
    let payload = object.remove("payload").unwrap_or(Value::Null);

    trace!(message_type = %message_type, "Decoded inbound frame");
    Ok(MessageEnvelope {
        message_type,
        payload,
    })
}
