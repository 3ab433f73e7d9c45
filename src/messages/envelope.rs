use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Wire tag of the outbound liveness ping
pub const HEARTBEAT_TYPE: &str = "heartbeat";

/// Inbound envelope tags the client knows about
pub const CALL_INCOMING: &str = "call.incoming";
pub const CALL_STATUS: &str = "call.status";
pub const RECORDING_STARTED: &str = "recording.started";
pub const RECORDING_STOPPED: &str = "recording.stopped";
pub const TRANSCRIPTION_UPDATE: &str = "transcription.update";
pub const EXTENSION_STATUS: &str = "extension.status";
pub const HEARTBEAT_RESPONSE: &str = "heartbeat.response";

/// A single inbound message: `{ "type": ..., "payload": ... }`
///
/// The tag set is open. Envelopes with a tag the client does not know are still
/// valid envelopes; they simply have no [`EnvelopeKind`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
}

impl MessageEnvelope {
    /// Create a new envelope from a tag and payload
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
        }
    }

    /// Classify the envelope tag, `None` for tags outside the known set
    pub fn kind(&self) -> Option<EnvelopeKind> {
        EnvelopeKind::from_tag(&self.message_type)
    }
}

/// Recognized inbound envelope tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    CallIncoming,
    CallStatus,
    RecordingStarted,
    RecordingStopped,
    TranscriptionUpdate,
    ExtensionStatus,
    HeartbeatResponse,
}

impl EnvelopeKind {
    pub const ALL: [EnvelopeKind; 7] = [
        EnvelopeKind::CallIncoming,
        EnvelopeKind::CallStatus,
        EnvelopeKind::RecordingStarted,
        EnvelopeKind::RecordingStopped,
        EnvelopeKind::TranscriptionUpdate,
        EnvelopeKind::ExtensionStatus,
        EnvelopeKind::HeartbeatResponse,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            CALL_INCOMING => Some(EnvelopeKind::CallIncoming),
            CALL_STATUS => Some(EnvelopeKind::CallStatus),
            RECORDING_STARTED => Some(EnvelopeKind::RecordingStarted),
            RECORDING_STOPPED => Some(EnvelopeKind::RecordingStopped),
            TRANSCRIPTION_UPDATE => Some(EnvelopeKind::TranscriptionUpdate),
            EXTENSION_STATUS => Some(EnvelopeKind::ExtensionStatus),
            HEARTBEAT_RESPONSE => Some(EnvelopeKind::HeartbeatResponse),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            EnvelopeKind::CallIncoming => CALL_INCOMING,
            EnvelopeKind::CallStatus => CALL_STATUS,
            EnvelopeKind::RecordingStarted => RECORDING_STARTED,
            EnvelopeKind::RecordingStopped => RECORDING_STOPPED,
            EnvelopeKind::TranscriptionUpdate => TRANSCRIPTION_UPDATE,
            EnvelopeKind::ExtensionStatus => EXTENSION_STATUS,
            EnvelopeKind::HeartbeatResponse => HEARTBEAT_RESPONSE,
        }
    }

    /// Whether envelopes of this kind are published to subscribers
    pub fn is_routed(&self) -> bool {
        !matches!(self, EnvelopeKind::HeartbeatResponse)
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

/// Outbound liveness ping: `{ "type": "heartbeat", "timestamp": <epoch-ms> }`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Heartbeat {
    #[serde(rename = "type")]
    pub message_type: String,
    pub timestamp: u64,
}

impl Heartbeat {
    pub fn new(timestamp: u64) -> Self {
        Self {
            message_type: HEARTBEAT_TYPE.to_string(),
            timestamp,
        }
    }

    /// Heartbeat stamped with the current wall clock
    pub fn now() -> Self {
        Self::new(epoch_millis())
    }
}

/// Milliseconds since the Unix epoch, 0 if the clock is before it
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
