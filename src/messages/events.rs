//! Payloads for the routed call-center event categories.
//!
//! Each category carries the payload exactly as the server sent it, so
//! subscribers always see the original object. Accessors read the common
//! fields leniently: ids may be strings or numbers, numeric fields may be
//! integers or floats, and a missing or mistyped field is `None`.

use crate::messages::{EnvelopeKind, MessageEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! payload_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
        #[serde(transparent)]
        pub struct $name {
            payload: Value,
        }

        impl $name {
            pub fn new(payload: Value) -> Self {
                Self { payload }
            }

            /// The payload as received
            pub fn payload(&self) -> &Value {
                &self.payload
            }

            pub fn into_payload(self) -> Value {
                self.payload
            }
        }

        impl From<Value> for $name {
            fn from(payload: Value) -> Self {
                Self::new(payload)
            }
        }
    };
}

payload_type!(
    /// New inbound call descriptor. The shape is server defined.
    IncomingCall
);
payload_type!(CallStatus);
payload_type!(RecordingStarted);
payload_type!(RecordingStopped);
payload_type!(TranscriptionUpdate);
payload_type!(ExtensionStatus);

/// String or numeric id, rendered as text
fn id_field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key)?.as_str()
}

fn number_field(payload: &Value, key: &str) -> Option<f64> {
    payload.get(key)?.as_f64()
}

impl IncomingCall {
    pub fn call_id(&self) -> Option<String> {
        id_field(&self.payload, "callId")
    }
}

impl CallStatus {
    pub fn call_id(&self) -> Option<String> {
        id_field(&self.payload, "callId")
    }

    pub fn status(&self) -> Option<&str> {
        str_field(&self.payload, "status")
    }

    /// Call duration in seconds, when the server reports one
    pub fn duration(&self) -> Option<f64> {
        number_field(&self.payload, "duration")
    }
}

impl RecordingStarted {
    pub fn call_id(&self) -> Option<String> {
        id_field(&self.payload, "callId")
    }

    pub fn recording_id(&self) -> Option<String> {
        id_field(&self.payload, "recordingId")
    }
}

impl RecordingStopped {
    pub fn call_id(&self) -> Option<String> {
        id_field(&self.payload, "callId")
    }

    pub fn recording_id(&self) -> Option<String> {
        id_field(&self.payload, "recordingId")
    }

    /// Recording length in seconds
    pub fn duration(&self) -> Option<f64> {
        number_field(&self.payload, "duration")
    }
}

impl TranscriptionUpdate {
    pub fn call_id(&self) -> Option<String> {
        id_field(&self.payload, "callId")
    }

    pub fn transcript(&self) -> Option<&str> {
        str_field(&self.payload, "transcript")
    }

    /// Interim updates are the default when the flag is absent
    pub fn is_final(&self) -> bool {
        self.payload
            .get("isFinal")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

impl ExtensionStatus {
    pub fn extension_id(&self) -> Option<String> {
        id_field(&self.payload, "extensionId")
    }

    pub fn status(&self) -> Option<&str> {
        str_field(&self.payload, "status")
    }
}

/// Any routed event, as delivered to `subscribe_all` listeners
#[derive(Debug, Clone, PartialEq)]
pub enum CallCenterEvent {
    IncomingCall(IncomingCall),
    CallStatus(CallStatus),
    RecordingStarted(RecordingStarted),
    RecordingStopped(RecordingStopped),
    TranscriptionUpdate(TranscriptionUpdate),
    ExtensionStatus(ExtensionStatus),
}

impl CallCenterEvent {
    /// Wrap the payload of a routed envelope in its category.
    ///
    /// Returns `None` for tags that are not routed (unknown or inert). The
    /// payload is never inspected, so every routed envelope yields an event.
    pub fn from_envelope(envelope: &MessageEnvelope) -> Option<Self> {
        let payload = envelope.payload.clone();
        let event = match envelope.kind()? {
            EnvelopeKind::CallIncoming => CallCenterEvent::IncomingCall(payload.into()),
            EnvelopeKind::CallStatus => CallCenterEvent::CallStatus(payload.into()),
            EnvelopeKind::RecordingStarted => CallCenterEvent::RecordingStarted(payload.into()),
            EnvelopeKind::RecordingStopped => CallCenterEvent::RecordingStopped(payload.into()),
            EnvelopeKind::TranscriptionUpdate => {
                CallCenterEvent::TranscriptionUpdate(payload.into())
            }
            EnvelopeKind::ExtensionStatus => CallCenterEvent::ExtensionStatus(payload.into()),
            EnvelopeKind::HeartbeatResponse => return None,
        };
        Some(event)
    }

    pub fn kind(&self) -> EnvelopeKind {
        match self {
            CallCenterEvent::IncomingCall(_) => EnvelopeKind::CallIncoming,
            CallCenterEvent::CallStatus(_) => EnvelopeKind::CallStatus,
            CallCenterEvent::RecordingStarted(_) => EnvelopeKind::RecordingStarted,
            CallCenterEvent::RecordingStopped(_) => EnvelopeKind::RecordingStopped,
            CallCenterEvent::TranscriptionUpdate(_) => EnvelopeKind::TranscriptionUpdate,
            CallCenterEvent::ExtensionStatus(_) => EnvelopeKind::ExtensionStatus,
        }
    }

    /// The event payload exactly as it arrived
    pub fn payload(&self) -> &Value {
        match self {
            CallCenterEvent::IncomingCall(p) => p.payload(),
            CallCenterEvent::CallStatus(p) => p.payload(),
            CallCenterEvent::RecordingStarted(p) => p.payload(),
            CallCenterEvent::RecordingStopped(p) => p.payload(),
            CallCenterEvent::TranscriptionUpdate(p) => p.payload(),
            CallCenterEvent::ExtensionStatus(p) => p.payload(),
        }
    }
}
