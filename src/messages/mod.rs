pub mod codec;
pub mod envelope;
pub mod events;

pub use codec::{decode, encode, CodecError, MAX_FRAME_SIZE};
pub use envelope::{epoch_millis, EnvelopeKind, Heartbeat, MessageEnvelope, HEARTBEAT_TYPE};
pub use events::{
    CallCenterEvent, CallStatus, ExtensionStatus, IncomingCall, RecordingStarted,
    RecordingStopped, TranscriptionUpdate,
};
