use crate::messages::{
    CallCenterEvent, CallStatus, EnvelopeKind, ExtensionStatus, IncomingCall,
    MessageEnvelope, RecordingStarted, RecordingStopped, TranscriptionUpdate,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Per-subscriber buffer; slow subscribers lag rather than block the link
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// What happened to a single envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Published on the category channel for this kind
    Published(EnvelopeKind),
    /// Recognized but inert (`heartbeat.response`)
    Discarded(EnvelopeKind),
    /// Tag outside the known set
    Unrouted(String),
}

/// Routes decoded envelopes to per-category publications.
///
/// Publication is fire-and-forget: there is no queue or replay, and a category
/// nobody listens to simply drops the event. Cloning yields another handle on
/// the same channels.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    incoming_calls: broadcast::Sender<IncomingCall>,
    call_status: broadcast::Sender<CallStatus>,
    recording_started: broadcast::Sender<RecordingStarted>,
    recording_stopped: broadcast::Sender<RecordingStopped>,
    transcriptions: broadcast::Sender<TranscriptionUpdate>,
    extension_status: broadcast::Sender<ExtensionStatus>,
    all: broadcast::Sender<CallCenterEvent>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    /// A zero capacity is raised to one
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            incoming_calls: broadcast::channel(capacity).0,
            call_status: broadcast::channel(capacity).0,
            recording_started: broadcast::channel(capacity).0,
            recording_stopped: broadcast::channel(capacity).0,
            transcriptions: broadcast::channel(capacity).0,
            extension_status: broadcast::channel(capacity).0,
            all: broadcast::channel(capacity).0,
        }
    }

    pub fn subscribe_incoming_calls(&self) -> broadcast::Receiver<IncomingCall> {
        self.incoming_calls.subscribe()
    }

    pub fn subscribe_call_status(&self) -> broadcast::Receiver<CallStatus> {
        self.call_status.subscribe()
    }

    pub fn subscribe_recording_started(&self) -> broadcast::Receiver<RecordingStarted> {
        self.recording_started.subscribe()
    }

    pub fn subscribe_recording_stopped(&self) -> broadcast::Receiver<RecordingStopped> {
        self.recording_stopped.subscribe()
    }

    pub fn subscribe_transcriptions(&self) -> broadcast::Receiver<TranscriptionUpdate> {
        self.transcriptions.subscribe()
    }

    pub fn subscribe_extension_status(&self) -> broadcast::Receiver<ExtensionStatus> {
        self.extension_status.subscribe()
    }

    /// Every routed event regardless of category
    pub fn subscribe_all(&self) -> broadcast::Receiver<CallCenterEvent> {
        self.all.subscribe()
    }

    /// Route one envelope. Never fails; problems are logged and reported in
    /// the outcome.
    pub fn dispatch(&self, envelope: &MessageEnvelope) -> DispatchOutcome {
        let Some(kind) = envelope.kind() else {
            debug!(message_type = %envelope.message_type, "Ignoring unrouted message type");
            return DispatchOutcome::Unrouted(envelope.message_type.clone());
        };

        if !kind.is_routed() {
            trace!(kind = %kind, "Discarding inert message");
            return DispatchOutcome::Discarded(kind);
        }

        match CallCenterEvent::from_envelope(envelope) {
            Some(event) => {
                self.publish(event);
                DispatchOutcome::Published(kind)
            }
            None => DispatchOutcome::Discarded(kind),
        }
    }

    fn publish(&self, event: CallCenterEvent) {
        // A send error only means nobody is subscribed right now
        let _ = self.all.send(event.clone());

        let delivered = match event {
            CallCenterEvent::IncomingCall(p) => self.incoming_calls.send(p).unwrap_or(0),
            CallCenterEvent::CallStatus(p) => self.call_status.send(p).unwrap_or(0),
            CallCenterEvent::RecordingStarted(p) => self.recording_started.send(p).unwrap_or(0),
            CallCenterEvent::RecordingStopped(p) => self.recording_stopped.send(p).unwrap_or(0),
            CallCenterEvent::TranscriptionUpdate(p) => self.transcriptions.send(p).unwrap_or(0),
            CallCenterEvent::ExtensionStatus(p) => self.extension_status.send(p).unwrap_or(0),
        };
        trace!(subscribers = delivered, "Event published");
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
