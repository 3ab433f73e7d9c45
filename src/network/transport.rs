use futures::future::BoxFuture;
use futures::{Sink, Stream};
use std::fmt;
use std::pin::Pin;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectFailed(String),

    #[error("Invalid target address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Channel closed")]
    Closed,

    #[error("Timed out waiting for {operation} after {after:?}")]
    TimedOut {
        operation: &'static str,
        after: std::time::Duration,
    },
}

pub type Result<T> = std::result::Result<T, TransportError>;

type OutboundSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;
type InboundStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open bidirectional text channel.
///
/// The inbound stream ending is the close event. An `Err` item is a transport
/// error event and does not by itself mean the channel is gone.
pub struct Channel {
    pub(crate) outbound: OutboundSink,
    pub(crate) inbound: InboundStream,
}

impl Channel {
    pub fn new<O, I>(outbound: O, inbound: I) -> Self
    where
        O: Sink<String, Error = TransportError> + Send + 'static,
        I: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            outbound: Box::pin(outbound),
            inbound: Box::pin(inbound),
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel").finish_non_exhaustive()
    }
}

/// Opens channels to the call-center backend.
///
/// Each call produces an independent channel; the link driver calls it once
/// per connection attempt.
pub trait Connector: Send + Sync + 'static {
    fn open(&self) -> BoxFuture<'static, Result<Channel>>;

    /// Address shown in logs
    fn target(&self) -> &str;
}
