pub mod cli;
pub mod messages;
pub mod network;

// Re-export key types for easy testing
pub use messages::{CallCenterEvent, MessageEnvelope};
pub use network::{ConnectionState, EventDispatcher, LinkConfig, LinkEvent, LinkHandle};
