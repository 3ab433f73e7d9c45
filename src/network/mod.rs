pub mod dispatcher;
pub mod heartbeat;
pub mod link;
pub mod reconnect;
pub mod transport;
pub mod websocket;

pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use link::{ConnectionState, Delivery, LinkConfig, LinkError, LinkEvent, LinkHandle, LinkStats};
pub use reconnect::{Backoff, ReconnectConfig, ReconnectPolicy};
pub use transport::{Channel, Connector, TransportError};
pub use websocket::{default_server_url, WebSocketConnector};
