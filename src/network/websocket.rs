use crate::network::transport::{Channel, Connector, Result, TransportError};
use futures::future::{self, BoxFuture};
use futures::{FutureExt, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, trace};

/// Path of the call-center channel on the backend host
pub const CALL_CENTER_PATH: &str = "/ws/call-center";

/// Build the default channel address for a backend host, e.g. `localhost:3000`
pub fn default_server_url(host: &str) -> String {
    format!("ws://{}{}", host.trim_end_matches('/'), CALL_CENTER_PATH)
}

/// WebSocket connector for the call-center backend
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    bearer_token: Option<String>,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            bearer_token: None,
        }
    }

    /// Attach `Authorization: Bearer <token>` to every opening handshake
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_request(
        &self,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let invalid = |reason: String| TransportError::InvalidAddress {
            address: self.url.clone(),
            reason,
        };

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| invalid(e.to_string()))?;

        if let Some(token) = &self.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| invalid(format!("bad bearer token: {}", e)))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }
        Ok(request)
    }
}

impl Connector for WebSocketConnector {
    fn open(&self) -> BoxFuture<'static, Result<Channel>> {
        let request = self.build_request();
        let url = self.url.clone();

        async move {
            let request = request?;
            debug!(url = %url, "Opening WebSocket channel");
            let (stream, response) = connect_async(request)
                .await
                .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
            debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

            let (sink, stream) = stream.split();
            let outbound = sink
                .with(|text: String| future::ready(Ok::<_, WsError>(Message::text(text))))
                .sink_map_err(|e| TransportError::WriteFailed(e.to_string()));
            let inbound = stream.filter_map(|message| future::ready(inbound_text(message)));

            Ok(Channel::new(outbound, inbound))
        }
        .boxed()
    }

    fn target(&self) -> &str {
        &self.url
    }
}

/// Map a raw WebSocket message onto the channel's text stream.
///
/// Control frames are handled by tungstenite and not surfaced.
fn inbound_text(message: std::result::Result<Message, WsError>) -> Option<Result<String>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
        Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Some(Ok(text)),
            Err(e) => Some(Err(TransportError::ReadFailed(format!(
                "binary frame is not UTF-8: {}",
                e
            )))),
        },
        Ok(Message::Close(frame)) => {
            trace!(?frame, "Close frame received");
            None
        }
        Ok(_) => None,
        Err(e) => Some(Err(TransportError::ReadFailed(e.to_string()))),
    }
}
