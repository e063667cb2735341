//! WebSocket transport
//!
//! Text frames carry the JSON envelope; the credential rides on the
//! upgrade request as an `Authorization` header.

use apolo_core::error::AppError;
use apolo_core::models::{ClientMessage, Credential, ServerMessage};
use apolo_core::traits::{ChannelLink, Transport};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Map one frame to at most one inbound item
///
/// Unknown kinds and malformed envelopes are dropped; only a socket error
/// ends the session.
fn decode_frame(frame: Result<Message, WsError>) -> Option<Result<ServerMessage, AppError>> {
    match frame {
        Ok(Message::Text(text)) => match ServerMessage::decode(&text) {
            Ok(Some(message)) => Some(Ok(message)),
            Ok(None) => {
                debug!("Ignoring message of unknown kind");
                None
            }
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                None
            }
        },
        Ok(Message::Close(frame)) => {
            info!(frame = ?frame, "Server sent close frame");
            None
        }
        Ok(_) => None,
        Err(WsError::ConnectionClosed) => None,
        Err(e) => Some(Err(AppError::Transport(e.to_string()))),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn open(&self, credential: &Credential) -> Result<ChannelLink, AppError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| AppError::Config(format!("invalid channel url {}: {}", self.url, e)))?;

        let header = HeaderValue::from_str(&credential.authorization_header())
            .map_err(|e| AppError::Handshake(format!("credential is not a valid header: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, header);

        let (stream, response) = connect_async(request).await.map_err(|e| match e {
            WsError::Http(response) => {
                AppError::Handshake(format!("upgrade rejected with {}", response.status()))
            }
            other => AppError::Handshake(other.to_string()),
        })?;
        debug!(url = %self.url, status = %response.status(), "WebSocket upgrade complete");

        let (sink, stream) = stream.split();
        let inbound = stream
            .filter_map(|frame| future::ready(decode_frame(frame)))
            .boxed();
        let outbound = sink
            .sink_map_err(|e| AppError::Transport(e.to_string()))
            .with(|message: ClientMessage| future::ready(message.encode().map(Message::Text)));

        Ok(ChannelLink::new(self.url.clone(), inbound, Box::pin(outbound)))
    }
}
