//! Stream transports.
//!
//! The stream client talks to the backend through a [`Connector`], which opens
//! one physical connection and yields its inbound frames. [`WebSocketConnector`]
//! is the production transport; tests substitute scripted ones.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tracing::debug;
use url::Url;

use crate::error::{ClientError, Result};

/// One inbound item from a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// UTF-8 text payload, expected to carry a `SystemState` object.
    Text(String),
    /// Ping, pong, binary or raw frames. Nothing to deliver.
    Control,
    /// Remote sent a close frame.
    Closed,
}

/// Inbound frames of one connection. Stream end or an `Err` item both mean
/// the connection is gone.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<TransportFrame>> + Send>>;

#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one physical connection to `url`.
    async fn connect(&self, url: &Url) -> Result<FrameStream>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    bearer_token: Option<String>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `Authorization: Bearer <token>` on the handshake.
    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token.filter(|token| !token.trim().is_empty());
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<FrameStream> {
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "URL must use ws:// or wss:// scheme, got: {}",
                url.scheme()
            )));
        }

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        if let Some(token) = &self.bearer_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|error| ClientError::Connection(format!("invalid bearer token: {error}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        let (stream, response) = connect_async(request)
            .await
            .map_err(|error| ClientError::WebSocket(error.to_string()))?;
        debug!("websocket handshake with {} returned {}", url, response.status());

        let frames = stream.map(|frame| match frame {
            Ok(Message::Text(text)) => Ok(TransportFrame::Text(text.to_string())),
            Ok(Message::Close(_)) => Ok(TransportFrame::Closed),
            Ok(Message::Binary(payload)) => {
                debug!("ignoring binary frame ({} bytes)", payload.len());
                Ok(TransportFrame::Control)
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                Ok(TransportFrame::Control)
            }
            Err(error) => Err(ClientError::WebSocket(error.to_string())),
        });
        Ok(Box::pin(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_websocket_urls() {
        let connector = WebSocketConnector::new();
        let url = Url::parse("http://localhost:8000/ws/system-stream").expect("url");
        let result = connector.connect(&url).await;
        assert!(matches!(result, Err(ClientError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_websocket_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/ws/system-stream")).expect("url");
        let result = WebSocketConnector::new().connect(&url).await;
        assert!(matches!(result, Err(ClientError::WebSocket(_))));
    }

    #[test]
    fn blank_tokens_are_dropped() {
        let connector = WebSocketConnector::new().with_bearer_token(Some("  ".to_string()));
        assert!(connector.bearer_token.is_none());
    }
}
