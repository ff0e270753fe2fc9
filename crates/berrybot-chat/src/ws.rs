//! WebSocket implementation of the gateway transport.
//!
//! The bearer token travels as the `token` query parameter of the
//! connection URL, which is what the managed gateway's authorizer reads.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::ChatError;
use crate::transport::{ConnectionEvent, Gateway, GatewayConnection};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gateway reached over `ws://` or `wss://`.
#[derive(Debug, Clone)]
pub struct WebSocketGateway {
    url: Url,
}

impl WebSocketGateway {
    pub fn new(url: &str) -> Result<Self, ChatError> {
        let url = Url::parse(url)
            .map_err(|e| ChatError::Gateway(format!("Invalid gateway URL '{}': {}", url, e)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self { url }),
            other => Err(ChatError::Gateway(format!(
                "Unsupported gateway scheme '{}'",
                other
            ))),
        }
    }

    /// URL for one connection attempt, with the token attached if present.
    pub fn connection_url(&self, token: Option<&str>) -> Url {
        let mut url = self.url.clone();
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("token", token);
        }
        url
    }
}

#[async_trait]
impl Gateway for WebSocketGateway {
    async fn connect(
        &self,
        token: Option<&str>,
    ) -> Result<Box<dyn GatewayConnection>, ChatError> {
        let url = self.connection_url(token);
        tracing::debug!(host = ?url.host_str(), "Opening gateway connection");
        let (stream, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ChatError::Gateway(format!("WebSocket connect failed: {}", e)))?;
        Ok(Box::new(WebSocketConnection { stream }))
    }
}

struct WebSocketConnection {
    stream: WsStream,
}

#[async_trait]
impl GatewayConnection for WebSocketConnection {
    async fn send_text(&mut self, text: String) -> Result<(), ChatError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| ChatError::Gateway(format!("WebSocket send failed: {}", e)))
    }

    async fn next_event(&mut self) -> Option<ConnectionEvent> {
        loop {
            let event = match self.stream.next().await? {
                Ok(Message::Text(text)) => ConnectionEvent::Text(text.as_str().to_string()),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => ConnectionEvent::Text(text),
                    Err(_) => {
                        tracing::debug!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                        continue;
                    }
                },
                Ok(Message::Close(frame)) => match frame {
                    Some(frame) => ConnectionEvent::Closed {
                        code: u16::from(frame.code),
                        reason: frame.reason.as_str().to_string(),
                    },
                    None => ConnectionEvent::Closed {
                        code: 1005,
                        reason: String::new(),
                    },
                },
                Ok(_) => continue,
                Err(e) => ConnectionEvent::Error(e.to_string()),
            };
            return Some(event);
        }
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| ChatError::Gateway(format!("WebSocket close failed: {}", e)))
    }
}
