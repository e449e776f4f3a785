//! WebSocket client for the connection pool.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use super::ClientError;
use crate::objects::SocketInbound;

/// A socket connection to `GET /ws/{id}`.
pub struct SocketClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SocketClient {
    /// Connect to the pool as `target`. `base_url` is the server's HTTP URL;
    /// the scheme is switched to `ws`/`wss`.
    pub async fn connect(base_url: &Url, target: &str) -> Result<Self, ClientError> {
        let mut url = base_url.join(&format!("/ws/{target}"))?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(ClientError::Scheme(other.to_owned())),
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Scheme(scheme.to_owned()))?;

        let (stream, _response) = connect_async(url.as_str()).await?;
        Ok(Self { stream })
    }

    /// Send a structured message to the pool.
    pub async fn send(&mut self, message: &SocketInbound) -> Result<(), ClientError> {
        let json = serde_json::to_string(message)?;
        self.send_text(json).await
    }

    /// Send a raw text frame.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Wait for the next text frame. `Ok(None)` once the server closed.
    pub async fn next_text(&mut self) -> Result<Option<String>, ClientError> {
        while let Some(message) = self.stream.next().await {
            match message? {
                Message::Text(text) => return Ok(Some(text)),
                Message::Close(_) => return Ok(None),
                _ => continue,
            }
        }
        Ok(None)
    }

    /// Close the connection with a normal close frame.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
