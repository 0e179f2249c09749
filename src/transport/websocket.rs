//! WebSocket frame source (`spec.md §4.3`), grounded in the corpus's
//! `tokio-tungstenite`-based EVM WS listener: text frames are decoded as
//! UTF-8, binary frames are taken verbatim; one frame = one envelope.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use async_trait::async_trait;

use super::multiplex::FrameConnection;
use crate::error::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// `PersistentWebSocket`: lazily connects on first use, caches the split
/// sink/stream halves (`spec.md §4.3`).
pub struct WebSocketConnection {
    uri: String,
    stream: Mutex<Option<WsStream>>,
}

impl WebSocketConnection {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            stream: Mutex::new(None),
        }
    }
}

#[async_trait]
impl FrameConnection for WebSocketConnection {
    async fn open(&self) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return Ok(());
        }
        let (ws, _response) = connect_async(&self.uri).await.map_err(|e| TransportError::Connect {
            uri: self.uri.clone(),
            source: std::io::Error::other(e.to_string()),
        })?;
        *guard = Some(ws);
        Ok(())
    }

    async fn read_frame(&self) -> Result<Vec<u8>, TransportError> {
        loop {
            let mut guard = self.stream.lock().await;
            let ws = guard
                .as_mut()
                .ok_or_else(|| TransportError::ConnectionLost("websocket not open".to_string()))?;
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.as_bytes().to_vec()),
                Some(Ok(Message::Binary(data))) => return Ok(data.to_vec()),
                Some(Ok(Message::Ping(payload))) => {
                    let _ = ws.send(Message::Pong(payload)).await;
                    continue;
                }
                Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(TransportError::ConnectionLost("websocket closed by peer".to_string()))
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(TransportError::ConnectionLost(e.to_string())),
            }
        }
    }

    async fn write_frame(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let ws = guard
            .as_mut()
            .ok_or_else(|| TransportError::ConnectionLost("websocket not open".to_string()))?;
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| TransportError::ConnectionLost(format!("outbound frame not UTF-8: {e}")))?;
        ws.send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::ConnectionLost(e.to_string()))
    }

    async fn close(&self) {
        let mut guard = self.stream.lock().await;
        if let Some(mut ws) = guard.take() {
            let _ = ws.close(None).await;
        }
    }
}
