//! Persistent WebSocket channel for live (per-frame) predictions.
//!
//! The backend expects one binary JPEG frame per message and answers each
//! with one JSON text message. The channel is driven from a plain worker
//! thread, so it owns a current-thread tokio runtime and blocks on it.

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::{InferenceError, InferenceResult};

/// One request/reply round trip per frame.
pub trait FrameChannel: Send {
    /// Send an encoded frame and block until the reply arrives.
    /// `Ok(None)` means the peer closed the channel.
    fn exchange(&mut self, frame: Vec<u8>) -> InferenceResult<Option<String>>;

    /// Best-effort graceful close. Errors are logged, not returned.
    fn close(&mut self);
}

pub struct LiveChannel {
    runtime: tokio::runtime::Runtime,
    stream: Option<WebSocketStream<MaybeTlsStream<TcpStream>>>,
    url: Url,
}

impl LiveChannel {
    pub fn connect(url: Url) -> InferenceResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| InferenceError::stream(format!("cannot start runtime: {}", e)))?;

        let (stream, _response) = runtime
            .block_on(tokio_tungstenite::connect_async(url.as_str()))
            .map_err(|e| InferenceError::stream(format!("connect {} failed: {}", url, e)))?;

        log::info!("Live channel open: {}", url);
        Ok(Self {
            runtime,
            stream: Some(stream),
            url,
        })
    }
}

impl FrameChannel for LiveChannel {
    fn exchange(&mut self, frame: Vec<u8>) -> InferenceResult<Option<String>> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };

        self.runtime.block_on(round_trip(stream, frame))
    }

    fn close(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        match self.runtime.block_on(stream.close(None)) {
            Ok(()) => log::info!("Live channel closed: {}", self.url),
            Err(e) => log::debug!("Live channel close for {} failed: {}", self.url, e),
        }
    }
}

async fn round_trip(
    stream: &mut WebSocketStream<MaybeTlsStream<TcpStream>>,
    frame: Vec<u8>,
) -> InferenceResult<Option<String>> {
    stream
        .send(Message::binary(frame))
        .await
        .map_err(|e| InferenceError::stream(format!("send failed: {}", e)))?;

    while let Some(msg) = stream.next().await {
        let msg = msg.map_err(|e| InferenceError::stream(format!("receive failed: {}", e)))?;
        match msg {
            Message::Text(text) => return Ok(Some(text.as_str().to_string())),
            Message::Binary(bytes) => return Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Message::Close(_) => return Ok(None),
            // Ping/pong are answered by tungstenite itself
            _ => continue,
        }
    }
    Ok(None)
}

impl Drop for LiveChannel {
    fn drop(&mut self) {
        self.close();
    }
}
