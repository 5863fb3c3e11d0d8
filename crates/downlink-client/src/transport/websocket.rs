//! WebSocket transport over `tokio-tungstenite`

use super::{now_ms, InboundFrame, Transport, TransportEvent, TransportStream};
use crate::error::TransportError;
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Consecutive non-fatal read errors tolerated before the stream is dropped
const MAX_CONSECUTIVE_WARNINGS: u32 = 16;

/// Plain `ws://` transport
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create transport
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportStream>, TransportError> {
        let (inner, response) =
            connect_async(endpoint)
                .await
                .map_err(|e| TransportError::ConnectFailed {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;
        tracing::debug!(endpoint, status = %response.status(), "websocket handshake complete");

        Ok(Box::new(WebSocketConnection {
            inner,
            consecutive_warnings: 0,
        }))
    }
}

struct WebSocketConnection {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    consecutive_warnings: u32,
}

#[async_trait]
impl TransportStream for WebSocketConnection {
    async fn next_event(&mut self) -> TransportEvent {
        loop {
            let Some(next) = self.inner.next().await else {
                return TransportEvent::Closed(TransportError::Closed(
                    "stream ended".to_string(),
                ));
            };
            let received_at_ms = now_ms();

            match next {
                Ok(Message::Text(text)) => {
                    self.consecutive_warnings = 0;
                    return TransportEvent::Frame(InboundFrame {
                        payload: text.into_bytes(),
                        received_at_ms,
                    });
                }
                Ok(Message::Binary(payload)) => {
                    self.consecutive_warnings = 0;
                    return TransportEvent::Frame(InboundFrame {
                        payload,
                        received_at_ms,
                    });
                }
                // Pings are answered by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    let reason = frame.map_or_else(
                        || "peer closed without close frame".to_string(),
                        |f| format!("peer closed ({}): {}", f.code, f.reason),
                    );
                    return TransportEvent::Closed(TransportError::Closed(reason));
                }
                Err(err) => {
                    let error = classify(err);
                    if error.is_fatal() {
                        return TransportEvent::Closed(error);
                    }
                    self.consecutive_warnings += 1;
                    if self.consecutive_warnings >= MAX_CONSECUTIVE_WARNINGS {
                        return TransportEvent::Closed(TransportError::Closed(format!(
                            "{} consecutive read errors, last: {error}",
                            self.consecutive_warnings
                        )));
                    }
                    return TransportEvent::Warning(error);
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.inner.close(None).await {
            tracing::debug!(error = %err, "websocket close did not complete cleanly");
        }
    }
}

/// Map a tungstenite read error onto the transport taxonomy
fn classify(err: tungstenite::Error) -> TransportError {
    match err {
        tungstenite::Error::Utf8 | tungstenite::Error::Capacity(_) => {
            TransportError::Io(err.to_string())
        }
        other => TransportError::Closed(other.to_string()),
    }
}
