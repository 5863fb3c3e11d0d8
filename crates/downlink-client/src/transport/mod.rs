//! Transport abstraction
//!
//! The client only needs two things from a transport: a way to open a
//! stream, and a way to pull the next event from it. Receive timestamps are
//! taken by the transport at frame arrival, before any decoding.

use crate::error::TransportError;
use async_trait::async_trait;

pub mod websocket;

pub use websocket::WebSocketTransport;

/// One inbound message unit with its arrival time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFrame {
    /// Raw message bytes (UTF-8 JSON for text frames)
    pub payload: Vec<u8>,
    /// Epoch milliseconds, local clock, stamped on arrival
    pub received_at_ms: i64,
}

impl InboundFrame {
    /// Stamp a payload with the current time
    #[inline]
    #[must_use]
    pub fn now(payload: impl Into<Vec<u8>>) -> Self {
        let received_at_ms = now_ms();
        Self {
            payload: payload.into(),
            received_at_ms,
        }
    }
}

/// Event produced by an open transport stream
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Message received
    Frame(InboundFrame),
    /// Non-fatal error; the stream stays open
    Warning(TransportError),
    /// Stream ended; no further events
    Closed(TransportError),
}

/// Opens transport streams
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a stream to `endpoint`
    ///
    /// # Errors
    /// `TransportError::ConnectFailed` if the stream cannot be established
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportStream>, TransportError>;
}

/// An open, receive-only message stream
#[async_trait]
pub trait TransportStream: Send {
    /// Wait for the next event
    ///
    /// After `Closed` is returned the stream must not be polled again.
    async fn next_event(&mut self) -> TransportEvent;

    /// Close the stream; best effort
    async fn close(&mut self);
}

/// Current wall-clock time in epoch milliseconds
#[inline]
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
