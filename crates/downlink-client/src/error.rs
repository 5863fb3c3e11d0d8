//! Error types for the streaming client
//!
//! None of these end a session. Transport failures drive reconnection,
//! illegal state transitions are rejected, and configuration errors are
//! reported before the client starts.

use crate::connection::ConnectionPhase;
use downlink_core::CoreError;

/// Main client error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Configuration rejected
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Connection state machine rejected an event
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Core failure (decode, capacity)
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Run loop task panicked or was aborted
    #[error("client task failed: {0}")]
    TaskFailed(String),
}

/// Transport-level errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Could not establish the connection
    #[error("connect to {endpoint} failed: {reason}")]
    ConnectFailed {
        /// URL that was dialled
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// Connect attempt exceeded the configured timeout
    #[error("connect to {endpoint} timed out after {timeout_ms}ms")]
    ConnectTimeout {
        /// URL that was dialled
        endpoint: String,
        /// Limit that elapsed
        timeout_ms: u64,
    },

    /// Connection dropped, locally or remotely
    #[error("connection closed: {0}")]
    Closed(String),

    /// Receive/send problem that leaves the connection open
    #[error("i/o warning: {0}")]
    Io(String),
}

impl TransportError {
    /// Check if the error ends the current connection
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Connection state machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    /// Event not valid in the current phase
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current phase
        from: ConnectionPhase,
        /// Requested phase
        to: ConnectionPhase,
    },

    /// Client already shut down
    #[error("client stopped")]
    Stopped,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Endpoint is not a plain ws:// URL
    #[error("invalid endpoint {0:?}: expected ws://host[:port]/path")]
    InvalidEndpoint(String),

    /// History must hold at least one sample
    #[error("history capacity must be at least 1")]
    ZeroCapacity,

    /// Reconnect delay must be non-zero
    #[error("reconnect delay must be non-zero")]
    ZeroReconnectDelay,

    /// Config file could not be read
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was opened
        path: String,
        /// I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `ClientConfig`
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
