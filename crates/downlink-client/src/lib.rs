//! Downlink Client - reconnecting telemetry stream consumer
//!
//! Maintains a long-lived connection to a telemetry source and publishes
//! the latest sample, a bounded history, connectivity and loss counters.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use downlink_client::prelude::*;
//!
//! let config = ClientConfig::new().with_endpoint("ws://localhost:8000/ws/telemetry");
//! let mut client = StreamingClient::spawn(config, WebSocketTransport::new())?;
//!
//! while let Some(view) = client.changed().await {
//!     println!("connected={} lost={}", view.is_connected, view.packets_lost);
//! }
//!
//! client.shutdown().await?;
//! ```

#![warn(unreachable_pub)]

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod transport;
pub mod view;

pub use client::{ClientHandle, ClientId, StreamingClient};
pub use config::{ClientConfig, DEFAULT_ENDPOINT, DEFAULT_RECONNECT_DELAY_MS};
pub use connection::{ConnectionManager, ConnectionPhase, ReconnectTimer, TimerId};
pub use error::{ClientError, ConfigError, ConnectionError, TransportError};
pub use transport::{InboundFrame, Transport, TransportEvent, TransportStream, WebSocketTransport};
pub use view::{ConnectionState, TelemetryView};

/// Re-export common types for convenience
pub mod prelude {
    pub use crate::{
        ClientConfig, ClientHandle, ConnectionPhase, StreamingClient, TelemetryView,
        WebSocketTransport,
    };
    pub use downlink_core::{RegressionPolicy, TelemetrySample};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
