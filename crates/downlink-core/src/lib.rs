//! Downlink Core - telemetry ingestion primitives
//!
//! The pure, transport-agnostic half of the streaming client:
//! - Typed telemetry data model and wire envelope
//! - Envelope codec (decode never panics)
//! - Sequence tracker (latency and packet loss)
//! - Bounded history buffer (FIFO eviction)
//!
//! # Example
//!
//! ```rust,ignore
//! use downlink_core::{codec, HistoryBuffer, SequenceTracker};
//!
//! let mut tracker = SequenceTracker::new();
//! let mut history = HistoryBuffer::default();
//!
//! let envelope = codec::decode(frame)?;
//! let observation = tracker.observe(&envelope, received_at_ms);
//! history.append(std::sync::Arc::new(envelope.into_sample()));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod codec;
pub mod error;
pub mod history;
pub mod sequence;
pub mod types;

pub use codec::{decode, encode};
pub use error::{CoreError, DecodeError};
pub use history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY};
pub use sequence::{RegressionPolicy, SequenceAnomaly, SequenceObservation, SequenceTracker};
pub use types::{
    Attitude, Envelope, Position, PowerSystem, Source, Status, SystemStatus, TelemetrySample,
    Thermal, Velocity, WarningKind,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
