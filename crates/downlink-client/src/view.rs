//! Published client state
//!
//! The run loop replaces the whole view on every change, so a consumer
//! always reads one consistent tuple.

use crate::connection::ConnectionPhase;
use downlink_core::{Source, TelemetrySample};
use serde::Serialize;
use std::sync::Arc;

/// Immutable snapshot handed to the consumer
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryView {
    /// Most recent sample, absent until the first envelope decodes
    pub latest: Option<Arc<TelemetrySample>>,
    /// Rolling history, oldest first
    pub history: Arc<[Arc<TelemetrySample>]>,
    /// `true` only while the transport is open
    pub is_connected: bool,
    /// Lifecycle phase behind `is_connected`
    pub phase: ConnectionPhase,
    /// Latency of the latest envelope
    pub latency_ms: Option<i64>,
    /// Running loss counter
    pub packets_lost: i64,
    /// Sequence number of the latest envelope
    pub last_sequence: Option<i64>,
    /// Producer of the latest envelope
    pub source: Option<Source>,
    /// Successful reconnects after the first connection
    pub reconnects: u64,
}

impl TelemetryView {
    /// Number of samples in the history window
    #[inline]
    #[must_use]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Connectivity and loss fields of the view
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState {
            is_connected: self.is_connected,
            last_sequence: self.last_sequence,
            latency_ms: self.latency_ms,
            packets_lost: self.packets_lost,
        }
    }
}

/// Connectivity, latency and loss counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConnectionState {
    /// Transport currently open
    pub is_connected: bool,
    /// Last sequence number seen
    pub last_sequence: Option<i64>,
    /// Latency of the most recent envelope
    pub latency_ms: Option<i64>,
    /// Running loss counter
    pub packets_lost: i64,
}

impl Default for TelemetryView {
    fn default() -> Self {
        Self {
            latest: None,
            history: Arc::from(Vec::new()),
            is_connected: false,
            phase: ConnectionPhase::Disconnected,
            latency_ms: None,
            packets_lost: 0,
            last_sequence: None,
            source: None,
            reconnects: 0,
        }
    }
}
