//! Sequence tracking
//!
//! Computes per-envelope latency and folds sequence-number discontinuities
//! into a running loss counter.

use crate::types::Envelope;
use serde::{Deserialize, Serialize};

/// How a sequence number lower than expected is counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegressionPolicy {
    /// Add the (negative) delta to the loss counter, as the reference viewer does
    #[default]
    Accumulate,
    /// Ignore negative deltas so the loss counter never decreases
    Clamp,
}

/// Non-contiguous sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceAnomaly {
    /// Sequence jumped forward; `missing` envelopes never arrived
    Gap {
        expected: i64,
        received: i64,
        missing: i64,
    },
    /// Duplicate, reordered or reset sequence number
    Regression { expected: i64, received: i64 },
}

/// Result of observing one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceObservation {
    /// `receive_time_ms - send_timestamp_ms`; negative under clock skew
    pub latency_ms: i64,
    /// Delta added to the loss counter by this observation
    pub gap: i64,
    /// Set when the sequence number was not `last + 1`
    pub anomaly: Option<SequenceAnomaly>,
}

/// Latency and loss state for one stream
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    last_sequence: Option<i64>,
    packets_lost: i64,
    latency_ms: Option<i64>,
    policy: RegressionPolicy,
}

impl SequenceTracker {
    /// Create a tracker with the default regression policy
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tracker with an explicit regression policy
    #[inline]
    #[must_use]
    pub fn with_policy(policy: RegressionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Observe one envelope
    ///
    /// `receive_time_ms` must be stamped when the frame arrived, before
    /// decoding. The first observation only establishes the baseline.
    pub fn observe(&mut self, envelope: &Envelope, receive_time_ms: i64) -> SequenceObservation {
        let latency_ms = receive_time_ms.saturating_sub(envelope.send_timestamp_ms);
        self.latency_ms = Some(latency_ms);

        let received = envelope.sequence_number;
        let mut gap = 0;
        let mut anomaly = None;

        if let Some(last) = self.last_sequence {
            // Widened so `last == i64::MAX` still expects a larger successor
            let delta = i128::from(received) - i128::from(last) - 1;
            if delta != 0 {
                let expected = last.saturating_add(1);
                let delta = i64::try_from(delta).unwrap_or(if delta > 0 { i64::MAX } else { i64::MIN });
                if delta > 0 {
                    tracing::warn!(expected, received, missing = delta, "packet loss detected");
                    anomaly = Some(SequenceAnomaly::Gap {
                        expected,
                        received,
                        missing: delta,
                    });
                    gap = delta;
                } else {
                    tracing::warn!(expected, received, "sequence regression detected");
                    anomaly = Some(SequenceAnomaly::Regression { expected, received });
                    if self.policy == RegressionPolicy::Accumulate {
                        gap = delta;
                    }
                }
                self.packets_lost = self.packets_lost.saturating_add(gap);
            }
        }

        self.last_sequence = Some(received);

        SequenceObservation {
            latency_ms,
            gap,
            anomaly,
        }
    }

    /// Last sequence number seen, if any
    #[inline]
    #[must_use]
    pub fn last_sequence(&self) -> Option<i64> {
        self.last_sequence
    }

    /// Running loss counter
    #[inline]
    #[must_use]
    pub fn packets_lost(&self) -> i64 {
        self.packets_lost
    }

    /// Latency of the most recent observation
    #[inline]
    #[must_use]
    pub fn latency_ms(&self) -> Option<i64> {
        self.latency_ms
    }

    /// Active regression policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> RegressionPolicy {
        self.policy
    }
}
