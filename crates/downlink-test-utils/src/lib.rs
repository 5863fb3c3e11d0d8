//! Testing utilities for the downlink workspace
//!
//! Shared fixtures and a scripted transport that lets tests decide, step by
//! step, when connects succeed, which frames arrive and when streams close.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use downlink_client::{InboundFrame, Transport, TransportError, TransportEvent, TransportStream};
use downlink_core::{
    codec, Attitude, Envelope, Position, PowerSystem, Source, Status, SystemStatus,
    TelemetrySample, Thermal, Velocity,
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Epoch milliseconds used as the fixture clock origin
pub const BASE_TIME_MS: i64 = 1_700_000_000_000;

pub fn sample(altitude_km: f64) -> TelemetrySample {
    TelemetrySample {
        timestamp: Utc
            .timestamp_millis_opt(BASE_TIME_MS)
            .single()
            .unwrap_or_default(),
        position: Position {
            altitude_km,
            latitude_deg: 0.0,
            longitude_deg: 0.0,
        },
        velocity: Velocity {
            orbital_velocity_km_per_s: 7.8,
            ground_track_velocity_km_per_s: 7.6,
        },
        power_system: PowerSystem {
            battery_level_pct: 100.0,
            solar_input_w: 450.0,
            power_draw_w: 250.0,
            net_power_w: 200.0,
        },
        thermal: Thermal {
            temp_battery_c: 20.0,
            temp_solar_panels_c: 15.0,
            temp_electronics_c: 22.0,
            temp_exterior_c: -50.0,
        },
        attitude: Attitude {
            pitch_deg: 0.0,
            roll_deg: 0.0,
            yaw_deg: 0.0,
        },
        status: Status {
            system_status: SystemStatus::Nominal,
            active_warnings: Vec::new(),
            mission_time_s: 0.0,
        },
    }
}

/// Envelope sent one second per sequence step after `BASE_TIME_MS`
pub fn envelope(sequence_number: i64, altitude_km: f64) -> Envelope {
    Envelope {
        send_timestamp_ms: BASE_TIME_MS + sequence_number * 1000,
        source: Source::Simulator,
        sequence_number,
        telemetry: sample(altitude_km),
    }
}

/// Wire form of `envelope`, stamped as received `latency_ms` after sending
pub fn frame(envelope: &Envelope, latency_ms: i64) -> InboundFrame {
    InboundFrame {
        payload: codec::encode(envelope)
            .unwrap_or_default()
            .into_bytes(),
        received_at_ms: envelope.send_timestamp_ms + latency_ms,
    }
}

/// Counters recorded by the scripted transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptStats {
    /// `connect` calls made by the client
    pub connect_attempts: usize,
    /// Streams the client closed itself
    pub closed_by_client: usize,
}

enum ConnectOutcome {
    Accept(mpsc::UnboundedReceiver<TransportEvent>),
    Refuse(String),
}

/// Transport whose behaviour is dictated by a [`TransportController`]
pub struct ScriptedTransport {
    attempts: mpsc::UnboundedSender<String>,
    outcomes: tokio::sync::Mutex<mpsc::UnboundedReceiver<ConnectOutcome>>,
    stats: Arc<Mutex<ScriptStats>>,
}

impl ScriptedTransport {
    pub fn new() -> (Self, TransportController) {
        let (attempts_tx, attempts_rx) = mpsc::unbounded_channel();
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(ScriptStats::default()));

        let transport = Self {
            attempts: attempts_tx,
            outcomes: tokio::sync::Mutex::new(outcomes_rx),
            stats: Arc::clone(&stats),
        };
        let controller = TransportController {
            attempts: attempts_rx,
            outcomes: outcomes_tx,
            stats,
        };
        (transport, controller)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn TransportStream>, TransportError> {
        self.stats.lock().connect_attempts += 1;
        let _ = self.attempts.send(endpoint.to_string());

        let outcome = self.outcomes.lock().await.recv().await;
        match outcome {
            Some(ConnectOutcome::Accept(events)) => Ok(Box::new(ScriptedStream {
                events,
                stats: Arc::clone(&self.stats),
            })),
            Some(ConnectOutcome::Refuse(reason)) => Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason,
            }),
            None => Err(TransportError::ConnectFailed {
                endpoint: endpoint.to_string(),
                reason: "controller dropped".to_string(),
            }),
        }
    }
}

struct ScriptedStream {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    stats: Arc<Mutex<ScriptStats>>,
}

#[async_trait]
impl TransportStream for ScriptedStream {
    async fn next_event(&mut self) -> TransportEvent {
        match self.events.recv().await {
            Some(event) => event,
            None => TransportEvent::Closed(TransportError::Closed("session dropped".to_string())),
        }
    }

    async fn close(&mut self) {
        self.stats.lock().closed_by_client += 1;
        self.events.close();
    }
}

/// Test-side control of a [`ScriptedTransport`]
pub struct TransportController {
    attempts: mpsc::UnboundedReceiver<String>,
    outcomes: mpsc::UnboundedSender<ConnectOutcome>,
    stats: Arc<Mutex<ScriptStats>>,
}

impl TransportController {
    /// Wait for the client's next connect call; returns the endpoint
    pub async fn next_attempt(&mut self) -> Option<String> {
        self.attempts.recv().await
    }

    /// Let the pending (or next) connect succeed
    pub fn accept(&self) -> ScriptedSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = self.outcomes.send(ConnectOutcome::Accept(rx));
        ScriptedSession { events: tx }
    }

    /// Fail the pending (or next) connect
    pub fn refuse(&self, reason: &str) {
        let _ = self.outcomes.send(ConnectOutcome::Refuse(reason.to_string()));
    }

    pub fn stats(&self) -> ScriptStats {
        *self.stats.lock()
    }
}

/// Server side of one accepted connection
pub struct ScriptedSession {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ScriptedSession {
    pub fn send_frame(&self, frame: InboundFrame) {
        let _ = self.events.send(TransportEvent::Frame(frame));
    }

    pub fn send_envelope(&self, envelope: &Envelope, latency_ms: i64) {
        self.send_frame(frame(envelope, latency_ms));
    }

    pub fn send_raw(&self, payload: &str) {
        self.send_frame(InboundFrame::now(payload));
    }

    pub fn warn(&self, message: &str) {
        let _ = self
            .events
            .send(TransportEvent::Warning(TransportError::Io(message.to_string())));
    }

    pub fn close(self, reason: &str) {
        let _ = self
            .events
            .send(TransportEvent::Closed(TransportError::Closed(reason.to_string())));
    }

    /// Whether the client has dropped its end of the stream
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}
