//! Telemetry data model
//!
//! Mirrors the producer's wire schema:
//! - One `TelemetrySample` per tick (position, velocity, power, thermal,
//!   attitude, status)
//! - An `Envelope` wrapping a sample with send time, source and sequence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Orbital position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Altitude above mean Earth radius (km)
    pub altitude_km: f64,
    /// Geodetic latitude (degrees)
    pub latitude_deg: f64,
    /// Geodetic longitude (degrees)
    pub longitude_deg: f64,
}

/// Orbital and ground-track velocity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// Orbital speed (km/s)
    pub orbital_velocity_km_per_s: f64,
    /// Speed of the sub-satellite point over the ground (km/s)
    pub ground_track_velocity_km_per_s: f64,
}

/// Electrical power system readings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSystem {
    /// Battery state of charge, 0-100
    pub battery_level_pct: f64,
    /// Solar array input (W)
    pub solar_input_w: f64,
    /// Total bus draw (W)
    pub power_draw_w: f64,
    /// `solar_input_w - power_draw_w`
    pub net_power_w: f64,
}

/// Temperatures in degrees Celsius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thermal {
    pub temp_battery_c: f64,
    pub temp_solar_panels_c: f64,
    pub temp_electronics_c: f64,
    pub temp_exterior_c: f64,
}

/// Vehicle attitude in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub pitch_deg: f64,
    pub roll_deg: f64,
    pub yaw_deg: f64,
}

/// Overall system health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    /// All systems within limits
    Nominal,
    /// At least one parameter outside its soft limit
    Warning,
    /// At least one parameter outside its hard limit
    Critical,
    /// Vehicle not reporting
    Offline,
}

impl SystemStatus {
    /// Wire name of the status
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemStatus::Nominal => "nominal",
            SystemStatus::Warning => "warning",
            SystemStatus::Critical => "critical",
            SystemStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active warning identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    LowFuel,
    HighTemp,
    SensorFault,
    LowAltitude,
    LowBattery,
    /// Identifier this client does not know about yet
    #[serde(other)]
    Unknown,
}

/// Status block of a sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Aggregate health
    pub system_status: SystemStatus,
    /// Warnings currently raised, in producer order
    pub active_warnings: Vec<WarningKind>,
    /// Mission elapsed time (s)
    pub mission_time_s: f64,
}

/// One complete spacecraft-state snapshot
///
/// Immutable once decoded; the client shares samples behind `Arc` between
/// the history buffer and the published view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Producer-side sample time
    pub timestamp: DateTime<Utc>,
    pub position: Position,
    pub velocity: Velocity,
    pub power_system: PowerSystem,
    pub thermal: Thermal,
    pub attitude: Attitude,
    pub status: Status,
}

impl TelemetrySample {
    /// Shorthand for `position.altitude_km`
    #[inline]
    #[must_use]
    pub fn altitude_km(&self) -> f64 {
        self.position.altitude_km
    }

    /// Shorthand for `status.system_status`
    #[inline]
    #[must_use]
    pub fn system_status(&self) -> SystemStatus {
        self.status.system_status
    }
}

/// Producer of an envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Ground simulator
    #[default]
    Simulator,
    /// Flight vehicle
    Rocket,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Simulator => f.write_str("simulator"),
            Source::Rocket => f.write_str("rocket"),
        }
    }
}

/// Wire unit: one telemetry sample plus transport metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Send time in epoch milliseconds, producer clock
    pub send_timestamp_ms: i64,
    /// Producer tag; absent on the wire means simulator
    #[serde(default)]
    pub source: Source,
    /// Strictly increasing per producer
    pub sequence_number: i64,
    /// Embedded sample
    pub telemetry: TelemetrySample,
}

impl Envelope {
    /// Split into the sample, discarding transport metadata
    #[inline]
    #[must_use]
    pub fn into_sample(self) -> TelemetrySample {
        self.telemetry
    }
}
