//! Client configuration
//!
//! Defaults match the ground-station deployment: local simulator endpoint,
//! fixed 3 s reconnect delay, 100-sample history.

use crate::error::ConfigError;
use downlink_core::{RegressionPolicy, DEFAULT_HISTORY_CAPACITY};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default telemetry stream address
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws/telemetry";

/// Default fixed reconnect delay
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3000;

/// Streaming client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket URL of the telemetry source
    pub endpoint: String,
    /// Delay between losing the connection and the next attempt
    pub reconnect_delay_ms: u64,
    /// Samples kept in the rolling history
    pub history_capacity: usize,
    /// Treatment of duplicate/reordered sequence numbers
    pub regression_policy: RegressionPolicy,
    /// Upper bound on a single connect attempt; unbounded when absent
    pub connect_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With endpoint
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// With reconnect delay
    #[inline]
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With history capacity
    #[inline]
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// With regression policy
    #[inline]
    #[must_use]
    pub fn with_regression_policy(mut self, policy: RegressionPolicy) -> Self {
        self.regression_policy = policy;
        self
    }

    /// With connect timeout
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Reconnect delay as a `Duration`
    #[inline]
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Connect timeout as a `Duration`
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration before starting a client
    ///
    /// # Errors
    /// - `ConfigError::InvalidEndpoint` if the endpoint is not a ws:// URL with a host
    /// - `ConfigError::ZeroCapacity` if the history capacity is zero
    /// - `ConfigError::ZeroReconnectDelay` if the reconnect delay is zero
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = self
            .endpoint
            .strip_prefix("ws://")
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
        if !valid {
            return Err(ConfigError::InvalidEndpoint(self.endpoint.clone()));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if self.reconnect_delay_ms == 0 {
            return Err(ConfigError::ZeroReconnectDelay);
        }
        Ok(())
    }

    /// Parse from TOML; missing keys take their defaults
    ///
    /// # Errors
    /// `ConfigError::Parse` on malformed TOML, or any `validate` error
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Read` if the file cannot be read, else as `from_toml_str`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&input)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            regression_policy: RegressionPolicy::default(),
            connect_timeout_ms: None,
        }
    }
}
