//! Race control configuration.
//!
//! Settings come from environment variables with defaults suitable for a
//! typical dedicated server. Invalid values are reported with `tracing` and
//! replaced by the default rather than failing startup.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::{RaceControlError, Result};

/// Tunables for one race control instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceControlConfig {
    /// Connected drivers silent for longer than this are force-disconnected.
    pub driver_timeout: Duration,
    /// How often the timeout sweep runs.
    pub timeout_sweep_interval: Duration,
    /// How often session info is requested from the server after a version event.
    pub session_poll_interval: Duration,
    /// Idle keep-alive probe interval for streaming clients.
    pub keepalive_interval: Duration,
    /// Outbound queue depth per streaming client. A full queue evicts the client.
    pub client_queue_capacity: usize,
    /// Interval between weather transition steps.
    pub weather_step_interval: Duration,
    /// Where the live timing snapshot is written, when file persistence is used.
    pub snapshot_path: PathBuf,
}

impl Default for RaceControlConfig {
    fn default() -> Self {
        Self {
            driver_timeout: Duration::from_secs(5 * 60),
            timeout_sweep_interval: Duration::from_secs(60),
            session_poll_interval: Duration::from_secs(1),
            keepalive_interval: Duration::from_secs(10),
            client_queue_capacity: 512,
            weather_step_interval: Duration::from_secs(1),
            snapshot_path: PathBuf::from("live_timing.yaml"),
        }
    }
}

impl RaceControlConfig {
    /// Load config from the environment, using defaults for anything unset or invalid.
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_number::<u64>("RACE_CONTROL_DRIVER_TIMEOUT_SECS") {
            config.driver_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_number::<u64>("RACE_CONTROL_SWEEP_INTERVAL_SECS") {
            config.timeout_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(millis) = env_number::<u64>("RACE_CONTROL_SESSION_POLL_MS") {
            config.session_poll_interval = Duration::from_millis(millis);
        }
        if let Some(secs) = env_number::<u64>("RACE_CONTROL_KEEPALIVE_SECS") {
            config.keepalive_interval = Duration::from_secs(secs);
        }
        if let Some(capacity) = env_number::<usize>("RACE_CONTROL_CLIENT_QUEUE") {
            config.client_queue_capacity = capacity;
        }
        if let Some(millis) = env_number::<u64>("RACE_CONTROL_WEATHER_STEP_MS") {
            config.weather_step_interval = Duration::from_millis(millis);
        }
        if let Ok(path) = std::env::var("RACE_CONTROL_SNAPSHOT_PATH") {
            config.snapshot_path = PathBuf::from(path);
        }

        if let Err(e) = config.validate() {
            warn!("{}, using defaults", e);
            return Self::default();
        }

        config
    }

    /// Check the settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.driver_timeout.is_zero() {
            return Err(RaceControlError::config("driver_timeout must be greater than zero"));
        }
        if self.timeout_sweep_interval.is_zero() {
            return Err(RaceControlError::config("timeout_sweep_interval must be greater than zero"));
        }
        if self.session_poll_interval.is_zero() {
            return Err(RaceControlError::config("session_poll_interval must be greater than zero"));
        }
        if self.keepalive_interval.is_zero() {
            return Err(RaceControlError::config("keepalive_interval must be greater than zero"));
        }
        if self.client_queue_capacity == 0 {
            return Err(RaceControlError::config("client_queue_capacity must be at least 1"));
        }
        if self.weather_step_interval.is_zero() {
            return Err(RaceControlError::config("weather_step_interval must be greater than zero"));
        }
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}
