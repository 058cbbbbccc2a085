use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{TripMeterError, TripResult};

/// Tunables for the trip computer.
///
/// Every field has a default, so a config file only needs to list the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TripConfig {
    /// Samples at or below this speed never add distance (m/s)
    pub min_moving_speed_mps: f64,
    /// Steps at or above this length are treated as fix glitches (m)
    pub max_step_meters: f64,
    /// Sliding window for the update-rate diagnostic (s)
    pub rate_window_secs: f64,
    /// Fraction of the remaining gap covered per render tick
    pub smoothing_factor: f64,
    /// Gap below which the visual counter snaps to the true value (m)
    pub snap_threshold_meters: f64,
    /// Render loop cadence
    pub frame_rate_hz: u32,
    pub handshake_timeout_secs: u64,
    pub telemetry: TelemetryConfig,
    pub max_track_points: usize,
    pub max_waypoints: usize,
    /// Remote button hold time that triggers a full reset (s)
    pub long_press_secs: f64,
}

/// Bluetooth identifiers of the telemetry puck
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub name_prefix: String,
    pub service_uuid: String,
    pub tx_characteristic_uuid: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            name_prefix: "RaceBox Mini".to_string(),
            service_uuid: "6e400001-b5a3-f393-e0a9-e50e24dcca9e".to_string(),
            tx_characteristic_uuid: "6e400003-b5a3-f393-e0a9-e50e24dcca9e".to_string(),
        }
    }
}

impl Default for TripConfig {
    fn default() -> Self {
        Self {
            min_moving_speed_mps: 0.1,
            max_step_meters: 50.0,
            rate_window_secs: 2.0,
            smoothing_factor: 0.1,
            snap_threshold_meters: 0.05,
            frame_rate_hz: 60,
            handshake_timeout_secs: 20,
            telemetry: TelemetryConfig::default(),
            max_track_points: 200_000,
            max_waypoints: 10_000,
            long_press_secs: 3.0,
        }
    }
}

impl TripConfig {
    /// Load a JSON config file and validate it
    pub fn load(path: impl AsRef<Path>) -> TripResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: TripConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TripResult<()> {
        if !(self.min_moving_speed_mps >= 0.0) {
            return Err(invalid("min_moving_speed_mps must be >= 0"));
        }
        if !(self.max_step_meters > 0.0) {
            return Err(invalid("max_step_meters must be > 0"));
        }
        if !(self.rate_window_secs > 0.0) {
            return Err(invalid("rate_window_secs must be > 0"));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(invalid("smoothing_factor must be in (0, 1]"));
        }
        if !(self.snap_threshold_meters > 0.0) {
            return Err(invalid("snap_threshold_meters must be > 0"));
        }
        if self.frame_rate_hz == 0 || self.frame_rate_hz > 240 {
            return Err(invalid("frame_rate_hz must be in 1..=240"));
        }
        if self.handshake_timeout_secs == 0 {
            return Err(invalid("handshake_timeout_secs must be > 0"));
        }
        if !(self.long_press_secs > 0.0 && self.long_press_secs.is_finite()) {
            return Err(invalid("long_press_secs must be finite and > 0"));
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate_hz.max(1) as f64)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

fn invalid(msg: &str) -> TripMeterError {
    TripMeterError::Config(msg.to_string())
}
