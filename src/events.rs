//! Outbound notifications to presentation code.
//!
//! For one accepted sample the order is always: speed, then trip update
//! (immediate mode only), then the debug patch.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// Receiver of computed values. All methods default to no-ops.
pub trait TripListener: Send {
    /// Visual Trip A / Trip B in meters
    fn on_trip_update(&mut self, _trip_a_m: f64, _trip_b_m: f64) {}

    fn on_speed_update(&mut self, _speed_kmh: f64) {}

    /// Only the fields set in `patch` changed
    fn on_debug_update(&mut self, _patch: &DebugPatch) {}

    fn on_telemetry_status_change(&mut self, _connected: bool) {}
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullListener;

impl TripListener for NullListener {}

/// Partial diagnostic update; `None` fields are unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugPatch {
    pub update_rate_hz: Option<f64>,
    pub raw_speed_mps: Option<f64>,
    pub altitude_m: Option<f64>,
    pub fix_status: Option<String>,
    pub distance_3d_m: Option<f64>,
    pub battery_percent: Option<u8>,
    pub track_points: Option<usize>,
}

impl DebugPatch {
    pub fn fix_status(status: impl Into<String>) -> Self {
        Self {
            fix_status: Some(status.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == DebugPatch::default()
    }
}

/// Current diagnostic fields, built up from patches
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub update_rate_hz: f64,
    pub raw_speed_mps: f64,
    pub altitude_m: Option<f64>,
    pub fix_status: String,
    pub distance_3d_m: Option<f64>,
    pub battery_percent: Option<u8>,
    pub track_points: usize,
}

impl DebugInfo {
    pub fn merge(&mut self, patch: &DebugPatch) {
        if let Some(v) = patch.update_rate_hz {
            self.update_rate_hz = v;
        }
        if let Some(v) = patch.raw_speed_mps {
            self.raw_speed_mps = v;
        }
        if let Some(v) = patch.altitude_m {
            self.altitude_m = Some(v);
        }
        if let Some(v) = &patch.fix_status {
            self.fix_status.clone_from(v);
        }
        if let Some(v) = patch.distance_3d_m {
            self.distance_3d_m = Some(v);
        }
        if let Some(v) = patch.battery_percent {
            self.battery_percent = Some(v);
        }
        if let Some(v) = patch.track_points {
            self.track_points = v;
        }
    }
}

/// Notifications as messages, for consumers on another task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TripEvent {
    Trip { trip_a_m: f64, trip_b_m: f64 },
    Speed { speed_kmh: f64 },
    Debug(DebugPatch),
    TelemetryStatus { connected: bool },
}

// A closed receiver just means nobody is listening any more.
impl TripListener for UnboundedSender<TripEvent> {
    fn on_trip_update(&mut self, trip_a_m: f64, trip_b_m: f64) {
        let _ = self.send(TripEvent::Trip { trip_a_m, trip_b_m });
    }

    fn on_speed_update(&mut self, speed_kmh: f64) {
        let _ = self.send(TripEvent::Speed { speed_kmh });
    }

    fn on_debug_update(&mut self, patch: &DebugPatch) {
        let _ = self.send(TripEvent::Debug(patch.clone()));
    }

    fn on_telemetry_status_change(&mut self, connected: bool) {
        let _ = self.send(TripEvent::TelemetryStatus { connected });
    }
}
