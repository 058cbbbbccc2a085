use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::{interval, Duration};

use crate::runtime::TripHandle;

/// Position report as delivered by either source, before validation.
///
/// Coordinates are optional because the platform sensor may hand over
/// incomplete fixes; such reports are dropped by the normalizer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawReport {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    /// Ground speed in m/s
    #[serde(default)]
    pub speed: Option<f64>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
}

impl RawReport {
    pub fn new(latitude: f64, longitude: f64, timestamp: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            altitude: None,
            speed: None,
            timestamp,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }
}

/// Validated position fix
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub speed_mps: f64,
    pub timestamp: f64,
}

impl PositionSample {
    /// Validate a raw report. Returns `None` when a coordinate is missing or NaN.
    pub fn from_report(report: &RawReport) -> Option<Self> {
        let latitude = report.latitude.filter(|v| v.is_finite())?;
        let longitude = report.longitude.filter(|v| v.is_finite())?;

        Some(Self {
            latitude,
            longitude,
            altitude: report.altitude.filter(|v| v.is_finite()),
            speed_mps: report.speed.filter(|v| v.is_finite()).unwrap_or(0.0),
            timestamp: report.timestamp,
        })
    }

    pub fn speed_kmh(&self) -> f64 {
        (self.speed_mps * 3.6).max(0.0)
    }
}

/// Synthetic 1 Hz drive used for bench testing without hardware.
///
/// Speed oscillates around ~50 km/h; both coordinates advance by a fixed
/// step per report.
#[derive(Clone, Debug)]
pub struct SimulatedDrive {
    latitude: f64,
    longitude: f64,
    altitude: f64,
    step_degrees: f64,
}

impl SimulatedDrive {
    pub fn new() -> Self {
        Self {
            latitude: 45.0,
            longitude: 9.0,
            altitude: 200.0,
            step_degrees: 0.00005,
        }
    }

    pub fn starting_at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::new()
        }
    }

    /// Produce the next report stamped with `timestamp` (seconds)
    pub fn next_report(&mut self, timestamp: f64) -> RawReport {
        let phase = timestamp / 5.0;
        let speed = (phase.sin() + 1.1) * 13.8;

        self.latitude += self.step_degrees;
        self.longitude += self.step_degrees;

        RawReport::new(self.latitude, self.longitude, timestamp)
            .with_altitude(self.altitude)
            .with_speed(speed)
    }
}

impl Default for SimulatedDrive {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed simulated internal-sensor reports into the runtime at 1 Hz
pub async fn simulated_sensor_loop(handle: TripHandle, mut drive: SimulatedDrive) {
    let mut interval = interval(Duration::from_secs(1));
    let mut fix_count = 0u64;

    loop {
        interval.tick().await;

        let report = drive.next_report(current_timestamp());
        if handle.push_internal(report).await.is_err() {
            log::debug!("Simulated sensor stopped after {} fixes", fix_count);
            break;
        }

        fix_count += 1;
        if fix_count % 10 == 0 {
            log::debug!("Simulated sensor: {} fixes", fix_count);
        }
    }
}

pub fn current_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
