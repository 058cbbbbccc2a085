use std::collections::VecDeque;

use crate::config::TripConfig;
use crate::geodesy::distance_3d;
use crate::sensors::{PositionSample, RawReport};

/// Result of ingesting one valid report
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NormalizedFix {
    pub sample: PositionSample,
    pub speed_kmh: f64,
    /// Accepted samples per second over the rate window (diagnostic only)
    pub update_rate_hz: f64,
    /// 3D distance from the previous fix, if there was one
    pub distance_m: Option<f64>,
    /// Distance that passed the movement gate and should be accumulated
    pub accepted_m: Option<f64>,
    /// True when this sample established the first fix on the active source
    pub first_fix: bool,
}

/// Why a computed step was not accumulated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateRejection {
    NoFirstFix,
    Stationary,
    Teleport,
}

/// Turns raw reports from the active source into validated fixes and
/// movement deltas.
///
/// Owns the last known position: every valid sample replaces it, whether or
/// not its distance passed the gate, so steps are always measured from the
/// most recent valid fix.
#[derive(Debug, Clone)]
pub struct PositionNormalizer {
    min_moving_speed_mps: f64,
    max_step_meters: f64,
    rate_window_secs: f64,
    last: Option<PositionSample>,
    has_first_fix: bool,
    accept_times: VecDeque<f64>,
}

impl PositionNormalizer {
    pub fn new(config: &TripConfig) -> Self {
        Self {
            min_moving_speed_mps: config.min_moving_speed_mps,
            max_step_meters: config.max_step_meters,
            rate_window_secs: config.rate_window_secs,
            last: None,
            has_first_fix: false,
            accept_times: VecDeque::with_capacity(64),
        }
    }

    /// Validate a report and compute its movement delta.
    ///
    /// Returns `None` (and changes nothing) when a coordinate is missing or NaN.
    pub fn ingest(&mut self, report: &RawReport) -> Option<NormalizedFix> {
        let sample = match PositionSample::from_report(report) {
            Some(sample) => sample,
            None => {
                log::debug!("Dropping report without valid coordinates");
                return None;
            }
        };

        let update_rate_hz = self.record_accept(sample.timestamp);

        let had_first_fix = self.has_first_fix;
        if !had_first_fix {
            self.has_first_fix = true;
            log::info!(
                "First fix acquired at {:.6}, {:.6}",
                sample.latitude,
                sample.longitude
            );
        }

        let distance_m = self.last.as_ref().map(|prev| distance_3d(prev, &sample));
        let accepted_m = distance_m.and_then(|d| match self.gate(d, sample.speed_mps, had_first_fix) {
            Ok(()) => Some(d),
            Err(GateRejection::Teleport) => {
                log::debug!("Rejecting {:.1} m jump", d);
                None
            }
            Err(_) => None,
        });

        self.last = Some(sample);

        Some(NormalizedFix {
            sample,
            speed_kmh: sample.speed_kmh(),
            update_rate_hz,
            distance_m,
            accepted_m,
            first_fix: !had_first_fix,
        })
    }

    /// Movement-acceptance policy for one step
    pub fn gate(&self, distance_m: f64, speed_mps: f64, had_first_fix: bool) -> Result<(), GateRejection> {
        if !had_first_fix {
            return Err(GateRejection::NoFirstFix);
        }
        if !(speed_mps > self.min_moving_speed_mps) {
            return Err(GateRejection::Stationary);
        }
        if !(distance_m < self.max_step_meters) {
            return Err(GateRejection::Teleport);
        }
        Ok(())
    }

    /// Forget the anchor and the first-fix flag. The next sample only
    /// re-establishes the anchor.
    pub fn reset_anchor(&mut self) {
        self.last = None;
        self.has_first_fix = false;
    }

    /// Last valid fix, once a first fix exists on the active source
    pub fn anchor(&self) -> Option<&PositionSample> {
        if self.has_first_fix {
            self.last.as_ref()
        } else {
            None
        }
    }

    pub fn has_first_fix(&self) -> bool {
        self.has_first_fix
    }

    fn record_accept(&mut self, now: f64) -> f64 {
        // Times behind the newest entry mean the source clock jumped.
        // Front eviction relies on the window being ordered, so start over.
        if self.accept_times.back().map_or(false, |&newest| now < newest) {
            log::debug!("Report time went backwards, restarting rate window");
            self.accept_times.clear();
        }
        self.accept_times.push_back(now);
        let cutoff = now - self.rate_window_secs;
        while let Some(&oldest) = self.accept_times.front() {
            if oldest > cutoff {
                break;
            }
            self.accept_times.pop_front();
        }

        self.update_rate()
    }

    /// Accepted samples per second across the current window
    pub fn update_rate(&self) -> f64 {
        if self.accept_times.len() < 2 {
            return 0.0;
        }
        let first = self.accept_times.front().copied().unwrap_or_default();
        let last = self.accept_times.back().copied().unwrap_or_default();
        let elapsed = last - first;
        if elapsed > 0.0 {
            self.accept_times.len() as f64 / elapsed
        } else {
            0.0
        }
    }
}
