use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TripConfig;

/// Trip counters in meters.
///
/// `trip_a`/`trip_b` are authoritative; the `visual_*` pair is what the
/// display shows and only ever chases the true values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    pub trip_a: f64,
    pub trip_b: f64,
    pub visual_trip_a: f64,
    pub visual_trip_b: f64,
}

impl TripState {
    /// Snap the visual counters onto the true ones
    pub fn align_visual(&mut self) {
        self.visual_trip_a = self.trip_a;
        self.visual_trip_b = self.trip_b;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
}

/// Marker left where Trip A was reset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Trip A at capture, two decimals (meters)
    pub label: String,
    pub captured_at: DateTime<Utc>,
}

/// Owns the trip counters, the recorded track and the waypoint list
#[derive(Debug, Clone)]
pub struct TripAccumulator {
    state: TripState,
    track: Vec<TrackPoint>,
    waypoints: Vec<Waypoint>,
    recording: bool,
    max_track_points: usize,
    max_waypoints: usize,
    track_full_logged: bool,
}

impl TripAccumulator {
    pub fn new(config: &TripConfig) -> Self {
        Self {
            state: TripState::default(),
            track: Vec::new(),
            waypoints: Vec::new(),
            recording: false,
            max_track_points: config.max_track_points,
            max_waypoints: config.max_waypoints,
            track_full_logged: false,
        }
    }

    /// Add an accepted step to both trips, recording `at` if the track is on
    pub fn accept_distance(&mut self, meters: f64, at: TrackPoint) {
        self.state.trip_a += meters;
        self.state.trip_b += meters;

        if !self.recording {
            return;
        }
        if self.track.len() < self.max_track_points {
            self.track.push(at);
        } else if !self.track_full_logged {
            log::warn!(
                "Track full at {} points, further points are not recorded",
                self.max_track_points
            );
            self.track_full_logged = true;
        }
    }

    /// Zero Trip A. With a valid fix, the old value is frozen into a waypoint there.
    pub fn reset_trip_a(&mut self, anchor: Option<TrackPoint>) -> Option<&Waypoint> {
        let captured = match anchor {
            Some(at) if self.waypoints.len() < self.max_waypoints => {
                let label = format!("{:.2}", self.state.trip_a);
                log::info!("Waypoint saved at {:.6}, {:.6}: {} m", at.latitude, at.longitude, label);
                self.waypoints.push(Waypoint {
                    latitude: at.latitude,
                    longitude: at.longitude,
                    label,
                    captured_at: Utc::now(),
                });
                true
            }
            Some(_) => {
                log::warn!("Waypoint limit of {} reached, not saving", self.max_waypoints);
                false
            }
            None => false,
        };

        self.state.trip_a = 0.0;
        self.state.visual_trip_a = 0.0;

        if captured {
            self.waypoints.last()
        } else {
            None
        }
    }

    /// Zero everything and start a new recording
    pub fn reset_all(&mut self) {
        self.state = TripState::default();
        self.track.clear();
        self.waypoints.clear();
        self.track_full_logged = false;
        self.recording = true;
        log::info!("Trips reset, track recording started");
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.recording = recording;
        log::info!("Track recording: {}", if recording { "on" } else { "off" });
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    pub fn state(&self) -> &TripState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut TripState {
        &mut self.state
    }

    pub fn track(&self) -> &[TrackPoint] {
        &self.track
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }
}
