//! Offline replay of recorded sessions.
//!
//! A session log is a sequence of tagged records, either as one JSON array
//! or as JSON lines, optionally gzip-compressed. Replay drives a
//! [`TripComputer`] synchronously and runs the render ticks that would have
//! happened between records.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::Duration;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};

use crate::computer::TripComputer;
use crate::error::{SensorFault, TripResult};
use crate::sensors::RawReport;
use crate::trip::TripState;

/// Render ticks run for one gap between records; enough for the visual
/// counters to settle.
const MAX_TICKS_PER_GAP: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayRecord {
    /// Internal sensor report
    Internal(RawReport),
    SensorFault { at: f64, fault: SensorFault },
    /// Telemetry notification payload
    Telemetry { received_at: f64, data: Vec<u8> },
    /// Handshake completed
    Connect { at: f64 },
    Disconnect { at: f64 },
    ResetTripA { at: f64 },
    ResetAll { at: f64 },
    Recording { at: f64, on: bool },
}

impl ReplayRecord {
    pub fn at(&self) -> f64 {
        match self {
            ReplayRecord::Internal(report) => report.timestamp,
            ReplayRecord::Telemetry { received_at, .. } => *received_at,
            ReplayRecord::SensorFault { at, .. }
            | ReplayRecord::Connect { at }
            | ReplayRecord::Disconnect { at }
            | ReplayRecord::ResetTripA { at }
            | ReplayRecord::ResetAll { at }
            | ReplayRecord::Recording { at, .. } => *at,
        }
    }
}

/// Outcome of a replay run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub records: usize,
    /// Position records that reached the normalizer
    pub samples_used: usize,
    /// Position records dropped (inactive source, invalid data)
    pub samples_dropped: usize,
    pub ticks: u64,
    pub trips: TripState,
    pub track_points: usize,
    pub waypoints: usize,
}

/// Load a session log from disk; `.gz` files are decompressed
pub fn load_records(path: &Path) -> TripResult<Vec<ReplayRecord>> {
    let file = File::open(path)?;
    let mut text = String::new();
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        BufReader::new(GzDecoder::new(file)).read_to_string(&mut text)?;
    } else {
        BufReader::new(file).read_to_string(&mut text)?;
    }
    let records = parse_records(&text)?;
    log::info!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse a JSON array of records, or one record per line
pub fn parse_records(text: &str) -> TripResult<Vec<ReplayRecord>> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

/// Feed `records` into `computer` in order, ticking the display between them
pub fn replay(records: &[ReplayRecord], computer: &mut TripComputer, frame_interval: Duration) -> ReplaySummary {
    let dt = frame_interval.as_secs_f64().max(1e-3);
    let mut summary = ReplaySummary {
        records: records.len(),
        samples_used: 0,
        samples_dropped: 0,
        ticks: 0,
        trips: TripState::default(),
        track_points: 0,
        waypoints: 0,
    };
    let mut last_at: Option<f64> = None;
    let mut carry = 0.0;

    computer.start();

    for record in records {
        let at = record.at();
        if let Some(prev) = last_at {
            let elapsed = (at - prev).max(0.0) + carry;
            let due = (elapsed / dt).floor();
            carry = elapsed - due * dt;
            summary.ticks += run_ticks(computer, (due as u64).min(MAX_TICKS_PER_GAP));
        }
        last_at = Some(at);

        let used = match record {
            ReplayRecord::Internal(report) => Some(computer.ingest_internal(report)),
            ReplayRecord::Telemetry { received_at, data } => {
                Some(computer.ingest_telemetry_frame(data, *received_at))
            }
            ReplayRecord::SensorFault { fault, .. } => {
                computer.report_sensor_fault(*fault);
                None
            }
            ReplayRecord::Connect { .. } => {
                computer.telemetry_connected();
                None
            }
            ReplayRecord::Disconnect { .. } => {
                computer.telemetry_disconnected();
                None
            }
            ReplayRecord::ResetTripA { .. } => {
                computer.reset_trip_a();
                None
            }
            ReplayRecord::ResetAll { .. } => {
                computer.reset_all();
                None
            }
            ReplayRecord::Recording { on, .. } => {
                computer.set_recording(*on);
                None
            }
        };
        match used {
            Some(true) => summary.samples_used += 1,
            Some(false) => summary.samples_dropped += 1,
            None => {}
        }
    }

    // Let the display settle on the final totals
    let mut settle = 0;
    while settle < MAX_TICKS_PER_GAP && !visual_settled(computer.trip_state()) {
        computer.tick();
        settle += 1;
    }
    summary.ticks += settle;

    summary.trips = *computer.trip_state();
    summary.track_points = computer.track().len();
    summary.waypoints = computer.waypoints().len();
    log::info!(
        "Replay done: {} records, {} samples used, trip B {:.1} m",
        summary.records,
        summary.samples_used,
        summary.trips.trip_b
    );
    summary
}

fn run_ticks(computer: &mut TripComputer, count: u64) -> u64 {
    for _ in 0..count {
        computer.tick();
    }
    count
}

fn visual_settled(state: &TripState) -> bool {
    state.visual_trip_a == state.trip_a && state.visual_trip_b == state.trip_b
}
