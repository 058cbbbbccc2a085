use serde::{Deserialize, Serialize};

use crate::arbiter::{SourceArbiter, SourceStatus};
use crate::config::TripConfig;
use crate::error::SensorFault;
use crate::events::{DebugInfo, DebugPatch, TripListener};
use crate::normalizer::PositionNormalizer;
use crate::sensors::RawReport;
use crate::smoothing::{DisplayMode, DisplaySmoother};
use crate::storage::TrackExport;
use crate::telemetry::decode_frame;
use crate::trip::{TrackPoint, TripAccumulator, TripState, Waypoint};

pub const STATUS_SEARCHING: &str = "Searching satellites";
pub const STATUS_FIX_OK: &str = "FIX OK";
pub const STATUS_TELEMETRY_DISCONNECTED: &str = "Telemetry disconnected";

/// Point-in-time view of the trip computer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripSnapshot {
    pub trips: TripState,
    pub source: SourceStatus,
    pub recording: bool,
    pub track_points: usize,
    pub waypoints: usize,
    pub debug: DebugInfo,
}

/// The trip computer: one explicit context owning every piece of state.
///
/// All mutation goes through `&mut self`, so a single owner (the runtime
/// task, or a replay loop) serializes position events, control calls and
/// render ticks.
pub struct TripComputer {
    normalizer: PositionNormalizer,
    trip: TripAccumulator,
    smoother: DisplaySmoother,
    arbiter: SourceArbiter,
    debug: DebugInfo,
    listener: Box<dyn TripListener>,
}

impl TripComputer {
    pub fn new(config: &TripConfig, listener: Box<dyn TripListener>) -> Self {
        Self {
            normalizer: PositionNormalizer::new(config),
            trip: TripAccumulator::new(config),
            smoother: DisplaySmoother::from_config(config),
            arbiter: SourceArbiter::new(),
            debug: DebugInfo::default(),
            listener,
        }
    }

    /// Announce that the internal sensor is waiting for its first fix
    pub fn start(&mut self) {
        self.emit_debug(DebugPatch::fix_status(STATUS_SEARCHING));
    }

    /// Report from the device's built-in sensor. Returns true if it was used.
    pub fn ingest_internal(&mut self, report: &RawReport) -> bool {
        if !self.arbiter.admits(SourceStatus::InternalSensor) {
            return false;
        }
        self.ingest(report, None)
    }

    /// Internal sensor error; only surfaced while the internal sensor is live
    pub fn report_sensor_fault(&mut self, fault: SensorFault) {
        if !self.arbiter.admits(SourceStatus::InternalSensor) {
            return;
        }
        log::warn!("Location sensor: {}", fault);
        self.emit_debug(DebugPatch::fix_status(fault.fix_status()));
    }

    /// Notification payload from the telemetry puck. Returns true if it was used.
    pub fn ingest_telemetry_frame(&mut self, data: &[u8], received_at: f64) -> bool {
        if !self.arbiter.admits(SourceStatus::ExternalTelemetry) {
            return false;
        }
        match decode_frame(data) {
            Ok(record) => self.ingest(&record.to_report(received_at), record.battery_percent),
            Err(e) => {
                log::debug!("Ignoring telemetry frame: {}", e);
                false
            }
        }
    }

    fn ingest(&mut self, report: &RawReport, battery_percent: Option<u8>) -> bool {
        let fix = match self.normalizer.ingest(report) {
            Some(fix) => fix,
            None => return false,
        };

        self.listener.on_speed_update(fix.speed_kmh);

        if let Some(meters) = fix.accepted_m {
            self.trip.accept_distance(
                meters,
                TrackPoint {
                    latitude: fix.sample.latitude,
                    longitude: fix.sample.longitude,
                },
            );
            if self.display_mode() == DisplayMode::Immediate {
                self.trip.state_mut().align_visual();
                self.emit_trip();
            }
        }

        self.emit_debug(DebugPatch {
            update_rate_hz: Some(fix.update_rate_hz),
            raw_speed_mps: Some(fix.sample.speed_mps),
            altitude_m: fix.sample.altitude,
            fix_status: Some(STATUS_FIX_OK.to_string()),
            distance_3d_m: fix.distance_m,
            battery_percent,
            track_points: Some(self.trip.track().len()),
        });

        true
    }

    /// One render frame: advance the visual counters and publish them
    pub fn tick(&mut self) {
        let mode = self.display_mode();
        self.smoother.tick(self.trip.state_mut(), mode);
        self.emit_trip();
    }

    /// Zero Trip A, leaving a waypoint at the current fix if there is one
    pub fn reset_trip_a(&mut self) -> Option<Waypoint> {
        let anchor = self.normalizer.anchor().map(|s| TrackPoint {
            latitude: s.latitude,
            longitude: s.longitude,
        });
        let waypoint = self.trip.reset_trip_a(anchor).cloned();
        self.emit_trip();
        waypoint
    }

    /// Zero both trips and begin a new track recording
    pub fn reset_all(&mut self) {
        self.trip.reset_all();
        self.emit_trip();
        self.emit_debug(DebugPatch {
            track_points: Some(0),
            ..Default::default()
        });
    }

    pub fn set_recording(&mut self, recording: bool) {
        self.trip.set_recording(recording);
    }

    /// The telemetry handshake completed; the puck becomes authoritative
    pub fn telemetry_connected(&mut self) {
        if self.switch_source(SourceStatus::ExternalTelemetry) {
            self.listener.on_telemetry_status_change(true);
        }
    }

    /// Explicit disconnect or link loss. No-op when already disconnected.
    pub fn telemetry_disconnected(&mut self) {
        if self.switch_source(SourceStatus::InternalSensor) {
            self.listener.on_telemetry_status_change(false);
            self.emit_debug(DebugPatch::fix_status(STATUS_TELEMETRY_DISCONNECTED));
        }
    }

    fn switch_source(&mut self, source: SourceStatus) -> bool {
        if !self.arbiter.switch_to(source) {
            return false;
        }
        self.normalizer.reset_anchor();
        self.trip.state_mut().align_visual();
        true
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.arbiter.active().display_mode()
    }

    pub fn active_source(&self) -> SourceStatus {
        self.arbiter.active()
    }

    pub fn trip_state(&self) -> &TripState {
        self.trip.state()
    }

    pub fn track(&self) -> &[TrackPoint] {
        self.trip.track()
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        self.trip.waypoints()
    }

    pub fn is_recording(&self) -> bool {
        self.trip.is_recording()
    }

    pub fn debug_info(&self) -> &DebugInfo {
        &self.debug
    }

    /// Current fix usable as a waypoint position
    pub fn last_known_position(&self) -> Option<TrackPoint> {
        self.normalizer.anchor().map(|s| TrackPoint {
            latitude: s.latitude,
            longitude: s.longitude,
        })
    }

    pub fn snapshot(&self) -> TripSnapshot {
        TripSnapshot {
            trips: *self.trip.state(),
            source: self.arbiter.active(),
            recording: self.trip.is_recording(),
            track_points: self.trip.track().len(),
            waypoints: self.trip.waypoints().len(),
            debug: self.debug.clone(),
        }
    }

    pub fn export(&self) -> TrackExport {
        TrackExport::new(self.trip.track(), self.trip.waypoints(), self.trip.state())
    }

    fn emit_trip(&mut self) {
        let state = *self.trip.state();
        self.listener
            .on_trip_update(state.visual_trip_a, state.visual_trip_b);
    }

    fn emit_debug(&mut self, patch: DebugPatch) {
        self.debug.merge(&patch);
        self.listener.on_debug_update(&patch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::tests::EventLog;
    use crate::events::TripEvent;
    use crate::geodesy::horizontal_distance;
    use crate::telemetry::frame::tests::build_frame;
    use approx::assert_relative_eq;

    fn computer() -> (TripComputer, EventLog) {
        let log = EventLog::default();
        let computer = TripComputer::new(&TripConfig::default(), Box::new(log.clone()));
        (computer, log)
    }

    fn moving(lat: f64, lon: f64, t: f64) -> RawReport {
        RawReport::new(lat, lon, t).with_speed(5.0)
    }

    fn frame_at(lat: f64, lon: f64, speed_mps: f64) -> Vec<u8> {
        build_frame(
            (lon * 1e7).round() as i32,
            (lat * 1e7).round() as i32,
            100_000,
            (speed_mps * 1000.0).round() as i32,
            64,
        )
    }

    #[test]
    fn test_accepted_step_adds_to_both_trips() {
        let (mut c, _) = computer();
        c.ingest_internal(&moving(45.0, 9.0, 0.0));
        c.ingest_internal(&moving(45.0001, 9.0, 1.0));

        let d = horizontal_distance(45.0, 9.0, 45.0001, 9.0);
        assert_relative_eq!(c.trip_state().trip_a, d);
        assert_relative_eq!(c.trip_state().trip_b, d);
        // Smoothed mode: visual has not moved yet
        assert_eq!(c.trip_state().visual_trip_a, 0.0);
    }

    #[test]
    fn test_stationary_and_teleport_leave_counters() {
        let (mut c, _) = computer();
        c.ingest_internal(&RawReport::new(45.0, 9.0, 0.0).with_speed(0.05));
        c.ingest_internal(&RawReport::new(45.0001, 9.0, 1.0).with_speed(0.05));
        assert_eq!(c.trip_state().trip_a, 0.0);

        c.ingest_internal(&moving(45.001, 9.0, 2.0));
        assert_eq!(c.trip_state().trip_b, 0.0);
    }

    #[test]
    fn test_event_order_for_sample() {
        let (mut c, log) = computer();
        c.telemetry_connected();
        log.take();

        c.ingest_telemetry_frame(&frame_at(45.0, 9.0, 10.0), 0.0);
        c.ingest_telemetry_frame(&frame_at(45.0001, 9.0, 10.0), 0.1);

        let events = log.take();
        // first sample: speed, debug; second: speed, trip, debug
        assert_eq!(events.len(), 5);
        assert!(matches!(events[2], TripEvent::Speed { .. }));
        assert!(matches!(events[3], TripEvent::Trip { .. }));
        match &events[4] {
            TripEvent::Debug(patch) => {
                assert_eq!(patch.battery_percent, Some(64));
                assert_eq!(patch.fix_status.as_deref(), Some(STATUS_FIX_OK));
                assert!(patch.distance_3d_m.is_some());
            }
            other => panic!("expected debug patch, got {:?}", other),
        }
    }

    #[test]
    fn test_immediate_mode_aligns_visual() {
        let (mut c, _) = computer();
        c.telemetry_connected();
        c.ingest_telemetry_frame(&frame_at(45.0, 9.0, 10.0), 0.0);
        c.ingest_telemetry_frame(&frame_at(45.0001, 9.0, 10.0), 0.1);

        let state = c.trip_state();
        assert!(state.trip_a > 10.0);
        assert_eq!(state.visual_trip_a, state.trip_a);
        assert_eq!(state.visual_trip_b, state.trip_b);
    }

    #[test]
    fn test_sources_are_exclusive() {
        let (mut c, _) = computer();
        assert!(!c.ingest_telemetry_frame(&frame_at(45.0, 9.0, 10.0), 0.0));

        c.telemetry_connected();
        assert!(!c.ingest_internal(&moving(45.0, 9.0, 0.0)));
        assert!(c.ingest_telemetry_frame(&frame_at(45.0, 9.0, 10.0), 0.0));
    }

    #[test]
    fn test_invalid_frame_ignored() {
        let (mut c, log) = computer();
        c.telemetry_connected();
        log.take();

        let mut frame = frame_at(45.0, 9.0, 10.0);
        frame[1] = 0x00;
        assert!(!c.ingest_telemetry_frame(&frame, 0.0));
        assert!(!c.ingest_telemetry_frame(&frame[..40], 0.0));
        assert!(log.take().is_empty());
        assert!(c.last_known_position().is_none());
    }

    #[test]
    fn test_switch_never_bridges_anchors() {
        let (mut c, _) = computer();
        c.ingest_internal(&moving(45.0, 9.0, 0.0));
        c.ingest_internal(&moving(45.0001, 9.0, 1.0));
        let before = *c.trip_state();

        c.telemetry_connected();
        assert!(c.last_known_position().is_none());
        assert_eq!(c.trip_state().visual_trip_a, before.trip_a);

        // First telemetry fix only anchors, even though it is close by
        c.ingest_telemetry_frame(&frame_at(45.0002, 9.0, 10.0), 2.0);
        assert_eq!(c.trip_state().trip_a, before.trip_a);

        c.telemetry_disconnected();
        c.ingest_internal(&moving(45.0003, 9.0, 3.0));
        assert_eq!(c.trip_state().trip_b, before.trip_b);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let (mut c, log) = computer();
        c.telemetry_disconnected();
        assert!(log.take().is_empty());

        c.telemetry_connected();
        c.telemetry_disconnected();
        c.telemetry_disconnected();

        let statuses: Vec<_> = log
            .take()
            .into_iter()
            .filter(|e| matches!(e, TripEvent::TelemetryStatus { .. }))
            .collect();
        assert_eq!(
            statuses,
            vec![
                TripEvent::TelemetryStatus { connected: true },
                TripEvent::TelemetryStatus { connected: false }
            ]
        );
        assert_eq!(c.debug_info().fix_status, STATUS_TELEMETRY_DISCONNECTED);
    }

    #[test]
    fn test_tick_smooths_toward_true() {
        let (mut c, log) = computer();
        c.ingest_internal(&moving(45.0, 9.0, 0.0));
        c.ingest_internal(&moving(45.0001, 9.0, 1.0));
        log.take();

        let target = c.trip_state().trip_a;
        c.tick();
        assert_relative_eq!(c.trip_state().visual_trip_a, target * 0.1);
        assert_eq!(
            log.take(),
            vec![TripEvent::Trip {
                trip_a_m: target * 0.1,
                trip_b_m: target * 0.1
            }]
        );

        for _ in 0..200 {
            c.tick();
        }
        assert_eq!(c.trip_state().visual_trip_a, target);
    }

    #[test]
    fn test_reset_trip_a_waypoints() {
        let (mut c, _) = computer();
        assert!(c.reset_trip_a().is_none());

        c.ingest_internal(&moving(45.0, 9.0, 0.0));
        let first = c.reset_trip_a().unwrap();
        let second = c.reset_trip_a().unwrap();

        assert_eq!(first.label, "0.00");
        assert_eq!(second.label, "0.00");
        assert_eq!(first.latitude, second.latitude);
        assert_eq!(first.longitude, second.longitude);
        assert_eq!(c.waypoints().len(), 2);
    }

    #[test]
    fn test_reset_all_then_record() {
        let (mut c, _) = computer();
        c.ingest_internal(&moving(45.0, 9.0, 0.0));
        c.ingest_internal(&moving(45.0001, 9.0, 1.0));
        c.reset_trip_a();

        c.reset_all();
        assert!(c.is_recording());
        assert!(c.track().is_empty());
        assert!(c.waypoints().is_empty());
        assert_eq!(*c.trip_state(), TripState::default());

        c.ingest_internal(&moving(45.0002, 9.0, 2.0));
        assert_eq!(c.track().len(), 1);
        assert_eq!(c.track()[0].latitude, 45.0002);
        assert_eq!(c.snapshot().debug.track_points, 1);
    }

    #[test]
    fn test_sensor_fault_status() {
        let (mut c, log) = computer();
        c.start();
        c.report_sensor_fault(SensorFault::PermissionDenied);
        assert_eq!(c.debug_info().fix_status, "Permission denied");
        assert_eq!(c.trip_state().trip_a, 0.0);

        c.telemetry_connected();
        log.take();
        c.report_sensor_fault(SensorFault::Timeout);
        assert!(log.take().is_empty());
    }

    #[test]
    fn test_invalid_sample_no_events() {
        let (mut c, log) = computer();
        let bad = RawReport {
            latitude: Some(f64::NAN),
            longitude: Some(9.0),
            timestamp: 0.0,
            ..Default::default()
        };
        assert!(!c.ingest_internal(&bad));
        assert!(log.take().is_empty());
    }
}
