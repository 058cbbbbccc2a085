//! Binary data frame sent by the telemetry puck.
//!
//! Layout: two sync bytes, message class and id, a 2-byte length, then the
//! payload. All payload fields are little-endian and addressed relative to
//! [`PAYLOAD_START`].

use serde::{Deserialize, Serialize};

use crate::error::FrameError;
use crate::sensors::RawReport;

/// Shortest frame accepted
pub const MIN_FRAME_LEN: usize = 70;

/// Sync bytes followed by message class / id
pub const FRAME_HEADER: [u8; 4] = [0xB5, 0x62, 0xFF, 0x01];

/// Payload origin within the frame
pub const PAYLOAD_START: usize = 6;

/// Payload-relative field offsets
pub mod offsets {
    /// i32, 1e-7 degrees
    pub const LONGITUDE: usize = 24;
    /// i32, 1e-7 degrees
    pub const LATITUDE: usize = 28;
    /// i32, millimeters
    pub const ALTITUDE: usize = 32;
    /// i32, millimeters per second
    pub const SPEED: usize = 48;
    /// u8, percent
    pub const BATTERY: usize = 67;
}

const DEGREE_SCALE: f64 = 1e-7;
const MILLI: f64 = 1000.0;

/// Fields decoded from one data frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub longitude: f64,
    pub latitude: f64,
    pub altitude_m: f64,
    pub speed_mps: f64,
    /// `None` when the frame ends before the battery byte
    pub battery_percent: Option<u8>,
}

impl TelemetryRecord {
    /// Convert to a position report stamped with the receive time
    pub fn to_report(&self, received_at: f64) -> RawReport {
        RawReport::new(self.latitude, self.longitude, received_at)
            .with_altitude(self.altitude_m)
            .with_speed(self.speed_mps)
    }
}

/// Decode a data frame. Pure function of the buffer.
pub fn decode_frame(data: &[u8]) -> Result<TelemetryRecord, FrameError> {
    if data.len() < MIN_FRAME_LEN {
        return Err(FrameError::TooShort { len: data.len() });
    }

    let header = [data[0], data[1], data[2], data[3]];
    if header != FRAME_HEADER {
        return Err(FrameError::BadHeader { found: header });
    }

    let payload = &data[PAYLOAD_START..];

    Ok(TelemetryRecord {
        longitude: read_i32(payload, offsets::LONGITUDE) as f64 * DEGREE_SCALE,
        latitude: read_i32(payload, offsets::LATITUDE) as f64 * DEGREE_SCALE,
        altitude_m: read_i32(payload, offsets::ALTITUDE) as f64 / MILLI,
        speed_mps: read_i32(payload, offsets::SPEED) as f64 / MILLI,
        battery_percent: payload.get(offsets::BATTERY).copied(),
    })
}

// Callers guarantee `offset + 4 <= payload.len()` through MIN_FRAME_LEN.
fn read_i32(payload: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        payload[offset],
        payload[offset + 1],
        payload[offset + 2],
        payload[offset + 3],
    ])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Full-size data frame carrying the given raw field values
    pub(crate) fn build_frame(lon_e7: i32, lat_e7: i32, alt_mm: i32, speed_mms: i32, battery: u8) -> Vec<u8> {
        let mut frame = vec![0u8; 88];
        frame[..4].copy_from_slice(&FRAME_HEADER);
        frame[4..6].copy_from_slice(&80u16.to_le_bytes());

        let p = PAYLOAD_START;
        frame[p + offsets::LONGITUDE..p + offsets::LONGITUDE + 4].copy_from_slice(&lon_e7.to_le_bytes());
        frame[p + offsets::LATITUDE..p + offsets::LATITUDE + 4].copy_from_slice(&lat_e7.to_le_bytes());
        frame[p + offsets::ALTITUDE..p + offsets::ALTITUDE + 4].copy_from_slice(&alt_mm.to_le_bytes());
        frame[p + offsets::SPEED..p + offsets::SPEED + 4].copy_from_slice(&speed_mms.to_le_bytes());
        frame[p + offsets::BATTERY] = battery;
        frame
    }

    #[test]
    fn test_decode_known_values() {
        let frame = build_frame(90_123_456, 451_234_567, 215_500, 13_890, 87);
        let record = decode_frame(&frame).unwrap();

        assert_relative_eq!(record.longitude, 9.0123456, epsilon = 1e-9);
        assert_relative_eq!(record.latitude, 45.1234567, epsilon = 1e-9);
        assert_relative_eq!(record.altitude_m, 215.5);
        assert_relative_eq!(record.speed_mps, 13.89);
        assert_eq!(record.battery_percent, Some(87));
    }

    #[test]
    fn test_decode_negative_fields() {
        let frame = build_frame(-1_220_000_000, -337_000_000, -12_000, 0, 5);
        let record = decode_frame(&frame).unwrap();

        assert_relative_eq!(record.longitude, -122.0, epsilon = 1e-9);
        assert_relative_eq!(record.latitude, -33.7, epsilon = 1e-9);
        assert_relative_eq!(record.altitude_m, -12.0);
    }

    #[test]
    fn test_any_header_byte_mutation_rejected() {
        let frame = build_frame(1, 2, 3, 4, 5);
        for i in 0..4 {
            let mut bad = frame.clone();
            bad[i] ^= 0x01;
            assert!(matches!(decode_frame(&bad), Err(FrameError::BadHeader { .. })));
        }
    }

    #[test]
    fn test_short_buffer_rejected() {
        let frame = build_frame(1, 2, 3, 4, 5);
        assert_eq!(
            decode_frame(&frame[..69]),
            Err(FrameError::TooShort { len: 69 })
        );
        assert_eq!(decode_frame(&[]), Err(FrameError::TooShort { len: 0 }));
    }

    #[test]
    fn test_minimum_length_without_battery() {
        let frame = build_frame(10, 20, 30, 40, 50);
        let record = decode_frame(&frame[..MIN_FRAME_LEN]).unwrap();
        assert_eq!(record.battery_percent, None);
        assert_relative_eq!(record.speed_mps, 0.04);
    }

    #[test]
    fn test_to_report() {
        let frame = build_frame(90_000_000, 450_000_000, 200_000, 5_000, 50);
        let report = decode_frame(&frame).unwrap().to_report(12.5);
        assert_eq!(report.timestamp, 12.5);
        assert_eq!(report.altitude, Some(200.0));
        assert_eq!(report.speed, Some(5.0));
    }
}
