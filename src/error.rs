use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rejected telemetry frame
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Frame too short: {len} bytes")]
    TooShort { len: usize },

    #[error("Unexpected frame header: {found:02X?}")]
    BadHeader { found: [u8; 4] },
}

/// Failures reported by the device's built-in location sensor.
///
/// All of them are recoverable: the sensor subscription keeps running and
/// may deliver a valid fix later.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorFault {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable")]
    PositionUnavailable,

    #[error("Location request timed out")]
    Timeout,

    #[error("Location sensor not supported")]
    Unsupported,
}

impl SensorFault {
    /// Label shown in the fix-status diagnostic field
    pub fn fix_status(&self) -> &'static str {
        match self {
            SensorFault::PermissionDenied => "Permission denied",
            SensorFault::PositionUnavailable => "Signal unavailable",
            SensorFault::Timeout => "Timeout - retrying",
            SensorFault::Unsupported => "Location not supported",
        }
    }
}

/// Steps of the telemetry device handshake, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStep {
    Discovery,
    Connect,
    ServiceLookup,
    CharacteristicLookup,
    Subscribe,
}

impl std::fmt::Display for HandshakeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandshakeStep::Discovery => "discovery",
            HandshakeStep::Connect => "connect",
            HandshakeStep::ServiceLookup => "service lookup",
            HandshakeStep::CharacteristicLookup => "characteristic lookup",
            HandshakeStep::Subscribe => "subscribe",
        };
        f.write_str(name)
    }
}

/// Telemetry device connection errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("No telemetry device found")]
    DeviceNotFound,

    #[error("Telemetry {step} failed: {reason}")]
    Step { step: HandshakeStep, reason: String },

    #[error("Telemetry handshake timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Telemetry handshake cancelled")]
    Cancelled,

    #[error("Telemetry device already connected")]
    AlreadyConnected,

    #[error("Telemetry device not connected")]
    NotConnected,
}

impl TelemetryError {
    pub fn step(step: HandshakeStep, reason: impl Into<String>) -> Self {
        TelemetryError::Step {
            step,
            reason: reason.into(),
        }
    }
}

/// Top-level error type
#[derive(Error, Debug)]
pub enum TripMeterError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime stopped")]
    RuntimeStopped,
}

/// Result type for trip meter operations
pub type TripResult<T> = Result<T, TripMeterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_labels() {
        assert_eq!(SensorFault::PermissionDenied.fix_status(), "Permission denied");
        assert_eq!(SensorFault::Timeout.fix_status(), "Timeout - retrying");
    }

    #[test]
    fn test_step_error_message() {
        let err = TelemetryError::step(HandshakeStep::ServiceLookup, "no such service");
        assert_eq!(
            err.to_string(),
            "Telemetry service lookup failed: no such service"
        );
    }

    #[test]
    fn test_frame_error_converts() {
        let err: TripMeterError = FrameError::TooShort { len: 12 }.into();
        assert!(matches!(err, TripMeterError::Frame(FrameError::TooShort { len: 12 })));
    }
}
