//! Trip meter core
//!
//! Odometer (Trip A / Trip B) fed by the internal location sensor or an
//! external Bluetooth telemetry puck.

pub mod arbiter;
pub mod computer;
pub mod config;
pub mod error;
pub mod events;
pub mod geodesy;
pub mod normalizer;
pub mod remote;
pub mod replay;
pub mod runtime;
pub mod sensors;
pub mod smoothing;
pub mod storage;
pub mod telemetry;
pub mod trip;

pub use arbiter::{SourceArbiter, SourceStatus};
pub use computer::{TripComputer, TripSnapshot};
pub use config::{TelemetryConfig, TripConfig};
pub use error::{FrameError, SensorFault, TelemetryError, TripMeterError, TripResult};
pub use events::{DebugInfo, DebugPatch, NullListener, TripEvent, TripListener};
pub use runtime::{TripHandle, TripRuntime};
pub use sensors::{PositionSample, RawReport, SimulatedDrive};
pub use storage::{ExportFormat, TrackExport};
pub use trip::{TrackPoint, TripState, Waypoint};
