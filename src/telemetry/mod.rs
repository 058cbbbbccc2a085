//! External Bluetooth telemetry puck: frame decoding and connection handshake.

pub mod frame;
pub mod link;

pub use frame::{decode_frame, TelemetryRecord, FRAME_HEADER, MIN_FRAME_LEN};
pub use link::{establish, establish_with_timeout, FrameReceiver, TelemetryLink, TelemetrySession};
