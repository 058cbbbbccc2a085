//! Connection handshake with the telemetry puck.
//!
//! The platform Bluetooth stack is abstracted behind [`TelemetryLink`].
//! [`establish`] walks the handshake steps in order and only hands back a
//! [`TelemetrySession`] once notifications are flowing, so a failed or
//! cancelled attempt never leaves a half-connected device behind.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::TelemetryConfig;
use crate::error::{HandshakeStep, TelemetryError};

/// Raw notification payloads from the device. The channel closing means the
/// link was lost.
pub type FrameReceiver = mpsc::Receiver<Vec<u8>>;

/// Platform Bluetooth operations needed to talk to the puck
#[async_trait]
pub trait TelemetryLink: Send {
    /// Scan for a device whose advertised name starts with `name_prefix`.
    /// Returns the device name.
    async fn request_device(&mut self, name_prefix: &str) -> Result<String, TelemetryError>;

    async fn connect(&mut self) -> Result<(), TelemetryError>;

    async fn primary_service(&mut self, uuid: &str) -> Result<(), TelemetryError>;

    async fn characteristic(&mut self, uuid: &str) -> Result<(), TelemetryError>;

    async fn start_notifications(&mut self) -> Result<FrameReceiver, TelemetryError>;

    async fn stop_notifications(&mut self) -> Result<(), TelemetryError>;

    /// Drop the connection. Must be safe to call in any state.
    fn disconnect(&mut self);
}

/// Owns a link for the length of an attempt or session and disconnects it
/// when dropped, unless [`LinkGuard::disconnect`] already ran.
struct LinkGuard {
    link: Box<dyn TelemetryLink>,
    live: bool,
}

impl LinkGuard {
    fn new(link: Box<dyn TelemetryLink>) -> Self {
        Self { link, live: true }
    }

    fn disconnect(&mut self) {
        if self.live {
            self.live = false;
            self.link.disconnect();
        }
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        if self.live {
            log::debug!("Disconnecting abandoned telemetry link");
            self.disconnect();
        }
    }
}

/// A connected device with notifications enabled.
///
/// Dropping a session without [`TelemetrySession::close`] still disconnects
/// the device, only without stopping notifications first.
pub struct TelemetrySession {
    device_name: String,
    link: LinkGuard,
    frames: Option<FrameReceiver>,
}

impl TelemetrySession {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Take the notification stream. Only the first call returns it.
    pub fn take_frames(&mut self) -> Option<FrameReceiver> {
        self.frames.take()
    }

    /// Stop notifications and drop the connection
    pub async fn close(mut self) {
        if let Err(e) = self.link.link.stop_notifications().await {
            log::debug!("Stopping notifications on {} failed: {}", self.device_name, e);
        }
        self.link.disconnect();
        log::info!("Telemetry device {} disconnected", self.device_name);
    }
}

/// Run the full handshake against `link`.
///
/// On any failure the link is disconnected and the error returned. Dropping
/// the returned future mid-handshake disconnects the link as well.
pub async fn establish(
    link: Box<dyn TelemetryLink>,
    config: &TelemetryConfig,
) -> Result<TelemetrySession, TelemetryError> {
    let mut link = LinkGuard::new(link);
    let outcome = run_handshake(link.link.as_mut(), config).await;
    conclude(link, outcome)
}

/// [`establish`] bounded by `timeout`
pub async fn establish_with_timeout(
    link: Box<dyn TelemetryLink>,
    config: &TelemetryConfig,
    timeout: std::time::Duration,
) -> Result<TelemetrySession, TelemetryError> {
    let mut link = LinkGuard::new(link);
    let outcome = match tokio::time::timeout(timeout, run_handshake(link.link.as_mut(), config)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(TelemetryError::Timeout {
            secs: timeout.as_secs(),
        }),
    };
    conclude(link, outcome)
}

fn conclude(
    mut link: LinkGuard,
    outcome: Result<(String, FrameReceiver), TelemetryError>,
) -> Result<TelemetrySession, TelemetryError> {
    match outcome {
        Ok((device_name, frames)) => {
            log::info!("Telemetry device {} connected", device_name);
            Ok(TelemetrySession {
                device_name,
                link,
                frames: Some(frames),
            })
        }
        Err(e) => {
            log::warn!("Telemetry handshake failed: {}", e);
            link.disconnect();
            Err(e)
        }
    }
}

async fn run_handshake(
    link: &mut dyn TelemetryLink,
    config: &TelemetryConfig,
) -> Result<(String, FrameReceiver), TelemetryError> {
    let device_name = link.request_device(&config.name_prefix).await?;
    log::debug!("Found telemetry device {}", device_name);

    link.connect().await.map_err(|e| tag(HandshakeStep::Connect, e))?;
    link.primary_service(&config.service_uuid)
        .await
        .map_err(|e| tag(HandshakeStep::ServiceLookup, e))?;
    link.characteristic(&config.tx_characteristic_uuid)
        .await
        .map_err(|e| tag(HandshakeStep::CharacteristicLookup, e))?;
    let frames = link
        .start_notifications()
        .await
        .map_err(|e| tag(HandshakeStep::Subscribe, e))?;

    Ok((device_name, frames))
}

// Attach the failing step to errors the link reported without one.
fn tag(step: HandshakeStep, error: TelemetryError) -> TelemetryError {
    match error {
        TelemetryError::Step { .. } | TelemetryError::Timeout { .. } | TelemetryError::Cancelled => {
            error
        }
        other => TelemetryError::step(step, other.to_string()),
    }
}
