//! Async host for the trip computer.
//!
//! One task owns the [`TripComputer`]. Sensor reports, telemetry frames,
//! control calls and render ticks all reach it through a single `select!`
//! loop, so they never interleave mid-update.

use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::computer::{TripComputer, TripSnapshot};
use crate::config::{TelemetryConfig, TripConfig};
use crate::error::{SensorFault, TelemetryError, TripMeterError, TripResult};
use crate::events::TripListener;
use crate::remote::{RemoteAction, RemoteButton};
use crate::sensors::{current_timestamp, RawReport};
use crate::storage::TrackExport;
use crate::telemetry::{establish_with_timeout, FrameReceiver, TelemetryLink, TelemetrySession};
use crate::trip::Waypoint;

const COMMAND_BUFFER: usize = 256;

type ConnectReply = oneshot::Sender<Result<String, TelemetryError>>;

enum Command {
    Internal(RawReport),
    SensorFault(SensorFault),
    Frame {
        generation: u64,
        data: Vec<u8>,
        received_at: f64,
    },
    LinkLost {
        generation: u64,
    },
    Connect {
        link: Box<dyn TelemetryLink>,
        reply: ConnectReply,
    },
    HandshakeDone {
        generation: u64,
        result: Result<TelemetrySession, TelemetryError>,
        reply: ConnectReply,
    },
    Disconnect,
    ResetTripA(oneshot::Sender<Option<Waypoint>>),
    ResetAll,
    SetRecording(bool),
    KeyDown {
        key: String,
        repeat: bool,
    },
    KeyUp {
        key: String,
    },
    Snapshot(oneshot::Sender<TripSnapshot>),
    Export(oneshot::Sender<TrackExport>),
    Shutdown,
}

enum LinkState {
    Idle,
    Connecting {
        generation: u64,
        task: JoinHandle<()>,
    },
    Connected {
        generation: u64,
        session: TelemetrySession,
        forwarder: JoinHandle<()>,
    },
}

/// Cloneable control surface of a running [`TripRuntime`]
#[derive(Clone)]
pub struct TripHandle {
    tx: mpsc::Sender<Command>,
}

impl TripHandle {
    async fn send(&self, command: Command) -> TripResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| TripMeterError::RuntimeStopped)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> TripResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| TripMeterError::RuntimeStopped)
    }

    /// Position report from the internal sensor
    pub async fn push_internal(&self, report: RawReport) -> TripResult<()> {
        self.send(Command::Internal(report)).await
    }

    pub async fn report_sensor_fault(&self, fault: SensorFault) -> TripResult<()> {
        self.send(Command::SensorFault(fault)).await
    }

    pub async fn reset_trip_a(&self) -> TripResult<Option<Waypoint>> {
        self.request(Command::ResetTripA).await
    }

    pub async fn reset_all(&self) -> TripResult<()> {
        self.send(Command::ResetAll).await
    }

    pub async fn set_recording(&self, recording: bool) -> TripResult<()> {
        self.send(Command::SetRecording(recording)).await
    }

    /// Run the telemetry handshake over `link`. Resolves with the device name
    /// once the puck is authoritative.
    pub async fn connect_telemetry(&self, link: Box<dyn TelemetryLink>) -> TripResult<String> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Connect { link, reply }).await?;
        match rx.await {
            Ok(result) => Ok(result?),
            // Reply dropped: the handshake was aborted by a disconnect
            Err(_) => Err(TelemetryError::Cancelled.into()),
        }
    }

    /// Drop the telemetry link, or abandon a handshake in progress
    pub async fn disconnect_telemetry(&self) -> TripResult<()> {
        self.send(Command::Disconnect).await
    }

    /// Key event from a Bluetooth remote
    pub async fn key_down(&self, key: &str, repeat: bool) -> TripResult<()> {
        self.send(Command::KeyDown {
            key: key.to_string(),
            repeat,
        })
        .await
    }

    pub async fn key_up(&self, key: &str) -> TripResult<()> {
        self.send(Command::KeyUp {
            key: key.to_string(),
        })
        .await
    }

    pub async fn snapshot(&self) -> TripResult<TripSnapshot> {
        self.request(Command::Snapshot).await
    }

    pub async fn export(&self) -> TripResult<TrackExport> {
        self.request(Command::Export).await
    }

    /// Stop the runtime. The telemetry link, if any, is closed.
    pub async fn shutdown(&self) -> TripResult<()> {
        self.send(Command::Shutdown).await
    }
}

/// Owner task of the trip computer
pub struct TripRuntime {
    computer: TripComputer,
    remote: RemoteButton,
    telemetry: TelemetryConfig,
    handshake_timeout: Duration,
    frame_interval: Duration,
    link: LinkState,
    generation: u64,
    tx: mpsc::WeakSender<Command>,
}

impl TripRuntime {
    /// Start the runtime on the current tokio runtime.
    ///
    /// Fails with [`TripMeterError::Config`] if `config` does not validate.
    pub fn spawn(
        config: TripConfig,
        listener: Box<dyn TripListener>,
    ) -> TripResult<(TripHandle, JoinHandle<()>)> {
        config.validate()?;
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let runtime = TripRuntime {
            computer: TripComputer::new(&config, listener),
            remote: RemoteButton::from_secs(config.long_press_secs),
            telemetry: config.telemetry.clone(),
            handshake_timeout: config.handshake_timeout(),
            frame_interval: config.frame_interval(),
            link: LinkState::Idle,
            generation: 0,
            tx: tx.downgrade(),
        };
        let task = tokio::spawn(runtime.run(rx));
        Ok((TripHandle { tx }, task))
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        let mut ticker = interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        self.computer.start();
        log::info!("Trip runtime started, render every {:?}", self.frame_interval);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command),
                },
                _ = ticker.tick() => self.on_tick(),
            }
        }

        self.drop_link();
        log::info!("Trip runtime stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Internal(report) => {
                self.computer.ingest_internal(&report);
            }
            Command::SensorFault(fault) => self.computer.report_sensor_fault(fault),
            Command::Frame {
                generation,
                data,
                received_at,
            } => {
                if self.is_current(generation) {
                    self.computer.ingest_telemetry_frame(&data, received_at);
                }
            }
            Command::LinkLost { generation } => {
                if self.is_current(generation) {
                    log::warn!("Telemetry link lost");
                    self.drop_link();
                }
            }
            Command::Connect { link, reply } => self.start_handshake(link, reply),
            Command::HandshakeDone {
                generation,
                result,
                reply,
            } => self.finish_handshake(generation, result, reply),
            Command::Disconnect => self.drop_link(),
            Command::ResetTripA(reply) => {
                let _ = reply.send(self.computer.reset_trip_a());
            }
            Command::ResetAll => self.computer.reset_all(),
            Command::SetRecording(on) => self.computer.set_recording(on),
            Command::KeyDown { key, repeat } => self.remote.key_down(&key, repeat, Instant::now()),
            Command::KeyUp { key } => {
                if let Some(action) = self.remote.key_up(&key, Instant::now()) {
                    self.apply(action);
                }
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.computer.snapshot());
            }
            Command::Export(reply) => {
                let _ = reply.send(self.computer.export());
            }
            // Handled by the loop
            Command::Shutdown => {}
        }
    }

    fn on_tick(&mut self) {
        if let Some(action) = self.remote.poll(Instant::now()) {
            self.apply(action);
        }
        self.computer.tick();
    }

    fn apply(&mut self, action: RemoteAction) {
        match action {
            RemoteAction::ResetTripA => {
                self.computer.reset_trip_a();
            }
            RemoteAction::ResetAll => self.computer.reset_all(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(self.link, LinkState::Connected { generation: g, .. } if g == generation)
    }

    fn start_handshake(&mut self, link: Box<dyn TelemetryLink>, reply: ConnectReply) {
        if !matches!(self.link, LinkState::Idle) {
            let _ = reply.send(Err(TelemetryError::AlreadyConnected));
            return;
        }
        self.generation += 1;
        let generation = self.generation;
        let config = self.telemetry.clone();
        let timeout = self.handshake_timeout;
        let tx = self.tx.clone();

        log::info!("Connecting to telemetry device ({})", config.name_prefix);
        // Aborting this task drops the link mid-handshake, which disconnects it
        let task = tokio::spawn(async move {
            let result = establish_with_timeout(link, &config, timeout).await;
            let tx = match tx.upgrade() {
                Some(tx) => tx,
                None => return,
            };
            let _ = tx
                .send(Command::HandshakeDone {
                    generation,
                    result,
                    reply,
                })
                .await;
        });
        self.link = LinkState::Connecting { generation, task };
    }

    fn finish_handshake(
        &mut self,
        generation: u64,
        result: Result<TelemetrySession, TelemetryError>,
        reply: ConnectReply,
    ) {
        let pending = matches!(self.link, LinkState::Connecting { generation: g, .. } if g == generation);
        if !pending {
            // Superseded by a disconnect while the handshake was finishing
            if let Ok(session) = result {
                tokio::spawn(session.close());
            }
            let _ = reply.send(Err(TelemetryError::Cancelled));
            return;
        }

        match result {
            Ok(mut session) => {
                let forwarder = match session.take_frames() {
                    Some(frames) => spawn_forwarder(frames, self.tx.clone(), generation),
                    None => {
                        self.link = LinkState::Idle;
                        tokio::spawn(session.close());
                        let _ = reply.send(Err(TelemetryError::NotConnected));
                        return;
                    }
                };
                let name = session.device_name().to_string();
                self.link = LinkState::Connected {
                    generation,
                    session,
                    forwarder,
                };
                self.computer.telemetry_connected();
                let _ = reply.send(Ok(name));
            }
            Err(e) => {
                self.link = LinkState::Idle;
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Tear down whatever link state exists and fall back to the internal sensor
    fn drop_link(&mut self) {
        match std::mem::replace(&mut self.link, LinkState::Idle) {
            LinkState::Idle => {}
            LinkState::Connecting { task, .. } => {
                log::info!("Telemetry handshake abandoned");
                task.abort();
            }
            LinkState::Connected {
                session, forwarder, ..
            } => {
                forwarder.abort();
                tokio::spawn(session.close());
            }
        }
        // Anything still in flight for the old link is now stale
        self.generation += 1;
        self.computer.telemetry_disconnected();
    }
}

// Holds only a weak sender so a live link never keeps the runtime alive
// after every handle is gone.
fn spawn_forwarder(mut frames: FrameReceiver, tx: mpsc::WeakSender<Command>, generation: u64) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(data) = frames.recv().await {
            let command = Command::Frame {
                generation,
                data,
                received_at: current_timestamp(),
            };
            let sent = match tx.upgrade() {
                Some(tx) => tx.send(command).await.is_ok(),
                None => false,
            };
            if !sent {
                return;
            }
        }
        if let Some(tx) = tx.upgrade() {
            let _ = tx.send(Command::LinkLost { generation }).await;
        }
    })
}
