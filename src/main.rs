use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::{sleep, Duration};

use trip_meter::replay::{load_records, replay};
use trip_meter::sensors::simulated_sensor_loop;
use trip_meter::{
    ExportFormat, NullListener, SimulatedDrive, TrackExport, TripComputer, TripConfig, TripEvent,
    TripRuntime,
};

#[derive(Parser, Debug)]
#[command(name = "trip_meter")]
#[command(about = "Trip A / Trip B odometer - replay recorded sessions or run a simulated drive", long_about = None)]
struct Cli {
    /// JSON config file (missing fields use defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override render rate
    #[arg(long, global = true)]
    frame_rate: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a session log (JSON array or JSON lines, optionally .gz)
    Replay {
        log: PathBuf,

        #[command(flatten)]
        outputs: Outputs,
    },
    /// Drive the runtime with the synthetic 1 Hz sensor
    Simulate {
        /// Duration in seconds (0 = until Ctrl-C)
        #[arg(long, default_value = "30")]
        seconds: u64,

        /// Start a fresh track recording
        #[arg(long)]
        record: bool,

        #[command(flatten)]
        outputs: Outputs,
    },
}

#[derive(Args, Debug)]
struct Outputs {
    /// Write the track as KML
    #[arg(long)]
    kml: Option<PathBuf>,

    /// Write the track as GPX
    #[arg(long)]
    gpx: Option<PathBuf>,

    /// Write the track as JSON
    #[arg(long)]
    json: Option<PathBuf>,
}

impl Outputs {
    fn write(&self, export: &TrackExport) -> Result<()> {
        let targets = [
            (&self.kml, ExportFormat::Kml),
            (&self.gpx, ExportFormat::Gpx),
            (&self.json, ExportFormat::Json),
        ];
        for (path, format) in targets {
            if let Some(path) = path {
                export
                    .write_to(path, format)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("[{}] Wrote {}", ts_now(), path.display());
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref(), cli.frame_rate)?;

    match cli.command {
        Command::Replay { log, outputs } => run_replay(&config, &log, &outputs),
        Command::Simulate {
            seconds,
            record,
            outputs,
        } => run_simulation(config, seconds, record, &outputs).await,
    }
}

fn load_config(path: Option<&Path>, frame_rate: Option<u32>) -> Result<TripConfig> {
    let mut config = match path {
        Some(path) => TripConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => TripConfig::default(),
    };
    if let Some(rate) = frame_rate {
        config.frame_rate_hz = rate;
    }
    config.validate()?;
    Ok(config)
}

fn run_replay(config: &TripConfig, log: &Path, outputs: &Outputs) -> Result<()> {
    let records = load_records(log).with_context(|| format!("reading {}", log.display()))?;
    let mut computer = TripComputer::new(config, Box::new(NullListener));
    let summary = replay(&records, &mut computer, config.frame_interval());

    println!("[{}] Replayed {}", ts_now(), log.display());
    println!("  Records:      {}", summary.records);
    println!("  Samples used: {} (dropped {})", summary.samples_used, summary.samples_dropped);
    println!("  Trip A:       {:.2} km", summary.trips.trip_a / 1000.0);
    println!("  Trip B:       {:.2} km", summary.trips.trip_b / 1000.0);
    println!("  Track points: {}", summary.track_points);
    println!("  Waypoints:    {}", summary.waypoints);

    outputs.write(&computer.export())
}

async fn run_simulation(config: TripConfig, seconds: u64, record: bool, outputs: &Outputs) -> Result<()> {
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<TripEvent>();
    let (handle, runtime) = TripRuntime::spawn(config, Box::new(events_tx))?;

    if record {
        handle.reset_all().await?;
    }

    let sensor = tokio::spawn(simulated_sensor_loop(handle.clone(), SimulatedDrive::new()));

    println!("[{}] Simulated drive started", ts_now());
    let deadline = async {
        if seconds == 0 {
            let _ = tokio::signal::ctrl_c().await;
        } else {
            sleep(Duration::from_secs(seconds)).await;
        }
    };
    tokio::pin!(deadline);

    let mut speed_kmh = 0.0;
    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events_rx.recv() => match event {
                Some(TripEvent::Speed { speed_kmh: v }) => speed_kmh = v,
                Some(TripEvent::Debug(patch)) => {
                    if let Some(status) = patch.fix_status {
                        log::debug!("Fix status: {}", status);
                    }
                    if patch.track_points.is_some() {
                        let snapshot = handle.snapshot().await?;
                        println!(
                            "[{}] {:5.1} km/h | A {:8.3} km | B {:8.3} km",
                            ts_now(),
                            speed_kmh,
                            snapshot.trips.trip_a / 1000.0,
                            snapshot.trips.trip_b / 1000.0
                        );
                    }
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    let export = handle.export().await?;
    let snapshot = handle.snapshot().await?;
    handle.shutdown().await?;
    sensor.abort();
    runtime.await?;

    println!("[{}] Simulation stopped", ts_now());
    println!("  Trip A: {:.3} km", snapshot.trips.trip_a / 1000.0);
    println!("  Trip B: {:.3} km", snapshot.trips.trip_b / 1000.0);
    println!("  Track points: {}", snapshot.track_points);

    outputs.write(&export)
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
