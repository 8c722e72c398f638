//! # traffic_rig
//!
//! Command-line entry point for the rotating camera rig.
//!
//! - `scan`: continuous alternating-direction scanning until Ctrl-C or a `q` line
//! - `once`: a single cycle, forward or `--reverse`
//! - `calibrate`: manual motor adjustment with a live preview image

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use traffic_rig::calibration::{run_live_preview, CalibrationSession};
use traffic_rig::config::{MotorConfig, RigConfig};
use traffic_rig::detection::HttpDetector;
use traffic_rig::error::{AppResult, RigError};
use traffic_rig::hardware::http_camera::HttpFrameSource;
use traffic_rig::hardware::{FrameSource, MotorLink};
use traffic_rig::logging;
use traffic_rig::scan::{
    stop_channel, ConsoleReviewer, ContinuousScan, ScanDirection, ScanOrchestrator, StopHandle,
};
use traffic_rig::storage::{ArtifactStore, DirectoryStore};

#[cfg(feature = "tokio_serial")]
type RigTransport = traffic_rig::hardware::serial_transport::SerialMotorTransport;
#[cfg(not(feature = "tokio_serial"))]
type RigTransport = traffic_rig::hardware::mock::MockMotorTransport;

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "traffic_rig")]
#[command(about = "Rotating camera traffic survey and signal priority controller")]
struct Cli {
    /// Configuration file (defaults to config/traffic_rig.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Scan continuously, alternating direction every cycle
    Scan,
    /// Run a single scan cycle
    Once {
        /// Turn in reverse instead of forward
        #[arg(long)]
        reverse: bool,
    },
    /// Adjust the motor by hand
    Calibrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = RigConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    logging::init_from_config(&config.application).context("failed to initialise logging")?;
    info!(command = ?cli.command, "traffic_rig starting");

    let mut link = open_motor_link(&config.motor)
        .await
        .context("could not open the motor link")?;

    let frames: Arc<dyn FrameSource> =
        Arc::new(HttpFrameSource::new(&config.camera).context("could not set up the camera")?);
    let detector =
        Arc::new(HttpDetector::new(&config.detector).context("could not set up the detector")?);
    let store = Arc::new(DirectoryStore::from_config(&config.artifacts));

    let (stop_handle, mut stop) = stop_channel();
    spawn_ctrl_c(stop_handle.clone());
    let mut lines = spawn_console_reader();

    match cli.command {
        Command::Scan | Command::Once { .. } => {
            tokio::spawn(watch_for_quit(lines, stop_handle.clone()));

            let reviewer = Arc::new(ConsoleReviewer::new(
                config.review.display_duration,
                stop.clone(),
            ));
            let orchestrator = ScanOrchestrator::new(
                frames,
                detector,
                store.clone(),
                reviewer,
                config.scan.clone(),
                stop.clone(),
            );

            if let Command::Once { reverse } = cli.command {
                let direction = if reverse {
                    ScanDirection::Reverse
                } else {
                    ScanDirection::Forward
                };
                let flow = orchestrator.perform_full_scan(&mut link, direction).await;
                info!(?flow, "single scan finished");
            } else {
                info!("continuous scan: press Ctrl-C or type 'q' and Enter to stop");
                let summary = ContinuousScan::from_config(&config.scan)
                    .run(&orchestrator, &mut link, &mut stop)
                    .await;
                info!(
                    cycles = summary.cycles_completed,
                    next_direction = summary.next_direction.label(),
                    "continuous scan finished"
                );
            }
        }
        Command::Calibrate => {
            let preview = {
                let frames = frames.clone();
                let store = store.clone();
                let interval = config.calibration.preview_interval;
                let stop = stop.clone();
                tokio::spawn(async move {
                    run_live_preview(frames.as_ref(), store.as_ref(), interval, stop).await
                })
            };

            let session = CalibrationSession::from_config(&config.calibration);
            let outcome = session.run(&mut link, &mut lines, &mut stop).await;

            stop_handle.trigger();
            if let Err(err) = preview.await {
                warn!(error = %err, "live preview task ended abnormally");
            }
            match outcome {
                Ok(summary) => info!(
                    moves = summary.moves_sent,
                    rejected = summary.rejected_inputs,
                    exit = ?summary.exit,
                    "calibration session closed"
                ),
                Err(err) => error!(error = %err, "calibration could not start"),
            }
        }
    }

    shutdown(&mut link, store.as_ref())
        .await
        .context("cleanup failed")?;
    info!("traffic_rig stopped");
    Ok(())
}

/// Opens the configured serial port, retrying per policy, then clears the
/// controller's start-up chatter.
#[cfg(feature = "tokio_serial")]
async fn open_motor_link(config: &MotorConfig) -> AppResult<MotorLink<RigTransport>> {
    let transport = traffic_rig::error_recovery::retry_with_policy(
        &config.retry_policy(),
        "open motor link",
        move || async move { RigTransport::open(&config.port, config.baud_rate) },
    )
    .await?;
    info!(port = %config.port, baud = config.baud_rate, "motor link open");

    let mut link = MotorLink::new(transport).with_poll_interval(config.poll_interval);
    // The controller resets when the port opens.
    tokio::time::sleep(config.startup_delay).await;
    let greeting = link.drain(config.poll_interval).await;
    info!(lines = greeting.len(), "motor controller ready");
    Ok(link)
}

#[cfg(not(feature = "tokio_serial"))]
async fn open_motor_link(config: &MotorConfig) -> AppResult<MotorLink<RigTransport>> {
    warn!(port = %config.port, "built without serial support");
    Err(RigError::SerialFeatureDisabled)
}

fn spawn_ctrl_c(stop: StopHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, stopping");
                stop.trigger();
            }
            Err(err) => warn!(error = %err, "cannot listen for Ctrl-C"),
        }
    });
}

/// Forwards stdin lines to a channel so they can be awaited alongside other work.
fn spawn_console_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut stdin = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match stdin.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "console input unavailable");
                    break;
                }
            }
        }
    });
    rx
}

async fn watch_for_quit(mut lines: mpsc::Receiver<String>, stop: StopHandle) {
    while let Some(line) = lines.recv().await {
        if matches!(line.trim().to_lowercase().as_str(), "q" | "quit" | "stop") {
            info!("stop requested from console");
            stop.trigger();
            break;
        }
    }
}

/// Closes the link and removes the artifact directories, reporting every failure.
async fn shutdown(
    link: &mut MotorLink<RigTransport>,
    store: &dyn ArtifactStore,
) -> AppResult<()> {
    let mut failures = Vec::new();
    if link.close().is_none() {
        warn!("motor link was already closed");
    }
    if let Err(err) = store.cleanup().await {
        failures.push(err);
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(RigError::ShutdownFailed(failures))
    }
}
