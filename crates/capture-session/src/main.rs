//! Camera IMU Logger - Main Entry Point

use anyhow::{Context, Result};
use camera_device::{CancellationToken, CompressionMode, RecordingParams, SimulatedCamera};
use capture_session::{
    init_logging, parse_source_arg, ControlCommand, SessionConfig, SessionController,
    SessionMode, StopReason,
};
use clap::Parser;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Capture stereo camera frames while logging IMU samples to CSV"
)]
struct Args {
    /// Stream address (a.b.c.d[:port]) or resolution keyword (HD2K, HD1080, HD720, VGA)
    source: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Record grabbed frames into this file
    #[arg(long)]
    record: Option<PathBuf>,

    /// Recording compression
    #[arg(long, value_enum, ignore_case = true)]
    compression: Option<CompressionMode>,

    /// Directory for the sensor CSV logs
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Keep capturing through grab failures
    #[arg(long)]
    unattended: bool,

    /// Reboot the camera before opening it
    #[arg(long)]
    reboot: bool,

    /// Read camera control keys from stdin
    #[arg(long)]
    controls: bool,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn apply_args(config: &mut SessionConfig, args: &Args) {
    if let Some(source) = &args.source {
        parse_source_arg(source).apply(&mut config.camera);
    }
    if let Some(path) = &args.record {
        config.recording = Some(RecordingParams {
            path: path.clone(),
            compression: args.compression.unwrap_or(CompressionMode::H264),
        });
    } else if let (Some(recording), Some(compression)) = (&mut config.recording, args.compression)
    {
        recording.compression = compression;
    }
    if let Some(dir) = &args.log_dir {
        config.logger.directory = dir.clone();
    }
    if args.unattended {
        config.mode = SessionMode::Unattended;
    }
    if args.reboot {
        config.reboot_before_open = true;
    }
}

fn print_controls_help() {
    println!();
    println!("Camera controls (type a key, then Enter):");
    println!("  s            : switch camera setting");
    println!("  + / -        : increase / decrease the setting value");
    println!("  l            : toggle the LED");
    println!("  r            : reset all settings to AUTO");
    println!("  a x y w h    : apply an AEC/AGC region of interest");
    println!("  f            : reset the region of interest to full image");
    println!("  q            : quit");
    println!();
}

/// Forward stdin lines as control commands until stdin closes
fn spawn_stdin_controls(tx: mpsc::Sender<ControlCommand>) -> Result<()> {
    std::thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match ControlCommand::parse(&line) {
                    Some(command) => {
                        if tx.send(command).is_err() {
                            break;
                        }
                    }
                    None => warn!("Unknown control '{}'", line.trim()),
                }
            }
        })
        .context("Failed to start the stdin control reader")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = SessionConfig::load(args.config.as_deref())
        .context("Failed to load session configuration")?;
    apply_args(&mut config, &args);

    init_logging(args.verbose).context("Failed to set tracing subscriber")?;

    info!("=== Camera IMU Logger v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Mode: {:?}, resolution: {}, input: {}",
        config.mode, config.camera.resolution, config.camera.input
    );

    let token = CancellationToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.cancel())
        .context("Error setting Ctrl-C handler")?;

    let mut session = SessionController::new(SimulatedCamera::new(), config, token);
    if args.controls {
        let (tx, rx) = mpsc::channel();
        spawn_stdin_controls(tx)?;
        print_controls_help();
        session = session.with_commands(rx);
    }

    let report = session.run().context("Capture session failed")?;

    match &report.stop_reason {
        StopReason::Cancelled => info!("Capture stopped on request"),
        StopReason::GrabFailed(e) => error!("Capture ended after a grab error: {}", e),
    }
    info!(
        "Frames grabbed: {}, grab failures: {}",
        report.capture.grabbed, report.capture.grab_failures
    );
    if let Some(logger) = &report.logger {
        info!(
            "Sensor records: {} imu, {} magnetometer, {} barometer ({} duplicates dropped)",
            logger.imu_records,
            logger.magnetometer_records,
            logger.barometer_records,
            logger.duplicates_dropped
        );
    }
    for path in &report.log_paths {
        info!("Sensor log: {}", path.display());
    }

    Ok(())
}
