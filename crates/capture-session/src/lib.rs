//! Capture Session
//!
//! Runs a stereo camera capture loop while a background thread logs the
//! camera's inertial sensor samples, and tears both down in a fixed order.

pub mod capture;
pub mod controls;
pub mod session;
pub mod settings;
pub mod source;

pub use capture::{CaptureLoop, CaptureStats, StopReason};
pub use controls::{CameraControls, ControlCommand, ControlOutcome};
pub use session::{SessionController, SessionReport};
pub use settings::{ConfigError, GrabFailurePolicy, LogFailurePolicy, SessionConfig, SessionMode};
pub use source::{parse_source_arg, SourceSelection};

use camera_device::DeviceError;
use imu_logger::LoggerError;
use thiserror::Error;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Camera open failed: {0}")]
    DeviceOpen(#[source] DeviceError),

    #[error("Recording could not be enabled: {0}")]
    RecordingEnable(#[source] DeviceError),

    #[error("Sensor log could not be started: {0}")]
    LogOpen(#[source] LoggerError),
}

/// Initialize logging
pub fn init_logging(verbose: bool) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
}
