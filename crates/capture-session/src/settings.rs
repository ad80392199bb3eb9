//! Session configuration

use camera_device::{InitConfig, InputSource, RecordingParams};
use imu_logger::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// How the session is operated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Operator present, camera controls live
    Interactive,
    /// Nobody watching, typically recording
    Unattended,
}

impl SessionMode {
    /// Grab failure handling used unless configured explicitly
    pub fn default_grab_policy(&self) -> GrabFailurePolicy {
        match self {
            SessionMode::Interactive => GrabFailurePolicy::Abort,
            SessionMode::Unattended => GrabFailurePolicy::Continue,
        }
    }
}

/// What the capture loop does when a grab fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrabFailurePolicy {
    /// Stop the loop and report the error
    Abort,
    /// Report the error and grab again
    Continue,
}

/// What the session does when the sensor log cannot be opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFailurePolicy {
    /// Keep capturing without sensor logging
    ContinueWithoutLogging,
    /// Tear the session down
    AbortSession,
}

/// Everything needed to run one capture session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera init parameters
    pub camera: InitConfig,
    /// Operating mode
    pub mode: SessionMode,
    /// Explicit grab failure policy; follows the mode when unset
    pub grab_failure_policy: Option<GrabFailurePolicy>,
    /// Reaction to a sensor log that cannot be opened
    pub log_failure_policy: LogFailurePolicy,
    /// Recording sink, disabled when unset
    pub recording: Option<RecordingParams>,
    /// Sensor logger settings
    pub logger: LoggerConfig,
    /// Power-cycle the camera before opening it
    pub reboot_before_open: bool,
    /// Wait after a reboot (milliseconds)
    pub reboot_settle_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera: InitConfig::default(),
            mode: SessionMode::Interactive,
            grab_failure_policy: None,
            log_failure_policy: LogFailurePolicy::ContinueWithoutLogging,
            recording: None,
            logger: LoggerConfig::default(),
            reboot_before_open: false,
            reboot_settle_ms: 3000,
        }
    }
}

impl SessionConfig {
    /// Unattended preset: keeps grabbing through transient failures
    pub fn unattended() -> Self {
        Self {
            mode: SessionMode::Unattended,
            ..Default::default()
        }
    }

    /// Grab failure policy in effect
    pub fn grab_policy(&self) -> GrabFailurePolicy {
        self.grab_failure_policy
            .unwrap_or_else(|| self.mode.default_grab_policy())
    }

    /// Index of the camera to reboot; streams reboot the local camera 0
    pub fn device_index(&self) -> u32 {
        match self.camera.input {
            InputSource::Live { device_index } => device_index,
            InputSource::Stream { .. } => 0,
        }
    }

    /// Load from an optional TOML file, then `CAPTURE_*` environment
    /// variables (`__` separates nested keys, e.g. `CAPTURE_LOGGER__DIRECTORY`)
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }
        builder = builder.add_source(
            ::config::Environment::with_prefix("CAPTURE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}
