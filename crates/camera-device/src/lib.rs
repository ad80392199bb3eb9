//! Camera Device Library
//!
//! Capability interface over a stereo camera with an on-board IMU.
//! Provides:
//! - Init configuration (resolution, depth mode, live or network input)
//! - Frame grabbing and image retrieval
//! - Sensor bundles (IMU, magnetometer, barometer)
//! - Video settings control and recording lifecycle
//! - A simulated camera and a scripted fake for tests

pub mod cancel;
pub mod config;
pub mod frame;
pub mod scripted;
pub mod sensors;
pub mod settings;
pub mod simulated;

pub use cancel::CancellationToken;
pub use config::{DepthMode, InitConfig, InputSource, Resolution, DEFAULT_STREAM_PORT};
pub use frame::{Frame, View};
pub use scripted::{DeviceEvent, ScriptedCamera};
pub use sensors::{
    BarometerSample, ImuSample, MagnetometerSample, SensorBundle, SensorKind, TimeReference,
};
pub use settings::{
    CameraInformation, CompressionMode, RecordingParams, Rect, Side, VideoSetting,
    VIDEO_SETTINGS_VALUE_AUTO,
};
pub use simulated::SimulatedCamera;

use thiserror::Error;

/// Device error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Camera not opened")]
    NotOpened,

    #[error("Grab failed: {0}")]
    Grab(String),

    #[error("No frame grabbed yet")]
    NoFrame,

    #[error("Sensors data not available: {0}")]
    Sensors(String),

    #[error("Invalid value {value} for {setting}")]
    InvalidSetting { setting: VideoSetting, value: i32 },

    #[error("Region {0} is outside the image")]
    InvalidRegion(Rect),

    #[error("Recording error: {0}")]
    Recording(String),

    #[error("Reboot of device {0} failed")]
    Reboot(u32),
}

/// Stereo camera capability set consumed by capture and logging tasks.
///
/// Every method takes `&self`: one handle is shared between the frame grab
/// loop and the sensor polling thread. Implementations must serialize
/// image retrieval and sensor retrieval internally so that both may be
/// called concurrently from different threads.
pub trait CameraDevice: Send + Sync {
    /// Open the camera with the given configuration
    fn open(&self, config: &InitConfig) -> Result<(), DeviceError>;

    /// Close the camera, stopping any recording still running
    fn close(&self);

    /// Acquire the next frame from the sensor
    fn grab(&self) -> Result<(), DeviceError>;

    /// Retrieve the image of the last grabbed frame
    fn retrieve_image(&self, view: View) -> Result<Frame, DeviceError>;

    /// Latest sensor bundle
    fn sensors_data(&self, reference: TimeReference) -> Result<SensorBundle, DeviceError>;

    /// Current value of a video setting
    fn camera_setting(&self, setting: VideoSetting) -> Result<i32, DeviceError>;

    /// Write a video setting; `VIDEO_SETTINGS_VALUE_AUTO` restores automatic mode
    fn set_camera_setting(&self, setting: VideoSetting, value: i32) -> Result<(), DeviceError>;

    /// Set the auto exposure/gain region of interest
    fn set_roi(&self, roi: Rect, side: Side, reset: bool) -> Result<(), DeviceError>;

    /// Start recording grabbed frames into a container file
    fn enable_recording(&self, params: &RecordingParams) -> Result<(), DeviceError>;

    /// Stop recording; no-op when not recording
    fn disable_recording(&self);

    /// Static information about the opened camera
    fn camera_information(&self) -> CameraInformation;

    /// Power-cycle the camera at the given index
    fn reboot(device_index: u32) -> Result<(), DeviceError>
    where
        Self: Sized;
}
