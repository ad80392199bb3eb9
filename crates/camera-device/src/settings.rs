//! Video settings, regions of interest, recording and camera information

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Value that puts a video setting back into automatic mode
pub const VIDEO_SETTINGS_VALUE_AUTO: i32 = -1;

/// Adjustable video settings, in device order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoSetting {
    Brightness,
    Contrast,
    Hue,
    Saturation,
    Sharpness,
    Gamma,
    Gain,
    Exposure,
    AecAgc,
    AecAgcRoi,
    WhitebalanceTemperature,
    WhitebalanceAuto,
    LedStatus,
}

impl VideoSetting {
    /// Every setting, in device order
    pub const ALL: [VideoSetting; 13] = [
        VideoSetting::Brightness,
        VideoSetting::Contrast,
        VideoSetting::Hue,
        VideoSetting::Saturation,
        VideoSetting::Sharpness,
        VideoSetting::Gamma,
        VideoSetting::Gain,
        VideoSetting::Exposure,
        VideoSetting::AecAgc,
        VideoSetting::AecAgcRoi,
        VideoSetting::WhitebalanceTemperature,
        VideoSetting::WhitebalanceAuto,
        VideoSetting::LedStatus,
    ];

    /// Position in device order
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Setting following this one in device order (wraps)
    pub fn next(&self) -> VideoSetting {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    /// Inclusive range of accepted values, excluding AUTO
    pub fn range(&self) -> (i32, i32) {
        match self {
            VideoSetting::Brightness
            | VideoSetting::Contrast
            | VideoSetting::Saturation
            | VideoSetting::Sharpness => (0, 8),
            VideoSetting::Hue => (0, 11),
            VideoSetting::Gamma => (1, 9),
            VideoSetting::Gain | VideoSetting::Exposure => (0, 100),
            VideoSetting::WhitebalanceTemperature => (2800, 6500),
            VideoSetting::AecAgc
            | VideoSetting::AecAgcRoi
            | VideoSetting::WhitebalanceAuto
            | VideoSetting::LedStatus => (0, 1),
        }
    }

    /// Whether AUTO may be written to this setting
    pub fn accepts_auto(&self) -> bool {
        !matches!(self, VideoSetting::LedStatus | VideoSetting::AecAgcRoi)
    }

    /// Device-side name
    pub fn name(&self) -> &'static str {
        match self {
            VideoSetting::Brightness => "BRIGHTNESS",
            VideoSetting::Contrast => "CONTRAST",
            VideoSetting::Hue => "HUE",
            VideoSetting::Saturation => "SATURATION",
            VideoSetting::Sharpness => "SHARPNESS",
            VideoSetting::Gamma => "GAMMA",
            VideoSetting::Gain => "GAIN",
            VideoSetting::Exposure => "EXPOSURE",
            VideoSetting::AecAgc => "AEC_AGC",
            VideoSetting::AecAgcRoi => "AEC_AGC_ROI",
            VideoSetting::WhitebalanceTemperature => "WHITEBALANCE_TEMPERATURE",
            VideoSetting::WhitebalanceAuto => "WHITEBALANCE_AUTO",
            VideoSetting::LedStatus => "LED_STATUS",
        }
    }
}

impl fmt::Display for VideoSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Image region in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when the region has no area
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// True when the region lies inside an image of the given size
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x.saturating_add(self.width) <= width && self.y.saturating_add(self.height) <= height
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{},{},{}]", self.x, self.y, self.width, self.height)
    }
}

/// Which sensor(s) a region applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
    Both,
}

/// Recording compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    #[value(name = "lossless")]
    Lossless,
    #[value(name = "h264")]
    H264,
    #[value(name = "h265")]
    H265,
}

impl CompressionMode {
    /// Tag stored in the container header
    pub fn tag(&self) -> u8 {
        match self {
            CompressionMode::Lossless => 0,
            CompressionMode::H264 => 1,
            CompressionMode::H265 => 2,
        }
    }
}

/// Recording sink parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingParams {
    /// Output container path
    pub path: PathBuf,
    /// Compression applied to frames
    pub compression: CompressionMode,
}

/// Static information about an opened camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInformation {
    pub model: String,
    pub serial_number: u32,
    pub camera_firmware: u32,
    pub sensors_firmware: u32,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}
