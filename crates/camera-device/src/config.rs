//! Camera init configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Default port of a camera network stream
pub const DEFAULT_STREAM_PORT: u16 = 30000;

/// Capture resolution (per eye)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Resolution {
    /// 672x376
    Vga,
    /// 1280x720
    Hd720,
    /// 1920x1080
    Hd1080,
    /// 2208x1242
    Hd2k,
}

impl Resolution {
    /// Image size in pixels (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::Vga => (672, 376),
            Resolution::Hd720 => (1280, 720),
            Resolution::Hd1080 => (1920, 1080),
            Resolution::Hd2k => (2208, 1242),
        }
    }

    /// Highest frame rate supported at this resolution
    pub fn max_fps(&self) -> u32 {
        match self {
            Resolution::Vga => 100,
            Resolution::Hd720 => 60,
            Resolution::Hd1080 => 30,
            Resolution::Hd2k => 15,
        }
    }

    /// Keyword used on the command line
    pub fn keyword(&self) -> &'static str {
        match self {
            Resolution::Vga => "VGA",
            Resolution::Hd720 => "HD720",
            Resolution::Hd1080 => "HD1080",
            Resolution::Hd2k => "HD2K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Depth computation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthMode {
    /// No depth computation
    None,
    Performance,
    Quality,
    Ultra,
    Neural,
}

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// Locally attached camera
    Live { device_index: u32 },
    /// Camera streamed over the network by a sender
    Stream { ip: Ipv4Addr, port: u16 },
}

impl InputSource {
    /// Stream input on the default port
    pub fn stream(ip: Ipv4Addr) -> Self {
        InputSource::Stream {
            ip,
            port: DEFAULT_STREAM_PORT,
        }
    }
}

impl Default for InputSource {
    fn default() -> Self {
        InputSource::Live { device_index: 0 }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Live { device_index } => write!(f, "live camera #{}", device_index),
            InputSource::Stream { ip, port } => write!(f, "stream {}:{}", ip, port),
        }
    }
}

/// Parameters applied when the camera is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitConfig {
    /// Capture resolution
    pub resolution: Resolution,
    /// Requested frame rate; 0 selects the resolution's maximum
    pub fps: u32,
    /// Depth computation mode
    pub depth_mode: DepthMode,
    /// Verbose device-side logging
    pub verbose: bool,
    /// Frame source
    pub input: InputSource,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::Hd720,
            fps: 0,
            depth_mode: DepthMode::None,
            verbose: true,
            input: InputSource::default(),
        }
    }
}

impl InitConfig {
    /// Frame rate the camera will actually run at
    pub fn effective_fps(&self) -> u32 {
        let max = self.resolution.max_fps();
        if self.fps == 0 {
            max
        } else {
            self.fps.min(max)
        }
    }
}
