//! Command-line source selection

use camera_device::{InitConfig, InputSource, Resolution, DEFAULT_STREAM_PORT};
use std::net::Ipv4Addr;
use tracing::{info, warn};

/// What a source argument asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelection {
    /// Argument not recognized; keep defaults
    Default,
    /// Recorded file playback, which this tool does not support
    Playback(String),
    /// Network stream
    Stream { ip: Ipv4Addr, port: u16 },
    /// Live camera at the given resolution
    Resolution(Resolution),
}

/// Interpret a source argument.
///
/// Accepts `a.b.c.d:port`, `a.b.c.d`, or any text containing a resolution
/// keyword (`HD2K`, `HD1080`, `HD720`, `VGA`, checked in that order).
pub fn parse_source_arg(arg: &str) -> SourceSelection {
    if arg.contains(".svo") {
        return SourceSelection::Playback(arg.to_string());
    }

    if let Some((host, port)) = arg.split_once(':') {
        if let (Ok(ip), Ok(port)) = (host.parse::<Ipv4Addr>(), port.parse::<u16>()) {
            return SourceSelection::Stream { ip, port };
        }
    }
    if let Ok(ip) = arg.parse::<Ipv4Addr>() {
        return SourceSelection::Stream {
            ip,
            port: DEFAULT_STREAM_PORT,
        };
    }

    [
        Resolution::Hd2k,
        Resolution::Hd1080,
        Resolution::Hd720,
        Resolution::Vga,
    ]
    .into_iter()
    .find(|r| arg.contains(r.keyword()))
    .map_or(SourceSelection::Default, SourceSelection::Resolution)
}

impl SourceSelection {
    /// Apply the selection to camera init parameters
    pub fn apply(&self, config: &mut InitConfig) {
        match self {
            SourceSelection::Default => {}
            SourceSelection::Playback(path) => {
                warn!("File input ({}) is not available for live capture, ignoring", path);
            }
            SourceSelection::Stream { ip, port } => {
                info!("Using stream input, IP: {}, port: {}", ip, port);
                config.input = InputSource::Stream {
                    ip: *ip,
                    port: *port,
                };
            }
            SourceSelection::Resolution(resolution) => {
                info!("Using camera in resolution {}", resolution);
                config.resolution = *resolution;
            }
        }
    }
}
