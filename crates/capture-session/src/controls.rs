//! Camera settings controls
//!
//! Commands arrive from an external control source (keyboard, stdin,
//! tests) and are applied between grabs.

use camera_device::{CameraDevice, DeviceError, Rect, Side, VideoSetting, VIDEO_SETTINGS_VALUE_AUTO};
use tracing::{info, warn};

/// A camera control request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Select the next adjustable setting
    NextSetting,
    /// Raise the selected setting by one step
    Increase,
    /// Lower the selected setting by one step, not below 0
    Decrease,
    /// Switch the camera LED on or off
    ToggleLed,
    /// Put every image setting back to AUTO
    ResetAll,
    /// Use a region for auto exposure/gain
    ApplyRoi(Rect),
    /// Use the full image for auto exposure/gain
    ResetRoi,
    /// End the session
    Quit,
}

impl ControlCommand {
    /// Parse a control line: `s`, `+`, `-`, `l`, `r`, `f`, `q`, or
    /// `a x y width height`
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let key = parts.next()?;
        match key {
            "s" => Some(ControlCommand::NextSetting),
            "+" => Some(ControlCommand::Increase),
            "-" => Some(ControlCommand::Decrease),
            "l" => Some(ControlCommand::ToggleLed),
            "r" => Some(ControlCommand::ResetAll),
            "f" => Some(ControlCommand::ResetRoi),
            "q" => Some(ControlCommand::Quit),
            "a" => {
                let values: Vec<u32> = parts.map(|p| p.parse().ok()).collect::<Option<_>>()?;
                match values.as_slice() {
                    [x, y, width, height] => {
                        Some(ControlCommand::ApplyRoi(Rect::new(*x, *y, *width, *height)))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Result of applying one command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    Quit,
}

/// Tracks the selected setting and LED state between commands
#[derive(Debug, Clone)]
pub struct CameraControls {
    selected: VideoSetting,
    step: i32,
    led_on: bool,
}

impl Default for CameraControls {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraControls {
    /// Controls with the first setting after `Brightness` selected
    pub fn new() -> Self {
        let mut controls = Self {
            selected: VideoSetting::Brightness,
            step: 1,
            led_on: true,
        };
        controls.switch_setting();
        controls
    }

    /// Currently selected setting
    pub fn selected(&self) -> VideoSetting {
        self.selected
    }

    /// Increment applied by Increase/Decrease
    pub fn step(&self) -> i32 {
        self.step
    }

    pub fn led_on(&self) -> bool {
        self.led_on
    }

    /// Select the next setting; the LED and ROI settings have their own
    /// commands and are skipped
    pub fn switch_setting(&mut self) -> VideoSetting {
        let mut next = self.selected.next();
        if next == VideoSetting::LedStatus {
            next = VideoSetting::Brightness;
        }
        if next == VideoSetting::AecAgcRoi {
            next = next.next();
        }

        self.selected = next;
        self.step = if next == VideoSetting::WhitebalanceTemperature {
            100
        } else {
            1
        };
        info!("Switch to camera setting: {}", next);
        next
    }

    /// Apply one command to the device
    pub fn apply<D: CameraDevice + ?Sized>(
        &mut self,
        device: &D,
        command: ControlCommand,
    ) -> Result<ControlOutcome, DeviceError> {
        match command {
            ControlCommand::NextSetting => {
                let setting = self.switch_setting();
                let value = device.camera_setting(setting)?;
                info!("{}: {}", setting, value);
            }
            ControlCommand::Increase => {
                let current = device.camera_setting(self.selected)?;
                device.set_camera_setting(self.selected, current.saturating_add(self.step))?;
                self.report(device)?;
            }
            ControlCommand::Decrease => {
                let current = device.camera_setting(self.selected)?;
                // Never step below 0, also keeps AUTO (-1) from going further negative
                let value = if current > 0 { current - self.step } else { 0 };
                device.set_camera_setting(self.selected, value)?;
                self.report(device)?;
            }
            ControlCommand::ToggleLed => {
                let led_on = !self.led_on;
                device.set_camera_setting(VideoSetting::LedStatus, led_on as i32)?;
                self.led_on = led_on;
                info!("LED {}", if led_on { "on" } else { "off" });
            }
            ControlCommand::ResetAll => {
                info!("Reset all settings to default");
                let last = VideoSetting::WhitebalanceTemperature.index();
                for setting in VideoSetting::ALL[..=last].iter().copied() {
                    if !setting.accepts_auto() {
                        continue;
                    }
                    if let Err(e) = device.set_camera_setting(setting, VIDEO_SETTINGS_VALUE_AUTO) {
                        warn!("Failed to reset {}: {}", setting, e);
                    }
                }
            }
            ControlCommand::ApplyRoi(roi) => {
                info!("Set AEC_AGC_ROI on target {}", roi);
                device.set_roi(roi, Side::Both, false)?;
            }
            ControlCommand::ResetRoi => {
                info!("Reset AEC_AGC_ROI to full resolution");
                device.set_roi(Rect::default(), Side::Both, true)?;
            }
            ControlCommand::Quit => return Ok(ControlOutcome::Quit),
        }
        Ok(ControlOutcome::Applied)
    }

    fn report<D: CameraDevice + ?Sized>(&self, device: &D) -> Result<(), DeviceError> {
        let value = device.camera_setting(self.selected)?;
        info!("{}: {}", self.selected, value);
        Ok(())
    }
}
