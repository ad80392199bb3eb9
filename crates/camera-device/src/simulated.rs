//! Simulated stereo camera
//!
//! Deterministic stand-in for the vendor SDK: frames are paced at the
//! configured frame rate, IMU/magnetometer/barometer samples are quantized
//! to their sensor rates so polling faster than a sensor repeats its last
//! sample, and recording writes a small raw container.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::{
    BarometerSample, CameraDevice, CameraInformation, DeviceError, Frame, ImuSample, InitConfig,
    InputSource, MagnetometerSample, RecordingParams, Rect, SensorBundle, Side, TimeReference,
    VideoSetting, View, VIDEO_SETTINGS_VALUE_AUTO,
};

/// Magic bytes at the start of a simulated recording
pub const RECORDING_MAGIC: &[u8; 8] = b"SIMREC01";

/// Default IMU output rate (Hz)
pub const DEFAULT_IMU_RATE_HZ: u32 = 400;

const MAGNETOMETER_RATE_HZ: u32 = 50;
const BAROMETER_RATE_HZ: u32 = 25;
const GRAVITY: f32 = 9.806_65;

/// Value a setting holds after a reset to AUTO
fn default_setting_value(setting: VideoSetting) -> i32 {
    match setting {
        VideoSetting::Brightness
        | VideoSetting::Contrast
        | VideoSetting::Saturation
        | VideoSetting::Sharpness => 4,
        VideoSetting::Hue => 0,
        VideoSetting::Gamma => 8,
        VideoSetting::Gain | VideoSetting::Exposure => 50,
        VideoSetting::WhitebalanceTemperature => 4600,
        VideoSetting::AecAgc | VideoSetting::WhitebalanceAuto | VideoSetting::LedStatus => 1,
        VideoSetting::AecAgcRoi => 0,
    }
}

/// Timestamp of the latest sample of a sensor running at `rate_hz`
fn quantize(elapsed_us: u64, rate_hz: u32) -> u64 {
    let period = 1_000_000 / rate_hz.max(1) as u64;
    (elapsed_us / period) * period
}

struct Recorder {
    writer: BufWriter<File>,
    frames: u64,
}

impl Recorder {
    fn create(params: &RecordingParams) -> std::io::Result<Self> {
        let mut writer = BufWriter::new(File::create(&params.path)?);
        writer.write_all(RECORDING_MAGIC)?;
        writer.write_all(&[params.compression.tag()])?;
        Ok(Self { writer, frames: 0 })
    }

    fn write_frame(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.writer.write_all(&frame.timestamp_us.to_le_bytes())?;
        self.writer.write_all(&frame.width.to_le_bytes())?;
        self.writer.write_all(&frame.height.to_le_bytes())?;
        self.writer.write_all(&(frame.data.len() as u32).to_le_bytes())?;
        self.writer.write_all(&frame.data)?;
        self.frames += 1;
        Ok(())
    }
}

struct OpenCamera {
    config: InitConfig,
    opened_at: Instant,
    frames: u64,
    last_grab: Option<(u64, u64)>,
    settings: HashMap<VideoSetting, i32>,
    roi: Option<Rect>,
    recorder: Option<Recorder>,
}

impl OpenCamera {
    /// Microseconds since open; sensor timestamps start at 0
    fn elapsed_us(&self) -> u64 {
        self.opened_at.elapsed().as_micros() as u64
    }

    fn frame_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.config.effective_fps().max(1) as u64)
    }

    fn render(&self, view: View, timestamp_us: u64, sequence: u64) -> Frame {
        let (width, height) = self.config.resolution.dimensions();
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        let blue = match view {
            View::Left => 64,
            View::Right => 192,
        };
        for y in 0..height {
            for x in 0..width {
                data.push((x as u64 + sequence) as u8);
                data.push(y as u8);
                data.push(blue);
            }
        }
        Frame::new(data, width, height, timestamp_us, sequence, view)
    }

    fn imu_at(&self, timestamp_us: u64) -> ImuSample {
        let t = timestamp_us as f32 / 1_000_000.0;
        ImuSample {
            timestamp_us,
            angular_velocity: [
                0.5 * (t * 1.3).sin(),
                0.25 * (t * 0.7).cos(),
                0.1 * (t * 2.1).sin(),
            ],
            linear_acceleration: [
                0.05 * (t * 3.0).sin(),
                0.05 * (t * 2.0).cos(),
                GRAVITY + 0.02 * (t * 5.0).sin(),
            ],
        }
    }
}

/// Simulated camera implementing [`CameraDevice`]
pub struct SimulatedCamera {
    imu_rate_hz: u32,
    state: Mutex<Option<OpenCamera>>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCamera {
    /// Create a closed simulated camera
    pub fn new() -> Self {
        Self::with_imu_rate(DEFAULT_IMU_RATE_HZ)
    }

    /// Create a camera whose IMU runs at `imu_rate_hz`
    pub fn with_imu_rate(imu_rate_hz: u32) -> Self {
        Self {
            imu_rate_hz: imu_rate_hz.max(1),
            state: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<OpenCamera>> {
        // A panicked holder leaves plain data behind; keep serving it
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Check if the camera is open
    pub fn is_opened(&self) -> bool {
        self.lock().is_some()
    }

    /// Check if a recording is in progress
    pub fn is_recording(&self) -> bool {
        self.lock()
            .as_ref()
            .map_or(false, |cam| cam.recorder.is_some())
    }
}

impl CameraDevice for SimulatedCamera {
    fn open(&self, config: &InitConfig) -> Result<(), DeviceError> {
        let mut state = self.lock();
        if state.is_some() {
            return Err(DeviceError::Open("camera already opened".to_string()));
        }
        if let InputSource::Stream { port: 0, .. } = config.input {
            return Err(DeviceError::Open("invalid stream port 0".to_string()));
        }

        let settings = VideoSetting::ALL
            .iter()
            .map(|&s| (s, default_setting_value(s)))
            .collect();

        *state = Some(OpenCamera {
            config: config.clone(),
            opened_at: Instant::now(),
            frames: 0,
            last_grab: None,
            settings,
            roi: None,
            recorder: None,
        });

        info!(
            "Simulated camera opened: {} {} @ {} fps, depth {:?}",
            config.input,
            config.resolution,
            config.effective_fps(),
            config.depth_mode
        );
        Ok(())
    }

    fn close(&self) {
        let mut state = self.lock();
        if let Some(mut cam) = state.take() {
            if let Some(mut recorder) = cam.recorder.take() {
                if let Err(e) = recorder.writer.flush() {
                    warn!("Failed to flush recording on close: {}", e);
                }
            }
            info!("Simulated camera closed after {} frames", cam.frames);
        }
    }

    fn grab(&self) -> Result<(), DeviceError> {
        let due = {
            let state = self.lock();
            let cam = state.as_ref().ok_or(DeviceError::NotOpened)?;
            let period = cam.frame_period();
            cam.opened_at + period * (cam.frames as u32 + 1)
        };

        // Wait for the sensor outside the lock so sensor polls keep flowing
        let now = Instant::now();
        if due > now {
            std::thread::sleep(due - now);
        }

        let mut state = self.lock();
        let cam = state.as_mut().ok_or(DeviceError::NotOpened)?;
        cam.frames += 1;
        let timestamp_us = cam.elapsed_us();
        let sequence = cam.frames;
        cam.last_grab = Some((timestamp_us, sequence));

        if cam.recorder.is_some() {
            let frame = cam.render(View::Left, timestamp_us, sequence);
            if let Some(recorder) = cam.recorder.as_mut() {
                recorder
                    .write_frame(&frame)
                    .map_err(|e| DeviceError::Recording(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn retrieve_image(&self, view: View) -> Result<Frame, DeviceError> {
        let state = self.lock();
        let cam = state.as_ref().ok_or(DeviceError::NotOpened)?;
        let (timestamp_us, sequence) = cam.last_grab.ok_or(DeviceError::NoFrame)?;
        Ok(cam.render(view, timestamp_us, sequence))
    }

    fn sensors_data(&self, reference: TimeReference) -> Result<SensorBundle, DeviceError> {
        let state = self.lock();
        let cam = state.as_ref().ok_or(DeviceError::NotOpened)?;
        let now_us = match reference {
            TimeReference::Current => cam.elapsed_us(),
            TimeReference::Image => cam.last_grab.map(|(ts, _)| ts).ok_or(DeviceError::NoFrame)?,
        };

        let imu_ts = quantize(now_us, self.imu_rate_hz);
        let mag_ts = quantize(now_us, MAGNETOMETER_RATE_HZ);
        let baro_ts = quantize(now_us, BAROMETER_RATE_HZ);
        let t = mag_ts as f32 / 1_000_000.0;

        Ok(SensorBundle {
            imu: Some(cam.imu_at(imu_ts)),
            magnetometer: Some(MagnetometerSample {
                timestamp_us: mag_ts,
                magnetic_field: [22.0 + (t * 0.2).sin(), -4.0, 41.5 + (t * 0.1).cos()],
            }),
            barometer: Some(BarometerSample {
                timestamp_us: baro_ts,
                pressure_hpa: 1013.25 + 0.05 * (baro_ts as f32 / 1_000_000.0).sin(),
            }),
        })
    }

    fn camera_setting(&self, setting: VideoSetting) -> Result<i32, DeviceError> {
        let state = self.lock();
        let cam = state.as_ref().ok_or(DeviceError::NotOpened)?;
        if setting == VideoSetting::AecAgcRoi {
            return Ok(cam.roi.is_some() as i32);
        }
        Ok(cam
            .settings
            .get(&setting)
            .copied()
            .unwrap_or_else(|| default_setting_value(setting)))
    }

    fn set_camera_setting(&self, setting: VideoSetting, value: i32) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let cam = state.as_mut().ok_or(DeviceError::NotOpened)?;

        if value == VIDEO_SETTINGS_VALUE_AUTO {
            if !setting.accepts_auto() {
                return Err(DeviceError::InvalidSetting { setting, value });
            }
            cam.settings.insert(setting, default_setting_value(setting));
            match setting {
                VideoSetting::Gain | VideoSetting::Exposure => {
                    cam.settings.insert(VideoSetting::AecAgc, 1);
                }
                VideoSetting::WhitebalanceTemperature => {
                    cam.settings.insert(VideoSetting::WhitebalanceAuto, 1);
                }
                _ => {}
            }
            debug!("{} set to AUTO", setting);
            return Ok(());
        }

        let (min, max) = setting.range();
        if setting == VideoSetting::AecAgcRoi || value < min || value > max {
            return Err(DeviceError::InvalidSetting { setting, value });
        }

        cam.settings.insert(setting, value);
        match setting {
            VideoSetting::Gain | VideoSetting::Exposure => {
                cam.settings.insert(VideoSetting::AecAgc, 0);
            }
            VideoSetting::WhitebalanceTemperature => {
                cam.settings.insert(VideoSetting::WhitebalanceAuto, 0);
            }
            _ => {}
        }
        debug!("{} set to {}", setting, value);
        Ok(())
    }

    fn set_roi(&self, roi: Rect, side: Side, reset: bool) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let cam = state.as_mut().ok_or(DeviceError::NotOpened)?;
        if reset {
            cam.roi = None;
            debug!("AEC/AGC region reset to full image ({:?})", side);
            return Ok(());
        }

        let (width, height) = cam.config.resolution.dimensions();
        if roi.is_empty() || !roi.fits_within(width, height) {
            return Err(DeviceError::InvalidRegion(roi));
        }
        cam.roi = Some(roi);
        debug!("AEC/AGC region set to {} ({:?})", roi, side);
        Ok(())
    }

    fn enable_recording(&self, params: &RecordingParams) -> Result<(), DeviceError> {
        let mut state = self.lock();
        let cam = state.as_mut().ok_or(DeviceError::NotOpened)?;
        if cam.recorder.is_some() {
            return Err(DeviceError::Recording("already recording".to_string()));
        }
        let recorder =
            Recorder::create(params).map_err(|e| DeviceError::Recording(e.to_string()))?;
        cam.recorder = Some(recorder);
        info!(
            "Recording to {} ({:?})",
            params.path.display(),
            params.compression
        );
        Ok(())
    }

    fn disable_recording(&self) {
        let mut state = self.lock();
        let Some(cam) = state.as_mut() else {
            return;
        };
        if let Some(mut recorder) = cam.recorder.take() {
            if let Err(e) = recorder.writer.flush() {
                warn!("Failed to flush recording: {}", e);
            }
            info!("Recording stopped after {} frames", recorder.frames);
        }
    }

    fn camera_information(&self) -> CameraInformation {
        let state = self.lock();
        let config = state
            .as_ref()
            .map(|cam| cam.config.clone())
            .unwrap_or_default();
        let serial_number = match config.input {
            InputSource::Live { device_index } => 30_000_000 + device_index,
            InputSource::Stream { port, .. } => 31_000_000 + port as u32,
        };
        let (width, height) = config.resolution.dimensions();
        CameraInformation {
            model: "ZED 2i (simulated)".to_string(),
            serial_number,
            camera_firmware: 1523,
            sensors_firmware: 777,
            width,
            height,
            fps: config.effective_fps(),
        }
    }

    fn reboot(device_index: u32) -> Result<(), DeviceError> {
        info!("Simulated reboot of camera #{}", device_index);
        Ok(())
    }
}
