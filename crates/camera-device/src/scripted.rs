//! Scripted camera for tests
//!
//! Replays queued grab and sensor results, injects failures, and keeps a
//! journal of every call so tests can assert on call ordering.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::{
    CameraDevice, CameraInformation, CancellationToken, DeviceError, Frame, ImuSample,
    InitConfig, RecordingParams, Rect, SensorBundle, Side, TimeReference, VideoSetting, View,
};

/// One call observed by a [`ScriptedCamera`]
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Open,
    Close,
    Grab,
    RetrieveImage(View),
    SensorsPoll,
    GetSetting(VideoSetting),
    SetSetting(VideoSetting, i32),
    SetRoi { roi: Rect, side: Side, reset: bool },
    EnableRecording(PathBuf),
    DisableRecording,
}

/// IMU-only bundle whose vector components are derived from the timestamp
pub fn imu_bundle(timestamp_us: u64) -> SensorBundle {
    let base = timestamp_us as f32;
    SensorBundle::with_imu(ImuSample {
        timestamp_us,
        angular_velocity: [base, base + 1.0, base + 2.0],
        linear_acceleration: [-base, -base - 1.0, -base - 2.0],
    })
}

struct Script {
    open_result: Result<(), DeviceError>,
    recording_result: Result<(), DeviceError>,
    grabs: VecDeque<Result<(), DeviceError>>,
    sensors: VecDeque<Result<SensorBundle, DeviceError>>,
    last_bundle: SensorBundle,
    settings: HashMap<VideoSetting, i32>,
    journal: Vec<DeviceEvent>,
    opened: bool,
    recording: bool,
    frames: u64,
    grab_count: usize,
    poll_count: usize,
    cancel_after: Option<(usize, CancellationToken)>,
}

/// Deterministic fake implementing [`CameraDevice`]
pub struct ScriptedCamera {
    script: Mutex<Script>,
    grab_interval: Duration,
}

impl Default for ScriptedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCamera {
    /// Camera that opens, grabs and polls successfully
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                open_result: Ok(()),
                recording_result: Ok(()),
                grabs: VecDeque::new(),
                sensors: VecDeque::new(),
                last_bundle: SensorBundle::default(),
                settings: HashMap::new(),
                journal: Vec::new(),
                opened: false,
                recording: false,
                frames: 0,
                grab_count: 0,
                poll_count: 0,
                cancel_after: None,
            }),
            grab_interval: Duration::ZERO,
        }
    }

    /// Make `open` fail with the given error
    pub fn fail_open(self, error: DeviceError) -> Self {
        self.lock().open_result = Err(error);
        self
    }

    /// Make `enable_recording` fail with the given error
    pub fn fail_recording(self, error: DeviceError) -> Self {
        self.lock().recording_result = Err(error);
        self
    }

    /// Queue grab results; once exhausted every grab succeeds
    pub fn with_grabs(self, grabs: impl IntoIterator<Item = Result<(), DeviceError>>) -> Self {
        self.lock().grabs.extend(grabs);
        self
    }

    /// Queue sensor poll results; once exhausted the last bundle repeats
    pub fn with_sensors(
        self,
        sensors: impl IntoIterator<Item = Result<SensorBundle, DeviceError>>,
    ) -> Self {
        self.lock().sensors.extend(sensors);
        self
    }

    /// Preset a video setting value
    pub fn with_setting(self, setting: VideoSetting, value: i32) -> Self {
        self.lock().settings.insert(setting, value);
        self
    }

    /// Cancel `token` when the `grabs`-th grab is attempted
    pub fn cancel_after_grabs(self, grabs: usize, token: CancellationToken) -> Self {
        self.lock().cancel_after = Some((grabs, token));
        self
    }

    /// Sleep this long inside every grab
    pub fn with_grab_interval(mut self, interval: Duration) -> Self {
        self.grab_interval = interval;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every call observed so far, in order
    pub fn journal(&self) -> Vec<DeviceEvent> {
        self.lock().journal.clone()
    }

    /// Number of sensor polls observed
    pub fn sensor_polls(&self) -> usize {
        self.lock().poll_count
    }

    /// Number of grabs observed
    pub fn grabs(&self) -> usize {
        self.lock().grab_count
    }

    /// Current stored value of a setting
    pub fn setting(&self, setting: VideoSetting) -> Option<i32> {
        self.lock().settings.get(&setting).copied()
    }

    pub fn is_opened(&self) -> bool {
        self.lock().opened
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }
}

impl CameraDevice for ScriptedCamera {
    fn open(&self, _config: &InitConfig) -> Result<(), DeviceError> {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::Open);
        script.open_result.clone()?;
        script.opened = true;
        Ok(())
    }

    fn close(&self) {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::Close);
        script.opened = false;
        script.recording = false;
    }

    fn grab(&self) -> Result<(), DeviceError> {
        if !self.grab_interval.is_zero() {
            std::thread::sleep(self.grab_interval);
        }

        let mut script = self.lock();
        script.journal.push(DeviceEvent::Grab);
        script.grab_count += 1;
        if let Some((limit, token)) = &script.cancel_after {
            if script.grab_count >= *limit {
                token.cancel();
            }
        }
        if !script.opened {
            return Err(DeviceError::NotOpened);
        }

        let result = script.grabs.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            script.frames += 1;
        }
        result
    }

    fn retrieve_image(&self, view: View) -> Result<Frame, DeviceError> {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::RetrieveImage(view));
        if script.frames == 0 {
            return Err(DeviceError::NoFrame);
        }
        let sequence = script.frames;
        Ok(Frame::new(vec![0; 2 * 2 * 3], 2, 2, sequence * 1000, sequence, view))
    }

    fn sensors_data(&self, _reference: TimeReference) -> Result<SensorBundle, DeviceError> {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::SensorsPoll);
        script.poll_count += 1;
        if !script.opened {
            return Err(DeviceError::NotOpened);
        }

        match script.sensors.pop_front() {
            Some(Ok(bundle)) => {
                script.last_bundle = bundle;
                Ok(bundle)
            }
            Some(Err(e)) => Err(e),
            None => Ok(script.last_bundle),
        }
    }

    fn camera_setting(&self, setting: VideoSetting) -> Result<i32, DeviceError> {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::GetSetting(setting));
        Ok(script.settings.get(&setting).copied().unwrap_or(0))
    }

    fn set_camera_setting(&self, setting: VideoSetting, value: i32) -> Result<(), DeviceError> {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::SetSetting(setting, value));
        script.settings.insert(setting, value);
        Ok(())
    }

    fn set_roi(&self, roi: Rect, side: Side, reset: bool) -> Result<(), DeviceError> {
        self.lock()
            .journal
            .push(DeviceEvent::SetRoi { roi, side, reset });
        Ok(())
    }

    fn enable_recording(&self, params: &RecordingParams) -> Result<(), DeviceError> {
        let mut script = self.lock();
        script
            .journal
            .push(DeviceEvent::EnableRecording(params.path.clone()));
        script.recording_result.clone()?;
        script.recording = true;
        Ok(())
    }

    fn disable_recording(&self) {
        let mut script = self.lock();
        script.journal.push(DeviceEvent::DisableRecording);
        script.recording = false;
    }

    fn camera_information(&self) -> CameraInformation {
        CameraInformation {
            model: "scripted".to_string(),
            serial_number: 1,
            camera_firmware: 1,
            sensors_firmware: 1,
            width: 2,
            height: 2,
            fps: 30,
        }
    }

    fn reboot(_device_index: u32) -> Result<(), DeviceError> {
        Ok(())
    }
}
