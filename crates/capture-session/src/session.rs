//! Session Controller
//!
//! Owns the device for one capture session: opens it, optionally enables
//! recording, starts the sensor logger, runs the capture loop, then tears
//! everything down in order (recording off, logger joined, device closed).

use camera_device::{
    CameraDevice, CameraInformation, CancellationToken, DeviceError, Frame, InitConfig,
    RecordingParams,
};
use chrono::Local;
use imu_logger::{LoggerHandle, LoggerReport, SensorLogger};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::capture::{CaptureLoop, CaptureStats, StopReason};
use crate::controls::ControlCommand;
use crate::settings::{LogFailurePolicy, SessionConfig};
use crate::SessionError;

/// Outcome of a finished session
#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Why capture ended
    pub stop_reason: StopReason,
    /// Capture loop counters
    pub capture: CaptureStats,
    /// Logger counters, when logging ran
    pub logger: Option<LoggerReport>,
    /// Sensor log files written
    pub log_paths: Vec<PathBuf>,
    /// Camera the session ran on
    pub camera: CameraInformation,
}

/// Open device plus its recording state.
///
/// Dropping the guard disables recording and closes the device.
struct DeviceGuard<D: CameraDevice> {
    device: Arc<D>,
    recording: bool,
    open: bool,
}

impl<D: CameraDevice> DeviceGuard<D> {
    fn open(device: Arc<D>, config: &InitConfig) -> Result<Self, DeviceError> {
        device.open(config)?;
        Ok(Self {
            device,
            recording: false,
            open: true,
        })
    }

    fn enable_recording(&mut self, params: &RecordingParams) -> Result<(), DeviceError> {
        self.device.enable_recording(params)?;
        self.recording = true;
        Ok(())
    }

    fn disable_recording(&mut self) {
        if self.recording {
            self.device.disable_recording();
            self.recording = false;
            info!("Recording disabled");
        }
    }

    fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.disable_recording();
        if self.open {
            self.device.close();
            self.open = false;
            info!("Camera closed");
        }
    }
}

impl<D: CameraDevice> Drop for DeviceGuard<D> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn log_camera_information(camera: &CameraInformation) {
    info!("Camera model              : {}", camera.model);
    info!("Camera serial number      : {}", camera.serial_number);
    info!(
        "Camera firmware           : {}/{}",
        camera.camera_firmware, camera.sensors_firmware
    );
    info!("Camera resolution         : {}x{}", camera.width, camera.height);
    info!("Camera FPS                : {}", camera.fps);
}

/// Runs one capture session over a device
pub struct SessionController<D: CameraDevice + 'static> {
    device: Arc<D>,
    config: SessionConfig,
    token: CancellationToken,
    commands: Option<Receiver<ControlCommand>>,
}

impl<D: CameraDevice + 'static> SessionController<D> {
    /// Create a controller; `token` is the session-wide cancellation flag
    pub fn new(device: D, config: SessionConfig, token: CancellationToken) -> Self {
        Self {
            device: Arc::new(device),
            config,
            token,
            commands: None,
        }
    }

    /// Feed camera control commands into the capture loop
    pub fn with_commands(mut self, commands: Receiver<ControlCommand>) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Shared device handle
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Run the session without inspecting frames
    pub fn run(self) -> Result<SessionReport, SessionError> {
        self.run_with(|_| {})
    }

    /// Run the session, handing every grabbed frame to `on_frame`
    pub fn run_with(self, on_frame: impl FnMut(&Frame)) -> Result<SessionReport, SessionError> {
        let Self {
            device,
            config,
            token,
            commands,
        } = self;

        if config.reboot_before_open {
            let index = config.device_index();
            info!("Rebooting camera #{}", index);
            match D::reboot(index) {
                Ok(()) => std::thread::sleep(Duration::from_millis(config.reboot_settle_ms)),
                Err(e) => warn!("Camera reboot failed, opening anyway: {}", e),
            }
        }

        let started = Local::now();
        let mut guard =
            DeviceGuard::open(device.clone(), &config.camera).map_err(SessionError::DeviceOpen)?;
        let camera = device.camera_information();
        log_camera_information(&camera);

        if let Some(params) = &config.recording {
            guard
                .enable_recording(params)
                .map_err(SessionError::RecordingEnable)?;
        }

        let logger: Option<LoggerHandle> =
            match SensorLogger::start(device.clone(), &config.logger, started, token.clone()) {
                Ok(handle) => Some(handle),
                Err(e) => match config.log_failure_policy {
                    LogFailurePolicy::ContinueWithoutLogging => {
                        warn!("Sensor logging disabled for this session: {}", e);
                        None
                    }
                    LogFailurePolicy::AbortSession => {
                        error!("Sensor logging failed to start: {}", e);
                        return Err(SessionError::LogOpen(e));
                    }
                },
            };
        let log_paths = logger
            .as_ref()
            .map(|handle| handle.paths().to_vec())
            .unwrap_or_default();

        let mut capture = CaptureLoop::new(device.as_ref(), config.grab_policy(), token);
        if let Some(commands) = commands {
            capture = capture.with_commands(commands);
        }
        let stop_reason = capture.run(on_frame);
        let stats = capture.stats();

        guard.disable_recording();
        let logger = logger.and_then(|handle| match handle.stop_and_join() {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Sensor logger failed: {}", e);
                None
            }
        });
        guard.close();

        Ok(SessionReport {
            stop_reason,
            capture: stats,
            logger,
            log_paths,
            camera,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{GrabFailurePolicy, SessionMode};
    use camera_device::scripted::imu_bundle;
    use camera_device::{CompressionMode, DeviceEvent, ScriptedCamera};
    use imu_logger::LoggerConfig;
    use std::sync::mpsc;

    fn config(dir: &std::path::Path) -> SessionConfig {
        SessionConfig {
            logger: LoggerConfig {
                directory: dir.to_path_buf(),
                poll_interval_us: 100,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn recording(dir: &std::path::Path) -> Option<RecordingParams> {
        Some(RecordingParams {
            path: dir.join("session.simrec"),
            compression: CompressionMode::H264,
        })
    }

    fn position(journal: &[DeviceEvent], event: &DeviceEvent) -> Option<usize> {
        journal.iter().position(|e| e == event)
    }

    /// Recording-disable and every sensor poll precede the close, which is last
    fn assert_ordered_teardown(journal: &[DeviceEvent]) {
        let close = position(journal, &DeviceEvent::Close).expect("device closed");
        assert_eq!(close, journal.len() - 1);
        if let Some(disable) = position(journal, &DeviceEvent::DisableRecording) {
            assert!(disable < close);
        }
        if let Some(last_poll) = journal.iter().rposition(|e| *e == DeviceEvent::SensorsPoll) {
            assert!(last_poll < close);
        }
    }

    #[test]
    fn test_normal_session() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let camera = ScriptedCamera::new()
            .with_sensors([100, 150, 200].map(|ts| Ok::<_, DeviceError>(imu_bundle(ts))))
            .with_grab_interval(Duration::from_millis(2))
            .cancel_after_grabs(20, token.clone());
        let session = SessionController::new(
            camera,
            SessionConfig {
                recording: recording(dir.path()),
                ..config(dir.path())
            },
            token,
        );
        let device = session.device().clone();

        let report = session.run().unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.capture.grabbed, 20);
        assert_eq!(report.log_paths.len(), 1);
        let logger = report.logger.unwrap();
        assert!(logger.polls > 0);
        assert!(logger.imu_records <= 3);

        let journal = device.journal();
        assert_eq!(journal[0], DeviceEvent::Open);
        assert_eq!(
            journal[1],
            DeviceEvent::EnableRecording(dir.path().join("session.simrec"))
        );
        assert!(position(&journal, &DeviceEvent::DisableRecording).is_some());
        assert_ordered_teardown(&journal);
        assert!(!device.is_opened());
    }

    #[test]
    fn test_teardown_order_for_any_cancel_point() {
        for cancel_at in [1, 2, 5, 13, 40] {
            let dir = tempfile::tempdir().unwrap();
            let token = CancellationToken::new();
            let camera = ScriptedCamera::new().cancel_after_grabs(cancel_at, token.clone());
            let session = SessionController::new(
                camera,
                SessionConfig {
                    recording: recording(dir.path()),
                    ..config(dir.path())
                },
                token,
            );
            let device = session.device().clone();

            let report = session.run().unwrap();

            assert_eq!(report.capture.grabbed, cancel_at as u64);
            assert_ordered_teardown(&device.journal());
        }
    }

    #[test]
    fn test_interactive_grab_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let camera = ScriptedCamera::new().with_grabs([
            Ok(()),
            Err(DeviceError::Grab("cable unplugged".into())),
        ]);
        let session =
            SessionController::new(camera, config(dir.path()), CancellationToken::new());
        let device = session.device().clone();

        let report = session.run().unwrap();

        assert!(matches!(report.stop_reason, StopReason::GrabFailed(_)));
        assert_eq!(report.capture.grabbed, 1);
        assert_eq!(device.grabs(), 2);
        assert!(report.logger.is_some());
        assert_ordered_teardown(&device.journal());
    }

    #[test]
    fn test_unattended_keeps_grabbing() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let failure = || -> Result<(), DeviceError> {
            Err(DeviceError::Grab("frame dropped".into()))
        };
        let camera = ScriptedCamera::new()
            .with_grabs([failure(), failure(), failure(), failure()])
            .cancel_after_grabs(10, token.clone());
        let session = SessionController::new(
            camera,
            SessionConfig {
                mode: SessionMode::Unattended,
                ..config(dir.path())
            },
            token,
        );

        let report = session.run().unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.capture.grab_failures, 4);
        assert_eq!(report.capture.grabbed, 6);
    }

    #[test]
    fn test_device_open_failure_starts_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let camera = ScriptedCamera::new().fail_open(DeviceError::Open("no camera".into()));
        let session =
            SessionController::new(camera, config(dir.path()), CancellationToken::new());
        let device = session.device().clone();

        let result = session.run();

        assert!(matches!(result, Err(SessionError::DeviceOpen(_))));
        assert_eq!(device.journal(), vec![DeviceEvent::Open]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_recording_failure_closes_device() {
        let dir = tempfile::tempdir().unwrap();
        let camera = ScriptedCamera::new()
            .fail_recording(DeviceError::Recording("disk full".into()));
        let session = SessionController::new(
            camera,
            SessionConfig {
                recording: recording(dir.path()),
                ..config(dir.path())
            },
            CancellationToken::new(),
        );
        let device = session.device().clone();

        let result = session.run();

        assert!(matches!(result, Err(SessionError::RecordingEnable(_))));
        let journal = device.journal();
        assert_eq!(journal.last(), Some(&DeviceEvent::Close));
        assert!(position(&journal, &DeviceEvent::Grab).is_none());
        assert_eq!(device.sensor_polls(), 0);
    }

    #[test]
    fn test_log_failure_continues_capture() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let camera = ScriptedCamera::new()
            .with_sensors([Ok(imu_bundle(1))])
            .cancel_after_grabs(5, token.clone());
        let mut config = config(dir.path());
        config.logger.directory = dir.path().join("missing");
        let session = SessionController::new(camera, config, token);
        let device = session.device().clone();

        let report = session.run().unwrap();

        assert!(report.logger.is_none());
        assert!(report.log_paths.is_empty());
        assert_eq!(report.capture.grabbed, 5);
        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(device.sensor_polls(), 0);
    }

    #[test]
    fn test_log_failure_can_abort_session() {
        let dir = tempfile::tempdir().unwrap();
        let camera = ScriptedCamera::new();
        let mut config = SessionConfig {
            recording: recording(dir.path()),
            log_failure_policy: LogFailurePolicy::AbortSession,
            ..config(dir.path())
        };
        config.logger.directory = dir.path().join("missing");
        let session = SessionController::new(camera, config, CancellationToken::new());
        let device = session.device().clone();

        let result = session.run();

        assert!(matches!(result, Err(SessionError::LogOpen(_))));
        let journal = device.journal();
        assert!(position(&journal, &DeviceEvent::Grab).is_none());
        assert_eq!(device.sensor_polls(), 0);
        assert_ordered_teardown(&journal);
        assert!(position(&journal, &DeviceEvent::DisableRecording).is_some());
    }

    #[test]
    fn test_quit_command_ends_session() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = mpsc::channel();
        tx.send(ControlCommand::NextSetting).unwrap();
        tx.send(ControlCommand::Quit).unwrap();
        let token = CancellationToken::new();
        let session = SessionController::new(
            ScriptedCamera::new(),
            SessionConfig {
                grab_failure_policy: Some(GrabFailurePolicy::Abort),
                ..config(dir.path())
            },
            token.clone(),
        )
        .with_commands(rx);

        let report = session.run().unwrap();

        assert_eq!(report.stop_reason, StopReason::Cancelled);
        assert_eq!(report.capture.commands_applied, 2);
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_back_to_back_sessions_keep_their_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut reports = Vec::new();
        for _ in 0..2 {
            let token = CancellationToken::new();
            let camera = ScriptedCamera::new()
                .with_sensors([Ok(imu_bundle(42))])
                .cancel_after_grabs(1, token.clone());
            reports.push(SessionController::new(camera, config(dir.path()), token).run().unwrap());
        }

        assert!(reports.iter().all(|r| r.logger.is_some()));
        assert_eq!(reports[0].log_paths.len(), 1);
        assert_eq!(reports[1].log_paths.len(), 1);
        assert_ne!(reports[0].log_paths, reports[1].log_paths);
        assert!(reports[0].log_paths[0].exists());
        assert!(reports[1].log_paths[0].exists());
    }

    #[test]
    fn test_frames_reach_sink() {
        let dir = tempfile::tempdir().unwrap();
        let token = CancellationToken::new();
        let camera = ScriptedCamera::new().cancel_after_grabs(3, token.clone());
        let session = SessionController::new(camera, config(dir.path()), token);

        let mut seen = Vec::new();
        session.run_with(|frame| seen.push(frame.sequence)).unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
    }
}
