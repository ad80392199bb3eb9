//! Background sensor logger

use camera_device::{CameraDevice, CancellationToken, SensorKind, TimeReference};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::filter::SensorFilters;
use crate::record::{format_record, LogWriter};
use crate::LoggerError;

/// Logger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Directory receiving the log files
    pub directory: PathBuf,
    /// File name prefix
    pub file_prefix: String,
    /// Also log magnetometer samples
    pub magnetometer: bool,
    /// Also log barometer samples
    pub barometer: bool,
    /// Pause between polls (microseconds, 0 = poll continuously)
    pub poll_interval_us: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_prefix: "imu_data".to_string(),
            magnetometer: false,
            barometer: false,
            poll_interval_us: 500,
        }
    }
}

impl LoggerConfig {
    /// Sensor kinds this configuration logs; inertial is always first
    pub fn kinds(&self) -> Vec<SensorKind> {
        let mut kinds = vec![SensorKind::Inertial];
        if self.magnetometer {
            kinds.push(SensorKind::Magnetometer);
        }
        if self.barometer {
            kinds.push(SensorKind::Barometric);
        }
        kinds
    }
}

/// Highest `_N` suffix tried when a session's log names are already taken
const MAX_NAME_SUFFIX: u32 = 99;

/// Log file paths of a session, derived from its start time
pub fn log_paths(config: &LoggerConfig, started: DateTime<Local>) -> Vec<(SensorKind, PathBuf)> {
    numbered_log_paths(config, started, 0)
}

/// Log file paths with a `_N` suffix after the timestamp (none for 0)
fn numbered_log_paths(
    config: &LoggerConfig,
    started: DateTime<Local>,
    suffix: u32,
) -> Vec<(SensorKind, PathBuf)> {
    let stamp = started.format("%Y%m%d_%H%M%S");
    let counter = if suffix == 0 {
        String::new()
    } else {
        format!("_{}", suffix)
    };
    config
        .kinds()
        .into_iter()
        .map(|kind| {
            let name = match kind {
                SensorKind::Inertial => format!("{}_{}{}.csv", config.file_prefix, stamp, counter),
                other => format!(
                    "{}_{}_{}{}.csv",
                    config.file_prefix,
                    other.short_name(),
                    stamp,
                    counter
                ),
            };
            (kind, config.directory.join(name))
        })
        .collect()
}

fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// Create one writer per path; on failure the files created so far are removed
fn create_writers(paths: Vec<(SensorKind, PathBuf)>) -> Result<Vec<LogWriter>, LoggerError> {
    let mut writers: Vec<LogWriter> = Vec::with_capacity(paths.len());
    for (kind, path) in paths {
        match LogWriter::create(kind, &path) {
            Ok(writer) => writers.push(writer),
            Err(e) => {
                let created: Vec<PathBuf> = writers.iter().map(|w| w.path().to_path_buf()).collect();
                drop(writers);
                remove_files(&created);
                return Err(e);
            }
        }
    }
    Ok(writers)
}

/// Open a fresh set of session logs, moving on to the next `_N` name while
/// files of the same name already exist
fn open_session_logs(
    config: &LoggerConfig,
    started: DateTime<Local>,
) -> Result<Vec<LogWriter>, LoggerError> {
    let mut suffix = 0;
    loop {
        match create_writers(numbered_log_paths(config, started, suffix)) {
            Err(LoggerError::OpenLog { ref path, ref source })
                if source.kind() == io::ErrorKind::AlreadyExists && suffix < MAX_NAME_SUFFIX =>
            {
                debug!("{} already exists, trying the next name", path.display());
                suffix += 1;
            }
            result => return result,
        }
    }
}

/// Lifecycle of a sensor logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoggerPhase {
    Unstarted = 0,
    OpeningLog = 1,
    Polling = 2,
    Draining = 3,
    Closed = 4,
}

impl LoggerPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LoggerPhase::OpeningLog,
            2 => LoggerPhase::Polling,
            3 => LoggerPhase::Draining,
            4 => LoggerPhase::Closed,
            _ => LoggerPhase::Unstarted,
        }
    }
}

#[derive(Debug, Clone)]
struct PhaseCell(Arc<AtomicU8>);

impl PhaseCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LoggerPhase::Unstarted as u8)))
    }

    fn set(&self, phase: LoggerPhase) {
        self.0.store(phase as u8, Ordering::SeqCst);
    }

    fn get(&self) -> LoggerPhase {
        LoggerPhase::from_u8(self.0.load(Ordering::SeqCst))
    }
}

/// Counters collected by a logger over its lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggerReport {
    /// Sensor polls issued
    pub polls: u64,
    /// Polls the device failed to answer
    pub poll_failures: u64,
    /// Inertial records handed to the log writer
    pub imu_records: u64,
    /// Magnetometer records handed to the log writer
    pub magnetometer_records: u64,
    /// Barometer records handed to the log writer
    pub barometer_records: u64,
    /// Samples dropped as duplicate or out of order
    pub duplicates_dropped: u64,
    /// Records rejected by the writer, plus one per log whose final flush
    /// failed (its buffered records may be lost)
    pub write_failures: u64,
}

impl LoggerReport {
    /// Records written for one sensor kind
    pub fn records(&self, kind: SensorKind) -> u64 {
        match kind {
            SensorKind::Inertial => self.imu_records,
            SensorKind::Magnetometer => self.magnetometer_records,
            SensorKind::Barometric => self.barometer_records,
        }
    }

    fn count(&mut self, kind: SensorKind) {
        match kind {
            SensorKind::Inertial => self.imu_records += 1,
            SensorKind::Magnetometer => self.magnetometer_records += 1,
            SensorKind::Barometric => self.barometer_records += 1,
        }
    }
}

/// Sensor logger entry point
pub struct SensorLogger;

impl SensorLogger {
    /// Open the session's log files and start polling on a background thread.
    ///
    /// Log files are opened before the thread starts: if any fails to open,
    /// nothing is polled and no thread is spawned. The thread runs until
    /// `token` is cancelled or the returned handle is stopped.
    pub fn start<D>(
        device: Arc<D>,
        config: &LoggerConfig,
        started: DateTime<Local>,
        token: CancellationToken,
    ) -> Result<LoggerHandle, LoggerError>
    where
        D: CameraDevice + 'static,
    {
        let phase = PhaseCell::new();
        phase.set(LoggerPhase::OpeningLog);

        let writers = match open_session_logs(config, started) {
            Ok(writers) => writers,
            Err(e) => {
                phase.set(LoggerPhase::Closed);
                return Err(e);
            }
        };
        for writer in &writers {
            info!("Logging {} samples to {}", writer.kind(), writer.path().display());
        }
        let paths: Vec<PathBuf> = writers.iter().map(|w| w.path().to_path_buf()).collect();

        let stop = CancellationToken::new();
        let poll_interval = Duration::from_micros(config.poll_interval_us);

        phase.set(LoggerPhase::Polling);
        let thread_phase = phase.clone();
        let thread_stop = stop.clone();
        let thread = std::thread::Builder::new()
            .name("imu-logger".to_string())
            .spawn(move || {
                poll_loop(
                    device.as_ref(),
                    writers,
                    poll_interval,
                    &token,
                    &thread_stop,
                    &thread_phase,
                )
            })
            .map_err(|e| {
                remove_files(&paths);
                phase.set(LoggerPhase::Closed);
                LoggerError::Spawn(e)
            })?;

        Ok(LoggerHandle {
            stop,
            phase,
            paths,
            thread: Some(thread),
        })
    }
}

fn poll_loop<D: CameraDevice>(
    device: &D,
    mut writers: Vec<LogWriter>,
    poll_interval: Duration,
    token: &CancellationToken,
    stop: &CancellationToken,
    phase: &PhaseCell,
) -> LoggerReport {
    let mut filters = SensorFilters::new();
    let mut report = LoggerReport::default();
    let mut failure_streak = 0u64;

    debug!("Sensor polling started");
    while !token.is_cancelled() && !stop.is_cancelled() {
        report.polls += 1;
        match device.sensors_data(TimeReference::Current) {
            Ok(bundle) => {
                if failure_streak > 0 {
                    info!("Sensor polling recovered after {} failures", failure_streak);
                    failure_streak = 0;
                }
                for writer in writers.iter_mut() {
                    let kind = writer.kind();
                    let Some(timestamp) = bundle.timestamp(kind) else {
                        continue;
                    };
                    if !filters.is_new(kind, timestamp) {
                        continue;
                    }
                    let Some(line) = format_record(kind, &bundle) else {
                        continue;
                    };
                    match writer.append(&line) {
                        Ok(()) => report.count(kind),
                        Err(e) => {
                            report.write_failures += 1;
                            warn!("Failed to write {} record {}: {}", kind, timestamp, e);
                        }
                    }
                }
            }
            Err(e) => {
                report.poll_failures += 1;
                failure_streak += 1;
                if failure_streak == 1 {
                    warn!("Sensor poll failed, skipping: {}", e);
                } else {
                    debug!("Sensor poll failed ({} in a row): {}", failure_streak, e);
                }
            }
        }

        if !poll_interval.is_zero() {
            std::thread::sleep(poll_interval);
        }
    }

    phase.set(LoggerPhase::Draining);
    drain(&mut writers, &mut report);
    report.duplicates_dropped = filters.rejected();
    phase.set(LoggerPhase::Closed);

    info!(
        "Sensor logger stopped: {} polls, {} imu records, {} duplicates dropped",
        report.polls, report.imu_records, report.duplicates_dropped
    );
    report
}

/// Flush every writer; a failed flush counts as one write failure
fn drain(writers: &mut [LogWriter], report: &mut LoggerReport) {
    for writer in writers.iter_mut() {
        if let Err(e) = writer.flush() {
            report.write_failures += 1;
            error!("Failed to flush {}: {}", writer.path().display(), e);
        }
    }
}

/// Handle to a running sensor logger.
///
/// Dropping the handle stops and joins the thread.
pub struct LoggerHandle {
    stop: CancellationToken,
    phase: PhaseCell,
    paths: Vec<PathBuf>,
    thread: Option<JoinHandle<LoggerReport>>,
}

impl LoggerHandle {
    /// Current lifecycle phase
    pub fn phase(&self) -> LoggerPhase {
        self.phase.get()
    }

    /// Paths of the log files being written
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Check if the polling thread has exited
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Stop polling and wait for the thread to drain its logs
    pub fn stop_and_join(mut self) -> Result<LoggerReport, LoggerError> {
        self.join()
    }

    fn join(&mut self) -> Result<LoggerReport, LoggerError> {
        self.stop.cancel();
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| LoggerError::Panicked),
            None => Ok(LoggerReport::default()),
        }
    }
}

impl Drop for LoggerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.join() {
                error!("Sensor logger ended abnormally: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_device::scripted::imu_bundle;
    use camera_device::{
        DeviceError, InitConfig, MagnetometerSample, ScriptedCamera, SensorBundle,
    };
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for logger");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn config(dir: &std::path::Path) -> LoggerConfig {
        LoggerConfig {
            directory: dir.to_path_buf(),
            poll_interval_us: 0,
            ..Default::default()
        }
    }

    fn opened(camera: ScriptedCamera) -> Arc<ScriptedCamera> {
        camera.open(&InitConfig::default()).unwrap();
        Arc::new(camera)
    }

    fn timestamps(path: &std::path::Path) -> Vec<u64> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| line.split(',').next().unwrap().parse().unwrap())
            .collect()
    }

    #[test]
    fn test_log_paths_from_start_time() {
        let started = Local::now();
        let config = LoggerConfig {
            directory: PathBuf::from("/data"),
            magnetometer: true,
            barometer: true,
            ..Default::default()
        };
        let stamp = started.format("%Y%m%d_%H%M%S").to_string();
        let paths = log_paths(&config, started);
        assert_eq!(
            paths,
            vec![
                (SensorKind::Inertial, PathBuf::from(format!("/data/imu_data_{}.csv", stamp))),
                (SensorKind::Magnetometer, PathBuf::from(format!("/data/imu_data_mag_{}.csv", stamp))),
                (SensorKind::Barometric, PathBuf::from(format!("/data/imu_data_baro_{}.csv", stamp))),
            ]
        );
    }

    #[test]
    fn test_duplicates_suppressed() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new().with_sensors(
            [100, 100, 150, 140, 200].map(|ts| Ok::<_, DeviceError>(imu_bundle(ts))),
        ));

        let token = CancellationToken::new();
        let handle =
            SensorLogger::start(camera.clone(), &config(dir.path()), Local::now(), token).unwrap();
        wait_for(|| camera.sensor_polls() >= 8);
        let path = handle.paths()[0].clone();
        let report = handle.stop_and_join().unwrap();

        assert_eq!(timestamps(&path), vec![100, 150, 200]);
        assert_eq!(report.imu_records, 3);
        // Script exhausted: every further poll repeats 200
        assert_eq!(report.duplicates_dropped, report.polls - 3);
        assert_eq!(report.poll_failures, 0);
    }

    #[test]
    fn test_record_content() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new().with_sensors([Ok(imu_bundle(7))]));
        let handle = SensorLogger::start(
            camera.clone(),
            &config(dir.path()),
            Local::now(),
            CancellationToken::new(),
        )
        .unwrap();
        wait_for(|| camera.sensor_polls() >= 2);
        let path = handle.paths()[0].clone();
        handle.stop_and_join().unwrap();

        assert_eq!(std::fs::read_to_string(path).unwrap(), "7,7,8,9,-7,-8,-9\n");
    }

    #[test]
    fn test_poll_failures_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new().with_sensors([
            Ok(imu_bundle(10)),
            Err(DeviceError::Sensors("bus busy".into())),
            Err(DeviceError::Sensors("bus busy".into())),
            Ok(imu_bundle(20)),
        ]));

        let handle = SensorLogger::start(
            camera.clone(),
            &config(dir.path()),
            Local::now(),
            CancellationToken::new(),
        )
        .unwrap();
        wait_for(|| camera.sensor_polls() >= 6);
        assert_eq!(handle.phase(), LoggerPhase::Polling);
        let path = handle.paths()[0].clone();
        let report = handle.stop_and_join().unwrap();

        assert_eq!(timestamps(&path), vec![10, 20]);
        assert_eq!(report.poll_failures, 2);
    }

    #[test]
    fn test_open_failure_polls_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new().with_sensors([Ok(imu_bundle(1))]));
        let config = LoggerConfig {
            directory: dir.path().join("missing"),
            ..Default::default()
        };

        let result = SensorLogger::start(camera.clone(), &config, Local::now(), CancellationToken::new());
        assert!(matches!(result, Err(LoggerError::OpenLog { .. })));

        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(camera.sensor_polls(), 0);
    }

    #[test]
    fn test_stops_on_session_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new());
        let token = CancellationToken::new();
        let handle =
            SensorLogger::start(camera.clone(), &config(dir.path()), Local::now(), token.clone())
                .unwrap();

        wait_for(|| camera.sensor_polls() >= 1);
        token.cancel();
        wait_for(|| handle.is_finished());
        assert_eq!(handle.phase(), LoggerPhase::Closed);

        let polls = camera.sensor_polls();
        let report = handle.stop_and_join().unwrap();
        assert_eq!(report.polls as usize, polls);
        // Empty bundles carry no samples to log
        assert_eq!(report.imu_records, 0);
    }

    #[test]
    fn test_per_kind_logs() {
        let dir = tempfile::tempdir().unwrap();
        let bundle = |imu_ts: u64, mag_ts: u64| SensorBundle {
            magnetometer: Some(MagnetometerSample {
                timestamp_us: mag_ts,
                magnetic_field: [1.0, 2.0, 3.0],
            }),
            ..imu_bundle(imu_ts)
        };
        let camera = opened(ScriptedCamera::new().with_sensors([
            Ok(bundle(100, 50)),
            Ok(bundle(200, 50)),
            Ok(bundle(200, 60)),
        ]));
        let config = LoggerConfig {
            magnetometer: true,
            ..config(dir.path())
        };

        let handle =
            SensorLogger::start(camera.clone(), &config, Local::now(), CancellationToken::new())
                .unwrap();
        wait_for(|| camera.sensor_polls() >= 4);
        let paths = handle.paths().to_vec();
        let report = handle.stop_and_join().unwrap();

        assert_eq!(timestamps(&paths[0]), vec![100, 200]);
        assert_eq!(timestamps(&paths[1]), vec![50, 60]);
        assert_eq!(report.records(SensorKind::Magnetometer), 2);
    }

    #[test]
    fn test_same_second_sessions_get_distinct_logs() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local::now();
        let stamp = started.format("%Y%m%d_%H%M%S").to_string();

        let mut logs = Vec::new();
        for _ in 0..2 {
            let camera = opened(ScriptedCamera::new().with_sensors([Ok(imu_bundle(5))]));
            let handle = SensorLogger::start(
                camera.clone(),
                &config(dir.path()),
                started,
                CancellationToken::new(),
            )
            .unwrap();
            wait_for(|| camera.sensor_polls() >= 2);
            let path = handle.paths()[0].clone();
            let report = handle.stop_and_join().unwrap();
            assert_eq!(report.imu_records, 1);
            logs.push(path);
        }

        assert_eq!(
            logs,
            vec![
                dir.path().join(format!("imu_data_{}.csv", stamp)),
                dir.path().join(format!("imu_data_{}_1.csv", stamp)),
            ]
        );
        assert_eq!(timestamps(&logs[0]), vec![5]);
        assert_eq!(timestamps(&logs[1]), vec![5]);
    }

    #[test]
    fn test_partial_log_set_removed() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new());
        let started = Local::now();
        let stamp = started.format("%Y%m%d_%H%M%S").to_string();
        let taken = dir.path().join(format!("imu_data_mag_{}.csv", stamp));
        std::fs::write(&taken, "previous session\n").unwrap();

        let config = LoggerConfig {
            magnetometer: true,
            ..config(dir.path())
        };
        let handle =
            SensorLogger::start(camera.clone(), &config, started, CancellationToken::new()).unwrap();
        let paths = handle.paths().to_vec();
        handle.stop_and_join().unwrap();

        assert_eq!(
            paths,
            vec![
                dir.path().join(format!("imu_data_{}_1.csv", stamp)),
                dir.path().join(format!("imu_data_mag_{}_1.csv", stamp)),
            ]
        );
        // The inertial file created before the clash was found is gone
        assert!(!dir.path().join(format!("imu_data_{}.csv", stamp)).exists());
        assert_eq!(std::fs::read_to_string(&taken).unwrap(), "previous session\n");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_flush_failure_counted() {
        let path = std::path::Path::new("/dev/full");
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        let mut writers = vec![LogWriter::from_file(SensorKind::Inertial, path, file)];
        writers[0].append("1,0,0,0,0,0,0\n").unwrap();

        let mut report = LoggerReport {
            imu_records: 1,
            ..Default::default()
        };
        drain(&mut writers, &mut report);

        assert_eq!(report.write_failures, 1);
        assert_eq!(report.imu_records, 1);
    }

    #[test]
    fn test_drop_joins_thread() {
        let dir = tempfile::tempdir().unwrap();
        let camera = opened(ScriptedCamera::new());
        let token = CancellationToken::new();
        let handle =
            SensorLogger::start(camera.clone(), &config(dir.path()), Local::now(), token.clone())
                .unwrap();
        wait_for(|| camera.sensor_polls() >= 1);
        drop(handle);

        let polls = camera.sensor_polls();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(camera.sensor_polls(), polls);
        // Stopping one logger leaves the session token alone
        assert!(!token.is_cancelled());
    }
}
