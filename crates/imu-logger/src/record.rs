//! Log record formatting and append-only log files

use camera_device::{SensorBundle, SensorKind};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::LoggerError;

/// Format the sample of `kind` from a bundle as one log line.
///
/// Inertial: `timestamp_us,angvel_x,angvel_y,angvel_z,linacc_x,linacc_y,linacc_z`
/// Magnetometer: `timestamp_us,mag_x,mag_y,mag_z`
/// Barometric: `timestamp_us,pressure_hpa`
pub fn format_record(kind: SensorKind, bundle: &SensorBundle) -> Option<String> {
    match kind {
        SensorKind::Inertial => bundle.imu.map(|s| {
            let [gx, gy, gz] = s.angular_velocity;
            let [ax, ay, az] = s.linear_acceleration;
            format!("{},{},{},{},{},{},{}\n", s.timestamp_us, gx, gy, gz, ax, ay, az)
        }),
        SensorKind::Magnetometer => bundle.magnetometer.map(|s| {
            let [mx, my, mz] = s.magnetic_field;
            format!("{},{},{},{}\n", s.timestamp_us, mx, my, mz)
        }),
        SensorKind::Barometric => bundle
            .barometer
            .map(|s| format!("{},{}\n", s.timestamp_us, s.pressure_hpa)),
    }
}

/// Append-only log file for one sensor kind.
///
/// Created with create-new semantics: an existing file is never
/// truncated or appended to from another session.
pub struct LogWriter {
    kind: SensorKind,
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
}

impl LogWriter {
    /// Create a fresh log file
    pub fn create(kind: SensorKind, path: &Path) -> Result<Self, LoggerError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| LoggerError::OpenLog {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self::from_file(kind, path, file))
    }

    pub(crate) fn from_file(kind: SensorKind, path: &Path, file: File) -> Self {
        Self {
            kind,
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        }
    }

    /// Append one formatted record
    pub fn append(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        self.written += 1;
        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended so far
    pub fn written(&self) -> u64 {
        self.written
    }
}
