//! Sensor samples reported by the camera

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor families available on the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Inertial,
    Magnetometer,
    Barometric,
}

impl SensorKind {
    /// All kinds, in bundle order
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Inertial,
        SensorKind::Magnetometer,
        SensorKind::Barometric,
    ];

    /// Short name used in file names and logs
    pub fn short_name(&self) -> &'static str {
        match self {
            SensorKind::Inertial => "imu",
            SensorKind::Magnetometer => "mag",
            SensorKind::Barometric => "baro",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Time frame of a sensors request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeReference {
    /// Most recent data available
    Current,
    /// Data synchronized with the last grabbed image
    Image,
}

/// IMU sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuSample {
    /// Timestamp (microseconds)
    pub timestamp_us: u64,
    /// Angular velocity X, Y, Z (deg/s)
    pub angular_velocity: [f32; 3],
    /// Linear acceleration X, Y, Z (m/s²)
    pub linear_acceleration: [f32; 3],
}

/// Magnetometer sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MagnetometerSample {
    /// Timestamp (microseconds)
    pub timestamp_us: u64,
    /// Magnetic field X, Y, Z (µT)
    pub magnetic_field: [f32; 3],
}

/// Barometer sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarometerSample {
    /// Timestamp (microseconds)
    pub timestamp_us: u64,
    /// Pressure (hPa)
    pub pressure_hpa: f32,
}

/// Everything the sensors reported at one poll.
///
/// A sensor the camera model lacks stays `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SensorBundle {
    pub imu: Option<ImuSample>,
    pub magnetometer: Option<MagnetometerSample>,
    pub barometer: Option<BarometerSample>,
}

impl SensorBundle {
    /// Bundle with only an IMU sample
    pub fn with_imu(imu: ImuSample) -> Self {
        Self {
            imu: Some(imu),
            ..Default::default()
        }
    }

    /// Timestamp of the sample of the given kind, if present
    pub fn timestamp(&self, kind: SensorKind) -> Option<u64> {
        match kind {
            SensorKind::Inertial => self.imu.map(|s| s.timestamp_us),
            SensorKind::Magnetometer => self.magnetometer.map(|s| s.timestamp_us),
            SensorKind::Barometric => self.barometer.map(|s| s.timestamp_us),
        }
    }
}
