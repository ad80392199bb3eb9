//! Timestamp Deduplication Filter

use camera_device::SensorKind;

/// Accepts a sample only when its timestamp is newer than every sample
/// accepted before it.
#[derive(Debug, Clone, Default)]
pub struct TimestampFilter {
    /// Last accepted timestamp; `None` sits below every timestamp
    reference: Option<u64>,
    accepted: u64,
    rejected: u64,
}

impl TimestampFilter {
    /// Create a filter that accepts any first timestamp
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a candidate timestamp, advancing the reference when accepted
    pub fn is_new(&mut self, candidate: u64) -> bool {
        match self.reference {
            Some(reference) if candidate <= reference => {
                self.rejected += 1;
                false
            }
            _ => {
                self.reference = Some(candidate);
                self.accepted += 1;
                true
            }
        }
    }

    /// Last accepted timestamp
    pub fn last_accepted(&self) -> Option<u64> {
        self.reference
    }

    /// Number of accepted samples
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Number of duplicate or out-of-order samples dropped
    pub fn rejected(&self) -> u64 {
        self.rejected
    }
}

/// One independent filter per sensor kind.
///
/// Owned by a single polling task; kinds never share a reference.
#[derive(Debug, Clone, Default)]
pub struct SensorFilters {
    inertial: TimestampFilter,
    magnetometer: TimestampFilter,
    barometric: TimestampFilter,
}

impl SensorFilters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check a candidate timestamp against the filter of `kind`
    pub fn is_new(&mut self, kind: SensorKind, candidate: u64) -> bool {
        self.get_mut(kind).is_new(candidate)
    }

    /// Filter of one sensor kind
    pub fn get(&self, kind: SensorKind) -> &TimestampFilter {
        match kind {
            SensorKind::Inertial => &self.inertial,
            SensorKind::Magnetometer => &self.magnetometer,
            SensorKind::Barometric => &self.barometric,
        }
    }

    fn get_mut(&mut self, kind: SensorKind) -> &mut TimestampFilter {
        match kind {
            SensorKind::Inertial => &mut self.inertial,
            SensorKind::Magnetometer => &mut self.magnetometer,
            SensorKind::Barometric => &mut self.barometric,
        }
    }

    /// Total samples dropped across all kinds
    pub fn rejected(&self) -> u64 {
        SensorKind::ALL.iter().map(|&k| self.get(k).rejected()).sum()
    }
}
