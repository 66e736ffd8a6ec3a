use std::fmt;

/// Number of angle buckets per revolution: the C1 resolves angles to 1/3 of a degree.
pub const ANGLE_BUCKETS: u16 = 1080;

/// A decoded standard-scan measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Heading in degrees, in `[0, 360)`.
    pub angle_degrees: f32,
    /// Distance in whole millimetres. 0 means the laser got no return.
    pub distance_mm: u16,
    /// Signal quality, 0 to 63.
    pub quality: u8,
    /// Set on the first measurement of a new revolution.
    pub start_of_revolution: bool,
}

impl Measurement {
    /// `true` if the device reported a distance for this heading.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.distance_mm != 0
    }

    /// The angle bucket this measurement lands in.
    #[inline]
    pub fn angle_key(&self) -> AngleKey {
        AngleKey::from_degrees(self.angle_degrees)
    }

    /// Distance as `Some(mm)`, or `None` when there was no return.
    #[inline]
    pub fn distance(&self) -> Option<u16> {
        if self.is_valid() {
            Some(self.distance_mm)
        } else {
            None
        }
    }
}

/// An angle rounded to the nearest 1/3 degree, used to key the angle map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AngleKey(u16);

impl AngleKey {
    /// Bucket for `degrees`. Angles that round up to 360 wrap to bucket 0.
    pub fn from_degrees(degrees: f32) -> AngleKey {
        let thirds = (degrees.rem_euclid(360.0) * 3.0).round() as u32;
        AngleKey((thirds % ANGLE_BUCKETS as u32) as u16)
    }

    /// Bucket index, `0..ANGLE_BUCKETS`.
    pub fn index(self) -> u16 {
        self.0
    }

    /// Centre of the bucket in degrees.
    pub fn degrees(self) -> f32 {
        self.0 as f32 / 3.0
    }
}

impl fmt::Display for AngleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}°", self.degrees())
    }
}

/// Represents the health status reported by the RPLIDAR device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// The device reports it is operating correctly.
    Good,
    /// The device reports a warning condition, but may still be operational. Contains the warning code.
    Warning(u16),
    /// The device reports a fatal error (protection stop). Contains the error code.
    Error(u16),
}

impl HealthStatus {
    /// The numeric code sent with the status. 0 when good.
    pub fn code(&self) -> u16 {
        match self {
            HealthStatus::Good => 0,
            HealthStatus::Warning(code) | HealthStatus::Error(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HealthStatus::Good => "good",
            HealthStatus::Warning(_) => "warning",
            HealthStatus::Error(_) => "error",
        }
    }

    pub fn is_good(&self) -> bool {
        matches!(self, HealthStatus::Good)
    }
}

/// Identity of the connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub model: u8,
    pub firmware_major: u8,
    pub firmware_minor: u8,
    pub hardware: u8,
    pub serial_number: [u8; 16],
}

impl DeviceInfo {
    /// Serial number as the upper-case hex string printed on the device label.
    pub fn serial_number_hex(&self) -> String {
        self.serial_number
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect()
    }
}

/// Time one measurement takes in each scan mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRate {
    /// Microseconds per sample in standard scan mode.
    pub standard_us: u16,
    /// Microseconds per sample in express scan mode.
    pub express_us: u16,
}

/// Lifecycle of the acquisition engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Stopping,
    Faulted,
}

/// Counters reported when a scan session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Measurement packets decoded and published.
    pub packets: u64,
    /// Misalignments recovered by shifting.
    pub resyncs: u64,
    /// Bytes skipped while searching for an alignment window.
    pub discarded_bytes: u64,
    /// Resync cycles that exhausted their shift bound.
    pub alignment_failures: u64,
    /// Measurements evicted from a full queue.
    pub dropped: u64,
}
