//! Connection and scan settings.

use crate::internals::*;
use std::time::Duration;

/// Serial connection settings. These only configure the transport, not the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    pub baud_rate: u32,
    /// Per-read timeout. A running scan notices a stop request within this interval.
    pub timeout: Duration,
}

impl SerialConfig {
    pub fn new(port: impl Into<String>) -> SerialConfig {
        SerialConfig {
            port: port.into(),
            ..SerialConfig::default()
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> SerialConfig {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> SerialConfig {
        self.timeout = timeout;
        self
    }
}

impl Default for SerialConfig {
    fn default() -> SerialConfig {
        SerialConfig {
            port: RPLIDAR_DEFAULT_PORT.to_owned(),
            baud_rate: RPLIDAR_DEFAULT_BAUD_RATE,
            timeout: RPLIDAR_DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Which sinks a scan publishes measurements to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutput {
    /// Publish every measurement, in order, to a FIFO queue.
    pub enable_queue: bool,
    /// Keep the latest distance per angle bucket.
    pub enable_mapping: bool,
}

impl ScanOutput {
    pub fn queue() -> ScanOutput {
        ScanOutput {
            enable_queue: true,
            enable_mapping: false,
        }
    }

    pub fn mapping() -> ScanOutput {
        ScanOutput {
            enable_queue: false,
            enable_mapping: true,
        }
    }

    pub fn both() -> ScanOutput {
        ScanOutput {
            enable_queue: true,
            enable_mapping: true,
        }
    }
}

impl Default for ScanOutput {
    fn default() -> ScanOutput {
        ScanOutput::queue()
    }
}

/// Options for a scan session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub output: ScanOutput,

    /// Start with the force-scan command, which does not wait for a stable motor speed.
    pub force: bool,

    /// Capacity of the measurement queue. When full, the oldest measurement is dropped.
    pub queue_capacity: usize,

    /// Capacity of the channel read buffer while scanning.
    pub read_buffer_size: usize,

    /// Single-byte shifts allowed per resynchronization cycle.
    pub max_resync_shifts: usize,

    /// Consecutive failed resynchronization cycles before the scan is faulted.
    pub max_alignment_failures: u32,

    /// Silence after which the scan is faulted with a timeout.
    pub stall_timeout: Duration,

    /// Timeout for the start handshake.
    pub response_timeout: Duration,
}

impl ScanConfig {
    pub fn with_output(output: ScanOutput) -> ScanConfig {
        ScanConfig {
            output,
            ..ScanConfig::default()
        }
    }
}

impl Default for ScanConfig {
    fn default() -> ScanConfig {
        ScanConfig {
            output: ScanOutput::default(),
            force: false,
            queue_capacity: RPLIDAR_DEFAULT_QUEUE_DEPTH,
            read_buffer_size: RPLIDAR_DEFAULT_READ_BUFFER_SIZE,
            max_resync_shifts: RPLIDAR_DEFAULT_MAX_RESYNC_SHIFTS,
            max_alignment_failures: RPLIDAR_DEFAULT_MAX_ALIGNMENT_FAILURES,
            stall_timeout: RPLIDAR_DEFAULT_STALL_TIMEOUT,
            response_timeout: RPLIDAR_DEFAULT_TIMEOUT,
        }
    }
}
