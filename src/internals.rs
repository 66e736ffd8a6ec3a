use std::time::Duration;

/// Default timeout for a single request/response exchange.
pub const RPLIDAR_DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Time the device needs after a reset before it accepts commands again.
pub const RPLIDAR_RESET_SETTLE: Duration = Duration::from_millis(500);

/// Time the device needs after a stop before it accepts the next command.
pub const RPLIDAR_STOP_SETTLE: Duration = Duration::from_millis(10);

/// Default serial port.
pub const RPLIDAR_DEFAULT_PORT: &str = "/dev/ttyUSB0";

/// Baud rate of the C1's UART.
pub const RPLIDAR_DEFAULT_BAUD_RATE: u32 = 460800;

/// Default per-read timeout of the serial port. Also the worst-case stop latency of a scan.
pub const RPLIDAR_DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Default capacity of the measurement queue.
pub const RPLIDAR_DEFAULT_QUEUE_DEPTH: usize = 8192;

/// Default capacity of the channel read buffer during a scan.
pub const RPLIDAR_DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Single-byte shifts allowed per resynchronization cycle.
pub const RPLIDAR_DEFAULT_MAX_RESYNC_SHIFTS: usize = 64;

/// Consecutive failed resynchronization cycles after which a scan is faulted.
pub const RPLIDAR_DEFAULT_MAX_ALIGNMENT_FAILURES: u32 = 8;

/// Silence after which a running scan is considered dead.
pub const RPLIDAR_DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(2);
