/// Sync bytes that open every response descriptor.
pub const RPLIDAR_ANS_SYNC_BYTES: [u8; 2] = [0xA5, 0x5A];

/// Mask for the 30-bit payload length packed into the descriptor.
pub const RPLIDAR_ANS_HEADER_SIZE_MASK: u32 = 0x3FFF_FFFF;
/// Shift for the 2-bit send mode packed above the length.
pub const RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT: u32 = 30;

/// Send mode: exactly one payload follows the descriptor.
pub const RPLIDAR_ANS_MODE_SINGLE: u8 = 0x0;
/// Send mode: payloads of the declared length follow until the device is stopped.
pub const RPLIDAR_ANS_MODE_MULTI: u8 = 0x1;

/// Response type identifier for device information.
pub const RPLIDAR_ANS_TYPE_DEVINFO: u8 = 0x4;
/// Size of the device information payload.
pub const RPLIDAR_DEVINFO_SIZE: usize = 20;

/// Response type identifier for device health status.
pub const RPLIDAR_ANS_TYPE_DEVHEALTH: u8 = 0x6;
/// Size of the health payload: status byte plus little-endian error code.
pub const RPLIDAR_DEVHEALTH_SIZE: usize = 3;

/// Health status code indicating the LIDAR is operating correctly.
pub const RPLIDAR_HEALTH_STATUS_OK: u8 = 0;
/// Health status code indicating a non-critical warning. The LIDAR might still function.
pub const RPLIDAR_HEALTH_STATUS_WARNING: u8 = 1;
/// Health status code indicating a critical error (protection stop).
pub const RPLIDAR_HEALTH_STATUS_ERROR: u8 = 2;

/// Response type identifier for the sample rate answer.
pub const RPLIDAR_ANS_TYPE_SAMPLE_RATE: u8 = 0x15;
/// Size of the sample rate payload: two little-endian u16 durations in microseconds.
pub const RPLIDAR_SAMPLE_RATE_SIZE: usize = 4;

/// Response type identifier for standard scan measurements.
pub const RPLIDAR_ANS_TYPE_MEASUREMENT: u8 = 0x81;
/// Size of one standard scan measurement packet.
pub const RPLIDAR_MEASUREMENT_PACKET_SIZE: usize = 5;

/// Start flag S, bit 0 of the first packet byte.
pub const RPLIDAR_RESP_MEASUREMENT_SYNCBIT: u8 = 0x1;
/// Inverted start flag, bit 1 of the first packet byte.
pub const RPLIDAR_RESP_MEASUREMENT_SYNCBIT_INVERSE: u8 = 0x2;
/// Bit shift for the 6-bit quality in the first packet byte.
pub const RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT: u8 = 2;
/// Check bit C, bit 0 of the second packet byte. Always set in a valid packet.
pub const RPLIDAR_RESP_MEASUREMENT_CHECKBIT: u8 = 0x1;
/// Bit shift for the Q6 angle packed above the check bit.
pub const RPLIDAR_RESP_MEASUREMENT_ANGLE_SHIFT: u8 = 1;

/// Response type identifier for capsuled measurement data (express scan).
pub const RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED: u8 = 0x82;

/// Response type identifier for configuration entries.
pub const RPLIDAR_ANS_TYPE_GET_LIDAR_CONF: u8 = 0x20;
