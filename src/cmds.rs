use crate::answers::*;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Sync byte that starts every request frame.
pub const RPLIDAR_CMD_SYNC_BYTE: u8 = 0xA5;

/// Flag OR-ed into the command byte of frames that carry a payload.
pub const RPLIDAR_CMDFLAG_HAS_PAYLOAD: u8 = 0x80;

/// Commands understood by the RPLIDAR C1, with their single-byte wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    /// Leave scanning mode and enter idle. The device needs about 10ms before the next command.
    Stop = 0x25,

    /// Reset the core. The device needs about 500ms to come back.
    Reset = 0x40,

    /// Start the standard scan, streaming 5-byte measurement packets.
    Scan = 0x20,

    /// Start scanning without waiting for the motor to reach a stable speed.
    ForceScan = 0x21,

    /// Start an express scan. Requires a 5-byte mode payload.
    ExpressScan = 0x82,

    /// Request model, firmware, hardware and serial number.
    GetInfo = 0x50,

    /// Request the health status.
    GetHealth = 0x52,

    /// Request the single measurement duration of the standard and express modes.
    GetSampleRate = 0x59,

    /// Request a configuration entry. Requires a payload holding the entry id.
    GetLidarConf = 0x84,
}

impl Command {
    /// Whether frames for this command carry a length, payload and checksum.
    pub fn takes_payload(self) -> bool {
        matches!(self, Command::ExpressScan | Command::GetLidarConf)
    }

    /// The descriptor data type the device answers this command with, if it answers at all.
    pub fn answer_type(self) -> Option<u8> {
        match self {
            Command::Stop | Command::Reset => None,
            Command::Scan | Command::ForceScan => Some(RPLIDAR_ANS_TYPE_MEASUREMENT),
            Command::ExpressScan => Some(RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED),
            Command::GetInfo => Some(RPLIDAR_ANS_TYPE_DEVINFO),
            Command::GetHealth => Some(RPLIDAR_ANS_TYPE_DEVHEALTH),
            Command::GetSampleRate => Some(RPLIDAR_ANS_TYPE_SAMPLE_RATE),
            Command::GetLidarConf => Some(RPLIDAR_ANS_TYPE_GET_LIDAR_CONF),
        }
    }

    /// The command whose answer carries `data_type`. Scan answers resolve to [`Command::Scan`].
    pub fn from_answer_type(data_type: u8) -> Option<Command> {
        match data_type {
            RPLIDAR_ANS_TYPE_MEASUREMENT => Some(Command::Scan),
            RPLIDAR_ANS_TYPE_MEASUREMENT_CAPSULED => Some(Command::ExpressScan),
            RPLIDAR_ANS_TYPE_DEVINFO => Some(Command::GetInfo),
            RPLIDAR_ANS_TYPE_DEVHEALTH => Some(Command::GetHealth),
            RPLIDAR_ANS_TYPE_SAMPLE_RATE => Some(Command::GetSampleRate),
            RPLIDAR_ANS_TYPE_GET_LIDAR_CONF => Some(Command::GetLidarConf),
            _ => None,
        }
    }
}

/// Payload of [`Command::ExpressScan`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ExpressScanPayload {
    /// Working mode id. 0 selects the legacy express mode.
    pub work_mode: u8,
    pub work_flags: u16,
    pub param: u16,
}

impl ExpressScanPayload {
    pub fn to_bytes(&self) -> [u8; 5] {
        let flags = self.work_flags.to_le_bytes();
        let param = self.param.to_le_bytes();
        [self.work_mode, flags[0], flags[1], param[0], param[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_codes_round_trip() {
        for cmd in [
            Command::Stop,
            Command::Reset,
            Command::Scan,
            Command::ForceScan,
            Command::ExpressScan,
            Command::GetInfo,
            Command::GetHealth,
            Command::GetSampleRate,
            Command::GetLidarConf,
        ] {
            let code: u8 = cmd.into();
            assert_eq!(Command::try_from(code).unwrap(), cmd);
        }
        assert_eq!(u8::from(Command::Stop), 0x25);
        assert_eq!(u8::from(Command::Scan), 0x20);
        assert_eq!(u8::from(Command::Reset), 0x40);
        assert!(Command::try_from(0x00u8).is_err());
    }

    #[test]
    fn answer_types_resolve_back() {
        assert_eq!(
            Command::from_answer_type(Command::GetHealth.answer_type().unwrap()),
            Some(Command::GetHealth)
        );
        assert_eq!(Command::Stop.answer_type(), None);
        assert_eq!(Command::from_answer_type(0x81), Some(Command::Scan));
    }
}
