//! Request framing and response descriptor parsing.
//!
//! Everything here is a pure transform over byte slices; the [`crate::base::Channel`] does
//! the I/O.

use crate::answers::*;
use crate::base::{Error, Result};
use crate::checksum::Checksum;
use crate::cmds::{Command, RPLIDAR_CMDFLAG_HAS_PAYLOAD, RPLIDAR_CMD_SYNC_BYTE};
use byteorder::{ByteOrder, LittleEndian};
use log::{error, trace};

/// Size of a response descriptor, sync bytes included.
pub const RESPONSE_DESCRIPTOR_SIZE: usize = 7;

/// Largest payload the one-byte length field can announce.
pub const MAX_REQUEST_PAYLOAD: usize = u8::MAX as usize;

/// How the payloads following a descriptor are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// One payload of the declared length.
    Single,
    /// Payloads of the declared length repeat until the device is stopped.
    Multi,
}

impl ResponseMode {
    fn from_bits(bits: u8) -> Result<ResponseMode> {
        match bits {
            RPLIDAR_ANS_MODE_SINGLE => Ok(ResponseMode::Single),
            RPLIDAR_ANS_MODE_MULTI => Ok(ResponseMode::Multi),
            other => Err(Error::ProtocolError {
                description: format!("unknown response send mode {:#X}", other),
            }),
        }
    }

    fn bits(self) -> u8 {
        match self {
            ResponseMode::Single => RPLIDAR_ANS_MODE_SINGLE,
            ResponseMode::Multi => RPLIDAR_ANS_MODE_MULTI,
        }
    }
}

/// The fixed header preceding a command's response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseDescriptor {
    /// Payload length in bytes (30 bits on the wire).
    pub length: u32,
    pub mode: ResponseMode,
    /// Answer type tag, e.g. [`RPLIDAR_ANS_TYPE_MEASUREMENT`].
    pub data_type: u8,
}

impl ResponseDescriptor {
    /// Encodes the descriptor the way the device sends it.
    pub fn to_bytes(&self) -> [u8; RESPONSE_DESCRIPTOR_SIZE] {
        let mut out = [0u8; RESPONSE_DESCRIPTOR_SIZE];
        out[..2].copy_from_slice(&RPLIDAR_ANS_SYNC_BYTES);
        let packed = (self.length & RPLIDAR_ANS_HEADER_SIZE_MASK)
            | ((self.mode.bits() as u32) << RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT);
        LittleEndian::write_u32(&mut out[2..6], packed);
        out[6] = self.data_type;
        out
    }

    /// The command this descriptor answers, if its data type is known.
    pub fn command(&self) -> Option<Command> {
        Command::from_answer_type(self.data_type)
    }

    /// Fails unless this descriptor announces `data_type` in `mode` with `length` bytes.
    pub fn expect(&self, data_type: u8, mode: ResponseMode, length: usize) -> Result<()> {
        if self.data_type != data_type {
            error!(
                "Unexpected response type: expected {:02X}, got {:02X}",
                data_type, self.data_type
            );
            return Err(Error::ProtocolError {
                description: format!(
                    "unexpected response type: expected {:02X}, got {:02X}",
                    data_type, self.data_type
                ),
            });
        }
        if self.mode != mode {
            return Err(Error::ProtocolError {
                description: format!(
                    "unexpected send mode for {:02X}: expected {:?}, got {:?}",
                    data_type, mode, self.mode
                ),
            });
        }
        if self.length as usize != length {
            return Err(Error::ProtocolError {
                description: format!(
                    "invalid data size for {:02X}: expected {}, got {}",
                    data_type, length, self.length
                ),
            });
        }
        Ok(())
    }
}

/// Builds a request frame: `[0xA5][command]` or, for payload commands,
/// `[0xA5][command|0x80][length][payload..][xor checksum]`.
pub fn build_request(command: Command, payload: Option<&[u8]>) -> Result<Vec<u8>> {
    let cmd: u8 = command.into();
    trace!(
        "Building request for {:?} ({:02X}), payload: {:?}",
        command,
        cmd,
        payload
    );

    match (command.takes_payload(), payload) {
        (false, None) => Ok(vec![RPLIDAR_CMD_SYNC_BYTE, cmd]),
        (false, Some(data)) => Err(Error::EncodingError {
            description: format!("{:?} does not take a payload ({} bytes given)", command, data.len()),
        }),
        (true, None) => Err(Error::EncodingError {
            description: format!("{:?} requires a payload", command),
        }),
        (true, Some(data)) => {
            if data.len() > MAX_REQUEST_PAYLOAD {
                error!(
                    "Payload too large: {} bytes (max {})",
                    data.len(),
                    MAX_REQUEST_PAYLOAD
                );
                return Err(Error::EncodingError {
                    description: format!(
                        "payload of {} bytes does not fit the length field",
                        data.len()
                    ),
                });
            }
            let mut frame = Vec::with_capacity(4 + data.len());
            frame.push(RPLIDAR_CMD_SYNC_BYTE);
            frame.push(cmd | RPLIDAR_CMDFLAG_HAS_PAYLOAD);
            frame.push(data.len() as u8);
            frame.extend_from_slice(data);
            frame.push(Checksum::of(&frame));
            trace!("Encoded frame: {:02X?}", frame);
            Ok(frame)
        }
    }
}

/// Parses a 7-byte response descriptor.
///
/// A sync mismatch is a [`Error::ProtocolError`]; the caller must abort the pending command.
pub fn parse_descriptor(bytes: &[u8]) -> Result<ResponseDescriptor> {
    if bytes.len() != RESPONSE_DESCRIPTOR_SIZE {
        return Err(Error::ProtocolError {
            description: format!(
                "descriptor must be {} bytes, got {}",
                RESPONSE_DESCRIPTOR_SIZE,
                bytes.len()
            ),
        });
    }
    if bytes[..2] != RPLIDAR_ANS_SYNC_BYTES {
        error!(
            "Descriptor sync mismatch: expected {:02X?}, got {:02X?}",
            RPLIDAR_ANS_SYNC_BYTES,
            &bytes[..2]
        );
        return Err(Error::ProtocolError {
            description: format!("descriptor sync mismatch: {:02X?}", &bytes[..2]),
        });
    }

    let packed = LittleEndian::read_u32(&bytes[2..6]);
    let length = packed & RPLIDAR_ANS_HEADER_SIZE_MASK;
    let mode = ResponseMode::from_bits((packed >> RPLIDAR_ANS_HEADER_SUBTYPE_SHIFT) as u8)?;
    let descriptor = ResponseDescriptor {
        length,
        mode,
        data_type: bytes[6],
    };
    trace!("Parsed descriptor: {:?}", descriptor);
    Ok(descriptor)
}
