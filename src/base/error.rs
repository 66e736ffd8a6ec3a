use crate::types::HealthStatus;
use std::error;
use std::fmt;
use std::io;

/// Represents errors that can occur while driving an RPLIDAR C1.
#[derive(Debug)]
pub enum Error {
    /// An outgoing request could not be encoded. This is a caller bug and is never retried.
    EncodingError { description: String },

    /// The device answered with bytes that do not follow the protocol, e.g. a descriptor
    /// with the wrong sync marker. The pending command is aborted and the device state is unknown.
    ProtocolError { description: String },

    /// No valid alignment window was found within the bounded number of single-byte shifts.
    AlignmentError { shifts: usize },

    /// The execution of operation is timed out.
    OperationTimeout,

    /// The device reported a health status other than good. The numeric code is kept as sent.
    DeviceError { status: HealthStatus },

    /// The operation cannot run in the current driver state.
    OperationFail { description: String },

    /// An I/O error occurred while communicating with the underlying stream (e.g., serial port).
    IoError(io::Error),
}

impl Error {
    /// Returns the device's numeric error code when this is a [`Error::DeviceError`].
    pub fn device_code(&self) -> Option<u16> {
        match self {
            Error::DeviceError { status } => Some(status.code()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EncodingError { description } => write!(f, "encoding error: {}", description),
            Error::ProtocolError { description } => write!(f, "protocol error: {}", description),
            Error::AlignmentError { shifts } => write!(
                f,
                "no valid alignment window after {} byte shifts",
                shifts
            ),
            Error::OperationTimeout => write!(f, "operation timeout"),
            Error::DeviceError { status } => write!(
                f,
                "device reported {} status (code {:#06X})",
                status.name(),
                status.code()
            ),
            Error::OperationFail { description } => write!(f, "operation failed: {}", description),
            Error::IoError(err) => write!(f, "io error: {}", err),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::TimedOut {
            Error::OperationTimeout
        } else {
            Error::IoError(err)
        }
    }
}

/// A specialized `Result` type for RPLIDAR C1 operations.
pub type Result<T> = std::result::Result<T, Error>;
