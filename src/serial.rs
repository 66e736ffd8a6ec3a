//! Serial port transport.

use crate::base::{Error, Result};
use crate::config::SerialConfig;
use log::debug;
use serialport::SerialPort;
use std::io;

/// Opens the port described by `config` with DTR and RTS deasserted.
///
/// The returned port times out reads after `config.timeout`, which is what the scan loop
/// relies on to poll its stop signal.
pub fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    debug!(
        "Opening serial port {} at {} baud (timeout {:?})",
        config.port, config.baud_rate, config.timeout
    );
    let mut port = serialport::new(&config.port, config.baud_rate)
        .timeout(config.timeout)
        .open()
        .map_err(|e| Error::from(io::Error::from(e)))?;

    port.write_data_terminal_ready(false)
        .map_err(|e| Error::from(io::Error::from(e)))?;
    port.write_request_to_send(false)
        .map_err(|e| Error::from(io::Error::from(e)))?;
    Ok(port)
}
