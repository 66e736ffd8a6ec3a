//! # RPLIDAR C1 Driver
//!
//! `rplidarc1` drives a Slamtec RPLIDAR C1 over its serial link. It encodes command frames,
//! parses response descriptors, and turns the standard scan's stream of 5-byte measurement
//! packets into [`types::Measurement`]s delivered to an ordered queue and/or an angle map
//! while the device spins.
//!
//! A corrupted stream is resynchronized byte by byte without stopping the scan; a dead or
//! broken stream faults the scan and hands the error back to the caller.
//!
//! ```ignore
//! use rplidarc1::{RplidarC1, ScanConfig, ScanOutput, SerialConfig};
//!
//! let mut lidar = RplidarC1::connect(&SerialConfig::new("/dev/ttyUSB0"))?;
//! lidar.startup()?;
//! let session = lidar.scan(&ScanConfig::with_output(ScanOutput::both()))?;
//! let stop = session.stop_signal();
//! // hand `stop` to whoever decides when scanning ends
//! for m in session.measurements().unwrap() {
//!     println!("{:.2}° {} mm", m.angle_degrees, m.distance_mm);
//! }
//! session.finish()?;
//! lidar.shutdown()?;
//! ```

extern crate byteorder;
extern crate log;

pub mod answers;
pub mod base;
mod checksum;
pub mod cmds;
pub mod config;
mod internals;
pub mod parsers;
pub mod protocol;
pub mod scanner;
pub mod serial;
pub mod types;

pub use crate::base::{Channel, Error, Result};
pub use crate::cmds::Command;
pub use crate::config::{ScanConfig, ScanOutput, SerialConfig};
pub use crate::protocol::{build_request, parse_descriptor, ResponseDescriptor, ResponseMode};
pub use crate::scanner::{ScanMap, ScanSession, StopSignal};
pub use crate::types::{DeviceInfo, HealthStatus, Measurement, SampleRate, ScanState, ScanStats};

use crate::answers::*;
use crate::internals::*;
use crate::protocol::RESPONSE_DESCRIPTOR_SIZE;
use crate::scanner::{run_scan_loop, Publisher};
use byteorder::{ByteOrder, LittleEndian};
use log::{debug, error, trace, warn};
use serialport::SerialPort;
use std::io::{Read, Write};
use std::thread;
use std::time::Duration;

/// Connection to and control interface for an RPLIDAR C1.
///
/// The device owns the transport through a [`Channel`]. Single-response commands run on the
/// caller's thread; [`RplidarC1::scan`] moves the transport to a worker thread for the
/// lifetime of the returned [`ScanSession`].
///
/// Dropping the device performs a best-effort [`RplidarC1::shutdown`].
#[derive(Debug)]
pub struct RplidarC1<T: ?Sized + Read + Write> {
    channel: Option<Channel<T>>,
    state: ScanState,
}

impl RplidarC1<dyn SerialPort> {
    /// Opens the serial port described by `config` and wraps it in a device.
    ///
    /// # Example
    /// ```ignore
    /// let mut lidar = RplidarC1::connect(&SerialConfig::default())?;
    /// let health = lidar.startup()?;
    /// ```
    pub fn connect(config: &SerialConfig) -> Result<RplidarC1<dyn SerialPort>> {
        let port = serial::open_port(config)?;
        Ok(RplidarC1::with_stream(port))
    }
}

impl<T: ?Sized> RplidarC1<T>
where
    T: Read + Write,
{
    /// Constructs a new `RplidarC1` using an existing `Channel`.
    pub fn new(channel: Channel<T>) -> RplidarC1<T> {
        trace!("Creating new RplidarC1");
        RplidarC1 {
            channel: Some(channel),
            state: ScanState::Idle,
        }
    }

    /// Constructs a new `RplidarC1` directly from a stream such as a serial port.
    ///
    /// The stream's reads must time out (`io::ErrorKind::TimedOut`) when the device is silent.
    pub fn with_stream(stream: Box<T>) -> RplidarC1<T> {
        RplidarC1::new(Channel::with_read_buffer_size(
            stream,
            RPLIDAR_DEFAULT_READ_BUFFER_SIZE,
        ))
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// `false` once the transport has been released by [`RplidarC1::shutdown`] or lost.
    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub(crate) fn set_state(&mut self, state: ScanState) {
        trace!("Scan state {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    /// Runs `op` against the channel. An I/O failure releases the transport and faults the
    /// device.
    fn transact<R>(&mut self, op: impl FnOnce(&mut Channel<T>) -> Result<R>) -> Result<R> {
        let channel = self.channel.as_mut().ok_or_else(|| Error::OperationFail {
            description: "transport has been released".to_owned(),
        })?;
        let result = op(channel);
        if let Err(Error::IoError(e)) = &result {
            error!("Transport failed, releasing it: {}", e);
            self.channel = None;
            self.set_state(ScanState::Faulted);
        }
        result
    }

    /// Sends `command` and reads its single response of `length` bytes.
    fn request(&mut self, command: Command, length: usize, timeout: Duration) -> Result<Vec<u8>> {
        let frame = build_request(command, None)?;
        let data_type = command.answer_type().ok_or_else(|| Error::OperationFail {
            description: format!("{:?} has no response", command),
        })?;
        trace!("Invoking command: {:?}", command);
        let result = self.transact(|channel| channel.invoke(&frame, data_type, length, timeout));
        match &result {
            Ok(payload) => trace!("Received {} byte response for {:?}", payload.len(), command),
            Err(Error::OperationTimeout) => warn!("Timeout waiting for {:?} response", command),
            Err(e) => error!("Error invoking {:?}: {}", command, e),
        }
        result
    }

    fn send(&mut self, command: Command) -> Result<()> {
        let frame = build_request(command, None)?;
        trace!("Sending {:?} ({:02X})", command, frame[1]);
        self.transact(|channel| channel.write_frame(&frame).map(|_| ()))
    }

    /// Gets the device's health status without judging it.
    pub fn get_health(&mut self) -> Result<HealthStatus> {
        self.get_health_with_timeout(RPLIDAR_DEFAULT_TIMEOUT)
    }

    pub fn get_health_with_timeout(&mut self, timeout: Duration) -> Result<HealthStatus> {
        let payload = self.request(Command::GetHealth, RPLIDAR_DEVHEALTH_SIZE, timeout)?;
        let code = LittleEndian::read_u16(&payload[1..3]);
        let status = match payload[0] {
            RPLIDAR_HEALTH_STATUS_OK => HealthStatus::Good,
            RPLIDAR_HEALTH_STATUS_WARNING => HealthStatus::Warning(code),
            RPLIDAR_HEALTH_STATUS_ERROR => HealthStatus::Error(code),
            other => {
                error!("Unknown health status byte: {}", other);
                return Err(Error::ProtocolError {
                    description: format!("unknown health status {}", other),
                });
            }
        };
        debug!("Health status: {:?}", status);
        Ok(status)
    }

    /// Checks the device's health. Any status other than good fails with
    /// [`Error::DeviceError`] carrying the device's code.
    pub fn healthcheck(&mut self) -> Result<HealthStatus> {
        debug!("Starting healthcheck");
        match self.get_health()? {
            HealthStatus::Good => {
                debug!("Completed healthcheck successfully");
                Ok(HealthStatus::Good)
            }
            status => {
                error!(
                    "Healthcheck returned {} (code {:#06X})",
                    status.name(),
                    status.code()
                );
                Err(Error::DeviceError { status })
            }
        }
    }

    /// Startup sequence: check health; on a protection stop, reset once and check again.
    ///
    /// Returns the final status, which may be a warning. A second error status fails with
    /// [`Error::DeviceError`].
    pub fn startup(&mut self) -> Result<HealthStatus> {
        debug!("Commencing startup sequence");
        let status = match self.get_health()? {
            HealthStatus::Error(code) => {
                warn!(
                    "Device reports protection stop (code {:#06X}), resetting",
                    code
                );
                self.reset()?;
                self.get_health()?
            }
            status => status,
        };
        match status {
            HealthStatus::Error(_) => {
                error!("Device still in error after reset");
                Err(Error::DeviceError { status })
            }
            HealthStatus::Warning(code) => {
                warn!("Device reports warning (code {:#06X})", code);
                Ok(status)
            }
            HealthStatus::Good => {
                debug!("Completed startup sequence");
                Ok(status)
            }
        }
    }

    /// Gets model, firmware, hardware and serial number.
    pub fn get_info(&mut self) -> Result<DeviceInfo> {
        self.get_info_with_timeout(RPLIDAR_DEFAULT_TIMEOUT)
    }

    pub fn get_info_with_timeout(&mut self, timeout: Duration) -> Result<DeviceInfo> {
        let payload = self.request(Command::GetInfo, RPLIDAR_DEVINFO_SIZE, timeout)?;
        let mut serial_number = [0u8; 16];
        serial_number.copy_from_slice(&payload[4..20]);
        let info = DeviceInfo {
            model: payload[0],
            firmware_minor: payload[1],
            firmware_major: payload[2],
            hardware: payload[3],
            serial_number,
        };
        debug!(
            "Device info: model {:02X}, firmware {}.{:02}, hardware {}",
            info.model, info.firmware_major, info.firmware_minor, info.hardware
        );
        Ok(info)
    }

    /// Gets the time a single measurement takes in standard and express mode.
    pub fn get_sample_rate(&mut self) -> Result<SampleRate> {
        let payload = self.request(
            Command::GetSampleRate,
            RPLIDAR_SAMPLE_RATE_SIZE,
            RPLIDAR_DEFAULT_TIMEOUT,
        )?;
        Ok(SampleRate {
            standard_us: LittleEndian::read_u16(&payload[0..2]),
            express_us: LittleEndian::read_u16(&payload[2..4]),
        })
    }

    /// Sends the stop command and waits for the device to settle.
    pub fn stop(&mut self) -> Result<()> {
        self.send(Command::Stop)?;
        thread::sleep(RPLIDAR_STOP_SETTLE);
        Ok(())
    }

    /// Stops and resets the core, then waits for it to come back.
    ///
    /// Returns a faulted device to [`ScanState::Idle`].
    pub fn reset(&mut self) -> Result<()> {
        debug!("Starting reset sequence");
        self.stop()?;
        self.send(Command::Reset)?;
        debug!("Sleeping {:?} while reset occurs", RPLIDAR_RESET_SETTLE);
        thread::sleep(RPLIDAR_RESET_SETTLE);
        // the core prints a boot banner after reset
        self.transact(|channel| channel.drain())?;
        self.set_state(ScanState::Idle);
        debug!("Completed reset sequence");
        Ok(())
    }

    /// Sends the stop command, drains trailing bytes and releases the transport.
    ///
    /// Calling it again after the transport is released does nothing.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut channel = match self.channel.take() {
            Some(channel) => channel,
            None => {
                trace!("Shutdown requested with transport already released");
                return Ok(());
            }
        };
        debug!("Starting shutdown sequence");
        let result = build_request(Command::Stop, None)
            .and_then(|frame| channel.write_frame(&frame))
            .map(|_| ());
        if result.is_ok() {
            thread::sleep(RPLIDAR_STOP_SETTLE);
            if let Err(e) = channel.drain() {
                warn!("Failed to drain channel during shutdown: {}", e);
            }
        }
        drop(channel);
        self.set_state(ScanState::Idle);
        debug!("Completed shutdown sequence");
        result
    }

    /// Starts a scan and returns the session that streams its measurements.
    ///
    /// The input buffer is flushed, the scan (or force scan) command sent and its descriptor
    /// validated on the caller's thread. A malformed descriptor faults the device; call
    /// [`RplidarC1::reset`] before trying again.
    ///
    /// # Arguments
    ///
    /// * `config` - Selects the sinks (at least one must be enabled), the scan command and the
    ///   bounds of the read loop: queue capacity, resync shifts, tolerated alignment failures
    ///   and stall timeout.
    ///
    /// # Example
    /// ```ignore
    /// let session = lidar.scan(&ScanConfig::with_output(ScanOutput::both()))?;
    /// let map = session.scan_map().unwrap().clone();
    /// thread::sleep(Duration::from_secs(1));
    /// println!("front: {:?} mm", map.distance_at(0.0));
    /// let stats = session.finish()?;
    /// ```
    pub fn scan(&mut self, config: &ScanConfig) -> Result<ScanSession<'_, T>>
    where
        T: Send + 'static,
    {
        if self.state != ScanState::Idle {
            return Err(Error::OperationFail {
                description: format!("cannot start a scan while {:?}", self.state),
            });
        }
        if !config.output.enable_queue && !config.output.enable_mapping {
            return Err(Error::OperationFail {
                description: "scan needs at least one output sink".to_owned(),
            });
        }

        let command = if config.force {
            Command::ForceScan
        } else {
            Command::Scan
        };
        let frame = build_request(command, None)?;
        debug!("Starting scan with {:?}", command);

        let handshake = self.transact(|channel| {
            channel.resize_read_buffer(config.read_buffer_size.max(RESPONSE_DESCRIPTOR_SIZE * 2));
            channel.drain()?;
            channel.write_frame(&frame)?;
            let descriptor = channel.read_descriptor(config.response_timeout)?;
            descriptor.expect(
                RPLIDAR_ANS_TYPE_MEASUREMENT,
                ResponseMode::Multi,
                RPLIDAR_MEASUREMENT_PACKET_SIZE,
            )
        });
        if let Err(e) = handshake {
            error!("Scan handshake failed: {}", e);
            if let Error::ProtocolError { .. } = e {
                self.set_state(ScanState::Faulted);
                if let Err(stop_err) = self.send(Command::Stop) {
                    warn!("Failed to stop device after bad handshake: {}", stop_err);
                }
            }
            return Err(e);
        }

        let mut channel = match self.channel.take() {
            Some(channel) => channel,
            None => {
                return Err(Error::OperationFail {
                    description: "transport has been released".to_owned(),
                })
            }
        };
        let (mut publisher, measurements, map) =
            Publisher::new(config.output, config.queue_capacity);
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let loop_config = config.clone();

        let spawned = thread::Builder::new()
            .name("rplidarc1-scan".to_owned())
            .spawn(move || {
                let result = run_scan_loop(&mut channel, &mut publisher, &worker_stop, &loop_config);
                if let Err(e) = &result {
                    error!("Scan loop ended with error: {}", e);
                }
                (channel, result)
            });

        match spawned {
            Ok(worker) => {
                self.set_state(ScanState::Scanning);
                Ok(ScanSession::new(self, worker, stop, measurements, map))
            }
            Err(e) => {
                error!("Failed to spawn scan worker: {}", e);
                self.set_state(ScanState::Faulted);
                Err(Error::IoError(e))
            }
        }
    }

    /// Takes the transport back from a finished scan worker and stops the device.
    pub(crate) fn finish_scan(
        &mut self,
        channel: Channel<T>,
        result: Result<ScanStats>,
    ) -> Result<ScanStats> {
        let result = match result {
            Err(Error::IoError(e)) => {
                error!("Scan lost its transport: {}", e);
                drop(channel);
                self.set_state(ScanState::Faulted);
                return Err(Error::IoError(e));
            }
            other => other,
        };

        self.channel = Some(channel);
        let stopped = self.transact(|channel| {
            channel.write_frame(&build_request(Command::Stop, None)?)?;
            thread::sleep(RPLIDAR_STOP_SETTLE);
            channel.drain()
        });

        match (result, stopped) {
            (Ok(stats), Ok(drained)) => {
                debug!(
                    "Scan stopped after {} packets ({} trailing bytes drained)",
                    stats.packets, drained
                );
                self.set_state(ScanState::Idle);
                Ok(stats)
            }
            (Ok(_), Err(e)) => {
                error!("Failed to stop device after scan: {}", e);
                self.set_state(ScanState::Faulted);
                Err(e)
            }
            (Err(e), _) => {
                self.set_state(ScanState::Faulted);
                Err(e)
            }
        }
    }
}

impl<T: ?Sized + Read + Write> Drop for RplidarC1<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Shutdown on drop failed: {}", e);
        }
    }
}
