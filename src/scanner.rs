//! Streaming acquisition: the scan worker, its sinks and the session handle.

use crate::answers::RPLIDAR_MEASUREMENT_PACKET_SIZE;
use crate::base::{Channel, Error, Result};
use crate::config::{ScanConfig, ScanOutput};
use crate::parsers::{decode, is_aligned, Resync, Resynchronizer};
use crate::types::{AngleKey, Measurement, ScanState, ScanStats};
use crate::RplidarC1;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, trace, warn};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

/// One-shot stop request shared between a scan worker and its callers.
///
/// Once set it stays set. The worker checks it before every read, so a scan ends at most one
/// read timeout after [`StopSignal::set`].
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> StopSignal {
        StopSignal::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Latest distance per angle bucket, written by the scan worker and readable from any thread.
///
/// `None` means the last measurement in that bucket had no return.
#[derive(Debug, Clone, Default)]
pub struct ScanMap {
    inner: Arc<RwLock<BTreeMap<AngleKey, Option<u16>>>>,
}

impl ScanMap {
    pub fn new() -> ScanMap {
        ScanMap::default()
    }

    /// Replace-or-insert under a single write lock, so readers never see a torn update.
    pub(crate) fn record(&self, measurement: &Measurement) {
        self.inner
            .write()
            .insert(measurement.angle_key(), measurement.distance());
    }

    /// Entry for `key`: `None` if never seen, `Some(None)` if seen without a return.
    pub fn get(&self, key: AngleKey) -> Option<Option<u16>> {
        self.inner.read().get(&key).copied()
    }

    /// Latest distance at the bucket nearest to `degrees`.
    pub fn distance_at(&self, degrees: f32) -> Option<u16> {
        self.get(AngleKey::from_degrees(degrees)).flatten()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Copy of the whole map, ordered by angle.
    pub fn snapshot(&self) -> BTreeMap<AngleKey, Option<u16>> {
        self.inner.read().clone()
    }
}

/// Write side of the sinks, owned by the scan worker.
#[derive(Debug)]
pub(crate) struct Publisher {
    queue: Option<(Sender<Measurement>, Receiver<Measurement>)>,
    map: Option<ScanMap>,
    dropped: u64,
}

impl Publisher {
    /// Creates the sinks selected by `output`, returning the publisher and the read ends.
    pub(crate) fn new(
        output: ScanOutput,
        queue_capacity: usize,
    ) -> (Publisher, Option<Receiver<Measurement>>, Option<ScanMap>) {
        let queue = if output.enable_queue {
            Some(crossbeam_channel::bounded(queue_capacity.max(1)))
        } else {
            None
        };
        let map = if output.enable_mapping {
            Some(ScanMap::new())
        } else {
            None
        };
        let receiver = queue.as_ref().map(|(_, rx)| rx.clone());
        let publisher = Publisher {
            queue,
            map: map.clone(),
            dropped: 0,
        };
        (publisher, receiver, map)
    }

    pub(crate) fn publish(&mut self, measurement: Measurement) {
        if let Some(map) = &self.map {
            map.record(&measurement);
        }
        if let Some((tx, rx)) = &self.queue {
            let mut pending = measurement;
            loop {
                match tx.try_send(pending) {
                    Ok(()) => break,
                    Err(TrySendError::Full(back)) => {
                        // evict the oldest entry so the read loop never blocks on a slow consumer
                        if rx.try_recv().is_ok() {
                            self.dropped += 1;
                        }
                        pending = back;
                    }
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        }
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Reads the measurement stream until `stop` is set or the stream fails.
///
/// Misaligned bytes are skipped through a [`Resynchronizer`]. The loop fails with
/// [`Error::OperationTimeout`] after `stall_timeout` without any byte, with
/// [`Error::AlignmentError`] after `max_alignment_failures` consecutive failed resync cycles,
/// and with [`Error::IoError`] when the stream breaks.
pub(crate) fn run_scan_loop<T: ?Sized + Read + Write>(
    channel: &mut Channel<T>,
    publisher: &mut Publisher,
    stop: &StopSignal,
    config: &ScanConfig,
) -> Result<ScanStats> {
    debug!("Scan loop started");
    let mut stats = ScanStats::default();
    let mut resync = Resynchronizer::new(config.max_resync_shifts);
    let mut consecutive_failures = 0u32;
    let mut last_data = Instant::now();
    let mut packet = [0u8; RPLIDAR_MEASUREMENT_PACKET_SIZE];

    // the handshake may already have buffered the first packets
    let mut pending = !channel.buffer().is_empty();

    while !stop.is_set() {
        if !pending {
            if channel.fill()? > 0 {
                last_data = Instant::now();
            } else if last_data.elapsed() >= config.stall_timeout {
                error!(
                    "No data from device for {:?}, giving up",
                    last_data.elapsed()
                );
                return Err(Error::OperationTimeout);
            }
        }
        pending = false;

        loop {
            let buf = channel.buffer_mut();
            let aligned = match (buf.peek(0), buf.peek(1)) {
                (Some(byte0), Some(byte1)) => is_aligned(byte0, byte1),
                _ => break,
            };

            if !aligned || resync.pending_shifts() > 0 {
                match resync.resynchronize(buf) {
                    Ok(Resync::Aligned(shifts)) => {
                        warn!("Resynchronized after discarding {} bytes", shifts);
                        stats.resyncs += 1;
                        stats.discarded_bytes += shifts as u64;
                    }
                    Ok(Resync::NeedMoreData) => break,
                    Err(Error::AlignmentError { shifts }) => {
                        stats.discarded_bytes += shifts as u64;
                        stats.alignment_failures += 1;
                        consecutive_failures += 1;
                        if consecutive_failures >= config.max_alignment_failures {
                            error!(
                                "{} consecutive resync cycles failed, stream is unusable",
                                consecutive_failures
                            );
                            stats.dropped = publisher.dropped();
                            return Err(Error::AlignmentError { shifts });
                        }
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            if !buf.peek_into(&mut packet) {
                break;
            }
            buf.skip_bytes(RPLIDAR_MEASUREMENT_PACKET_SIZE);

            let measurement = decode(&packet);
            trace!(
                "Measurement: angle={:.2}, dist={}mm, quality={}, start={}",
                measurement.angle_degrees,
                measurement.distance_mm,
                measurement.quality,
                measurement.start_of_revolution
            );
            publisher.publish(measurement);
            stats.packets += 1;
            consecutive_failures = 0;
        }
    }

    stats.dropped = publisher.dropped();
    debug!("Scan loop stopped: {:?}", stats);
    Ok(stats)
}

/// A running scan.
///
/// The worker thread owns the transport while the session lives. The session holds the device
/// mutably, so no other command can interleave with the measurement stream. Ending the session
/// with [`ScanSession::finish`], or dropping it, stops the worker, sends the stop command and
/// hands the transport back to the device.
///
/// # Example
/// ```ignore
/// let mut lidar = RplidarC1::connect(&SerialConfig::default())?;
/// lidar.healthcheck()?;
/// let session = lidar.scan(&ScanConfig::with_output(ScanOutput::both()))?;
/// for m in session.measurements().unwrap().iter().take(1000) {
///     println!("{:.2}° {}mm q{}", m.angle_degrees, m.distance_mm, m.quality);
/// }
/// let stats = session.finish()?;
/// ```
pub struct ScanSession<'a, T: ?Sized + Read + Write + Send + 'static> {
    device: &'a mut RplidarC1<T>,
    worker: Option<JoinHandle<(Channel<T>, Result<ScanStats>)>>,
    stop: StopSignal,
    measurements: Option<Receiver<Measurement>>,
    map: Option<ScanMap>,
}

impl<'a, T: ?Sized + Read + Write + Send + 'static> ScanSession<'a, T> {
    pub(crate) fn new(
        device: &'a mut RplidarC1<T>,
        worker: JoinHandle<(Channel<T>, Result<ScanStats>)>,
        stop: StopSignal,
        measurements: Option<Receiver<Measurement>>,
        map: Option<ScanMap>,
    ) -> ScanSession<'a, T> {
        ScanSession {
            device,
            worker: Some(worker),
            stop,
            measurements,
            map,
        }
    }

    /// A handle that ends the scan when set. Can be moved to other threads.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Requests the scan to stop without waiting for it.
    pub fn stop(&self) {
        self.stop.set();
    }

    /// The ordered measurement queue, if enabled. The receiver may be cloned.
    pub fn measurements(&self) -> Option<&Receiver<Measurement>> {
        self.measurements.as_ref()
    }

    /// The angle map, if enabled.
    pub fn scan_map(&self) -> Option<&ScanMap> {
        self.map.as_ref()
    }

    /// `false` once the worker has exited, either on request or because of a fault.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .map(|worker| !worker.is_finished())
            .unwrap_or(false)
    }

    /// Stops the scan and returns the device to idle.
    ///
    /// Returns the session's counters, or the error that ended the scan. After an error the
    /// device is [`ScanState::Faulted`].
    pub fn finish(mut self) -> Result<ScanStats> {
        self.end()
    }

    fn end(&mut self) -> Result<ScanStats> {
        let worker = match self.worker.take() {
            Some(worker) => worker,
            None => return Ok(ScanStats::default()),
        };

        self.stop.set();
        self.device.set_state(ScanState::Stopping);
        debug!("Waiting for scan worker to exit");
        match worker.join() {
            Ok((channel, result)) => self.device.finish_scan(channel, result),
            Err(_) => {
                error!("Scan worker panicked, transport lost");
                self.device.set_state(ScanState::Faulted);
                Err(Error::OperationFail {
                    description: "scan worker panicked".to_owned(),
                })
            }
        }
    }
}

impl<'a, T: ?Sized + Read + Write + Send + 'static> Drop for ScanSession<'a, T> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(e) = self.end() {
                warn!("Scan ended with error: {}", e);
            }
        }
    }
}
