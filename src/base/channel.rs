use crate::base::error::{Error, Result};
use crate::base::ring_byte_buffer::RingByteBuffer;
use crate::protocol::{parse_descriptor, ResponseDescriptor, ResponseMode, RESPONSE_DESCRIPTOR_SIZE};
use log::{error, trace, warn};
use std::io;
use std::time::{Duration, Instant};

const DEFAULT_CHANNEL_READ_BUFFER_SIZE: usize = 1024;

/// Upper bound on reads issued by a single [`Channel::drain`] call.
const MAX_DRAIN_READS: usize = 64;

/// Channel sends request frames and receives response bytes via a stream.
///
/// The stream is expected to behave like a serial port opened with a read timeout: a read
/// with nothing to deliver fails with `io::ErrorKind::TimedOut` (or returns 0) after that
/// timeout. The stream is closed when the channel is dropped.
///
/// # Examples
/// ```ignore
/// let port = serialport::new("/dev/ttyUSB0", 460800).open()?;
/// let mut channel = Channel::new(port);
/// channel.write_frame(&[0xA5, 0x25])?;
/// ```
#[derive(Debug)]
pub struct Channel<T: ?Sized> {
    stream: Box<T>,
    read_buffer: RingByteBuffer,
    // a read gave up early; the rest of its reply may still be in flight
    stale: bool,
}

impl<T: ?Sized> Channel<T>
where
    T: io::Read + io::Write,
{
    /// Create a new `Channel` over `stream`.
    pub fn new(stream: Box<T>) -> Channel<T> {
        Channel::with_read_buffer_size(stream, DEFAULT_CHANNEL_READ_BUFFER_SIZE)
    }

    /// Create a new `Channel` with non-default ring buffer capacity.
    pub fn with_read_buffer_size(stream: Box<T>, read_buffer_size: usize) -> Channel<T> {
        trace!("Creating new Channel with buffer size {}", read_buffer_size);
        Channel {
            stream,
            read_buffer: RingByteBuffer::with_capacity(read_buffer_size),
            stale: false,
        }
    }

    /// Bytes received but not yet consumed.
    pub fn buffer(&self) -> &RingByteBuffer {
        &self.read_buffer
    }

    pub fn buffer_mut(&mut self) -> &mut RingByteBuffer {
        &mut self.read_buffer
    }

    /// Replaces the read buffer with an empty one of `capacity` bytes.
    pub fn resize_read_buffer(&mut self, capacity: usize) {
        if capacity != self.read_buffer.capacity() {
            trace!("Resizing channel read buffer to {}", capacity);
            self.read_buffer = RingByteBuffer::with_capacity(capacity);
        } else {
            self.read_buffer.clear();
        }
    }

    /// Write an encoded request frame and flush it.
    pub fn write_frame(&mut self, frame: &[u8]) -> Result<usize> {
        trace!("Channel write: {:02X?}", frame);
        self.stream.write_all(frame).map_err(|e| {
            error!("IO error writing frame: {}", e);
            Error::from(e)
        })?;
        self.stream.flush()?;
        Ok(frame.len())
    }

    /// Issue one bounded read from the stream into the buffer.
    ///
    /// Returns the number of bytes received, 0 if the stream's read timeout elapsed.
    pub fn fill(&mut self) -> Result<usize> {
        match self.read_buffer.read_from(&mut *self.stream) {
            Ok(read) => {
                if read > 0 {
                    trace!(
                        "Read {} bytes from stream (buffered: {})",
                        read,
                        self.read_buffer.len()
                    );
                }
                Ok(read)
            }
            Err(e) => {
                error!("IO error reading from stream: {}", e);
                Err(Error::IoError(e))
            }
        }
    }

    /// Read exactly `n` bytes, waiting at most `timeout` for them to arrive.
    ///
    /// Fails with [`Error::OperationTimeout`] if the deadline passes first; bytes received
    /// so far stay buffered.
    pub fn read_exact(&mut self, n: usize, timeout: Duration) -> Result<Vec<u8>> {
        trace!("Channel read_exact: {} bytes within {:?}", n, timeout);
        if n > self.read_buffer.capacity() {
            return Err(Error::OperationFail {
                description: format!(
                    "read of {} bytes exceeds channel buffer capacity {}",
                    n,
                    self.read_buffer.capacity()
                ),
            });
        }
        let start = Instant::now();
        while self.read_buffer.len() < n {
            if start.elapsed() >= timeout {
                warn!(
                    "Timed out waiting for {} bytes (have {})",
                    n,
                    self.read_buffer.len()
                );
                self.stale = true;
                return Err(Error::OperationTimeout);
            }
            self.fill()?;
        }
        let mut out = vec![0; n];
        self.read_buffer.peek_into(&mut out);
        self.read_buffer.skip_bytes(n);
        Ok(out)
    }

    /// Discard buffered bytes and everything the stream delivers until it goes quiet.
    ///
    /// Returns the number of bytes thrown away.
    pub fn drain(&mut self) -> Result<usize> {
        let mut drained = self.read_buffer.len();
        self.read_buffer.clear();
        for _ in 0..MAX_DRAIN_READS {
            let read = self.fill()?;
            drained += read;
            self.read_buffer.clear();
            if read == 0 {
                break;
            }
        }
        self.stale = false;
        if drained > 0 {
            trace!("Drained {} bytes from channel", drained);
        }
        Ok(drained)
    }

    /// Read and validate a 7-byte response descriptor.
    pub fn read_descriptor(&mut self, timeout: Duration) -> Result<ResponseDescriptor> {
        let bytes = self.read_exact(RESPONSE_DESCRIPTOR_SIZE, timeout)?;
        parse_descriptor(&bytes)
    }

    /// Send a request frame, then read a single response of `data_type` carrying exactly
    /// `length` payload bytes.
    ///
    /// Leftover input is discarded before the frame goes out. After a timed-out read the
    /// stream is drained as well, so a late reply to the earlier request cannot be taken for
    /// this one. The descriptor is checked before any payload is read, so a corrupt length
    /// never turns into an oversized read.
    ///
    /// # Arguments
    ///
    /// * `frame` - Encoded request, as built by [`crate::protocol::build_request`].
    /// * `data_type` - Answer type the descriptor must announce.
    /// * `length` - Exact payload size the descriptor must announce.
    /// * `timeout` - Deadline for the descriptor and again for the payload.
    ///
    /// # Example
    /// ```ignore
    /// let payload = channel.invoke(&[0xA5, 0x52], 0x06, 3, Duration::from_secs(1))?;
    /// ```
    pub fn invoke(
        &mut self,
        frame: &[u8],
        data_type: u8,
        length: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        if self.stale {
            self.drain()?;
        } else if !self.read_buffer.is_empty() {
            trace!("Discarding {} stale bytes", self.read_buffer.len());
            self.read_buffer.clear();
        }
        self.write_frame(frame)?;
        let descriptor = self.read_descriptor(timeout)?;
        trace!("Invoke: received descriptor {:?}", descriptor);
        descriptor.expect(data_type, ResponseMode::Single, length)?;
        self.read_exact(length, timeout)
    }
}
