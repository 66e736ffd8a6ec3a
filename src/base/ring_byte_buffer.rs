use std::cmp::min;
use std::io::{self, Read};

/// Fixed-capacity circular byte store sitting between the serial stream and the decoders.
///
/// Bytes enter at the tail through [`RingByteBuffer::read_from`] or [`RingByteBuffer::extend`]
/// and leave at the head through [`RingByteBuffer::skip_bytes`]. Decoders look at the head
/// without consuming it through [`RingByteBuffer::peek`] and [`RingByteBuffer::peek_into`],
/// which see across the wrap point.
///
/// # Example
///
/// ```rust
/// use rplidarc1::base::RingByteBuffer;
///
/// let mut buffer = RingByteBuffer::with_capacity(8);
/// buffer.extend(&[0xA5, 0x5A, 0x05]);
/// assert_eq!(buffer.peek(1), Some(0x5A));
/// buffer.skip_bytes(2);
/// assert_eq!(buffer.len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RingByteBuffer {
    buf: Vec<u8>,
    head: usize,
    size: usize,
}

impl RingByteBuffer {
    /// Creates an empty buffer able to hold `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> RingByteBuffer {
        RingByteBuffer {
            buf: vec![0; capacity.max(1)],
            head: 0,
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn free_space(&self) -> usize {
        self.buf.len() - self.size
    }

    /// Drops every buffered byte.
    pub fn clear(&mut self) {
        self.head = 0;
        self.size = 0;
    }

    fn tail(&self) -> usize {
        (self.head + self.size) % self.buf.len()
    }

    /// Returns the byte `offset` positions after the head, if buffered.
    #[inline]
    pub fn peek(&self, offset: usize) -> Option<u8> {
        if offset < self.size {
            Some(self.buf[(self.head + offset) % self.buf.len()])
        } else {
            None
        }
    }

    /// Copies the first `dest.len()` buffered bytes into `dest` without consuming them.
    ///
    /// Returns `false` and leaves `dest` untouched when fewer bytes are buffered.
    pub fn peek_into(&self, dest: &mut [u8]) -> bool {
        if dest.len() > self.size {
            return false;
        }
        let first = min(dest.len(), self.buf.len() - self.head);
        dest[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        let rest = dest.len() - first;
        dest[first..].copy_from_slice(&self.buf[..rest]);
        true
    }

    /// Removes up to `bytes` bytes from the head and returns how many were removed.
    pub fn skip_bytes(&mut self, bytes: usize) -> usize {
        let skipped = min(self.size, bytes);
        self.head = (self.head + skipped) % self.buf.len();
        self.size -= skipped;
        if self.size == 0 {
            self.head = 0;
        }
        skipped
    }

    /// Appends as much of `data` as fits and returns the number of bytes stored.
    pub fn extend(&mut self, data: &[u8]) -> usize {
        let mut stored = 0;
        while stored < data.len() {
            let slot = self.write_slot();
            if slot.is_empty() {
                break;
            }
            let n = min(slot.len(), data.len() - stored);
            slot[..n].copy_from_slice(&data[stored..stored + n]);
            self.size += n;
            stored += n;
        }
        stored
    }

    /// contiguous free region starting at the tail
    fn write_slot(&mut self) -> &mut [u8] {
        if self.free_space() == 0 {
            return &mut [];
        }
        let tail = self.tail();
        let end = if tail >= self.head {
            self.buf.len()
        } else {
            self.head
        };
        &mut self.buf[tail..end]
    }

    /// Performs a single read from `upstream` into the free space at the tail.
    ///
    /// A read that times out counts as zero bytes. Only one blocking read is issued, so the
    /// call returns within the stream's own timeout.
    pub fn read_from<R: Read + ?Sized>(&mut self, upstream: &mut R) -> io::Result<usize> {
        let slot = self.write_slot();
        if slot.is_empty() {
            return Ok(0);
        }
        match upstream.read(slot) {
            Ok(read) => {
                self.size += read;
                Ok(read)
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => Ok(0),
            Err(err) => Err(err),
        }
    }
}
