use crate::answers::*;
use crate::base::{Error, Result, RingByteBuffer};
use crate::types::Measurement;
use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};

/// Whether `byte0, byte1` can open a measurement packet: S != S̄ and C == 1.
#[inline]
pub fn is_aligned(byte0: u8, byte1: u8) -> bool {
    let start = byte0 & RPLIDAR_RESP_MEASUREMENT_SYNCBIT != 0;
    let start_inverse = byte0 & RPLIDAR_RESP_MEASUREMENT_SYNCBIT_INVERSE != 0;
    let check = byte1 & RPLIDAR_RESP_MEASUREMENT_CHECKBIT != 0;
    start != start_inverse && check
}

/// Decodes one measurement packet. The caller has already checked [`is_aligned`].
#[inline]
pub fn decode(packet: &[u8; RPLIDAR_MEASUREMENT_PACKET_SIZE]) -> Measurement {
    let quality = packet[0] >> RPLIDAR_RESP_MEASUREMENT_QUALITY_SHIFT;
    let angle_q6 = LittleEndian::read_u16(&packet[1..3]) >> RPLIDAR_RESP_MEASUREMENT_ANGLE_SHIFT;
    let distance_q2 = LittleEndian::read_u16(&packet[3..5]);

    Measurement {
        angle_degrees: (angle_q6 as f32 / 64.0).rem_euclid(360.0),
        distance_mm: distance_q2 / 4,
        quality,
        start_of_revolution: packet[0] & RPLIDAR_RESP_MEASUREMENT_SYNCBIT != 0,
    }
}

/// Outcome of a [`Resynchronizer::resynchronize`] call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resync {
    /// The head of the buffer is a valid alignment window; this many bytes were discarded.
    Aligned(usize),
    /// The buffer ran dry before a window was found; call again when more bytes arrive.
    NeedMoreData,
}

/// Sliding-window search for the next alignment window after corruption.
///
/// A recovery cycle may shift the read position by at most `max_shifts` bytes. The count
/// carries over calls that return [`Resync::NeedMoreData`], so a slow trickle of garbage is
/// bounded the same way as a burst.
#[derive(Debug, Clone)]
pub struct Resynchronizer {
    max_shifts: usize,
    shifts: usize,
}

impl Resynchronizer {
    pub fn new(max_shifts: usize) -> Resynchronizer {
        Resynchronizer {
            max_shifts: max_shifts.max(1),
            shifts: 0,
        }
    }

    /// Shifts consumed by the cycle in progress.
    pub fn pending_shifts(&self) -> usize {
        self.shifts
    }

    /// Discards bytes from the head of `buf` one at a time until [`is_aligned`] holds for
    /// the leading pair.
    ///
    /// Fails with [`Error::AlignmentError`] once the cycle has shifted `max_shifts` bytes
    /// without success; the next call starts a fresh cycle.
    ///
    /// # Arguments
    ///
    /// * `buf` - Buffered stream bytes. Skipped bytes are consumed from its head; the aligned
    ///   packet itself is left in place for the caller to decode.
    ///
    /// # Example
    ///
    /// ```rust
    /// use rplidarc1::base::RingByteBuffer;
    /// use rplidarc1::parsers::{Resync, Resynchronizer};
    ///
    /// let mut buf = RingByteBuffer::with_capacity(16);
    /// buf.extend(&[0x00, 0x3E, 0x01, 0x00, 0x10, 0x00]);
    /// let mut resync = Resynchronizer::new(8);
    /// assert_eq!(resync.resynchronize(&mut buf).unwrap(), Resync::Aligned(1));
    /// assert_eq!(buf.len(), 5);
    /// ```
    pub fn resynchronize(&mut self, buf: &mut RingByteBuffer) -> Result<Resync> {
        loop {
            let (byte0, byte1) = match (buf.peek(0), buf.peek(1)) {
                (Some(b0), Some(b1)) => (b0, b1),
                _ => {
                    trace!(
                        "Resync paused after {} shifts, waiting for data",
                        self.shifts
                    );
                    return Ok(Resync::NeedMoreData);
                }
            };

            if is_aligned(byte0, byte1) {
                let shifts = self.shifts;
                self.shifts = 0;
                trace!("Resync found alignment window after {} shifts", shifts);
                return Ok(Resync::Aligned(shifts));
            }

            if self.shifts >= self.max_shifts {
                let shifts = self.shifts;
                self.shifts = 0;
                warn!("No alignment window within {} shifts", shifts);
                return Err(Error::AlignmentError { shifts });
            }

            buf.skip_bytes(1);
            self.shifts += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn packet(start: bool, quality: u8, angle_q6: u16, distance_q2: u16) -> [u8; 5] {
        let s = start as u8;
        let angle = (angle_q6 << 1) | 1;
        [
            (quality << 2) | ((1 - s) << 1) | s,
            angle as u8,
            (angle >> 8) as u8,
            distance_q2 as u8,
            (distance_q2 >> 8) as u8,
        ]
    }

    #[test]
    fn alignment_predicate_exhaustive() {
        for byte0 in 0..=255u8 {
            for byte1 in 0..=255u8 {
                let s = byte0 & 0x1;
                let s_inv = (byte0 >> 1) & 0x1;
                let c = byte1 & 0x1;
                let expected = s != s_inv && c == 1;
                assert_eq!(
                    is_aligned(byte0, byte1),
                    expected,
                    "byte0={:08b} byte1={:08b}",
                    byte0,
                    byte1
                );
            }
        }
    }

    #[test]
    fn decode_known_packet() {
        let m = decode(&packet(true, 47, 90 * 64, 1000 * 4));
        assert_eq!(m.quality, 47);
        assert_eq!(m.angle_degrees, 90.0);
        assert_eq!(m.distance_mm, 1000);
        assert!(m.start_of_revolution);

        let m = decode(&packet(false, 0, 64 * 180 + 32, 6));
        assert_eq!(m.angle_degrees, 180.5);
        assert_eq!(m.distance_mm, 1);
        assert!(!m.start_of_revolution);
    }

    #[test]
    fn decode_wraps_out_of_range_angle() {
        // 15-bit angle field can encode up to ~512 degrees
        let m = decode(&packet(false, 10, 400 * 64, 40));
        assert_eq!(m.angle_degrees, 40.0);
    }

    #[test]
    fn resync_skips_single_corrupt_byte() {
        let mut buf = RingByteBuffer::with_capacity(64);
        buf.extend(&[0x00]);
        buf.extend(&packet(false, 10, 64, 40));
        let mut resync = Resynchronizer::new(8);
        assert_eq!(resync.resynchronize(&mut buf).unwrap(), Resync::Aligned(1));
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn resync_resumes_across_calls() {
        let mut buf = RingByteBuffer::with_capacity(64);
        buf.extend(&[0xFF, 0xFF, 0xFF]);
        let mut resync = Resynchronizer::new(8);
        assert_eq!(resync.resynchronize(&mut buf).unwrap(), Resync::NeedMoreData);
        assert_eq!(resync.pending_shifts(), 2);

        buf.extend(&packet(true, 1, 1, 4));
        assert_eq!(resync.resynchronize(&mut buf).unwrap(), Resync::Aligned(3));
        assert_eq!(resync.pending_shifts(), 0);
    }

    #[test]
    fn resync_gives_up_on_dead_stream() {
        for filler in [0x00u8, 0xFF] {
            let mut buf = RingByteBuffer::with_capacity(256);
            buf.extend(&[filler; 200]);
            let mut resync = Resynchronizer::new(16);
            match resync.resynchronize(&mut buf) {
                Err(Error::AlignmentError { shifts }) => assert_eq!(shifts, 16),
                other => panic!("expected alignment error, got {:?}", other),
            }
            assert_eq!(buf.len(), 200 - 16);
            assert_eq!(resync.pending_shifts(), 0);
        }
    }

    proptest! {
        #[test]
        fn decode_stays_in_range(
            byte0 in any::<u8>(),
            byte1 in any::<u8>(),
            byte2 in any::<u8>(),
            byte3 in any::<u8>(),
            byte4 in any::<u8>(),
        ) {
            prop_assume!(is_aligned(byte0, byte1));
            let raw = [byte0, byte1, byte2, byte3, byte4];
            let first = decode(&raw);
            let second = decode(&raw);
            prop_assert_eq!(first, second);
            prop_assert!(first.angle_degrees >= 0.0 && first.angle_degrees < 360.0);
            prop_assert!(first.quality <= 63);
        }

        #[test]
        fn resync_always_terminates(
            garbage in proptest::collection::vec(any::<u8>(), 0..512),
            max_shifts in 1usize..128,
        ) {
            let mut buf = RingByteBuffer::with_capacity(512);
            buf.extend(&garbage);
            let mut resync = Resynchronizer::new(max_shifts);
            match resync.resynchronize(&mut buf) {
                Ok(Resync::Aligned(shifts)) => {
                    prop_assert!(shifts <= max_shifts);
                    prop_assert!(is_aligned(buf.peek(0).unwrap(), buf.peek(1).unwrap()));
                }
                Ok(Resync::NeedMoreData) => prop_assert!(buf.len() < 2),
                Err(Error::AlignmentError { shifts }) => prop_assert_eq!(shifts, max_shifts),
                Err(e) => prop_assert!(false, "unexpected error {:?}", e),
            }
        }
    }
}
