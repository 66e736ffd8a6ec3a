/// Running XOR checksum appended to request frames that carry a payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct Checksum {
    current: u8,
}

impl Checksum {
    #[inline]
    pub fn new() -> Checksum {
        Checksum { current: 0 }
    }

    /// Checksum of a complete byte slice.
    #[inline]
    pub fn of(data: &[u8]) -> u8 {
        let mut checksum = Checksum::new();
        checksum.push_slice(data);
        checksum.checksum()
    }

    #[inline]
    pub fn push(&mut self, byte: u8) {
        self.current ^= byte;
    }

    #[inline]
    pub fn push_slice(&mut self, data: &[u8]) {
        data.iter().for_each(|b| self.push(*b));
    }

    #[inline]
    pub fn checksum(&self) -> u8 {
        self.current
    }
}
