//! Byte ring shared between UART interrupt handlers and the foreground

/// Fixed-size byte FIFO. `N` must be a power of two; one slot stays empty to
/// tell a full ring from an empty one.
pub struct RingBuffer<const N: usize> {
    data: [u8; N],
    write_idx: usize,
    read_idx: usize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two(), "ring size must be a power of two");
        N - 1
    };

    pub const fn new() -> Self {
        Self {
            data: [0; N],
            write_idx: 0,
            read_idx: 0,
        }
    }

    /// Append a byte; `false` when the ring is full
    pub fn write(&mut self, byte: u8) -> bool {
        let next_write = (self.write_idx + 1) & Self::MASK;
        if next_write != self.read_idx {
            self.data[self.write_idx] = byte;
            self.write_idx = next_write;
            true
        } else {
            false
        }
    }

    pub fn read(&mut self) -> Option<u8> {
        if self.read_idx != self.write_idx {
            let byte = self.data[self.read_idx];
            self.read_idx = (self.read_idx + 1) & Self::MASK;
            Some(byte)
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.write_idx.wrapping_sub(self.read_idx) & Self::MASK
    }

    pub fn is_empty(&self) -> bool {
        self.read_idx == self.write_idx
    }

    pub fn is_full(&self) -> bool {
        ((self.write_idx + 1) & Self::MASK) == self.read_idx
    }

    pub fn clear(&mut self) {
        self.read_idx = self.write_idx;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
