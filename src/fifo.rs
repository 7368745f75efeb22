//! Software receive FIFO backing the interrupt-driven channel mode.
//!
//! The buffer has a fixed capacity chosen when the channel is opened.  It is filled by the
//! interrupt dispatcher (draining the 64-byte hardware FIFO) and emptied by the channel's read
//! methods.  A full buffer rejects further bytes instead of overwriting the oldest ones.
use alloc::boxed::Box;
use alloc::vec;

/// A byte was rejected because the buffer is at capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferFull;

/// No byte is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BufferEmpty;

/// Fixed-capacity circular byte buffer.
pub struct CircularByteBuffer {
    storage: Box<[u8]>,
    write: usize,
    read: usize,
    count: usize,
}

impl CircularByteBuffer {
    /// Allocate an empty buffer holding up to `capacity` bytes.
    ///
    /// # Panics
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0);
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            write: 0,
            read: 0,
            count: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == self.capacity()
    }

    /// Number of bytes that can still be written.
    pub fn free(&self) -> usize {
        self.capacity() - self.count
    }

    /// Append one byte.  The buffer is left untouched when it is full.
    pub fn write(&mut self, byte: u8) -> Result<(), BufferFull> {
        if self.is_full() {
            return Err(BufferFull);
        }
        self.storage[self.write] = byte;
        self.write = (self.write + 1) % self.capacity();
        self.count += 1;
        Ok(())
    }

    /// Remove and return the oldest byte.
    pub fn read(&mut self) -> Result<u8, BufferEmpty> {
        let byte = self.peek()?;
        self.read = (self.read + 1) % self.capacity();
        self.count -= 1;
        Ok(byte)
    }

    /// Return the oldest byte without removing it.
    pub fn peek(&self) -> Result<u8, BufferEmpty> {
        if self.is_empty() {
            return Err(BufferEmpty);
        }
        Ok(self.storage[self.read])
    }

    /// Move up to `max_count` of the oldest bytes into `dest`, returning how many were moved.
    ///
    /// The amount is also limited by `dest.len()` and by the number of buffered bytes.
    pub fn move_into(&mut self, dest: &mut [u8], max_count: usize) -> usize {
        let n = max_count.min(dest.len()).min(self.count);
        if n == 0 {
            return 0;
        }

        // contiguous run up to the end of storage, then the wrapped remainder from index 0
        let first = n.min(self.capacity() - self.read);
        dest[..first].copy_from_slice(&self.storage[self.read..self.read + first]);
        let rest = n - first;
        if rest > 0 {
            dest[first..n].copy_from_slice(&self.storage[..rest]);
        }

        self.read = (self.read + n) % self.capacity();
        self.count -= n;
        n
    }

    /// Drop all buffered bytes.  Storage is not zeroed.
    pub fn clear(&mut self) {
        self.write = 0;
        self.read = 0;
        self.count = 0;
    }

    /// Logical access relative to the oldest byte; `None` when `index >= len()`.
    pub fn get(&self, index: usize) -> Option<u8> {
        if index >= self.count {
            return None;
        }
        Some(self.storage[(self.read + index) % self.capacity()])
    }
}

impl core::ops::Index<usize> for CircularByteBuffer {
    type Output = u8;

    fn index(&self, index: usize) -> &u8 {
        assert!(
            index < self.count,
            "index {} out of range for buffer holding {} bytes",
            index,
            self.count
        );
        &self.storage[(self.read + index) % self.capacity()]
    }
}

impl core::fmt::Debug for CircularByteBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CircularByteBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.count)
            .finish()
    }
}
