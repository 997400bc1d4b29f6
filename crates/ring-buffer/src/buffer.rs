//! Ring Buffer Implementation

use crate::RingBufferError;

/// Default buffer capacity (2^20 samples, ~3.9s at the GSM symbol rate)
pub const DEFAULT_CAPACITY: usize = 1 << 20;

/// Result of a truncating write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteOutcome {
    /// Samples stored in the buffer
    pub written: usize,
    /// Samples discarded because the buffer was full
    pub dropped: usize,
}

impl WriteOutcome {
    /// Whether this write lost data
    pub fn overran(&self) -> bool {
        self.dropped > 0
    }
}

/// Fixed-capacity single-producer/single-consumer circular store.
///
/// `available_to_read() + available_to_write() == capacity()` holds after
/// every operation. Storage is allocated once and never resized.
pub struct RingBuffer<T> {
    /// Pre-allocated storage
    storage: Box<[T]>,
    /// Read cursor
    read_pos: usize,
    /// Number of readable slots
    len: usize,
    /// Span handed out by the last `reserve_write`
    reserved: usize,
    /// Truncated writes
    overruns: u64,
    /// Total samples committed (for statistics)
    total_written: u64,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Create a new ring buffer with given capacity
    pub fn new(capacity: usize) -> Result<Self, RingBufferError> {
        if capacity == 0 {
            return Err(RingBufferError::ZeroCapacity);
        }
        Ok(Self {
            storage: vec![T::default(); capacity].into_boxed_slice(),
            read_pos: 0,
            len: 0,
            reserved: 0,
            overruns: 0,
            total_written: 0,
        })
    }

    /// Create a buffer with default capacity
    pub fn with_default_capacity() -> Self {
        Self {
            storage: vec![T::default(); DEFAULT_CAPACITY].into_boxed_slice(),
            read_pos: 0,
            len: 0,
            reserved: 0,
            overruns: 0,
            total_written: 0,
        }
    }

    /// Get the buffer capacity
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Samples waiting to be read
    pub fn available_to_read(&self) -> usize {
        self.len
    }

    /// Free slots
    pub fn available_to_write(&self) -> usize {
        self.capacity() - self.len
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if buffer is full
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Get fill ratio (0.0 to 1.0)
    pub fn fill_ratio(&self) -> f64 {
        self.len as f64 / self.capacity() as f64
    }

    fn write_pos(&self) -> usize {
        (self.read_pos + self.len) % self.capacity()
    }

    /// Borrow the contiguous free region starting at the write cursor.
    ///
    /// The span never wraps, so it may be shorter than
    /// `available_to_write()`. Its length is the most that the following
    /// `commit_write` may advance by.
    pub fn reserve_write(&mut self) -> &mut [T] {
        let start = self.write_pos();
        let end = (start + self.available_to_write()).min(self.capacity());
        self.reserved = end - start;
        &mut self.storage[start..end]
    }

    /// Advance the write cursor over `n` samples filled in the reserved span
    pub fn commit_write(&mut self, n: usize) -> Result<(), RingBufferError> {
        if n > self.reserved {
            return Err(RingBufferError::CommitExceedsReservation {
                requested: n,
                reserved: self.reserved,
            });
        }
        self.len += n;
        self.reserved = 0;
        self.total_written += n as u64;
        Ok(())
    }

    /// Copy `src` in, truncating at the free space.
    ///
    /// A truncated write counts exactly one overrun and leaves already
    /// buffered samples untouched.
    pub fn write(&mut self, src: &[T]) -> WriteOutcome {
        let mut written = 0;
        // At most two spans: up to the end of storage, then from the front
        while written < src.len() {
            let span = self.reserve_write();
            if span.is_empty() {
                break;
            }
            let n = span.len().min(src.len() - written);
            span[..n].copy_from_slice(&src[written..written + n]);
            self.len += n;
            self.reserved = 0;
            self.total_written += n as u64;
            written += n;
        }

        let dropped = src.len() - written;
        if dropped > 0 {
            self.overruns += 1;
        }
        WriteOutcome { written, dropped }
    }

    /// Copy up to `dest.len()` samples out and advance the read cursor.
    ///
    /// Non-blocking: returns fewer samples than requested when the
    /// buffer runs dry.
    pub fn read(&mut self, dest: &mut [T]) -> usize {
        let count = dest.len().min(self.len);
        let first = count.min(self.capacity() - self.read_pos);

        dest[..first].copy_from_slice(&self.storage[self.read_pos..self.read_pos + first]);
        dest[first..count].copy_from_slice(&self.storage[..count - first]);

        self.read_pos = (self.read_pos + count) % self.capacity();
        self.len -= count;
        count
    }

    /// Discard all buffered data
    pub fn flush(&mut self) {
        self.read_pos = 0;
        self.len = 0;
        self.reserved = 0;
    }

    /// Number of truncated writes since creation
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Record an overrun detected by the producer outside `write`
    pub fn record_overrun(&mut self) {
        self.overruns += 1;
    }

    /// Get total samples written (for statistics)
    pub fn total_written(&self) -> u64 {
        self.total_written
    }
}

impl<T> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.storage.len())
            .field("len", &self.len)
            .field("read_pos", &self.read_pos)
            .field("overruns", &self.overruns)
            .finish()
    }
}
