//! Sample Ring Buffer
//!
//! Provides a fixed-capacity SPSC ring buffer for complex radio samples.
//! The producer reserves a contiguous span, fills it and commits; the
//! consumer drains with non-blocking reads. A write that does not fit is
//! truncated and counted as an overrun.

mod buffer;

pub use buffer::{RingBuffer, WriteOutcome, DEFAULT_CAPACITY};
pub use num_complex::Complex32;

use thiserror::Error;

/// Ring buffer holding complex float samples
pub type SampleBuffer = RingBuffer<Complex32>;

/// Errors raised by ring buffer operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingBufferError {
    /// Capacity must be at least one slot
    #[error("Ring buffer capacity must be non-zero")]
    ZeroCapacity,

    /// Commit larger than the span handed out by the last reserve
    #[error("Commit of {requested} samples exceeds reserved span of {reserved}")]
    CommitExceedsReservation { requested: usize, reserved: usize },
}
