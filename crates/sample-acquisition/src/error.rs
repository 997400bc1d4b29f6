//! Acquisition Error Types

use thiserror::Error;

/// Errors reported by a radio front-end driver
#[derive(Debug, Error)]
pub enum RadioError {
    /// Device could not be created or configured
    #[error("Failed to open radio: {0}")]
    Open(String),

    /// Retune rejected by the hardware
    #[error("Tune to {freq_hz} Hz failed: {reason}")]
    Tune { freq_hz: f64, reason: String },

    /// Gain, antenna or stream setting rejected
    #[error("Radio control error: {0}")]
    Control(String),

    /// Packet receive failed
    #[error("Receive error: {0}")]
    Receive(String),
}

/// Errors surfaced by the acquisition service
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Hardware call attempted before `open`
    #[error("Radio not opened")]
    NotOpen,

    /// Gain ratio outside [0.0, 1.0]
    #[error("Gain ratio {0} outside [0.0, 1.0]")]
    GainOutOfRange(f32),

    /// Hardware returned fewer samples than a full packet
    #[error("Short receive: {received} of {expected} samples")]
    ShortReceive { received: usize, expected: usize },

    /// Ring buffer could not be allocated
    #[error("Sample buffer error: {0}")]
    Buffer(#[from] ring_buffer::RingBufferError),

    /// A thread panicked while holding the hardware or buffer lock
    #[error("Acquisition lock poisoned")]
    LockPoisoned,

    /// Driver failure
    #[error(transparent)]
    Radio(#[from] RadioError),
}
