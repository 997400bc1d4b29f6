//! Protocol Error Types

use thiserror::Error;

/// Errors raised while encoding, decoding or moving control records
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Command byte outside the known range
    #[error("Unknown command byte: {0}")]
    UnknownCommand(u8),

    /// Peer closed before a whole record arrived
    #[error("Connection closed after {received} of {expected} bytes")]
    ConnectionClosed { received: usize, expected: usize },

    /// Band name not recognised
    #[error("Unknown band indicator: {0}")]
    UnknownBand(String),

    /// Socket I/O failure
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Whether the connection can keep being read after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ProtocolError::UnknownCommand(_))
    }
}
