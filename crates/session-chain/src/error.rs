//! Session Error Types

use jam_protocol::ProtocolError;
use thiserror::Error;

/// Errors raised while building or using the session chain
#[derive(Debug, Error)]
pub enum SessionError {
    /// Address and port lists differ in length
    #[error("{addresses} jammer addresses but {ports} ports")]
    EndpointCountMismatch { addresses: usize, ports: usize },

    /// Port text is not a valid TCP port
    #[error("Invalid port: {0}")]
    InvalidPort(String),

    /// TCP connect failed
    #[error("Connect to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// Jammers were configured but none accepted a connection
    #[error("No jammer session could be established")]
    NoSessions,

    /// Session already closed
    #[error("Session {0} is closed")]
    Closed(usize),

    /// Record transfer failed
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Socket setup failure
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}
