//! Controller Error Types

use sample_acquisition::AcquisitionError;
use session_chain::SessionError;
use thiserror::Error;

/// Errors that abort a controller run
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Settings could not be read or parsed
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// A setting is out of range
    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// Requested radio backend was not compiled in
    #[error("Radio backend '{0}' is not available in this build")]
    BackendUnavailable(&'static str),

    /// Radio open, tune or receive failed
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    /// Jammer or BTS connection failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Blocking orchestrator task panicked
    #[error("Orchestrator task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Socket handover failed
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
}

impl ControllerError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ControllerError::InvalidSetting {
            field,
            reason: reason.into(),
        }
    }
}
