//! KalJam Controller
//!
//! Loads settings, opens the radio, connects the jammer chain and runs
//! an orchestrator over both.

mod app;
mod error;
mod logging;
mod orchestrator;
mod settings;
mod survey;

pub use app::{run, ChainSummary, SHUTDOWN_GRACE};
pub use error::ControllerError;
pub use logging::{init_logging, LogFormat};
pub use orchestrator::{JamHandle, Orchestrator, EXIT_FAILURE, EXIT_OK};
pub use settings::{
    BtsSettings, JamRequest, JammerSettings, ModeSettings, RadioBackend, RadioSettings, Settings,
};
pub use survey::{PowerReport, SurveyOrchestrator, DEFAULT_BLOCK_SIZE};
