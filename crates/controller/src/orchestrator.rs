//! Orchestrator seam
//!
//! Detection algorithms run on a blocking thread. They pull samples from
//! the acquisition service and issue jam commands through a [`JamHandle`].

use std::net::TcpStream;
use std::sync::Arc;

use jam_protocol::{BandIndicator, ControlMessage};
use sample_acquisition::SampleAcquisitionService;
use session_chain::{Session, SessionError};
use tokio::runtime::Handle;

/// Exit status for a successful run
pub const EXIT_OK: u8 = 0;
/// Exit status for a failed run
pub const EXIT_FAILURE: u8 = 1;

/// Offset and band-scan algorithms driven by the controller
pub trait Orchestrator: Send {
    /// Estimate clock offset on the frequency the radio is tuned to
    fn offset_detect(&mut self, acquisition: &SampleAcquisitionService) -> u8;

    /// Scan `band` for base stations, jamming through `primary` when
    /// a chain is connected
    fn scan_band(
        &mut self,
        acquisition: &SampleAcquisitionService,
        band: BandIndicator,
        primary: Option<JamHandle>,
        bts: Option<TcpStream>,
    ) -> u8;
}

/// Blocking access to the primary jammer session.
///
/// Rejections are handled by the chain's control loops, so a successful
/// `request` only means the record was written.
#[derive(Debug, Clone)]
pub struct JamHandle {
    runtime: Handle,
    session: Arc<Session>,
}

impl JamHandle {
    pub fn new(runtime: Handle, session: Arc<Session>) -> Self {
        Self { runtime, session }
    }

    /// Ordinal of the session requests go to
    pub fn ordinal(&self) -> usize {
        self.session.ordinal()
    }

    /// Send one record. Must not be called from an async task.
    pub fn request(&self, message: &ControlMessage) -> Result<(), SessionError> {
        self.runtime.block_on(self.session.send(message))
    }

    /// Start jamming a channel
    pub fn jam(
        &self,
        channel: u16,
        amplitude: u8,
        band: BandIndicator,
        duration_seconds: u16,
    ) -> Result<(), SessionError> {
        self.request(&ControlMessage::add_freq(
            channel,
            amplitude,
            band.as_byte(),
            duration_seconds,
        ))
    }

    /// Stop jamming a channel
    pub fn release(&self, channel: u16, band: BandIndicator) -> Result<(), SessionError> {
        self.request(&ControlMessage::del_freq(channel, band.as_byte()))
    }

    /// Stop everything on the primary jammer
    pub fn clear_all(&self) -> Result<(), SessionError> {
        self.request(&ControlMessage::clear_all())
    }
}
