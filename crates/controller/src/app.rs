//! Controller run: open the radio, connect the chain, hand both to the
//! orchestrator, then tear everything down.

use std::sync::Arc;
use std::time::Duration;

use sample_acquisition::{RadioFrontEnd, SampleAcquisitionService, SimulatedRadio};
use session_chain::{connect_bts, connect_chain, ChainEvent};
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::error::ControllerError;
use crate::orchestrator::{JamHandle, Orchestrator};
use crate::settings::{ModeSettings, RadioBackend, RadioSettings, Settings};

/// How long control loops get to exit after shutdown
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Chain outcomes seen during a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainSummary {
    pub forwarded: usize,
    pub unavailable: usize,
    pub forward_failed: usize,
    pub dropped: usize,
    pub closed: usize,
}

impl ChainSummary {
    /// Count one event
    pub fn record(&mut self, event: &ChainEvent) {
        match event {
            ChainEvent::Forwarded { .. } => self.forwarded += 1,
            ChainEvent::ResourceUnavailable { .. } => self.unavailable += 1,
            ChainEvent::ForwardFailed { .. } => self.forward_failed += 1,
            ChainEvent::Dropped { .. } => self.dropped += 1,
            ChainEvent::SessionClosed { .. } => self.closed += 1,
        }
    }

    /// Log and count events until every control loop has exited
    pub async fn collect(mut events: UnboundedReceiver<ChainEvent>) -> Self {
        let mut summary = Self::default();
        while let Some(event) = events.recv().await {
            match &event {
                ChainEvent::Forwarded { from, to, message } => {
                    debug!("Channel {} moved from session {} to {}", message.channel, from, to)
                }
                ChainEvent::ResourceUnavailable { message, .. } => {
                    warn!("No jammer left for channel {}", message.channel)
                }
                ChainEvent::ForwardFailed { to, message, .. } => {
                    warn!("Channel {} lost with session {}", message.channel, to)
                }
                ChainEvent::Dropped { ordinal, reason } => {
                    debug!("Session {} dropped a record: {}", ordinal, reason)
                }
                ChainEvent::SessionClosed { ordinal } => info!("Session {} closed", ordinal),
            }
            summary.record(&event);
        }
        summary
    }
}

fn build_radio(settings: &RadioSettings) -> Result<Box<dyn RadioFrontEnd>, ControllerError> {
    match settings.backend {
        RadioBackend::Simulated => Ok(Box::new(SimulatedRadio::default())),
        #[cfg(feature = "uhd")]
        RadioBackend::Uhd => Ok(Box::new(sample_acquisition::uhd::UhdRadio::new(
            &settings.device_args,
        ))),
        #[cfg(not(feature = "uhd"))]
        RadioBackend::Uhd => Err(ControllerError::BackendUnavailable(settings.backend.as_str())),
    }
}

/// Run one measurement or scan and return the process exit status.
///
/// `settings` must already be validated.
pub async fn run(
    settings: Settings,
    mut orchestrator: Box<dyn Orchestrator>,
) -> Result<u8, ControllerError> {
    if settings.debug {
        settings.log_effective();
    }

    let radio = build_radio(&settings.radio)?;
    let acquisition = Arc::new(SampleAcquisitionService::new(
        radio,
        settings.radio.acquisition_config(),
    )?);

    let subdevice = settings.radio.subdevice;
    let opened = Arc::clone(&acquisition);
    tokio::task::spawn_blocking(move || opened.open(subdevice)).await??;

    match settings.mode {
        ModeSettings::Offset { frequency_hz } => {
            if !settings.jammers.addresses.trim().is_empty() {
                debug!("Jammers are not used in offset mode");
            }
            let acquisition = Arc::clone(&acquisition);
            let code = tokio::task::spawn_blocking(move || {
                let actual = acquisition.tune(frequency_hz)?;
                info!(
                    "Calculating clock frequency offset at {:.1} MHz",
                    actual / 1e6
                );
                Ok::<u8, ControllerError>(orchestrator.offset_detect(&acquisition))
            })
            .await??;
            Ok(code)
        }
        ModeSettings::Scan { band } => {
            let endpoints = settings.jammers.endpoints()?;
            let (chain, events) =
                connect_chain(&endpoints, &settings.jammers.session_config()).await?;
            let collector = tokio::spawn(ChainSummary::collect(events));

            let bts = match &settings.bts {
                Some(bts) => {
                    let stream = connect_bts(&bts.endpoint()).await?.into_std()?;
                    stream.set_nonblocking(false)?;
                    Some(stream)
                }
                None => None,
            };

            let primary = chain
                .primary()
                .map(|session| JamHandle::new(Handle::current(), session));

            info!("Scanning for {} base stations", band);
            let scanning = Arc::clone(&acquisition);
            let result = tokio::task::spawn_blocking(move || {
                orchestrator.scan_band(&scanning, band, primary, bts)
            })
            .await;

            chain.shutdown().await;
            if tokio::time::timeout(SHUTDOWN_GRACE, chain.join())
                .await
                .is_err()
            {
                warn!("Some jammers did not hang up within {:?}", SHUTDOWN_GRACE);
            }

            // The channel closes once the last loop has exited
            match tokio::time::timeout(SHUTDOWN_GRACE, collector).await {
                Ok(Ok(summary)) => info!(
                    "Chain: {} forwarded, {} unavailable, {} forward failures, {} dropped, {} closed",
                    summary.forwarded,
                    summary.unavailable,
                    summary.forward_failed,
                    summary.dropped,
                    summary.closed
                ),
                Ok(Err(e)) => warn!("Chain event collector failed: {}", e),
                Err(_) => warn!("Chain events still pending after {:?}", SHUTDOWN_GRACE),
            }

            Ok(result?)
        }
    }
}
