//! Built-in survey orchestrator
//!
//! Reports received power instead of running detection; in scan mode it
//! then issues the configured jam requests to the chain.

use std::net::TcpStream;

use jam_protocol::BandIndicator;
use sample_acquisition::{AcquisitionError, Complex32, SampleAcquisitionService};
use tracing::{error, info, warn};

use crate::orchestrator::{JamHandle, Orchestrator, EXIT_FAILURE, EXIT_OK};
use crate::settings::{JamRequest, Settings};

/// Samples read per survey block
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 16;

/// Full-scale SC16 power
const FULL_SCALE_POWER: f64 = 32768.0 * 32768.0;

/// Mean power of one sample block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerReport {
    /// Samples measured
    pub samples: usize,
    /// Mean |x|^2 in ADC counts
    pub mean_power: f64,
}

impl PowerReport {
    pub fn measure(samples: &[Complex32]) -> Self {
        let total: f64 = samples.iter().map(|s| f64::from(s.norm_sqr())).sum();
        let mean_power = if samples.is_empty() {
            0.0
        } else {
            total / samples.len() as f64
        };
        Self {
            samples: samples.len(),
            mean_power,
        }
    }

    /// Power relative to full scale
    pub fn dbfs(&self) -> f64 {
        10.0 * (self.mean_power / FULL_SCALE_POWER).max(f64::MIN_POSITIVE).log10()
    }
}

/// Power survey plus scripted jam requests
#[derive(Debug, Clone)]
pub struct SurveyOrchestrator {
    block_size: usize,
    flush_packets: usize,
    requests: Vec<JamRequest>,
}

impl SurveyOrchestrator {
    pub fn new(block_size: usize, flush_packets: usize, requests: Vec<JamRequest>) -> Self {
        Self {
            block_size,
            flush_packets,
            requests,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            DEFAULT_BLOCK_SIZE.min(settings.radio.buffer_capacity),
            settings.radio.flush_packets,
            settings.jam_requests.clone(),
        )
    }

    fn survey(&self, acquisition: &SampleAcquisitionService) -> Result<PowerReport, AcquisitionError> {
        acquisition.start()?;
        acquisition.flush(self.flush_packets)?;

        let mut block = vec![Complex32::default(); self.block_size];
        let count = acquisition.read(&mut block)?;
        let report = PowerReport::measure(&block[..count]);

        acquisition.stop()?;
        Ok(report)
    }

    fn issue_requests(&self, band: BandIndicator, primary: &JamHandle) -> usize {
        let mut sent = 0;
        for request in &self.requests {
            match primary.jam(
                request.channel,
                request.amplitude,
                band,
                request.duration_seconds,
            ) {
                Ok(()) => {
                    info!(
                        "Requested {} channel {} for {} s via session {}",
                        band, request.channel, request.duration_seconds, primary.ordinal()
                    );
                    sent += 1;
                }
                Err(e) => error!("Jam request for channel {} failed: {}", request.channel, e),
            }
        }
        sent
    }
}

impl Orchestrator for SurveyOrchestrator {
    fn offset_detect(&mut self, acquisition: &SampleAcquisitionService) -> u8 {
        match self.survey(acquisition) {
            Ok(report) => {
                info!(
                    "Received {:.1} dBFS over {} samples",
                    report.dbfs(),
                    report.samples
                );
                EXIT_OK
            }
            Err(e) => {
                error!("Offset survey failed: {}", e);
                EXIT_FAILURE
            }
        }
    }

    fn scan_band(
        &mut self,
        acquisition: &SampleAcquisitionService,
        band: BandIndicator,
        primary: Option<JamHandle>,
        bts: Option<TcpStream>,
    ) -> u8 {
        if let Some(bts) = &bts {
            match bts.peer_addr() {
                Ok(peer) => info!("BTS link open to {}", peer),
                Err(e) => warn!("BTS link unusable: {}", e),
            }
        }

        let report = match self.survey(acquisition) {
            Ok(report) => report,
            Err(e) => {
                error!("{} scan failed: {}", band, e);
                return EXIT_FAILURE;
            }
        };
        info!(
            "{}: {:.1} dBFS over {} samples",
            band,
            report.dbfs(),
            report.samples
        );

        match (&primary, self.requests.is_empty()) {
            (_, true) => {}
            (Some(primary), false) => {
                let sent = self.issue_requests(band, primary);
                info!("{} of {} jam requests sent", sent, self.requests.len());
            }
            (None, false) => {
                warn!(
                    "No jammer connected, skipping {} jam requests",
                    self.requests.len()
                );
            }
        }
        EXIT_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jam_protocol::{read_message, Command};
    use sample_acquisition::{AcquisitionConfig, SimulatedRadio, SimulatedRadioConfig};
    use session_chain::{connect_chain, Endpoint, SessionConfig};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::runtime::Handle;
    use tokio::time::timeout;

    fn service() -> Arc<SampleAcquisitionService> {
        let radio = SimulatedRadio::new(SimulatedRadioConfig {
            samples_per_packet: 100,
            ..Default::default()
        });
        let config = AcquisitionConfig {
            buffer_capacity: 4096,
            ..Default::default()
        };
        let service = SampleAcquisitionService::new(Box::new(radio), config).unwrap();
        service.open(1).unwrap();
        Arc::new(service)
    }

    #[test]
    fn test_power_of_known_tone() {
        let samples = vec![Complex32::new(3.0, 4.0); 10];
        let report = PowerReport::measure(&samples);
        assert_eq!(report.samples, 10);
        assert!((report.mean_power - 25.0).abs() < 1e-9);
        assert!(PowerReport::measure(&[]).dbfs().is_finite());
    }

    #[test]
    fn test_offset_survey_reports_power() {
        let acquisition = service();
        let mut survey = SurveyOrchestrator::new(1000, 2, Vec::new());
        assert_eq!(survey.offset_detect(&acquisition), EXIT_OK);
    }

    #[test]
    fn test_survey_fails_before_open() {
        let radio = SimulatedRadio::default();
        let acquisition =
            SampleAcquisitionService::new(Box::new(radio), AcquisitionConfig::default()).unwrap();
        let mut survey = SurveyOrchestrator::new(1000, 2, Vec::new());
        assert_eq!(survey.offset_detect(&acquisition), EXIT_FAILURE);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_scan_sends_requests_to_primary() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (chain, _events) = connect_chain(
            &[Endpoint::new("127.0.0.1", port)],
            &SessionConfig::default(),
        )
        .await
        .unwrap();
        let (mut jammer, _) = listener.accept().await.unwrap();

        let primary = JamHandle::new(Handle::current(), chain.primary().unwrap());
        let acquisition = service();
        let requests = vec![JamRequest {
            channel: 62,
            amplitude: 150,
            duration_seconds: 10,
        }];

        let code = tokio::task::spawn_blocking(move || {
            let mut survey = SurveyOrchestrator::new(1000, 1, requests);
            survey.scan_band(&acquisition, BandIndicator::Gsm900, Some(primary), None)
        })
        .await
        .unwrap();
        assert_eq!(code, EXIT_OK);

        let got = timeout(Duration::from_secs(5), read_message(&mut jammer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.command, Command::AddFreq);
        assert_eq!(got.channel, 62);
        assert_eq!(got.band, BandIndicator::Gsm900.as_byte());
    }
}
