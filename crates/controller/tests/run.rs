//! Full controller runs against the simulated radio and loopback jammers

use std::sync::mpsc;
use std::time::Duration;

use controller::{
    run, ControllerError, JamHandle, JamRequest, ModeSettings, Orchestrator, Settings,
    SurveyOrchestrator, EXIT_FAILURE, EXIT_OK,
};
use jam_protocol::{read_message, write_message, BandIndicator, Command, ControlMessage, ProtocolError};
use sample_acquisition::SampleAcquisitionService;
use session_chain::SessionError;
use tokio::net::TcpListener;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn small_settings(mode: ModeSettings) -> Settings {
    let mut settings = Settings::default();
    settings.mode = mode;
    settings.radio.buffer_capacity = 1 << 14;
    settings.validate().unwrap()
}

fn survey(settings: &Settings) -> Box<SurveyOrchestrator> {
    Box::new(SurveyOrchestrator::from_settings(settings))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_offset_run_succeeds() {
    let settings = small_settings(ModeSettings::Offset {
        frequency_hz: 935.2e6,
    });
    let orchestrator = survey(&settings);
    assert_eq!(run(settings, orchestrator).await.unwrap(), EXIT_OK);
}

/// Sends one request, then waits until the last jammer has seen it
struct FailoverWatcher {
    request: ControlMessage,
    delivered: mpsc::Receiver<ControlMessage>,
}

impl Orchestrator for FailoverWatcher {
    fn offset_detect(&mut self, _acquisition: &SampleAcquisitionService) -> u8 {
        EXIT_FAILURE
    }

    fn scan_band(
        &mut self,
        _acquisition: &SampleAcquisitionService,
        _band: BandIndicator,
        primary: Option<JamHandle>,
        bts: Option<std::net::TcpStream>,
    ) -> u8 {
        assert!(bts.is_none());
        let primary = match primary {
            Some(primary) => primary,
            None => return EXIT_FAILURE,
        };
        assert_eq!(primary.ordinal(), 2);
        primary.request(&self.request).unwrap();
        match self.delivered.recv_timeout(WAIT) {
            Ok(forwarded) if forwarded == self.request => EXIT_OK,
            _ => EXIT_FAILURE,
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scan_run_fails_over_to_second_jammer() {
    let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let second = TcpListener::bind("127.0.0.1:0").await.unwrap();

    let mut settings = small_settings(ModeSettings::Scan {
        band: BandIndicator::Egsm,
    });
    settings.jammers.addresses = "127.0.0.1 127.0.0.1".to_string();
    settings.jammers.ports = format!(
        "{} {}",
        first.local_addr().unwrap().port(),
        second.local_addr().unwrap().port()
    );

    // Primary is full and rejects everything
    let rejecting = tokio::spawn(async move {
        let (mut socket, _) = first.accept().await.unwrap();
        let request = read_message(&mut socket).await.unwrap();
        write_message(&mut socket, &ControlMessage::nack_freq(&request))
            .await
            .unwrap();
        // Hang up once the controller closes its side
        while read_message(&mut socket).await.is_ok() {}
        request
    });

    let (delivered_tx, delivered_rx) = mpsc::channel();
    let accepting = tokio::spawn(async move {
        let (mut socket, _) = second.accept().await.unwrap();
        let request = read_message(&mut socket).await.unwrap();
        delivered_tx.send(request).unwrap();
        read_message(&mut socket).await
    });

    let request = ControlMessage::add_freq(975, 90, BandIndicator::Egsm.as_byte(), 15);
    let orchestrator = Box::new(FailoverWatcher {
        request,
        delivered: delivered_rx,
    });
    assert_eq!(run(settings, orchestrator).await.unwrap(), EXIT_OK);

    let rejected = timeout(WAIT, rejecting).await.unwrap().unwrap();
    assert_eq!(rejected, request);

    // Shutdown closed the second session too
    let tail = timeout(WAIT, accepting).await.unwrap().unwrap();
    assert!(matches!(
        tail,
        Err(ProtocolError::ConnectionClosed { received: 0, .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scan_run_sends_configured_requests() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut settings = small_settings(ModeSettings::Scan {
        band: BandIndicator::Pcs,
    });
    settings.jammers.addresses = "127.0.0.1".to_string();
    settings.jammers.ports = listener.local_addr().unwrap().port().to_string();
    settings.jam_requests = vec![JamRequest {
        channel: 600,
        amplitude: 40,
        duration_seconds: 5,
    }];

    let jammer = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_message(&mut socket).await.unwrap();
        while read_message(&mut socket).await.is_ok() {}
        request
    });

    let orchestrator = survey(&settings);
    assert_eq!(run(settings, orchestrator).await.unwrap(), EXIT_OK);

    let got = timeout(WAIT, jammer).await.unwrap().unwrap();
    assert_eq!(got.command, Command::AddFreq);
    assert_eq!(got.channel, 600);
    assert_eq!(got.band, BandIndicator::Pcs.as_byte());
}

#[tokio::test]
async fn test_scan_run_without_reachable_jammer_fails() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    };
    let mut settings = small_settings(ModeSettings::default());
    settings.jammers.addresses = "127.0.0.1".to_string();
    settings.jammers.ports = port.to_string();

    let orchestrator = survey(&settings);
    assert!(matches!(
        run(settings, orchestrator).await,
        Err(ControllerError::Session(SessionError::NoSessions))
    ));
}
