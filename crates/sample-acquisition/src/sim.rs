//! Simulated radio front-end
//!
//! Generates a deterministic complex tone in SC16 packets so the rest of
//! the pipeline can run without hardware. A shared [`SimCounters`] counts
//! hardware calls and injects faults for tests.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::RadioError;
use crate::radio::{OpenParams, RadioFrontEnd};

/// Simulated radio configuration
#[derive(Debug, Clone)]
pub struct SimulatedRadioConfig {
    /// Complex samples per packet (USRP2 over 1500-byte MTU)
    pub samples_per_packet: usize,
    /// Reported gain range in dB
    pub gain_range: (f64, f64),
    /// Reported antenna ports
    pub antennas: Vec<String>,
    /// Tone offset from the tuned frequency (Hz)
    pub tone_offset_hz: f64,
    /// Tone amplitude in ADC counts
    pub amplitude: f64,
}

impl Default for SimulatedRadioConfig {
    fn default() -> Self {
        Self {
            samples_per_packet: 363,
            gain_range: (0.0, 31.5),
            antennas: vec!["TX/RX".to_string(), "RX2".to_string()],
            // FCCH burst sits a quarter of the GSM bit rate above the carrier
            tone_offset_hz: 1_625_000.0 / 24.0,
            amplitude: 2000.0,
        }
    }
}

/// Call counters and fault switches shared with a [`SimulatedRadio`]
#[derive(Debug, Default)]
pub struct SimCounters {
    opens: AtomicUsize,
    tunes: AtomicUsize,
    gain_calls: AtomicUsize,
    antenna_calls: AtomicUsize,
    receives: AtomicUsize,
    last_gain_db_bits: AtomicU64,
    antenna: Mutex<Option<String>>,
    streaming: AtomicBool,
    fail_next_tune: AtomicBool,
    short_receive: AtomicBool,
}

impl SimCounters {
    /// Number of successful opens
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of tune calls
    pub fn tunes(&self) -> usize {
        self.tunes.load(Ordering::SeqCst)
    }

    /// Number of `set_gain_db` calls
    pub fn gain_calls(&self) -> usize {
        self.gain_calls.load(Ordering::SeqCst)
    }

    /// Number of `set_antenna` calls
    pub fn antenna_calls(&self) -> usize {
        self.antenna_calls.load(Ordering::SeqCst)
    }

    /// Number of packets delivered
    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    /// Gain most recently applied (dB)
    pub fn last_gain_db(&self) -> f64 {
        f64::from_bits(self.last_gain_db_bits.load(Ordering::SeqCst))
    }

    /// Antenna most recently selected
    pub fn antenna(&self) -> Option<String> {
        self.antenna.lock().ok().and_then(|a| a.clone())
    }

    /// Whether the simulated stream is running
    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    /// Make the next tune fail
    pub fn fail_next_tune(&self) {
        self.fail_next_tune.store(true, Ordering::SeqCst);
    }

    /// Make every following receive return half a packet
    pub fn short_receives(&self, enabled: bool) {
        self.short_receive.store(enabled, Ordering::SeqCst);
    }
}

/// Software stand-in for a receive front-end
pub struct SimulatedRadio {
    config: SimulatedRadioConfig,
    counters: Arc<SimCounters>,
    sample_rate: f64,
    master_clock_hz: f64,
    center_freq: f64,
    phase: f64,
    open: bool,
}

impl SimulatedRadio {
    /// Create a simulated radio
    pub fn new(config: SimulatedRadioConfig) -> Self {
        info!("Creating simulated radio ({} samples/packet)", config.samples_per_packet);
        Self {
            config,
            counters: Arc::new(SimCounters::default()),
            sample_rate: 0.0,
            master_clock_hz: 0.0,
            center_freq: 0.0,
            phase: 0.0,
            open: false,
        }
    }

    /// Handle for observing calls after the radio is moved into a service
    pub fn counters(&self) -> Arc<SimCounters> {
        Arc::clone(&self.counters)
    }

    fn ensure_open(&self) -> Result<(), RadioError> {
        if self.open {
            Ok(())
        } else {
            Err(RadioError::Control("device not open".to_string()))
        }
    }
}

impl Default for SimulatedRadio {
    fn default() -> Self {
        Self::new(SimulatedRadioConfig::default())
    }
}

impl RadioFrontEnd for SimulatedRadio {
    fn open(&mut self, params: &OpenParams) -> Result<(), RadioError> {
        if params.sample_rate <= 0.0 {
            return Err(RadioError::Open(format!(
                "invalid sample rate {}",
                params.sample_rate
            )));
        }
        // The FPGA can only decimate the master clock by an integer
        self.master_clock_hz = params.fpga_master_clock_hz as f64;
        let decimation = (self.master_clock_hz / params.sample_rate).round().max(1.0);
        self.sample_rate = self.master_clock_hz / decimation;
        self.open = true;
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        debug!(
            "Simulated radio open: side {}, {:.1} S/s, {} reference",
            params.subdevice,
            self.sample_rate,
            params.clock_source.as_str()
        );
        Ok(())
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn samples_per_packet(&self) -> usize {
        self.config.samples_per_packet
    }

    fn tune(&mut self, freq_hz: f64) -> Result<f64, RadioError> {
        self.ensure_open()?;
        self.counters.tunes.fetch_add(1, Ordering::SeqCst);
        if self.counters.fail_next_tune.swap(false, Ordering::SeqCst) {
            return Err(RadioError::Tune {
                freq_hz,
                reason: "injected failure".to_string(),
            });
        }
        // 32-bit DDS resolution
        let step = self.master_clock_hz / 4_294_967_296.0;
        self.center_freq = (freq_hz / step).round() * step;
        Ok(self.center_freq)
    }

    fn gain_range(&self) -> Result<(f64, f64), RadioError> {
        Ok(self.config.gain_range)
    }

    fn set_gain_db(&mut self, gain_db: f64) -> Result<(), RadioError> {
        self.ensure_open()?;
        self.counters.gain_calls.fetch_add(1, Ordering::SeqCst);
        self.counters
            .last_gain_db_bits
            .store(gain_db.to_bits(), Ordering::SeqCst);
        Ok(())
    }

    fn antennas(&self) -> Result<Vec<String>, RadioError> {
        Ok(self.config.antennas.clone())
    }

    fn set_antenna(&mut self, name: &str) -> Result<(), RadioError> {
        self.ensure_open()?;
        if !self.config.antennas.iter().any(|a| a == name) {
            return Err(RadioError::Control(format!("no antenna named {}", name)));
        }
        self.counters.antenna_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut antenna) = self.counters.antenna.lock() {
            *antenna = Some(name.to_string());
        }
        Ok(())
    }

    fn start(&mut self) -> Result<(), RadioError> {
        self.ensure_open()?;
        self.counters.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioError> {
        self.counters.streaming.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn receive_packet(&mut self, buf: &mut [i16]) -> Result<usize, RadioError> {
        self.ensure_open()?;
        if !self.counters.is_streaming() {
            return Err(RadioError::Receive("stream not started".to_string()));
        }

        let mut count = self.config.samples_per_packet.min(buf.len() / 2);
        if self.counters.short_receive.load(Ordering::SeqCst) {
            count /= 2;
        }

        let step = TAU * self.config.tone_offset_hz / self.sample_rate;
        for pair in buf[..2 * count].chunks_exact_mut(2) {
            pair[0] = (self.config.amplitude * self.phase.cos()) as i16;
            pair[1] = (self.config.amplitude * self.phase.sin()) as i16;
            self.phase = (self.phase + step) % TAU;
        }

        self.counters.receives.fetch_add(1, Ordering::SeqCst);
        Ok(count)
    }
}
