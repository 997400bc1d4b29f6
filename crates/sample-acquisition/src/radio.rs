//! Radio front-end capability

use serde::{Deserialize, Serialize};

use crate::error::RadioError;

/// Frequency reference for the radio's oscillator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockSource {
    /// Internal oscillator
    #[default]
    Internal,
    /// External 10 MHz reference on the SMA input
    External,
}

impl ClockSource {
    /// Name understood by UHD
    pub fn as_str(&self) -> &'static str {
        match self {
            ClockSource::Internal => "internal",
            ClockSource::External => "external",
        }
    }
}

/// Antenna port selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AntennaSelector {
    /// Position in the list reported by the device
    Index(usize),
    /// Port name, e.g. "RX2"
    Name(String),
}

impl Default for AntennaSelector {
    fn default() -> Self {
        // RX2
        AntennaSelector::Index(1)
    }
}

/// Parameters negotiated when the device is first opened
#[derive(Debug, Clone, PartialEq)]
pub struct OpenParams {
    /// Daughterboard side (0 = A, 1 = B)
    pub subdevice: u32,
    /// Requested sample rate (Hz)
    pub sample_rate: f64,
    /// FPGA master clock (Hz)
    pub fpga_master_clock_hz: u64,
    /// Frequency reference
    pub clock_source: ClockSource,
}

/// Blocking control and streaming interface of a receive front-end.
///
/// Implementations are not required to be thread-safe; the acquisition
/// service serializes every call behind one lock.
pub trait RadioFrontEnd: Send {
    /// Create the device handle and apply rate and clock settings
    fn open(&mut self, params: &OpenParams) -> Result<(), RadioError>;

    /// Sample rate actually achieved (Hz)
    fn sample_rate(&self) -> f64;

    /// Complex samples delivered by one `receive_packet`
    fn samples_per_packet(&self) -> usize;

    /// Tune the RX chain; returns the frequency achieved
    fn tune(&mut self, freq_hz: f64) -> Result<f64, RadioError>;

    /// Gain range in dB as (min, max)
    fn gain_range(&self) -> Result<(f64, f64), RadioError>;

    /// Apply an absolute gain in dB
    fn set_gain_db(&mut self, gain_db: f64) -> Result<(), RadioError>;

    /// Antenna ports offered by the device
    fn antennas(&self) -> Result<Vec<String>, RadioError>;

    /// Select an antenna port by name
    fn set_antenna(&mut self, name: &str) -> Result<(), RadioError>;

    /// Begin continuous streaming
    fn start(&mut self) -> Result<(), RadioError>;

    /// End continuous streaming
    fn stop(&mut self) -> Result<(), RadioError>;

    /// Receive one packet of interleaved SC16 words into `buf`.
    ///
    /// `buf` holds `2 * samples_per_packet()` words. Returns the number of
    /// complex samples written.
    fn receive_packet(&mut self, buf: &mut [i16]) -> Result<usize, RadioError>;
}
