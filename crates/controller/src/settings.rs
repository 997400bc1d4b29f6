//! Controller settings
//!
//! Layered as built-in defaults, then an optional TOML file, then
//! `KALJAM__SECTION__KEY` environment variables.

use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use config::builder::DefaultState;
use jam_protocol::{BandIndicator, ControlMessage};
use sample_acquisition::{AcquisitionConfig, AntennaSelector, ClockSource, GSM_RATE};
use serde::{Deserialize, Serialize};
use session_chain::{parse_endpoints, Endpoint, SessionConfig};
use tracing::info;

use crate::error::ControllerError;
use crate::logging::LogFormat;

/// File read when `KALJAM_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "kal-jam.toml";
/// Variable naming an explicit settings file
pub const CONFIG_PATH_ENV: &str = "KALJAM_CONFIG";
/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "KALJAM";

/// Lowest FPGA master clock the radio can run GSM rates from
pub const MIN_FPGA_MASTER_CLOCK_HZ: u64 = 48_000_000;
/// Downlink range accepted in offset mode (Hz)
pub const OFFSET_FREQ_RANGE: (f64, f64) = (869e6, 2e9);

/// Radio front-end implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioBackend {
    /// Built-in tone generator
    #[default]
    Simulated,
    /// Ettus USRP through UHD
    Uhd,
}

impl RadioBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            RadioBackend::Simulated => "simulated",
            RadioBackend::Uhd => "uhd",
        }
    }
}

/// Radio settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSettings {
    /// Which front-end to drive
    pub backend: RadioBackend,
    /// UHD device address string
    pub device_args: String,
    /// Requested sample rate (Hz)
    pub sample_rate: f64,
    /// Daughterboard side (0 = A, 1 = B)
    pub subdevice: u32,
    /// Receive antenna
    pub antenna: AntennaSelector,
    /// Gain as a ratio of the device range; (1, 100] is read as percent
    pub gain: f32,
    /// Lock to the external 10 MHz reference
    pub external_ref: bool,
    /// FPGA master clock; values below 1000 are read as MHz
    pub fpga_master_clock_hz: u64,
    /// Ring buffer capacity (samples)
    pub buffer_capacity: usize,
    /// Packets discarded after a retune
    pub flush_packets: usize,
}

impl Default for RadioSettings {
    fn default() -> Self {
        Self {
            backend: RadioBackend::Simulated,
            device_args: String::new(),
            sample_rate: GSM_RATE,
            subdevice: 1,
            antenna: AntennaSelector::Index(1),
            gain: 0.45,
            external_ref: false,
            fpga_master_clock_hz: 100_000_000,
            buffer_capacity: 1 << 20,
            flush_packets: 2,
        }
    }
}

impl RadioSettings {
    /// Configuration handed to the acquisition service
    pub fn acquisition_config(&self) -> AcquisitionConfig {
        AcquisitionConfig {
            sample_rate: self.sample_rate,
            fpga_master_clock_hz: self.fpga_master_clock_hz,
            clock_source: if self.external_ref {
                ClockSource::External
            } else {
                ClockSource::Internal
            },
            buffer_capacity: self.buffer_capacity,
            default_gain: self.gain,
            default_antenna: self.antenna.clone(),
        }
    }

    /// Daughterboard side letter
    pub fn side(&self) -> &'static str {
        if self.subdevice == 0 {
            "A"
        } else {
            "B"
        }
    }
}

/// Jammer chain settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JammerSettings {
    /// Space-delimited addresses, primary first
    pub addresses: String,
    /// Space-delimited ports, one per address
    pub ports: String,
    /// Close a jammer session after this much silence
    pub read_timeout_ms: Option<u64>,
    /// Disable send coalescing
    pub nodelay: Option<bool>,
}

impl JammerSettings {
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, ControllerError> {
        Ok(parse_endpoints(&self.addresses, &self.ports)?)
    }

    pub fn session_config(&self) -> SessionConfig {
        let defaults = SessionConfig::default();
        SessionConfig {
            read_timeout: self.read_timeout_ms.map(Duration::from_millis),
            nodelay: self.nodelay.unwrap_or(defaults.nodelay),
        }
    }
}

/// BTS control endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BtsSettings {
    pub address: String,
    pub port: u16,
}

impl BtsSettings {
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.address.clone(), self.port)
    }
}

/// What the run does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModeSettings {
    /// Measure clock offset against one downlink frequency
    Offset { frequency_hz: f64 },
    /// Survey a band and issue jam requests
    Scan { band: BandIndicator },
}

impl Default for ModeSettings {
    fn default() -> Self {
        ModeSettings::Scan {
            band: BandIndicator::Gsm900,
        }
    }
}

/// One request issued to the chain during a scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JamRequest {
    /// ARFCN
    pub channel: u16,
    pub amplitude: u8,
    pub duration_seconds: u16,
}

impl JamRequest {
    /// ADD_FREQ for this request in `band`
    pub fn to_message(&self, band: BandIndicator) -> ControlMessage {
        ControlMessage::add_freq(
            self.channel,
            self.amplitude,
            band.as_byte(),
            self.duration_seconds,
        )
    }
}

/// Complete controller settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub radio: RadioSettings,
    pub jammers: JammerSettings,
    pub bts: Option<BtsSettings>,
    pub mode: ModeSettings,
    pub jam_requests: Vec<JamRequest>,
    /// Filter directive when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    /// Log the effective radio settings at startup
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            radio: RadioSettings::default(),
            jammers: JammerSettings::default(),
            bts: None,
            mode: ModeSettings::default(),
            jam_requests: Vec::new(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            debug: false,
        }
    }
}

impl Settings {
    /// Load from `KALJAM_CONFIG` (required if set) or `kal-jam.toml`
    /// (optional), then apply environment overrides
    pub fn load() -> Result<Self, ControllerError> {
        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => File::with_name(&path).required(true),
            Err(_) => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );
        Self::build(builder)
    }

    /// Parse settings from TOML text alone
    pub fn from_toml(text: &str) -> Result<Self, ControllerError> {
        Self::build(Config::builder().add_source(File::from_str(text, FileFormat::Toml)))
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ControllerError> {
        Ok(builder.build()?.try_deserialize()?)
    }

    /// Normalise shorthand units and reject out-of-range values.
    ///
    /// Runs before any hardware or socket is touched.
    pub fn validate(mut self) -> Result<Self, ControllerError> {
        let radio = &mut self.radio;

        if radio.gain > 1.0 && radio.gain <= 100.0 {
            radio.gain /= 100.0;
        }
        if !(0.0..=1.0).contains(&radio.gain) {
            return Err(ControllerError::invalid(
                "radio.gain",
                format!("{} is outside [0, 1] and (1, 100]", radio.gain),
            ));
        }

        if radio.fpga_master_clock_hz < 1000 {
            radio.fpga_master_clock_hz *= 1_000_000;
        }
        if radio.fpga_master_clock_hz < MIN_FPGA_MASTER_CLOCK_HZ {
            return Err(ControllerError::invalid(
                "radio.fpga_master_clock_hz",
                format!("FPGA master clock too slow: {}", radio.fpga_master_clock_hz),
            ));
        }

        if radio.sample_rate <= 0.0 {
            return Err(ControllerError::invalid(
                "radio.sample_rate",
                format!("{} is not positive", radio.sample_rate),
            ));
        }
        if radio.buffer_capacity == 0 {
            return Err(ControllerError::invalid("radio.buffer_capacity", "must be non-zero"));
        }
        if radio.subdevice > 1 {
            return Err(ControllerError::invalid(
                "radio.subdevice",
                format!("bad side {}", radio.subdevice),
            ));
        }
        if radio.backend == RadioBackend::Uhd && !cfg!(feature = "uhd") {
            return Err(ControllerError::BackendUnavailable(radio.backend.as_str()));
        }

        if let ModeSettings::Offset { frequency_hz } = self.mode {
            let (low, high) = OFFSET_FREQ_RANGE;
            if !(low..=high).contains(&frequency_hz) {
                return Err(ControllerError::invalid(
                    "mode.frequency_hz",
                    format!("bad frequency: {}", frequency_hz),
                ));
            }
        }

        // Count mismatch is fatal before anything connects
        self.jammers.endpoints()?;

        Ok(self)
    }

    /// Print the effective radio settings
    pub fn log_effective(&self) {
        let radio = &self.radio;
        info!("Backend               : {}", radio.backend.as_str());
        info!("FPGA master clock     : {} Hz", radio.fpga_master_clock_hz);
        info!(
            "External reference    : {}",
            if radio.external_ref { "Yes" } else { "No" }
        );
        info!("RX subdevice          : {}", radio.side());
        info!("Antenna               : {:?}", radio.antenna);
        info!("Gain                  : {:.2}", radio.gain);
        info!("Mode                  : {:?}", self.mode);
    }
}
