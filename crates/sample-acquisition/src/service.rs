//! Sample Acquisition Service
//!
//! Every hardware call goes through one lock. `fill` takes that lock
//! once per packet, so control calls from other threads may interleave
//! between packets.

use std::sync::{Mutex, MutexGuard};

use ring_buffer::{Complex32, SampleBuffer, DEFAULT_CAPACITY};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::convert::convert_sc16;
use crate::error::{AcquisitionError, RadioError};
use crate::radio::{AntennaSelector, ClockSource, OpenParams, RadioFrontEnd};

/// GSM symbol rate (Hz)
pub const GSM_RATE: f64 = 1_625_000.0 / 6.0;

/// Acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Requested sample rate (Hz)
    pub sample_rate: f64,
    /// FPGA master clock (Hz)
    pub fpga_master_clock_hz: u64,
    /// Frequency reference
    pub clock_source: ClockSource,
    /// Ring buffer capacity (samples)
    pub buffer_capacity: usize,
    /// Gain ratio applied on first open
    pub default_gain: f32,
    /// Antenna selected on first open
    pub default_antenna: AntennaSelector,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_rate: GSM_RATE,
            fpga_master_clock_hz: 100_000_000,
            clock_source: ClockSource::Internal,
            buffer_capacity: DEFAULT_CAPACITY,
            default_gain: 0.45,
            default_antenna: AntennaSelector::Index(1),
        }
    }
}

/// What one `fill` call pulled from the hardware
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillStats {
    /// Packets received
    pub packets: usize,
    /// Packets truncated because the buffer was full
    pub overruns: usize,
}

struct Hardware {
    radio: Box<dyn RadioFrontEnd>,
    open: bool,
}

impl Hardware {
    fn require_open(&self) -> Result<(), AcquisitionError> {
        if self.open {
            Ok(())
        } else {
            Err(AcquisitionError::NotOpen)
        }
    }

    fn apply_gain(&mut self, ratio: f32) -> Result<(), AcquisitionError> {
        let (min, max) = self.radio.gain_range()?;
        let gain_db = min + f64::from(ratio) * (max - min);
        debug!("Setting gain {:.2} -> {:.1} dB", ratio, gain_db);
        self.radio.set_gain_db(gain_db)?;
        Ok(())
    }

    fn apply_antenna(&mut self, antenna: &AntennaSelector) -> Result<(), AcquisitionError> {
        match antenna {
            AntennaSelector::Index(index) => {
                let antennas = self.radio.antennas()?;
                match antennas.get(*index) {
                    Some(name) => self.radio.set_antenna(name)?,
                    None => warn!(
                        "Requested invalid antenna {} ({} available)",
                        index,
                        antennas.len()
                    ),
                }
            }
            AntennaSelector::Name(name) => self.radio.set_antenna(name)?,
        }
        Ok(())
    }
}

/// Owns the radio and the sample ring buffer
pub struct SampleAcquisitionService {
    config: AcquisitionConfig,
    hardware: Mutex<Hardware>,
    buffer: Mutex<SampleBuffer>,
}

impl SampleAcquisitionService {
    /// Create the service; the radio is not touched until `open`
    pub fn new(
        radio: Box<dyn RadioFrontEnd>,
        config: AcquisitionConfig,
    ) -> Result<Self, AcquisitionError> {
        let buffer = SampleBuffer::new(config.buffer_capacity)?;
        info!(
            "Creating acquisition service ({} sample buffer)",
            config.buffer_capacity
        );
        Ok(Self {
            config,
            hardware: Mutex::new(Hardware { radio, open: false }),
            buffer: Mutex::new(buffer),
        })
    }

    fn hardware(&self) -> Result<MutexGuard<'_, Hardware>, AcquisitionError> {
        self.hardware
            .lock()
            .map_err(|_| AcquisitionError::LockPoisoned)
    }

    fn buffer(&self) -> Result<MutexGuard<'_, SampleBuffer>, AcquisitionError> {
        self.buffer.lock().map_err(|_| AcquisitionError::LockPoisoned)
    }

    /// Open the device on the given daughterboard side.
    ///
    /// The first call negotiates rate and clock, then applies the default
    /// gain and antenna. Later calls return immediately.
    pub fn open(&self, subdevice: u32) -> Result<(), AcquisitionError> {
        let mut hw = self.hardware()?;
        if hw.open {
            return Ok(());
        }

        let params = OpenParams {
            subdevice,
            sample_rate: self.config.sample_rate,
            fpga_master_clock_hz: self.config.fpga_master_clock_hz,
            clock_source: self.config.clock_source,
        };
        hw.radio.open(&params)?;
        if hw.radio.samples_per_packet() == 0 {
            return Err(
                RadioError::Open("device reports zero samples per packet".to_string()).into(),
            );
        }
        info!("Sample rate: {:.3} S/s", hw.radio.sample_rate());

        // Only a fully configured device counts as open
        hw.apply_gain(self.config.default_gain)?;
        hw.apply_antenna(&self.config.default_antenna)?;
        hw.open = true;
        Ok(())
    }

    /// Negotiated sample rate, 0.0 before `open`
    pub fn sample_rate(&self) -> Result<f64, AcquisitionError> {
        let hw = self.hardware()?;
        Ok(if hw.open { hw.radio.sample_rate() } else { 0.0 })
    }

    /// Tune the receiver; returns the frequency actually achieved
    pub fn tune(&self, freq_hz: f64) -> Result<f64, AcquisitionError> {
        let mut hw = self.hardware()?;
        hw.require_open()?;
        let actual = hw.radio.tune(freq_hz)?;
        debug!("Tuned to {:.1} Hz (requested {:.1} Hz)", actual, freq_hz);
        Ok(actual)
    }

    /// Set gain as a fraction of the hardware's range.
    ///
    /// Ratios outside [0.0, 1.0] are rejected before the hardware is
    /// touched.
    pub fn set_gain(&self, ratio: f32) -> Result<(), AcquisitionError> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(AcquisitionError::GainOutOfRange(ratio));
        }
        let mut hw = self.hardware()?;
        hw.require_open()?;
        hw.apply_gain(ratio)
    }

    /// Select an antenna port; an out-of-range index is logged and ignored
    pub fn set_antenna(&self, antenna: &AntennaSelector) -> Result<(), AcquisitionError> {
        let mut hw = self.hardware()?;
        hw.require_open()?;
        hw.apply_antenna(antenna)
    }

    /// Antenna ports offered by the device
    pub fn antennas(&self) -> Result<Vec<String>, AcquisitionError> {
        let hw = self.hardware()?;
        hw.require_open()?;
        Ok(hw.radio.antennas()?)
    }

    /// Start continuous streaming
    pub fn start(&self) -> Result<(), AcquisitionError> {
        let mut hw = self.hardware()?;
        hw.require_open()?;
        hw.radio.start()?;
        Ok(())
    }

    /// Stop continuous streaming; a no-op before `open`
    pub fn stop(&self) -> Result<(), AcquisitionError> {
        let mut hw = self.hardware()?;
        if hw.open {
            hw.radio.stop()?;
        }
        Ok(())
    }

    fn samples_per_packet(&self) -> Result<usize, AcquisitionError> {
        let hw = self.hardware()?;
        hw.require_open()?;
        Ok(hw.radio.samples_per_packet())
    }

    /// Pull packets until `target` samples are buffered or the buffer is full.
    ///
    /// A packet shorter than the device's packet size fails the call.
    pub fn fill(&self, target: usize) -> Result<FillStats, AcquisitionError> {
        let per_packet = self.samples_per_packet()?;
        let mut raw = vec![0i16; 2 * per_packet];
        let mut samples = vec![Complex32::default(); per_packet];
        let mut stats = FillStats::default();

        loop {
            {
                let buffer = self.buffer()?;
                if buffer.available_to_read() >= target || buffer.available_to_write() == 0 {
                    break;
                }
            }

            // Hold the hardware lock for this one receive only
            let received = {
                let mut hw = self.hardware()?;
                hw.radio.receive_packet(&mut raw)?
            };
            if received > per_packet {
                return Err(RadioError::Receive(format!(
                    "driver reported {} samples for a {} sample packet",
                    received, per_packet
                ))
                .into());
            }
            if received < per_packet {
                error!("Short receive: {} of {} samples", received, per_packet);
                return Err(AcquisitionError::ShortReceive {
                    received,
                    expected: per_packet,
                });
            }

            let converted = convert_sc16(&raw[..2 * received], &mut samples);
            let outcome = self.buffer()?.write(&samples[..converted]);
            stats.packets += 1;
            if outcome.overran() {
                warn!("Local overrun: dropped {} samples", outcome.dropped);
                stats.overruns += 1;
            }
        }

        Ok(stats)
    }

    /// Fill, then drain up to `dest.len()` samples into `dest`
    pub fn read(&self, dest: &mut [Complex32]) -> Result<usize, AcquisitionError> {
        self.fill(dest.len())?;
        Ok(self.buffer()?.read(dest))
    }

    /// Discard buffered samples plus roughly `packet_count` packets of
    /// fresh data, e.g. the transient after a retune
    pub fn flush(&self, packet_count: usize) -> Result<(), AcquisitionError> {
        self.buffer()?.flush();
        let per_packet = self.samples_per_packet()?;
        self.fill(packet_count * per_packet)?;
        self.buffer()?.flush();
        Ok(())
    }

    /// Samples currently buffered
    pub fn available(&self) -> Result<usize, AcquisitionError> {
        Ok(self.buffer()?.available_to_read())
    }

    /// Truncated writes since creation
    pub fn overruns(&self) -> Result<u64, AcquisitionError> {
        Ok(self.buffer()?.overruns())
    }
}

impl Drop for SampleAcquisitionService {
    fn drop(&mut self) {
        if let Ok(hw) = self.hardware.get_mut() {
            if hw.open {
                if let Err(e) = hw.radio.stop() {
                    warn!("Failed to stop radio on shutdown: {}", e);
                }
            }
        }
    }
}
