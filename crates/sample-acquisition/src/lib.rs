//! Sample Acquisition
//!
//! Owns the radio front-end and turns its fixed-point packets into a
//! buffered stream of complex float samples. Supports:
//! - Simulated front-end (deterministic tone, fault injection)
//! - Ettus USRP via the UHD C API (`uhd` feature)

mod convert;
mod error;
mod radio;
mod service;
pub mod sim;
#[cfg(feature = "uhd")]
pub mod uhd;

pub use convert::convert_sc16;
pub use error::{AcquisitionError, RadioError};
pub use radio::{AntennaSelector, ClockSource, OpenParams, RadioFrontEnd};
pub use ring_buffer::Complex32;
pub use service::{AcquisitionConfig, FillStats, SampleAcquisitionService, GSM_RATE};
pub use sim::{SimCounters, SimulatedRadio, SimulatedRadioConfig};
