//! Jammer Control Protocol
//!
//! Every jammer and BTS socket carries the same 7-byte record: a command
//! byte followed by amplitude, band, channel and duration. There is no
//! framing; the receiver always reads exactly one record. The 16-bit
//! fields are big-endian (network byte order).

mod band;
mod error;
mod io;
mod message;

pub use band::BandIndicator;
pub use error::ProtocolError;
pub use io::{read_message, write_message};
pub use message::{Command, ControlMessage, MESSAGE_SIZE};
