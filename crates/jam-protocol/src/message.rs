//! Control Record Definitions

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Size of one control record on the wire
pub const MESSAGE_SIZE: usize = 7;

/// Jammer commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Command {
    /// Start jamming a channel (0)
    AddFreq = 0,
    /// Stop jamming a channel (1)
    DelFreq = 1,
    /// Regenerate the interference signal (2)
    RegenSig = 2,
    /// Stop all channels (3)
    ClearAll = 3,
    /// Ask the jammer to hang up (4)
    CloseConn = 4,
    /// Change the jammer's transmit gain (5)
    SetGain = 5,
    /// Jammer cannot honour an ADD_FREQ (6)
    NackFreq = 6,
}

impl Command {
    /// All commands in wire order
    pub const ALL: [Command; 7] = [
        Command::AddFreq,
        Command::DelFreq,
        Command::RegenSig,
        Command::ClearAll,
        Command::CloseConn,
        Command::SetGain,
        Command::NackFreq,
    ];

    /// Get the wire byte
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Whether a jammer sends this unsolicited
    pub fn is_from_jammer(&self) -> bool {
        matches!(self, Command::NackFreq)
    }
}

impl TryFrom<u8> for Command {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Command::ALL
            .get(byte as usize)
            .copied()
            .ok_or(ProtocolError::UnknownCommand(byte))
    }
}

/// One control record.
///
/// Layout: `command | amplitude | band | channel (u16 BE) | duration (u16 BE)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlMessage {
    /// What to do
    pub command: Command,
    /// Transmit amplitude
    pub amplitude: u8,
    /// Band indicator byte
    pub band: u8,
    /// ARFCN
    pub channel: u16,
    /// How long to keep jamming (seconds)
    pub duration_seconds: u16,
}

impl ControlMessage {
    /// Create a record with every field given
    pub fn new(command: Command, amplitude: u8, band: u8, channel: u16, duration_seconds: u16) -> Self {
        Self {
            command,
            amplitude,
            band,
            channel,
            duration_seconds,
        }
    }

    /// Request interference on a channel
    pub fn add_freq(channel: u16, amplitude: u8, band: u8, duration_seconds: u16) -> Self {
        Self::new(Command::AddFreq, amplitude, band, channel, duration_seconds)
    }

    /// Stop interference on a channel
    pub fn del_freq(channel: u16, band: u8) -> Self {
        Self::new(Command::DelFreq, 0, band, channel, 0)
    }

    /// Stop everything on the jammer
    pub fn clear_all() -> Self {
        Self::new(Command::ClearAll, 0, 0, 0, 0)
    }

    /// Ask the jammer to close the connection
    pub fn close_conn() -> Self {
        Self::new(Command::CloseConn, 0, 0, 0, 0)
    }

    /// Set the jammer's transmit gain (carried in the amplitude byte)
    pub fn set_gain(amplitude: u8) -> Self {
        Self::new(Command::SetGain, amplitude, 0, 0, 0)
    }

    /// Rejection of an ADD_FREQ, echoing its parameters
    pub fn nack_freq(request: &ControlMessage) -> Self {
        Self {
            command: Command::NackFreq,
            ..*request
        }
    }

    /// Same parameters, re-issued as an ADD_FREQ
    pub fn as_add_freq(&self) -> Self {
        Self {
            command: Command::AddFreq,
            ..*self
        }
    }

    /// Encode to wire bytes
    pub fn to_bytes(&self) -> [u8; MESSAGE_SIZE] {
        let channel = self.channel.to_be_bytes();
        let secs = self.duration_seconds.to_be_bytes();
        [
            self.command.as_byte(),
            self.amplitude,
            self.band,
            channel[0],
            channel[1],
            secs[0],
            secs[1],
        ]
    }

    /// Decode from wire bytes
    pub fn from_bytes(bytes: &[u8; MESSAGE_SIZE]) -> Result<Self, ProtocolError> {
        Ok(Self {
            command: Command::try_from(bytes[0])?,
            amplitude: bytes[1],
            band: bytes[2],
            channel: u16::from_be_bytes([bytes[3], bytes[4]]),
            duration_seconds: u16::from_be_bytes([bytes[5], bytes[6]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_wire_layout() {
        let msg = ControlMessage::add_freq(0x0102, 0xAA, 3, 0x0304);
        assert_eq!(msg.to_bytes(), [0, 0xAA, 3, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let bytes = [7, 0, 0, 0, 0, 0, 0];
        match ControlMessage::from_bytes(&bytes) {
            Err(ProtocolError::UnknownCommand(7)) => {}
            other => panic!("unexpected decode result: {:?}", other),
        }
    }

    #[test]
    fn test_nack_rewritten_as_add() {
        let request = ControlMessage::add_freq(62, 200, 1, 30);
        let nack = ControlMessage::nack_freq(&request);
        assert_eq!(nack.command, Command::NackFreq);
        assert!(nack.command.is_from_jammer());
        assert_eq!(nack.as_add_freq(), request);
    }

    #[test]
    fn test_command_bytes_in_order() {
        for (i, command) in Command::ALL.iter().enumerate() {
            assert_eq!(command.as_byte() as usize, i);
            assert_eq!(Command::try_from(i as u8).unwrap(), *command);
        }
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            idx in 0usize..7,
            amplitude: u8,
            band: u8,
            channel: u16,
            duration_seconds: u16,
        ) {
            let msg = ControlMessage::new(Command::ALL[idx], amplitude, band, channel, duration_seconds);
            let decoded = ControlMessage::from_bytes(&msg.to_bytes()).unwrap();
            prop_assert_eq!(decoded, msg);
        }
    }
}
