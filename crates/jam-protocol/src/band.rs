//! GSM Band Indicators

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

/// GSM frequency band, carried in the `band` byte of a control record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[repr(u8)]
pub enum BandIndicator {
    /// 850 MHz
    Gsm850 = 0,
    /// Primary 900 MHz
    Gsm900 = 1,
    /// Extended 900 MHz
    Egsm = 2,
    /// 1800 MHz
    Dcs = 3,
    /// 1900 MHz
    Pcs = 4,
}

impl BandIndicator {
    /// Get the wire byte
    pub fn as_byte(&self) -> u8 {
        *self as u8
    }

    /// Canonical name as accepted on the command line
    pub fn name(&self) -> &'static str {
        match self {
            BandIndicator::Gsm850 => "GSM850",
            BandIndicator::Gsm900 => "GSM900",
            BandIndicator::Egsm => "EGSM",
            BandIndicator::Dcs => "DCS",
            BandIndicator::Pcs => "PCS",
        }
    }
}

impl fmt::Display for BandIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BandIndicator {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "").as_str() {
            "GSM850" | "850" => Ok(BandIndicator::Gsm850),
            "GSM900" | "900" => Ok(BandIndicator::Gsm900),
            "EGSM" | "EGSM900" => Ok(BandIndicator::Egsm),
            "DCS" | "DCS1800" | "1800" => Ok(BandIndicator::Dcs),
            "PCS" | "PCS1900" | "1900" => Ok(BandIndicator::Pcs),
            _ => Err(ProtocolError::UnknownBand(s.to_string())),
        }
    }
}

impl TryFrom<u8> for BandIndicator {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(BandIndicator::Gsm850),
            1 => Ok(BandIndicator::Gsm900),
            2 => Ok(BandIndicator::Egsm),
            3 => Ok(BandIndicator::Dcs),
            4 => Ok(BandIndicator::Pcs),
            other => Err(ProtocolError::UnknownBand(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        assert_eq!("gsm900".parse::<BandIndicator>().unwrap(), BandIndicator::Gsm900);
        assert_eq!("DCS".parse::<BandIndicator>().unwrap(), BandIndicator::Dcs);
        assert_eq!("GSM-850".parse::<BandIndicator>().unwrap(), BandIndicator::Gsm850);
        assert!("LTE".parse::<BandIndicator>().is_err());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for byte in 0..5u8 {
            let band = BandIndicator::try_from(byte).unwrap();
            assert_eq!(band.as_byte(), byte);
            assert_eq!(band.to_string().parse::<BandIndicator>().unwrap(), band);
        }
    }
}
