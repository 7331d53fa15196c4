use std::fmt::{Display, Formatter};

use crate::errors::Error;
use crate::errors::HardwareError::UnknownPin;
use crate::errors::ProtocolError::UnexpectedValueKind;

/// A value reported by the board, decoded from an ANALOG_MESSAGE or a DIGITAL_MESSAGE.
///
/// Analog messages identify a channel: the matching pin is resolved through the analog mapping
/// when the value is decoded.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FirmataValue {
    /// Reading of an analog channel (14-bit at most).
    Analog {
        channel: u8,
        pin: Option<u16>,
        value: u16,
    },
    /// State of the 8 pins of a digital port, as a bitmask.
    Digital { port: u8, value: u16 },
}

impl FirmataValue {
    pub fn is_analog(&self) -> bool {
        matches!(self, FirmataValue::Analog { .. })
    }

    /// Returns the `(pin, value)` of an analog reading.
    ///
    /// # Errors
    /// * `UnexpectedValueKind` - this is a digital value.
    /// * `UnknownPin` - the channel is missing from the analog mapping.
    pub fn analog_value(&self) -> Result<(u16, u16), Error> {
        match *self {
            FirmataValue::Analog {
                pin: Some(pin),
                value,
                ..
            } => Ok((pin, value)),
            FirmataValue::Analog { channel, .. } => Err(UnknownPin {
                pin: format!("A{}", channel).into(),
            }
            .into()),
            FirmataValue::Digital { .. } => Err(UnexpectedValueKind {
                expected: "analog",
                found: "digital",
            }
            .into()),
        }
    }

    /// Returns the port and the `(pin, level)` state of each of its 8 pins.
    ///
    /// # Errors
    /// * `UnexpectedValueKind` - this is an analog value.
    pub fn digital_value(&self) -> Result<(u8, [(u16, bool); 8]), Error> {
        match *self {
            FirmataValue::Digital { port, value } => {
                let first = u16::from(port) * 8;
                let states = std::array::from_fn(|i| (first + i as u16, value & (1 << i) != 0));
                Ok((port, states))
            }
            FirmataValue::Analog { .. } => Err(UnexpectedValueKind {
                expected: "digital",
                found: "analog",
            }
            .into()),
        }
    }
}

impl Display for FirmataValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FirmataValue::Analog {
                pin: Some(pin),
                value,
                ..
            } => write!(f, "Analog value {} = {}", pin, value),
            FirmataValue::Analog { channel, value, .. } => {
                write!(f, "Analog value A{} = {}", channel, value)
            }
            FirmataValue::Digital { port, value } => {
                write!(f, "Digital port {} = {:08b}", port, value & 0xFF)
            }
        }
    }
}
