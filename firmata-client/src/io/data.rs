use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};

use crate::errors::HardwareError::UnknownPin;
use crate::errors::*;

/// Represents the internal data a [`Firmata`](crate::io::Firmata) client builds during the handshake.
///
/// This struct is hidden behind an `Arc<RwLock<IoData>>`: the background reader is the only writer
/// (and only during the handshake), the control surface only reads it.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IoData {
    /// The capability table: every pin reported by the board, indexed by pin id.
    pub pins: Vec<Pin>,
    /// Bidirectional analog pin <-> channel mapping.
    pub analog_mapping: AnalogMapping,
    /// Progress of the initialization handshake and board identification.
    pub handshake: HandshakeState,
    /// A boolean indicating whether the client is connected.
    pub connected: bool,
}

impl IoData {
    /// Retrieves a reference to a pin by its id or name.
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report such a pin.
    pub fn get_pin<T: Into<PinIdOrName>>(&self, pin: T) -> Result<&Pin, Error> {
        let pin = pin.into();
        let found = match &pin {
            PinIdOrName::Id(id) => self.pins.get(*id as usize),
            PinIdOrName::Name(name) => self.pins.iter().find(|p| p.name == *name),
        };
        found.ok_or(Error::from(UnknownPin { pin }))
    }

    /// Retrieves a mutable reference to a pin by its id.
    pub fn get_pin_mut(&mut self, pin: u16) -> Result<&mut Pin, Error> {
        self.pins
            .get_mut(pin as usize)
            .ok_or(Error::from(UnknownPin { pin: pin.into() }))
    }
}

/// Tracks which handshake responses have been received, plus the board identification.
///
/// Flags only ever go from `false` to `true`.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandshakeState {
    /// The capability response has been decoded.
    pub capabilities_received: bool,
    /// The analog mapping response has been decoded.
    pub analog_mapping_received: bool,
    /// A string indicating the version of the protocol.
    pub protocol_version: String,
    /// A string representing the name of the firmware.
    pub firmware_name: String,
    /// A string representing the version of the firmware.
    pub firmware_version: String,
}

impl HandshakeState {
    /// The handshake is complete once both the capabilities and the analog mapping are known.
    pub fn is_complete(&self) -> bool {
        self.capabilities_received && self.analog_mapping_received
    }
}

/// Analog messages name a channel, not a pin: this keeps both directions of the translation.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AnalogMapping {
    pin_to_channel: HashMap<u16, u8>,
    channel_to_pin: HashMap<u8, u16>,
}

impl AnalogMapping {
    pub fn insert(&mut self, pin: u16, channel: u8) {
        self.pin_to_channel.insert(pin, channel);
        self.channel_to_pin.insert(channel, pin);
    }

    /// The analog channel of `pin`, if the pin is analog capable.
    pub fn channel(&self, pin: u16) -> Option<u8> {
        self.pin_to_channel.get(&pin).copied()
    }

    /// The pin behind the analog `channel`.
    pub fn pin(&self, channel: u8) -> Option<u16> {
        self.channel_to_pin.get(&channel).copied()
    }

    pub fn len(&self) -> usize {
        self.pin_to_channel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pin_to_channel.is_empty()
    }
}

/// Represents the capabilities of a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default)]
pub struct Pin {
    /// The pin ID, which also corresponds to the index in [`IoData::pins`].
    pub id: u16,
    /// The pin name: 'D13' or 'A0' for instance.
    pub name: String,
    /// All pin supported modes.
    pub supported_modes: Vec<PinMode>,
}

impl Pin {
    /// Verifies if a pin supports the given mode and returns it if it does.
    ///
    /// # Returns
    /// * `None` if the mode is not supported.
    /// * `PinMode` the `PinMode` configuration if supported
    pub fn supports_mode(&self, mode: PinModeId) -> Option<PinMode> {
        self.supported_modes.iter().find(|m| m.id == mode).copied()
    }

    /// Port holding this pin in digital messages (8 pins per port).
    pub fn port(&self) -> u8 {
        (self.id / 8) as u8
    }
}

impl Debug for Pin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("supported modes", &self.supported_modes)
            .finish()
    }
}

// ########################################

/// Defines a structure to receive either an id or a name for a pin: 1, 'D1' or 'A1' for instance.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, PartialEq, Debug)]
pub enum PinIdOrName {
    Id(u16),
    Name(String),
}

impl From<u16> for PinIdOrName {
    fn from(n: u16) -> Self {
        PinIdOrName::Id(n)
    }
}

impl From<&str> for PinIdOrName {
    fn from(s: &str) -> Self {
        PinIdOrName::Name(s.to_string())
    }
}

impl From<String> for PinIdOrName {
    fn from(s: String) -> Self {
        PinIdOrName::Name(s)
    }
}

impl Display for PinIdOrName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PinIdOrName::Id(n) => write!(f, "{}", n),
            PinIdOrName::Name(s) => write!(f, "{:?}", s),
        }
    }
}

// ########################################

/// Represents a mode a pin supports.
///
/// # Fields
/// - `id`: The ID of the mode.
/// - `resolution`: The resolution (number of bits) this mode uses.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, Copy, PartialEq)]
pub struct PinMode {
    pub id: PinModeId,
    pub resolution: u8,
}

impl PinMode {
    /// Get the max value this pinMode can reach according to its resolution.
    pub fn get_max_possible_value(&self) -> u16 {
        match self.resolution {
            0 => 0,
            16.. => u16::MAX,
            bits => (1 << bits) - 1,
        }
    }
}

impl Display for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Debug for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            PinModeId::UNSUPPORTED => write!(f, "[{}]", self.id),
            _ => write!(f, "[id: {}, resolution: {}]", self.id, self.resolution),
        }
    }
}

// ########################################

/// Enumerates the possible modes for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[repr(u8)]
pub enum PinModeId {
    /// Same as INPUT defined in Arduino.
    INPUT = 0,
    /// Same as OUTPUT defined in Arduino.h
    OUTPUT = 1,
    /// Analog pin in analogInput mode
    ANALOG = 2,
    /// Digital pin in PWM output mode
    PWM = 3,
    /// Digital pin in Servo output mode
    SERVO = 4,
    /// shiftIn/shiftOut mode
    SHIFT = 5,
    /// Pin included in I2C setup
    I2C = 6,
    /// Pin configured for 1-wire
    ONEWIRE = 7,
    /// Pin configured for stepper motor
    STEPPER = 8,
    /// Pin configured for rotary encoders
    ENCODER = 9,
    /// Pin configured for serial communication
    SERIAL = 0x0A,
    /// Enable internal pull-up resistor for pin
    PULLUP = 0x0B,
    /// Pin configured for SPI
    SPI = 0x0C,
    /// Pin configured for proximity sensors
    SONAR = 0x0D,
    /// Pin configured for piezzo buzzer tone generation
    TONE = 0x0E,
    /// Pin configured for DHT humidity and temperature sensors
    DHT = 0x0F,
    /// Pin configured to be ignored by digitalWrite and capabilityResponse
    #[default]
    UNSUPPORTED = 0x7F,
}

impl PinModeId {
    /// Converts a `u8` byte value into a `PinModeId`.
    ///
    /// # Errors
    /// * `Unknown`: The value does not match any known pin mode.
    pub fn from_u8(value: u8) -> Result<PinModeId, Error> {
        match value {
            0 => Ok(PinModeId::INPUT),
            1 => Ok(PinModeId::OUTPUT),
            2 => Ok(PinModeId::ANALOG),
            3 => Ok(PinModeId::PWM),
            4 => Ok(PinModeId::SERVO),
            5 => Ok(PinModeId::SHIFT),
            6 => Ok(PinModeId::I2C),
            7 => Ok(PinModeId::ONEWIRE),
            8 => Ok(PinModeId::STEPPER),
            9 => Ok(PinModeId::ENCODER),
            0x0A => Ok(PinModeId::SERIAL),
            0x0B => Ok(PinModeId::PULLUP),
            0x0C => Ok(PinModeId::SPI),
            0x0D => Ok(PinModeId::SONAR),
            0x0E => Ok(PinModeId::TONE),
            0x0F => Ok(PinModeId::DHT),
            0x7F => Ok(PinModeId::UNSUPPORTED),
            x => Err(Unknown {
                info: format!("PinMode not found with value: {}", x),
            }),
        }
    }
}

impl From<PinModeId> for u8 {
    fn from(mode: PinModeId) -> u8 {
        mode as u8
    }
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
