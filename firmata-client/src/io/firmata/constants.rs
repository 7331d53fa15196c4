//! Firmata protocol constants

/// Received Protocol message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    ProtocolVersion,
    Analog,
    Digital,
    EmptyResponse,
    AnalogMappingResponse,
    CapabilityResponse,
    ReportFirmware,
    StringData,
}

// ########################################
// Message command bytes (128-255/0x80-0xFF)

/// Set on every command byte, clear on data bytes.
pub const COMMAND_BIT: u8 = 0x80;
/// Mask selecting the command family of a message byte (its low nibble is a port or channel).
pub const COMMAND_MASK: u8 = 0xF0;
/// Mask selecting the port/channel part of a message byte.
pub const SELECTOR_MASK: u8 = 0x0F;
/// Send data for a digital port (collection of 8 pins)
pub const DIGITAL_MESSAGE: u8 = 0x90;
/// Send data for an analog pin (or PWM)
pub const ANALOG_MESSAGE: u8 = 0xE0;
/// Enable analog input by pin #
pub const REPORT_ANALOG: u8 = 0xC0;
/// Enable digital input by port pair
pub const REPORT_DIGITAL: u8 = 0xD0;
//
/// Set a pint to INPUT/OUTPUT/PWM/etc
pub const SET_PIN_MODE: u8 = 0xF4;
//
/// Report protocol version
pub const REPORT_VERSION: u8 = 0xF9;
/// Reset from MIDI
pub const SYSTEM_RESET: u8 = 0xFF;
//
/// Start a MIDI Sysex message
pub const START_SYSEX: u8 = 0xF0;
/// End a MIDI Sysex message
pub const END_SYSEX: u8 = 0xF7;

// Extended command set using sysex (0-127/0x00-0x7F)

/// Set max angle, minPulse, maxPulse, freq
pub const SERVO_CONFIG: u8 = 0x70;
/// String message with 14-bits per char
pub const STRING_DATA: u8 = 0x71;
/// Report name and version of the firmware
pub const REPORT_FIRMWARE: u8 = 0x79;
/// Analog write (PWM, Servo, etc) to any pin
pub const EXTENDED_ANALOG: u8 = 0x6F;
/// Ask for supported modes and resolution of all pins
pub const CAPABILITY_QUERY: u8 = 0x6B;
/// Reply with supported modes and resolution
pub const CAPABILITY_RESPONSE: u8 = 0x6C;
/// Ask for mapping of analog to pin numbers
pub const ANALOG_MAPPING_QUERY: u8 = 0x69;
/// Reply with mapping info
pub const ANALOG_MAPPING_RESPONSE: u8 = 0x6A;
/// Set the poll rate of the main loop
pub const SAMPLING_INTERVAL: u8 = 0x7A;
/// MIDI Reserved for realtime messages: also the "no more data" marker of capability and mapping records.
pub const SYSEX_REALTIME: u8 = 0x7F;

// Other values
/// Number of pins grouped in a digital port.
pub const PINS_PER_PORT: u16 = 8;
/// Digital and analog messages address at most 16 ports/channels.
pub const MAX_SELECTOR: u8 = 0x0F;
/// Largest value a 14-bit message can carry.
pub const MAX_14BIT_VALUE: u16 = 0x3FFF;
