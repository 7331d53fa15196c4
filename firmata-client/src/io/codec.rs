//! 7-bit packing used by every Firmata data byte.
//!
//! Data bytes on the wire always have their high bit clear (the high bit marks a command byte),
//! so any value wider than 7 bits travels as an LSB/MSB pair.
//! <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>

/// Splits `value` into its `[lsb7, msb7]` wire representation.
///
/// Only the lowest 14 bits are transmitted: an 8-bit value yields an MSB of at most 1.
pub fn encode14(value: u16) -> [u8; 2] {
    [(value & 0x7F) as u8, ((value >> 7) & 0x7F) as u8]
}

/// Rebuilds a 14-bit value from its `lsb7`/`msb7` wire representation.
///
/// Any byte is accepted: the high bit of each byte is simply ignored.
pub fn decode14(lsb7: u8, msb7: u8) -> u16 {
    u16::from(lsb7 & 0x7F) | (u16::from(msb7 & 0x7F) << 7)
}
