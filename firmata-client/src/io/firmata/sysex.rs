//! Decoding of SYSEX responses: <https://github.com/firmata/protocol/blob/master/protocol.md#sysex-message-format>
//!
//! Every function receives the payload with its START_SYSEX/END_SYSEX framing already stripped.

use log::{debug, info, trace, warn};

use crate::errors::Error;
use crate::errors::ProtocolError::MessageTooShort;
use crate::io::codec::decode14;
use crate::io::firmata::constants::*;
use crate::io::{IoData, Pin, PinMode, PinModeId};

/// Dispatches a sysex payload according to its sub-command (first byte).
///
/// Unknown sub-commands are ignored.
pub(crate) fn decode_sysex(payload: &[u8], data: &mut IoData) -> Result<Message, Error> {
    let Some((&command, body)) = payload.split_first() else {
        return Ok(Message::EmptyResponse);
    };
    match command {
        CAPABILITY_RESPONSE => decode_capability_response(body, data),
        ANALOG_MAPPING_RESPONSE => decode_analog_mapping_response(body, data),
        REPORT_FIRMWARE => decode_firmware_report(body, data),
        STRING_DATA => decode_string_data(body),
        _ => {
            trace!("Ignored sysex command 0x{:02X}: {:02X?}", command, body);
            Ok(Message::EmptyResponse)
        }
    }
}

/// Handle a CAPABILITY_RESPONSE message (0x6C - reply with supported modes and resolution)
/// <https://github.com/firmata/protocol/blob/master/protocol.md#capability-query>
///
/// One record per pin, in pin order: `(mode, resolution)` pairs terminated by 0x7F.
fn decode_capability_response(body: &[u8], data: &mut IoData) -> Result<Message, Error> {
    let mut pins: Vec<Pin> = vec![];
    let mut supported_modes: Vec<PinMode> = vec![];
    let mut bytes = body.iter();

    while let Some(&byte) = bytes.next() {
        if byte == SYSEX_REALTIME {
            let id = pins.len() as u16;
            let name = match data.analog_mapping.channel(id) {
                Some(channel) => format!("A{}", channel),
                None => format!("D{}", id),
            };
            pins.push(Pin {
                id,
                name,
                supported_modes: std::mem::take(&mut supported_modes),
            });
            continue;
        }

        let Some(&resolution) = bytes.next() else {
            warn!("Truncated capability record for pin {}", pins.len());
            break;
        };
        match PinModeId::from_u8(byte) {
            Ok(id) => supported_modes.push(PinMode { id, resolution }),
            Err(_) => warn!("Pin {}: ignored unknown mode 0x{:02X}", pins.len(), byte),
        }
    }

    debug!("Received capabilities for {} pins", pins.len());
    data.pins = pins;
    data.handshake.capabilities_received = true;
    Ok(Message::CapabilityResponse)
}

/// Handle an ANALOG_MAPPING_RESPONSE message (0x6A - reply with analog pins mapping info).
/// <https://github.com/firmata/protocol/blob/master/protocol.md#analog-mapping-query>
///
/// One byte per pin: its analog channel, or 0x7F for a pin with no analog capability.
fn decode_analog_mapping_response(body: &[u8], data: &mut IoData) -> Result<Message, Error> {
    for (id, &channel) in body.iter().enumerate() {
        if channel == SYSEX_REALTIME {
            continue;
        }
        let id = id as u16;
        data.analog_mapping.insert(id, channel);
        if let Ok(pin) = data.get_pin_mut(id) {
            pin.name = format!("A{}", channel);
        }
    }

    debug!("Received analog mapping: {} analog pins", data.analog_mapping.len());
    data.handshake.analog_mapping_received = true;
    Ok(Message::AnalogMappingResponse)
}

/// Handle a REPORT_FIRMWARE message (0x79 - report name and version of the firmware).
/// <https://github.com/firmata/protocol/blob/master/protocol.md#query-firmware-name-and-version>
fn decode_firmware_report(body: &[u8], data: &mut IoData) -> Result<Message, Error> {
    if body.len() < 2 {
        return Err(MessageTooShort {
            operation: "decode_firmware_report",
            expected: 2,
            received: body.len(),
        }
        .into());
    }
    data.handshake.firmware_version = format!("{}.{}", body[0], body[1]);
    data.handshake.firmware_name = decode_string(&body[2..]);
    debug!(
        "Received firmware: {} {}",
        data.handshake.firmware_name, data.handshake.firmware_version
    );
    Ok(Message::ReportFirmware)
}

/// Handle a STRING_DATA message (0x71 - text sent by the board).
/// <https://github.com/firmata/protocol/blob/master/protocol.md#string-data>
fn decode_string_data(body: &[u8]) -> Result<Message, Error> {
    info!("Board says: {}", decode_string(body));
    Ok(Message::StringData)
}

/// Rebuilds a string whose characters travel as 14-bit LSB/MSB pairs.
///
/// A trailing odd byte and NUL characters are dropped.
pub(crate) fn decode_string(bytes: &[u8]) -> String {
    bytes
        .chunks_exact(2)
        .filter_map(|pair| char::from_u32(u32::from(decode14(pair[0], pair[1]))))
        .filter(|&c| c != '\0')
        .collect()
}
