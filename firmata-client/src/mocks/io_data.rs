use crate::io::codec::encode14;
use crate::io::firmata::constants::*;
use crate::io::{HandshakeState, IoData, Pin, PinMode, PinModeId};
use crate::mocks::transport::MockTransport;

fn mode(id: PinModeId, resolution: u8) -> PinMode {
    PinMode { id, resolution }
}

/// Pin reserved by the board (serial RX/TX): it reports no mode at all.
pub fn create_unsupported_pin(id: u16) -> Pin {
    Pin {
        id,
        name: format!("D{}", id),
        supported_modes: vec![],
    }
}

pub fn create_digital_pin(id: u16) -> Pin {
    Pin {
        id,
        name: format!("D{}", id),
        supported_modes: vec![
            mode(PinModeId::INPUT, 1),
            mode(PinModeId::OUTPUT, 1),
            mode(PinModeId::PULLUP, 1),
            mode(PinModeId::SERVO, 14),
        ],
    }
}

pub fn create_pwm_pin(id: u16) -> Pin {
    let mut pin = create_digital_pin(id);
    pin.supported_modes.insert(2, mode(PinModeId::PWM, 8));
    pin
}

pub fn create_analog_pin(id: u16, channel: u8) -> Pin {
    Pin {
        id,
        name: format!("A{}", channel),
        supported_modes: vec![
            mode(PinModeId::INPUT, 1),
            mode(PinModeId::OUTPUT, 1),
            mode(PinModeId::ANALOG, 10),
            mode(PinModeId::PULLUP, 1),
        ],
    }
}

/// An Arduino UNO as reported by StandardFirmata: D0-D1 reserved, PWM on 3, 5, 6, 9, 10 and 11,
/// A0-A5 on pins 14-19.
pub fn create_test_io_data() -> IoData {
    let mut data = IoData {
        pins: vec![],
        analog_mapping: Default::default(),
        handshake: HandshakeState {
            capabilities_received: true,
            analog_mapping_received: true,
            protocol_version: String::from("2.5"),
            firmware_name: String::from("MockFirmata.ino"),
            firmware_version: String::from("2.5"),
        },
        connected: false,
    };
    for id in 0..20u16 {
        let pin = match id {
            0 | 1 => create_unsupported_pin(id),
            3 | 5 | 6 | 9 | 10 | 11 => create_pwm_pin(id),
            14.. => {
                let channel = (id - 14) as u8;
                data.analog_mapping.insert(id, channel);
                create_analog_pin(id, channel)
            }
            _ => create_digital_pin(id),
        };
        data.pins.push(pin);
    }
    data
}

/// CAPABILITY_RESPONSE frame describing `data.pins`.
pub fn create_capability_response(data: &IoData) -> Vec<u8> {
    let mut frame = vec![START_SYSEX, CAPABILITY_RESPONSE];
    for pin in &data.pins {
        for mode in &pin.supported_modes {
            frame.push(u8::from(mode.id));
            frame.push(mode.resolution);
        }
        frame.push(SYSEX_REALTIME);
    }
    frame.push(END_SYSEX);
    frame
}

/// ANALOG_MAPPING_RESPONSE frame describing `data.analog_mapping`.
pub fn create_analog_mapping_response(data: &IoData) -> Vec<u8> {
    let mut frame = vec![START_SYSEX, ANALOG_MAPPING_RESPONSE];
    for pin in &data.pins {
        frame.push(data.analog_mapping.channel(pin.id).unwrap_or(SYSEX_REALTIME));
    }
    frame.push(END_SYSEX);
    frame
}

/// REPORT_FIRMWARE frame: version bytes followed by the 14-bit packed name.
pub fn create_firmware_response(major: u8, minor: u8, name: &str) -> Vec<u8> {
    let mut frame = vec![START_SYSEX, REPORT_FIRMWARE, major, minor];
    for c in name.chars() {
        frame.extend(encode14(c as u16));
    }
    frame.push(END_SYSEX);
    frame
}

/// A [`MockTransport`] answering the handshake queries the way an UNO running StandardFirmata 2.5
/// does (see [`create_test_io_data`]).
pub fn create_test_transport() -> MockTransport {
    create_test_transport_for(&create_test_io_data())
}

/// A [`MockTransport`] whose handshake answers describe `data` (pins, analog mapping and firmware
/// name), with protocol and firmware version 2.5.
pub fn create_test_transport_for(data: &IoData) -> MockTransport {
    let transport = MockTransport::default();
    transport.respond_to(&[REPORT_VERSION], &[REPORT_VERSION, 2, 5]);
    transport.respond_to(
        &[START_SYSEX, REPORT_FIRMWARE, END_SYSEX],
        &create_firmware_response(2, 5, &data.handshake.firmware_name),
    );
    transport.respond_to(
        &[START_SYSEX, CAPABILITY_QUERY, END_SYSEX],
        &create_capability_response(data),
    );
    transport.respond_to(
        &[START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX],
        &create_analog_mapping_response(data),
    );
    transport
}
