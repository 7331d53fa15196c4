//! Official Firmata documentation: https://github.com/firmata/protocol
//! Helper unofficial documentation: https://github.com/martin-eden/firmata_protocol/blob/main/protocol.md

pub mod constants;
mod reader;
mod stream;
mod sysex;

pub use reader::ReaderState;
pub use stream::ValueStream;

use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::errors::HardwareError::{IncompatibleMode, ValueOutOfRange};
use crate::errors::ProtocolError::{ConnectionClosed, HandshakeTimeout};
use crate::errors::Error;
use crate::io::codec::encode14;
use crate::io::firmata::constants::*;
use crate::io::firmata::reader::FrameReader;
use crate::io::firmata::stream::Delivery;
use crate::io::{IoData, IoTransport, Pin, PinIdOrName, PinModeId};
use crate::utils::format_as_hex;

/// Timing of the connection handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandshakeOptions {
    /// Delay after which the reset and the queries are sent again.
    pub retry_interval: Duration,
    /// Delay after which the connection is abandoned.
    pub timeout: Duration,
}

impl Default for HandshakeOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(15),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Client of the [Firmata protocol](https://github.com/firmata/protocol) over an [`IoTransport`].
///
/// A background reader decodes everything the board sends: the handshake responses feed the
/// pin capability model, input reports feed the [`ValueStream`]. Control operations validate
/// against the capability model then write to the transport directly.
///
/// All operations take `&self`: share the client across tasks or threads with an `Arc`.
///
/// # Example
/// ```no_run
/// use firmata_client::io::{Firmata, PinModeId, Serial};
///
/// #[tokio::main]
/// async fn main() -> Result<(), firmata_client::errors::Error> {
///     let board = Firmata::connect(Serial::new("/dev/ttyACM0")).await?;
///     board.set_pin_mode(13, PinModeId::OUTPUT)?;
///     board.digital_write(13, true)?;
///     board.close()
/// }
/// ```
pub struct Firmata {
    /// Write side of the transport (the reader owns a clone for the read side).
    transport: Mutex<Box<dyn IoTransport>>,
    /// Capability model, filled in by the reader during the handshake.
    data: Arc<RwLock<IoData>>,
    /// Last state written to each digital port: one lock per port.
    ports: [Mutex<u8>; 16],
    /// Handed out once by [`Firmata::values`].
    values: Mutex<Option<mpsc::Receiver<Delivery>>>,
}

impl Firmata {
    /// Opens the transport and performs the handshake with [`HandshakeOptions::default`].
    ///
    /// # Errors
    /// * `HandshakeTimeout` - The board did not describe itself within 30 seconds.
    /// * Any transport error while opening or writing.
    pub async fn connect<T: IoTransport + 'static>(transport: T) -> Result<Self, Error> {
        Self::connect_with(transport, HandshakeOptions::default()).await
    }

    /// Opens the transport, starts the background reader and queries the board until it
    /// reported both its capabilities and its analog mapping.
    ///
    /// The reset and the queries are sent again every `retry_interval`; the transport is closed
    /// if the handshake does not complete within `timeout`.
    pub async fn connect_with<T: IoTransport + 'static>(
        transport: T,
        options: HandshakeOptions,
    ) -> Result<Self, Error> {
        let mut transport: Box<dyn IoTransport> = Box::new(transport);
        transport.open()?;
        debug!("Transport opened: {}", transport);

        // Set before the reader starts: only the reader (or a close) may clear it.
        let data = Arc::new(RwLock::new(IoData {
            connected: true,
            ..Default::default()
        }));
        let (handshake_tx, handshake_rx) = oneshot::channel();
        let (values_tx, mut values_rx) = mpsc::channel(1);

        let reader = FrameReader::new(
            dyn_clone::clone_box(&*transport),
            data.clone(),
            handshake_tx,
            values_tx,
        );
        if let Err(error) = reader.spawn() {
            let _ = transport.close();
            return Err(error);
        }

        let client = Self {
            transport: Mutex::new(transport),
            data,
            ports: Default::default(),
            values: Mutex::new(None),
        };

        match client.handshake(handshake_rx, &mut values_rx, options).await {
            Ok(()) => {
                *client.values.lock() = Some(values_rx);
                debug!("Connected: {}", client);
                Ok(client)
            }
            Err(error) => {
                let _ = client.close();
                Err(error)
            }
        }
    }

    async fn handshake(
        &self,
        mut signal: oneshot::Receiver<()>,
        values: &mut mpsc::Receiver<Delivery>,
        options: HandshakeOptions,
    ) -> Result<(), Error> {
        self.query_board()?;

        let mut retry =
            tokio::time::interval_at(Instant::now() + options.retry_interval, options.retry_interval);
        let deadline = tokio::time::sleep(options.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                result = &mut signal => return match result {
                    Ok(()) => Ok(()),
                    // The reader died: it reports why on the value channel.
                    Err(_) => Err(match values.recv().await {
                        Some((Err(error), _)) => error,
                        _ => ConnectionClosed.into(),
                    }),
                },
                _ = retry.tick() => {
                    debug!("No handshake from the board yet: querying again");
                    self.query_board()?;
                }
                _ = &mut deadline => {
                    return Err(HandshakeTimeout {
                        timeout_ms: options.timeout.as_millis(),
                    }
                    .into());
                }
            }
        }
    }

    /// Resets the board then asks for everything the handshake needs.
    ///
    /// Boards do not always announce their protocol version on their own, hence REPORT_VERSION
    /// to get the reader in sync.
    fn query_board(&self) -> Result<(), Error> {
        self.send_command(&[SYSTEM_RESET])?;
        self.send_command(&[REPORT_VERSION])?;
        self.send_command(&[START_SYSEX, REPORT_FIRMWARE, END_SYSEX])?;
        self.send_command(&[START_SYSEX, CAPABILITY_QUERY, END_SYSEX])?;
        self.send_command(&[START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX])
    }

    /// Closes the transport: the reader stops and the value stream ends with an error.
    pub fn close(&self) -> Result<(), Error> {
        self.data.write().connected = false;
        self.transport.lock().close()
    }

    /// Writes raw bytes to the transport. Every command goes through here.
    ///
    /// # Errors
    /// Transport errors, unmodified.
    pub fn send_command(&self, bytes: &[u8]) -> Result<(), Error> {
        trace!("Send: [{}]", format_as_hex(bytes));
        self.transport.lock().write(bytes)
    }

    /// Takes the stream of values reported by the board: only the first call gets it.
    ///
    /// The reader blocks until each value is consumed, so start draining the stream before
    /// enabling inputs.
    pub fn values(&self) -> Option<ValueStream> {
        self.values.lock().take().map(ValueStream::new)
    }

    // ########################################
    // Pin control

    /// Sets the mode of a pin (SET_PIN_MODE - 0xF4).
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report this pin.
    /// * `IncompatibleMode` - The pin does not support this mode. Nothing is sent.
    pub fn set_pin_mode(&self, pin: u16, mode: PinModeId) -> Result<(), Error> {
        self.get_pin(pin)?
            .supports_mode(mode)
            .ok_or(IncompatibleMode {
                pin,
                mode,
                context: "set pin mode",
            })?;
        self.send_command(&[SET_PIN_MODE, pin as u8 & SYSEX_REALTIME, u8::from(mode)])
    }

    /// Sets a digital output level (DIGITAL_MESSAGE - 0x90).
    ///
    /// The state of the whole port is sent: the other 7 pins keep the level last written to them.
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report this pin.
    /// * `IncompatibleMode` - The pin is not an output, or lies beyond port 15.
    pub fn digital_write(&self, pin: u16, level: bool) -> Result<(), Error> {
        let port = self.output_port(pin)?;
        let bit = 1 << (pin % PINS_PER_PORT);

        let mut state = self.ports[usize::from(port)].lock();
        let value = match level {
            true => *state | bit,
            false => *state & !bit,
        };
        let [lsb, msb] = encode14(u16::from(value));
        self.send_command(&[DIGITAL_MESSAGE | port, lsb, msb])?;
        *state = value;
        Ok(())
    }

    fn output_port(&self, pin: u16) -> Result<u8, Error> {
        let instance = self.get_pin(pin)?;
        instance
            .supports_mode(PinModeId::OUTPUT)
            .ok_or(IncompatibleMode {
                pin,
                mode: PinModeId::OUTPUT,
                context: "digital write",
            })?;
        match instance.port() <= MAX_SELECTOR {
            true => Ok(instance.port()),
            false => Err(IncompatibleMode {
                pin,
                mode: PinModeId::OUTPUT,
                context: "digital messages only address ports 0 to 15",
            }
            .into()),
        }
    }

    /// Writes an analog value (PWM duty cycle, servo position) to a pin.
    ///
    /// Pins 0 to 15 use ANALOG_MESSAGE (0xE0), the others the EXTENDED_ANALOG sysex (0x6F).
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report this pin.
    /// * `IncompatibleMode` - The pin supports neither PWM nor SERVO.
    /// * `ValueOutOfRange` - The value exceeds the pin resolution.
    pub fn analog_write(&self, pin: u16, value: u16) -> Result<(), Error> {
        let max = {
            let lock = self.data.read();
            let instance = lock.get_pin(pin)?;
            let mode = instance
                .supports_mode(PinModeId::PWM)
                .or_else(|| instance.supports_mode(PinModeId::SERVO))
                .ok_or(IncompatibleMode {
                    pin,
                    mode: PinModeId::PWM,
                    context: "analog write",
                })?;
            match pin > u16::from(MAX_SELECTOR) {
                true => mode.get_max_possible_value(),
                false => mode.get_max_possible_value().min(MAX_14BIT_VALUE),
            }
        };
        if value > max {
            return Err(ValueOutOfRange { pin, value, max }.into());
        }

        let [lsb, msb] = encode14(value);
        match pin > u16::from(MAX_SELECTOR) {
            true => {
                let mut payload = vec![START_SYSEX, EXTENDED_ANALOG, pin as u8, lsb, msb];
                if value > MAX_14BIT_VALUE {
                    payload.push((value >> 14) as u8 & SYSEX_REALTIME);
                }
                payload.push(END_SYSEX);
                self.send_command(&payload)
            }
            false => self.send_command(&[ANALOG_MESSAGE | pin as u8, lsb, msb]),
        }
    }

    /// Starts or stops the reporting of the port holding `pin` (REPORT_DIGITAL - 0xD0).
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report this pin.
    /// * `IncompatibleMode` - The pin can be neither INPUT nor PULLUP, or lies beyond port 15.
    pub fn enable_digital_input(&self, pin: u16, enabled: bool) -> Result<(), Error> {
        let port = {
            let lock = self.data.read();
            let instance = lock.get_pin(pin)?;
            let incompatible = |context| IncompatibleMode {
                pin,
                mode: PinModeId::INPUT,
                context,
            };
            instance
                .supports_mode(PinModeId::INPUT)
                .or_else(|| instance.supports_mode(PinModeId::PULLUP))
                .ok_or(incompatible("enable digital input"))?;
            if instance.port() > MAX_SELECTOR {
                return Err(incompatible("digital reports only address ports 0 to 15").into());
            }
            instance.port()
        };
        self.send_command(&[REPORT_DIGITAL | port, u8::from(enabled)])
    }

    /// Starts or stops the reporting of an analog pin (REPORT_ANALOG - 0xC0).
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report this pin.
    /// * `IncompatibleMode` - The pin has no analog channel (or its channel is above 15).
    pub fn enable_analog_input(&self, pin: u16, enabled: bool) -> Result<(), Error> {
        let channel = {
            let lock = self.data.read();
            lock.get_pin(pin)?;
            lock.analog_mapping.channel(pin)
        };
        match channel {
            Some(channel) if channel <= MAX_SELECTOR => {
                self.send_command(&[REPORT_ANALOG | channel, u8::from(enabled)])
            }
            _ => Err(IncompatibleMode {
                pin,
                mode: PinModeId::ANALOG,
                context: "enable analog input",
            }
            .into()),
        }
    }

    /// Sets how often analog inputs are sampled and reported (SAMPLING_INTERVAL - 0x7A).
    ///
    /// Values above 16383ms are clamped.
    pub fn set_analog_sampling_interval(&self, interval_ms: u16) -> Result<(), Error> {
        let [lsb, msb] = encode14(interval_ms.min(MAX_14BIT_VALUE));
        self.send_command(&[START_SYSEX, SAMPLING_INTERVAL, lsb, msb, END_SYSEX])
    }

    /// Configures the pulse range of a servo (SERVO_CONFIG - 0x70).
    ///
    /// # Errors
    /// * `UnknownPin` - The board did not report this pin.
    /// * `IncompatibleMode` - The pin does not support SERVO.
    /// * `ValueOutOfRange` - A pulse width does not fit in 14 bits.
    pub fn servo_config(&self, pin: u16, min_pulse: u16, max_pulse: u16) -> Result<(), Error> {
        self.get_pin(pin)?
            .supports_mode(PinModeId::SERVO)
            .ok_or(IncompatibleMode {
                pin,
                mode: PinModeId::SERVO,
                context: "servo config",
            })?;
        for value in [min_pulse, max_pulse] {
            if value > MAX_14BIT_VALUE {
                return Err(ValueOutOfRange {
                    pin,
                    value,
                    max: MAX_14BIT_VALUE,
                }
                .into());
            }
        }

        let [min_lsb, min_msb] = encode14(min_pulse);
        let [max_lsb, max_msb] = encode14(max_pulse);
        self.send_command(&[
            START_SYSEX,
            SERVO_CONFIG,
            pin as u8 & SYSEX_REALTIME,
            min_lsb,
            min_msb,
            max_lsb,
            max_msb,
            END_SYSEX,
        ])
    }

    // ########################################
    // Accessors

    /// Read access to the capability model, as filled in by the handshake.
    ///
    /// Hold the guard briefly: the reader needs the lock to decode incoming frames.
    pub fn get_io(&self) -> RwLockReadGuard<'_, IoData> {
        self.data.read()
    }

    /// `false` once closed or after the reader lost the transport.
    pub fn is_connected(&self) -> bool {
        self.data.read().connected
    }

    pub fn protocol_version(&self) -> String {
        self.data.read().handshake.protocol_version.clone()
    }

    pub fn firmware_name(&self) -> String {
        self.data.read().handshake.firmware_name.clone()
    }

    pub fn firmware_version(&self) -> String {
        self.data.read().handshake.firmware_version.clone()
    }

    /// Retrieves a pin by id or name ('D13', 'A0'...).
    pub fn get_pin<T: Into<PinIdOrName>>(&self, pin: T) -> Result<Pin, Error> {
        self.data.read().get_pin(pin).cloned()
    }

    pub fn pins(&self) -> Vec<Pin> {
        self.data.read().pins.clone()
    }
}

impl Drop for Firmata {
    fn drop(&mut self) {
        let _ = self.transport.get_mut().close();
    }
}

impl Debug for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firmata")
            .field("transport", &self.transport.lock())
            .field("data", &self.data.read())
            .finish()
    }
}

impl Display for Firmata {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        write!(
            f,
            "Firmata [firmware={}, version={}, protocol={}, transport={}]",
            data.handshake.firmware_name,
            data.handshake.firmware_version,
            data.handshake.protocol_version,
            self.transport.lock()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::create_test_transport;
    use crate::mocks::transport::MockTransport;
    use futures::StreamExt;
    use serial_test::serial;

    async fn create_test_client() -> (Firmata, MockTransport) {
        let board = create_test_transport();
        let client = Firmata::connect(board.clone()).await.unwrap();
        board.clear_written();
        (client, board)
    }

    fn fast_options() -> HandshakeOptions {
        HandshakeOptions {
            retry_interval: Duration::from_millis(50),
            timeout: Duration::from_millis(220),
        }
    }

    #[tokio::test]
    async fn test_connect() {
        let board = create_test_transport();
        let client = Firmata::connect(board.clone()).await.unwrap();

        assert!(client.is_connected());
        assert!(board.is_open());
        assert_eq!(
            board.written(),
            vec![
                vec![SYSTEM_RESET],
                vec![REPORT_VERSION],
                vec![START_SYSEX, REPORT_FIRMWARE, END_SYSEX],
                vec![START_SYSEX, CAPABILITY_QUERY, END_SYSEX],
                vec![START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX],
            ]
        );
        assert_eq!(client.pins().len(), 20);
        assert_eq!(client.get_pin("A0").unwrap().id, 14);
        assert_eq!(client.protocol_version(), "2.5");
        assert_eq!(client.firmware_version(), "2.5");
        assert_eq!(client.firmware_name(), "MockFirmata.ino");
        assert!(client.get_io().handshake.is_complete());
        assert_eq!(
            format!("{}", client),
            "Firmata [firmware=MockFirmata.ino, version=2.5, protocol=2.5, transport=MockTransport]"
        );
    }

    #[tokio::test]
    #[serial]
    async fn test_connect_timeout_retries_then_closes() {
        let board = MockTransport::default();
        let result = Firmata::connect_with(board.clone(), fast_options()).await;

        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: No handshake received from the board within 220ms."
        );
        assert!(!board.is_open());
        let resets = board
            .written()
            .iter()
            .filter(|bytes| bytes.as_slice() == [SYSTEM_RESET])
            .count();
        assert!(resets >= 3, "Reset sent {} times", resets);
    }

    #[tokio::test]
    #[serial]
    async fn test_connect_completes_after_late_answer() {
        let data = crate::mocks::create_test_io_data();
        let board = MockTransport::default();
        let feeder = board.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(80)).await;
            feeder.push_incoming(&[REPORT_VERSION, 2, 5]);
            feeder.push_incoming(&crate::mocks::create_capability_response(&data));
            feeder.push_incoming(&crate::mocks::create_analog_mapping_response(&data));
        });
        let options = HandshakeOptions {
            retry_interval: Duration::from_millis(50),
            timeout: Duration::from_secs(5),
        };
        let client = Firmata::connect_with(board.clone(), options).await.unwrap();
        assert!(client.is_connected());
        assert!(board.written().len() > 5, "Queries were sent again");
    }

    #[tokio::test]
    async fn test_connect_fails_when_reader_dies() {
        #[derive(Clone, Debug)]
        struct ClosingTransport(MockTransport);
        impl Display for ClosingTransport {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "ClosingTransport")
            }
        }
        impl IoTransport for ClosingTransport {
            fn open(&mut self) -> Result<(), Error> {
                self.0.open()
            }
            fn close(&mut self) -> Result<(), Error> {
                self.0.close()
            }
            fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
                self.0.write(buf)
            }
            fn read_byte(&mut self) -> Result<u8, Error> {
                Err(crate::errors::ProtocolError::IoException {
                    info: String::from("Board unplugged"),
                }
                .into())
            }
        }

        let board = MockTransport::default();
        let result = Firmata::connect(ClosingTransport(board.clone())).await;
        assert_eq!(
            result.err().unwrap().to_string(),
            "Protocol error: Board unplugged."
        );
        assert!(!board.is_open());
    }

    #[tokio::test]
    async fn test_reader_failure_after_handshake_disconnects() {
        /// Read side fails once the handshake answers are consumed.
        #[derive(Clone, Debug)]
        struct DyingTransport {
            board: MockTransport,
            remaining: Arc<Mutex<usize>>,
        }
        impl Display for DyingTransport {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "DyingTransport")
            }
        }
        impl IoTransport for DyingTransport {
            fn open(&mut self) -> Result<(), Error> {
                self.board.open()
            }
            fn close(&mut self) -> Result<(), Error> {
                self.board.close()
            }
            fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
                self.board.write(buf)
            }
            fn read_byte(&mut self) -> Result<u8, Error> {
                let mut remaining = self.remaining.lock();
                match *remaining {
                    0 => Err(crate::errors::ProtocolError::IoException {
                        info: String::from("Board unplugged"),
                    }
                    .into()),
                    _ => {
                        *remaining -= 1;
                        self.board.read_byte()
                    }
                }
            }
        }

        let data = crate::mocks::create_test_io_data();
        let handshake_bytes = 3
            + crate::mocks::create_firmware_response(2, 5, &data.handshake.firmware_name).len()
            + crate::mocks::create_capability_response(&data).len()
            + crate::mocks::create_analog_mapping_response(&data).len();
        let transport = DyingTransport {
            board: create_test_transport(),
            remaining: Arc::new(Mutex::new(handshake_bytes)),
        };

        let client = Firmata::connect(transport).await.unwrap();
        let mut values = client.values().unwrap();
        assert_eq!(
            values.recv().await.unwrap().err().unwrap().to_string(),
            "Protocol error: Board unplugged."
        );
        assert!(!client.is_connected(), "Reader failure is not overwritten");
    }

    #[tokio::test]
    async fn test_set_pin_mode() {
        let (client, board) = create_test_client().await;

        assert!(client.set_pin_mode(13, PinModeId::OUTPUT).is_ok());
        assert!(client.set_pin_mode(3, PinModeId::PWM).is_ok());
        assert!(client.set_pin_mode(14, PinModeId::ANALOG).is_ok());
        assert_eq!(
            board.written(),
            vec![vec![0xF4, 13, 0x01], vec![0xF4, 3, 0x03], vec![0xF4, 14, 0x02]]
        );
    }

    #[tokio::test]
    async fn test_set_pin_mode_failures_send_nothing() {
        let (client, board) = create_test_client().await;

        assert_eq!(
            client.set_pin_mode(4, PinModeId::PWM).err().unwrap().to_string(),
            "Hardware error: Pin (4) not compatible with mode (PWM) - set pin mode."
        );
        assert_eq!(
            client.set_pin_mode(0, PinModeId::INPUT).err().unwrap().to_string(),
            "Hardware error: Pin (0) not compatible with mode (INPUT) - set pin mode."
        );
        assert_eq!(
            client.set_pin_mode(42, PinModeId::OUTPUT).err().unwrap().to_string(),
            "Hardware error: Unknown pin 42."
        );
        assert!(board.written().is_empty());
    }

    #[tokio::test]
    async fn test_set_pin_mode_follows_capabilities() {
        let (client, board) = create_test_client().await;
        let modes = [
            PinModeId::INPUT,
            PinModeId::OUTPUT,
            PinModeId::ANALOG,
            PinModeId::PWM,
            PinModeId::SERVO,
            PinModeId::PULLUP,
            PinModeId::I2C,
        ];
        for pin in client.pins() {
            for mode in modes {
                let result = client.set_pin_mode(pin.id, mode);
                assert_eq!(
                    result.is_ok(),
                    pin.supports_mode(mode).is_some(),
                    "pin {} mode {}",
                    pin.id,
                    mode
                );
            }
        }
        assert!(board.written().iter().all(|bytes| bytes[0] == SET_PIN_MODE));
    }

    #[tokio::test]
    async fn test_digital_write_isolates_bits() {
        let (client, board) = create_test_client().await;

        client.digital_write(2, true).unwrap();
        client.digital_write(7, true).unwrap();
        client.digital_write(13, true).unwrap();
        client.digital_write(7, false).unwrap();
        assert_eq!(
            board.written(),
            vec![
                vec![0x90, 0b0000_0100, 0x00],
                vec![0x90, 0b0000_0100, 0x01],
                vec![0x91, 0b0010_0000, 0x00],
                vec![0x90, 0b0000_0100, 0x00],
            ]
        );

        for pin in 2..20u16 {
            board.clear_written();
            let port = (pin / 8) as usize;
            let before = *client.ports[port].lock();
            client.digital_write(pin, true).unwrap();
            client.digital_write(pin, false).unwrap();
            let after = *client.ports[port].lock();
            let bit = 1u8 << (pin % 8);
            assert_eq!(before & !bit, after & !bit, "pin {}", pin);
            assert_eq!(after & bit, 0);
        }
    }

    #[tokio::test]
    async fn test_digital_write_failures() {
        let (client, board) = create_test_client().await;
        assert_eq!(
            client.digital_write(1, true).err().unwrap().to_string(),
            "Hardware error: Pin (1) not compatible with mode (OUTPUT) - digital write."
        );
        assert!(client.digital_write(20, true).is_err());
        assert!(board.written().is_empty());

        board.fail_writes();
        assert!(client.digital_write(13, true).is_err());
        assert_eq!(*client.ports[1].lock(), 0, "Failed write keeps the port state");
    }

    #[tokio::test]
    async fn test_concurrent_digital_writes() {
        let (client, board) = create_test_client().await;
        let client = Arc::new(client);

        let handles: Vec<_> = (8..14u16)
            .map(|pin| {
                let client = client.clone();
                std::thread::spawn(move || client.digital_write(pin, true))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(*client.ports[1].lock(), 0b0011_1111);
        assert_eq!(board.written().last().unwrap(), &vec![0x91, 0x3F, 0x00]);
    }

    #[tokio::test]
    async fn test_analog_write() {
        let (client, board) = create_test_client().await;

        client.analog_write(3, 170).unwrap();
        client.analog_write(9, 255).unwrap();
        client.analog_write(2, 1500).unwrap();
        assert_eq!(
            board.written(),
            vec![
                vec![0xE3, 0x2A, 0x01],
                vec![0xE9, 0x7F, 0x01],
                vec![0xE2, 0x5C, 0x0B],
            ]
        );

        assert_eq!(
            client.analog_write(3, 256).err().unwrap().to_string(),
            "Hardware error: Value 256 out of range for pin 3 (max: 255)."
        );
        assert_eq!(
            client.analog_write(14, 10).err().unwrap().to_string(),
            "Hardware error: Pin (14) not compatible with mode (PWM) - analog write."
        );
        assert_eq!(board.written().len(), 3);
    }

    #[tokio::test]
    async fn test_extended_analog_write() {
        let mut data = crate::mocks::create_test_io_data();
        data.pins.push(crate::mocks::create_pwm_pin(20));
        let board = crate::mocks::create_test_transport_for(&data);
        let client = Firmata::connect(board.clone()).await.unwrap();
        board.clear_written();
        assert_eq!(client.pins().len(), 21);

        client.analog_write(20, 200).unwrap();
        assert_eq!(
            board.written(),
            vec![vec![0xF0, 0x6F, 20, 0x48, 0x01, 0xF7]]
        );
    }

    #[tokio::test]
    async fn test_enable_inputs() {
        let (client, board) = create_test_client().await;

        client.enable_digital_input(10, true).unwrap();
        client.enable_digital_input(2, false).unwrap();
        client.enable_analog_input(14, true).unwrap();
        client.enable_analog_input(19, false).unwrap();
        assert_eq!(
            board.written(),
            vec![
                vec![0xD1, 0x01],
                vec![0xD0, 0x00],
                vec![0xC0, 0x01],
                vec![0xC5, 0x00],
            ]
        );

        assert_eq!(
            client.enable_analog_input(13, true).err().unwrap().to_string(),
            "Hardware error: Pin (13) not compatible with mode (ANALOG) - enable analog input."
        );
        assert!(client.enable_digital_input(0, true).is_err());
        assert!(client.enable_analog_input(66, true).is_err());
        assert_eq!(board.written().len(), 4);
    }

    #[tokio::test]
    async fn test_sampling_interval_and_servo_config() {
        let (client, board) = create_test_client().await;

        client.set_analog_sampling_interval(100).unwrap();
        client.set_analog_sampling_interval(20000).unwrap();
        client.servo_config(9, 544, 2400).unwrap();
        assert_eq!(
            board.written(),
            vec![
                vec![0xF0, 0x7A, 0x64, 0x00, 0xF7],
                vec![0xF0, 0x7A, 0x7F, 0x7F, 0xF7],
                vec![0xF0, 0x70, 9, 0x20, 0x04, 0x60, 0x12, 0xF7],
            ]
        );

        assert!(client.servo_config(14, 544, 2400).is_err());
        assert!(client.servo_config(9, 544, 20000).is_err());
        assert_eq!(board.written().len(), 3);
    }

    #[tokio::test]
    async fn test_value_stream() {
        let (client, board) = create_test_client().await;
        let mut values = client.values().unwrap();
        assert!(client.values().is_none(), "Stream is handed out once");

        board.push_incoming(&[0xE0, 0x68, 0x07, 0x90, 0x7F, 0x01]);
        let analog = values.recv().await.unwrap().unwrap();
        assert_eq!(analog.analog_value().unwrap(), (14, 1000));
        let digital = values.next().await.unwrap().unwrap();
        assert_eq!(digital.digital_value().unwrap().0, 0);

        client.close().unwrap();
        assert!(!client.is_connected());
        assert!(values.recv().await.unwrap().is_err());
        assert!(values.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_send_command_propagates_errors() {
        let (client, board) = create_test_client().await;
        client.send_command(&[0x01, 0x02]).unwrap();
        assert_eq!(board.written(), vec![vec![0x01, 0x02]]);

        client.close().unwrap();
        assert_eq!(
            client.send_command(&[0x01]).err().unwrap().to_string(),
            "Protocol error: Connection has not been initialized."
        );
    }

    #[test]
    fn test_handshake_options_default() {
        let options = HandshakeOptions::default();
        assert_eq!(options.retry_interval, Duration::from_secs(15));
        assert_eq!(options.timeout, Duration::from_secs(30));
    }
}
