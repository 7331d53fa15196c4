use crate::errors::Error;
use crate::errors::ProtocolError::{ConnectionClosed, NotInitialized};
use crate::io::IoTransport;
use log::trace;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

/// Default Firmata baud rate (StandardFirmata uses 57600).
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// How long a single read may block before the reader lock is released and taken again.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

type SharedPort = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

#[derive(Clone, Debug)]
pub struct Serial {
    /// The connection port.
    port: String,
    /// The connection speed.
    baud_rate: u32,
    /// Handle used for writing.
    writer: SharedPort,
    /// Handle used for reading: a clone of the writer handle so a pending read never holds the write lock.
    reader: SharedPort,
}

impl Serial {
    /// Constructs a new `Serial` transport layer instance for communication through the specified port.
    ///
    /// # Arguments
    /// * `port` - The serial port to use for communication.
    ///
    /// # Example
    /// ```no_run
    /// use firmata_client::io::{Firmata, Serial};
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let board = Firmata::connect(Serial::new("/dev/ttyACM0")).await;
    /// }
    /// ```
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            writer: Arc::new(Mutex::new(None)),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    /// Overrides the default baud rate (57600).
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Retrieves the configured port.
    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// Retrieves the configured baud rate.
    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Default for Serial {
    /// Creates a new serial transport connection with the first available port or an empty string if no ports are available.
    ///
    /// # Notes
    /// The first available port will be used, None otherwise, which will probably lead to an error
    /// during the open phase.
    #[cfg(not(tarpaulin_include))]
    fn default() -> Self {
        let ports = serialport::available_ports().unwrap_or_else(|_| vec![]);
        match ports.first() {
            Some(port) => Self::new(&port.port_name),
            None => Self::new(""),
        }
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({})", self.port)
    }
}

impl IoTransport for Serial {
    fn open(&mut self) -> Result<(), Error> {
        let connexion = serialport::new(self.port.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()?;
        trace!("Serial port is now opened: {:?}", connexion);

        let reader = connexion.try_clone()?;
        *self.writer.lock() = Some(connexion);
        *self.reader.lock() = Some(reader);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        *self.writer.lock() = None;
        // Waits at most READ_TIMEOUT for a pending read to release the handle.
        *self.reader.lock() = None;
        Ok(())
    }

    /// Write bytes to the internal connection. For more details see [`std::io::Write::write_all`].
    ///
    /// # Returns
    /// * `Ok(())` if all bytes were successfully written.
    /// * `Err(Error)` if there was an issue writing data.
    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut lock = self.writer.lock();
        lock.as_mut().ok_or(NotInitialized)?.write_all(buf)?;
        Ok(())
    }

    /// Reads a byte from the internal connection.
    ///
    /// Read timeouts are not errors: the call keeps waiting until a byte arrives, the port fails or
    /// the transport is closed.
    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut byte = [0u8];
        loop {
            let mut lock = self.reader.lock();
            let io = lock.as_mut().ok_or(ConnectionClosed)?;
            match io.read(&mut byte) {
                Ok(0) => return Err(ConnectionClosed.into()),
                Ok(_) => return Ok(byte[0]),
                Err(error) if error.kind() == ErrorKind::TimedOut => continue,
                Err(error) => return Err(error.into()),
            }
        }
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        std::io::Error::from(value).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::serial_port::SerialPortMock;
    use serialport::ErrorKind;

    fn get_test_successful_transport() -> Serial {
        let transport = Serial::new("/dev/ttyACM0");
        *transport.writer.lock() = Some(Box::new(SerialPortMock::default()));
        *transport.reader.lock() = Some(Box::new(SerialPortMock::default()));
        transport
    }

    fn get_test_failing_transport() -> Serial {
        let transport = Serial::new("/dev/ttyACM0");
        *transport.writer.lock() = Some(Box::new(SerialPortMock::new(ErrorKind::InvalidInput)));
        *transport.reader.lock() = Some(Box::new(SerialPortMock::new(ErrorKind::InvalidInput)));
        transport
    }

    #[test]
    fn test_new_serial_transport() {
        let transport = Serial::new("/dev/ttyACM0");
        assert_eq!(transport.get_port(), "/dev/ttyACM0");
        assert_eq!(transport.get_baud_rate(), 57_600);
        assert!(transport.writer.lock().is_none());
        assert!(transport.reader.lock().is_none());

        let transport = Serial::new("COM4").with_baud_rate(115_200);
        assert_eq!(transport.get_port(), "COM4");
        assert_eq!(transport.get_baud_rate(), 115_200);
    }

    #[test]
    fn test_close_serial_transport() {
        let mut transport = get_test_successful_transport();
        let clone = transport.clone();
        let result = transport.close();
        assert!(result.is_ok());
        assert!(transport.writer.lock().is_none());
        assert!(clone.reader.lock().is_none(), "Clones share the same handles");
    }

    #[test]
    fn test_write_data() {
        let mut transport = get_test_successful_transport();
        assert!(transport.write(&[1, 2, 3]).is_ok());
        assert!(transport.write(&[]).is_ok());

        let mut transport = get_test_failing_transport();
        assert!(transport.write(&[1, 2, 3]).is_err());

        let mut transport = Serial::new("/dev/ttyACM0");
        assert_eq!(
            transport.write(&[1]).err().unwrap().to_string(),
            "Protocol error: Connection has not been initialized."
        );
    }

    #[test]
    fn test_read_byte() {
        let mut transport = get_test_successful_transport();
        *transport.reader.lock() = Some(Box::new(SerialPortMock::with_incoming(&[0xF9, 0x02])));
        assert_eq!(transport.read_byte().unwrap(), 0xF9);
        assert_eq!(transport.read_byte().unwrap(), 0x02);

        let mut transport = get_test_failing_transport();
        assert!(transport.read_byte().is_err());
    }

    #[test]
    fn test_read_after_close() {
        let mut transport = get_test_successful_transport();
        let mut reader = transport.clone();
        transport.close().unwrap();
        assert_eq!(
            reader.read_byte().err().unwrap().to_string(),
            "Protocol error: Connection closed by the board or the transport."
        );
    }

    #[test]
    fn test_from_serial_error() {
        let serial_error = serialport::Error {
            kind: ErrorKind::Unknown,
            description: String::from("test error"),
        };
        let custom_error: Error = serial_error.into();
        assert_eq!(custom_error.to_string(), "Protocol error: test error.");

        let serial_error = serialport::Error {
            kind: ErrorKind::Io(std::io::ErrorKind::NotFound),
            description: String::from("IO error"),
        };
        let custom_error: Error = serial_error.into();
        assert_eq!(
            custom_error.to_string(),
            "Protocol error: Board not found or already in use."
        );
    }

    #[test]
    fn test_display_serial_transport() {
        let transport = Serial::new("/dev/ttyACM0");
        assert_eq!(format!("{}", transport), "Serial(/dev/ttyACM0)");
    }
}
