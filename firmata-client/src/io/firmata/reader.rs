use std::sync::Arc;

use log::{debug, error, trace, warn};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};

use crate::errors::Error;
use crate::io::codec::decode14;
use crate::io::firmata::constants::*;
use crate::io::firmata::stream::Delivery;
use crate::io::firmata::sysex::decode_sysex;
use crate::io::{FirmataValue, IoData, IoTransport};

/// Synchronization state of the [`FrameReader`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReaderState {
    /// Every byte is discarded until a REPORT_VERSION command shows up.
    AwaitingSync,
    /// Frames are decoded for the rest of the connection.
    Synced,
}

/// Background decoder owning the read side of the transport.
///
/// It updates the shared [`IoData`] from sysex responses, signals the end of the handshake once,
/// and hands decoded values over to the [`ValueStream`](crate::io::ValueStream).
pub(crate) struct FrameReader {
    transport: Box<dyn IoTransport>,
    data: Arc<RwLock<IoData>>,
    state: ReaderState,
    /// Fires once: taken when the handshake completes.
    handshake: Option<oneshot::Sender<()>>,
    values: mpsc::Sender<Delivery>,
    /// Acknowledgement of the last value handed over, not consumed yet.
    pending: Option<oneshot::Receiver<()>>,
    /// Command byte that interrupted a sysex: decoded next.
    lookahead: Option<u8>,
}

impl FrameReader {
    pub(crate) fn new(
        transport: Box<dyn IoTransport>,
        data: Arc<RwLock<IoData>>,
        handshake: oneshot::Sender<()>,
        values: mpsc::Sender<Delivery>,
    ) -> Self {
        Self {
            transport,
            data,
            state: ReaderState::AwaitingSync,
            handshake: Some(handshake),
            values,
            pending: None,
            lookahead: None,
        }
    }

    /// Runs the reader on a dedicated thread: reads block on the transport.
    pub(crate) fn spawn(self) -> Result<(), Error> {
        std::thread::Builder::new()
            .name(String::from("firmata-reader"))
            .spawn(move || self.run())?;
        Ok(())
    }

    /// Decodes frames until the transport fails.
    ///
    /// The next frame is only read once the consumer took the previous value.
    /// The failure marks the client as disconnected, is pushed on the value stream, and ends the
    /// stream once the reader is gone.
    fn run(mut self) {
        let error = loop {
            self.await_delivery();
            if let Err(error) = self.read_and_decode() {
                break error;
            }
        };

        error!("Firmata reader stopped: {}", error);
        self.data.write().connected = false;
        // Dropping the signal lets a pending handshake fail right away.
        self.handshake = None;
        let (ack, _) = oneshot::channel();
        let _ = self.values.blocking_send((Err(error), ack));
    }

    /// Stalls until the last emitted value is consumed, or the stream is dropped.
    fn await_delivery(&mut self) {
        if let Some(delivered) = self.pending.take() {
            let _ = delivered.blocking_recv();
        }
    }

    /// Reads one frame, applies it and returns its type.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>
    ///
    /// # Errors
    /// Only transport errors: decoding anomalies are logged and tolerated.
    pub(crate) fn read_and_decode(&mut self) -> Result<Message, Error> {
        let command = match self.lookahead.take() {
            Some(command) => command,
            None => self.transport.read_byte()?,
        };

        if self.state == ReaderState::AwaitingSync {
            if command != REPORT_VERSION {
                trace!("Waiting for sync: discarded 0x{:02X}", command);
                return Ok(Message::EmptyResponse);
            }
            debug!("Synced with the board");
            self.state = ReaderState::Synced;
        }

        match command {
            REPORT_VERSION => self.handle_protocol_version(),
            START_SYSEX => self.handle_sysex_message(),
            _ if command & COMMAND_MASK == DIGITAL_MESSAGE => self.handle_digital_message(command),
            _ if command & COMMAND_MASK == ANALOG_MESSAGE => self.handle_analog_message(command),
            _ => {
                trace!("Ignored command byte 0x{:02X}", command);
                Ok(Message::EmptyResponse)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ReaderState {
        self.state
    }

    fn read_pair(&mut self) -> Result<(u8, u8), Error> {
        Ok((self.transport.read_byte()?, self.transport.read_byte()?))
    }

    /// Handle a REPORT_VERSION message (0xF9 - protocol version): sent at boot or on request.
    fn handle_protocol_version(&mut self) -> Result<Message, Error> {
        let (major, minor) = self.read_pair()?;
        let version = format!("{}.{}", major, minor);
        debug!("Received protocol version: {}", version);
        self.data.write().handshake.protocol_version = version;
        Ok(Message::ProtocolVersion)
    }

    /// Handle a START_SYSEX message: collects the payload up to END_SYSEX and decodes it.
    ///
    /// Payload bytes are 7-bit: any other command byte means END_SYSEX got lost. The sysex is then
    /// dropped and that command decoded on the next call.
    fn handle_sysex_message(&mut self) -> Result<Message, Error> {
        let mut payload = vec![];
        loop {
            match self.transport.read_byte()? {
                END_SYSEX => break,
                byte if byte & COMMAND_BIT != 0 => {
                    warn!("Sysex {:02X?} interrupted by 0x{:02X}: dropped", payload, byte);
                    self.lookahead = Some(byte);
                    return Ok(Message::EmptyResponse);
                }
                byte => payload.push(byte),
            }
        }

        let (message, complete) = {
            let mut lock = self.data.write();
            let message = decode_sysex(&payload, &mut lock).unwrap_or_else(|error| {
                warn!("Invalid sysex message {:02X?}: {}", payload, error);
                Message::EmptyResponse
            });
            (message, lock.handshake.is_complete())
        };

        if complete {
            if let Some(signal) = self.handshake.take() {
                debug!("Handshake complete");
                let _ = signal.send(());
            }
        }
        Ok(message)
    }

    /// Handle a DIGITAL_MESSAGE message (0x90 - report state of a digital port)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    fn handle_digital_message(&mut self, command: u8) -> Result<Message, Error> {
        let (lsb, msb) = self.read_pair()?;
        self.emit(FirmataValue::Digital {
            port: command & SELECTOR_MASK,
            value: decode14(lsb, msb),
        });
        Ok(Message::Digital)
    }

    /// Handle an ANALOG_MESSAGE message (0xE0 - report state of an analog channel)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    fn handle_analog_message(&mut self, command: u8) -> Result<Message, Error> {
        let (lsb, msb) = self.read_pair()?;
        let channel = command & SELECTOR_MASK;
        let pin = self.data.read().analog_mapping.pin(channel);
        self.emit(FirmataValue::Analog {
            channel,
            pin,
            value: decode14(lsb, msb),
        });
        Ok(Message::Analog)
    }

    /// Hands a value over to the consumer: [`FrameReader::run`] waits for its acknowledgement
    /// before reading further.
    ///
    /// Values reported before the handshake completes are dropped: nobody can consume them yet.
    fn emit(&mut self, value: FirmataValue) {
        if !self.data.read().handshake.is_complete() {
            trace!("Dropped early value: {}", value);
            return;
        }
        trace!("{}", value);
        let (ack, delivered) = oneshot::channel();
        match self.values.blocking_send((Ok(value), ack)) {
            Ok(()) => self.pending = Some(delivered),
            Err(_) => trace!("Value stream dropped: discarded {}", value),
        }
    }
}
