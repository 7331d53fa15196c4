use crate::errors::Error;
use crate::errors::ProtocolError::{ConnectionClosed, IoException, NotInitialized};
use crate::io::IoTransport;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Mock [`IoTransport`] for testing the protocol engine without a board.
///
/// Clones share the same state, so a test can keep one handle to feed bytes and inspect writes
/// while the client (and its background reader) own the others.
/// Canned answers registered with [`MockTransport::respond_to`] play the board side of a
/// conversation: see [`create_test_transport`](crate::mocks::create_test_transport).
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    inner: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
    available: Condvar,
}

#[derive(Debug, Default)]
struct MockState {
    opened: bool,
    /// Bytes the board "sent", waiting to be read.
    incoming: VecDeque<u8>,
    /// Log of every `write()` call.
    written: Vec<Vec<u8>>,
    /// Request/response pairs: writing `request` queues `response` for reading.
    responses: Vec<(Vec<u8>, Vec<u8>)>,
    /// Makes every subsequent write fail.
    failing_writes: bool,
}

impl MockTransport {
    /// Queues bytes as if the board had sent them.
    pub fn push_incoming(&self, bytes: &[u8]) {
        let mut state = self.inner.state.lock();
        state.incoming.extend(bytes);
        self.inner.available.notify_all();
    }

    /// Registers a canned answer: each time exactly `request` is written, `response` gets queued.
    pub fn respond_to(&self, request: &[u8], response: &[u8]) {
        self.inner
            .state
            .lock()
            .responses
            .push((request.to_vec(), response.to_vec()));
    }

    /// Returns all data written so far, one entry per `write()` call.
    pub fn written(&self) -> Vec<Vec<u8>> {
        self.inner.state.lock().written.clone()
    }

    /// Forgets the write log.
    pub fn clear_written(&self) {
        self.inner.state.lock().written.clear();
    }

    /// Makes every subsequent write fail with an IO error.
    pub fn fail_writes(&self) {
        self.inner.state.lock().failing_writes = true;
    }

    pub fn is_open(&self) -> bool {
        self.inner.state.lock().opened
    }
}

impl Display for MockTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockTransport")
    }
}

impl IoTransport for MockTransport {
    fn open(&mut self) -> Result<(), Error> {
        self.inner.state.lock().opened = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.inner.state.lock().opened = false;
        self.inner.available.notify_all();
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut state = self.inner.state.lock();
        if !state.opened {
            return Err(NotInitialized.into());
        }
        if state.failing_writes {
            return Err(IoException {
                info: String::from("Mock write failure"),
            }
            .into());
        }
        state.written.push(buf.to_vec());

        let response = state
            .responses
            .iter()
            .find(|(request, _)| request == buf)
            .map(|(_, response)| response.clone());
        if let Some(response) = response {
            state.incoming.extend(response);
            self.inner.available.notify_all();
        }
        Ok(())
    }

    /// Blocks until a byte is queued or the transport is closed.
    fn read_byte(&mut self) -> Result<u8, Error> {
        let mut state = self.inner.state.lock();
        loop {
            if !state.opened {
                return Err(ConnectionClosed.into());
            }
            if let Some(byte) = state.incoming.pop_front() {
                return Ok(byte);
            }
            self.inner.available.wait(&mut state);
        }
    }
}
