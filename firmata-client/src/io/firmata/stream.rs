use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

use crate::errors::Error;
use crate::io::FirmataValue;

/// A value handed over by the reader, with the acknowledgement it waits for.
pub(crate) type Delivery = (Result<FirmataValue, Error>, oneshot::Sender<()>);

/// Single consumer stream of the values reported by the board.
///
/// The reader hands values over one at a time: it stalls until the previous one has been
/// consumed. A transport failure is delivered as a final `Err` item, then the stream ends.
#[derive(Debug)]
pub struct ValueStream {
    receiver: mpsc::Receiver<Delivery>,
}

/// Releases the reader waiting on this delivery.
fn accept((item, ack): Delivery) -> Result<FirmataValue, Error> {
    let _ = ack.send(());
    item
}

impl ValueStream {
    pub(crate) fn new(receiver: mpsc::Receiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Waits for the next value. Returns `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<Result<FirmataValue, Error>> {
        self.receiver.recv().await.map(accept)
    }

    /// Blocking variant of [`ValueStream::recv`] for use outside an async runtime.
    ///
    /// # Panics
    /// When called from within an asynchronous execution context.
    pub fn blocking_recv(&mut self) -> Option<Result<FirmataValue, Error>> {
        self.receiver.blocking_recv().map(accept)
    }

    /// Takes the pending value, if any, without waiting.
    pub fn try_recv(&mut self) -> Result<Result<FirmataValue, Error>, TryRecvError> {
        self.receiver.try_recv().map(accept)
    }
}

impl Stream for ValueStream {
    type Item = Result<FirmataValue, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx).map(|delivery| delivery.map(accept))
    }
}
