use crate::errors::Error;
use dyn_clone::DynClone;
use std::fmt::{Debug, Display};

pub mod serial;

dyn_clone::clone_trait_object!(IoTransport);

/// Duplex byte stream used by the [`Firmata`](crate::io::Firmata) client.
///
/// A transport is cloned once when connecting: the clone is handed to the background reader, which
/// is then the only caller of [`IoTransport::read_byte`], while the client keeps the original for
/// [`IoTransport::write`]. Clones must therefore share the same underlying connection.
pub trait IoTransport: Debug + Display + DynClone + Send + Sync {
    /// Opens communication (in a blocking way) using the transport layer.
    fn open(&mut self) -> Result<(), Error>;

    /// Gracefully shuts down the transport layer.
    ///
    /// # Notes
    /// A `read_byte` pending in another clone must fail once the transport is closed.
    fn close(&mut self) -> Result<(), Error>;

    /// Writes all bytes to the internal connection. For more details see [`std::io::Write::write_all`].
    ///
    /// # Notes
    /// This function blocks until the write operation is complete. Ensure proper error handling in calling code.
    fn write(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Reads the next byte from the internal connection.
    ///
    /// # Notes
    /// This function blocks until a byte is available or the connection fails.
    fn read_byte(&mut self) -> Result<u8, Error>;
}
