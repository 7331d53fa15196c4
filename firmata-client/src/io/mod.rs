//! Firmata protocol engine: wire codec, capability model, frame reader and client.

pub mod codec;
mod data;
pub mod firmata;
mod transports;
mod value;

pub use data::*;
pub use firmata::{Firmata, HandshakeOptions, ReaderState, ValueStream};
pub use transports::serial::Serial;
pub use transports::*;
pub use value::*;
