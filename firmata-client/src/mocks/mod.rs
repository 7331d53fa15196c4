//! Mocked transports and board data (useful for tests mostly).

mod io_data;
pub mod serial_port;
pub mod transport;

pub use io_data::*;
