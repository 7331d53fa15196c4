#![doc(html_root_url = "https://docs.rs/firmata-client/0.1.0")]

//! <h1 align="center">FIRMATA-CLIENT</h1>
//! <div style="text-align:center;font-style:italic;">Drive the pins of a Firmata board from Rust.</div>
//! <br/>
//!
//! # Documentation
//!
//! This is the API documentation.<br/>
//! To see the code in action, run the demos of the `examples/` directory: `cargo run --example blink -- /dev/ttyACM0`.
//!
//! # Features
//!
//! **Firmata-client** speaks the [Firmata protocol](https://github.com/firmata/protocol) with a
//! microcontroller over a duplex byte stream (a serial port most of the time):
//!
//! - Connect to a board through an [`IoTransport`](io::IoTransport) ([`Serial`](io::Serial) for the moment) and
//!   learn its pins capabilities during the handshake
//! - Set pin modes, write digital and analog outputs, configure servos: every call is checked against
//!   the capabilities reported by the board
//! - Receive the digital and analog inputs as a [`ValueStream`](io::ValueStream)
//!
//! # Prerequisites
//!
//! [StandardFirmata.ino](https://github.com/firmata/arduino/blob/main/examples/StandardFirmata/StandardFirmata.ino)
//! (or StandardFirmataPlus) Arduino sketch **MUST** be installed on the board.
//! _This code is available by default in Arduino IDE under the Firmata samples sketch menu._
//!
//! # Getting Started
//!
//! - Add the following to your `Cargo.toml`:
//! ```toml
//! [dependencies]
//! firmata-client = "0.1.0"
//! tokio = { version = "1", features = ["macros", "rt-multi-thread"] }
//! ```
//!
//! The following code blinks the Arduino embedded led on pin 13.
//! ```no_run
//! use std::time::Duration;
//! use firmata_client::io::{Firmata, PinModeId, Serial};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), firmata_client::errors::Error> {
//!     // Connect to the first available serial port.
//!     let board = Firmata::connect(Serial::default()).await?;
//!     board.set_pin_mode(13, PinModeId::OUTPUT)?;
//!
//!     for i in 0..10 {
//!         board.digital_write(13, i % 2 == 0)?;
//!         tokio::time::sleep(Duration::from_millis(500)).await;
//!     }
//!     board.close()
//! }
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport` crate _libudev_ feature under-the-hood (required on Linux only for port listing).
//! - **serde** -- Enables serialize/deserialize capabilities for the pin capability model and the reported values.
//! - **mocks** -- Provides mocked transports and board data (useful for tests mostly).

pub mod errors;
pub mod io;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod utils;
