use std::time::Duration;

use firmata_client::errors::Error;
use firmata_client::io::{Firmata, PinModeId, Serial};

/// Blinks the embedded led of an Arduino (pin 13) ten times.
///
/// Usage: `cargo run --example blink -- [PORT]` (first available port by default).
#[tokio::main]
async fn main() -> Result<(), Error> {
    let transport = match std::env::args().nth(1) {
        Some(port) => Serial::new(port),
        None => Serial::default(),
    };

    let board = Firmata::connect(transport).await?;
    println!("{}", board);

    board.set_pin_mode(13, PinModeId::OUTPUT)?;
    for i in 0..20 {
        board.digital_write(13, i % 2 == 0)?;
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    board.close()
}
