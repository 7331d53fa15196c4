use futures::StreamExt;

use firmata_client::errors::Error;
use firmata_client::io::{Firmata, PinModeId, Serial};

/// Prints the readings of a potentiometer plugged on A0 and of a button plugged on pin 2.
///
/// Usage: `cargo run --example analog_input -- [PORT]` (first available port by default).
#[tokio::main]
async fn main() -> Result<(), Error> {
    let transport = match std::env::args().nth(1) {
        Some(port) => Serial::new(port),
        None => Serial::default(),
    };

    let board = Firmata::connect(transport).await?;
    println!("{}", board);

    // Drain the stream before enabling the reports: the reader waits for each value to be consumed.
    let mut values = board.values().expect("value stream already taken");
    let printer = tokio::spawn(async move {
        while let Some(value) = values.next().await {
            match value {
                Ok(value) => println!("{}", value),
                Err(error) => println!("Connection lost: {}", error),
            }
        }
    });

    let a0 = board.get_pin("A0")?.id;
    board.set_pin_mode(a0, PinModeId::ANALOG)?;
    board.set_pin_mode(2, PinModeId::PULLUP)?;
    board.set_analog_sampling_interval(100)?;
    board.enable_analog_input(a0, true)?;
    board.enable_digital_input(2, true)?;

    tokio::time::sleep(std::time::Duration::from_secs(10)).await;

    board.enable_analog_input(a0, false)?;
    board.enable_digital_input(2, false)?;
    board.close()?;
    let _ = printer.await;
    Ok(())
}
