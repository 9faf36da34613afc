//! Simulated peripheral example
//!
//! Runs the peripheral core against the in-process radio and walks through
//! a central session:
//! - Advertising with the scaled interval
//! - A central connecting and writing to RX
//! - The indicator effect expiring
//! - Re-advertising after the central leaves
//!
//! Run with: cargo run --example simulated_peripheral
//!
//! To send your own message:
//!   cargo run --example simulated_peripheral -- --message "hello there"

use partible_peripheral::ble::RX_UUID;
use partible_peripheral::sim::{RecordingIndicator, SimulatedRadio};
use partible_peripheral::{
    PeerHandle, PeripheralConfig, PeripheralController, PeripheralEvent, Result,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("warn,partible_peripheral=debug")
        .init();

    println!("Simulated Peripheral");
    println!("====================\n");

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let message = args
        .iter()
        .position(|arg| arg == "--message")
        .and_then(|i| args.get(i + 1))
        .cloned()
        .unwrap_or_else(|| "hello partible".to_string());

    let radio = Arc::new(SimulatedRadio::new(8));
    let indicator = Arc::new(RecordingIndicator::new());
    let config = PeripheralConfig::default()
        .with_indicator_duration(Duration::from_millis(1500))
        .with_status_interval(Duration::from_secs(1));

    let peripheral = Arc::new(PeripheralController::new(
        radio.clone(),
        indicator.clone(),
        config,
    ));

    let _events = peripheral.on_event(|event| match event {
        PeripheralEvent::DataReceived { peer, data } => {
            println!("  <- {} wrote {} bytes", peer, data.len());
        }
        other => println!("  event: {}", other),
    });

    peripheral.setup()?;
    peripheral.start_loop().await?;

    if let Some(payload) = peripheral.advertising_payload() {
        println!("Advertising payload: {:02X?}", payload.to_bytes());
    }

    let peer = PeerHandle(1);
    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("\nCentral connects");
    radio.connect(peer);
    tokio::time::sleep(Duration::from_millis(100)).await;

    println!("Central writes {:?}", message);
    radio.write(RX_UUID, message.as_bytes(), peer);
    if let Some(color) = indicator.colors().last() {
        println!("Indicator colour: {}", color);
    }

    match peripheral.notify(b"ack") {
        Ok(()) => println!("Sent notification"),
        Err(e) => println!("Notify failed: {}", e),
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("Indicator under application control: {}", indicator.is_controlled());

    println!("\nCentral disconnects");
    radio.disconnect(peer);
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("Advertising again: {}", peripheral.is_advertising());

    let stats = peripheral.stats();
    println!("\nWrites: {}, bytes: {}", stats.writes, stats.bytes);

    peripheral.shutdown().await?;
    Ok(())
}
