//! Example: Watching SensorPush Advertisements
//!
//! This example listens for SensorPush broadcasts for 30 seconds and prints
//! every decoded reading. No connection is made to any device.
//!
//! Run with: `cargo run --example watch_advertisements`

use std::time::Duration;

use sensorpush_core::{BleRadio, ConnectionConfig, Radio, parse_advertisement};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let radio = BleRadio::open(0, ConnectionConfig::default()).await?;
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let pump = radio.advertisement_pump(tx).start(cancel.clone());

    radio.resume_scan().await?;
    println!("Listening for SensorPush advertisements...");
    println!();

    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            adv = rx.recv() => {
                let Some(adv) = adv else { break };
                let Some(decoded) = parse_advertisement(&adv) else { continue };

                let rssi = adv
                    .signal_strength
                    .map(|r| format!("{} dBm", r))
                    .unwrap_or_else(|| "N/A".to_string());
                match decoded.climate() {
                    Some((temperature, humidity)) => println!(
                        "  {} [{}] {:.2} °C {:.2} % ({})",
                        adv.radio_address, decoded.device_type, temperature, humidity, rssi
                    ),
                    None => println!(
                        "  {} [{}] no readings ({})",
                        adv.radio_address, decoded.device_type, rssi
                    ),
                }
            }
        }
    }

    cancel.cancel();
    radio.pause_scan().await?;
    pump.await??;
    Ok(())
}
