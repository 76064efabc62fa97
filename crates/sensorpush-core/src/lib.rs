//! Radio layer for SensorPush temperature and humidity sensors.
//!
//! This crate sits between the host's Bluetooth adapter and the ingestion
//! pipeline. It captures advertisements, decodes SensorPush payloads, and
//! performs the point-to-point identity read that assigns a sensor its
//! permanent device number.
//!
//! # Features
//!
//! - **Advertisement capture**: Forward adapter events as [`RawAdvertisement`]s
//! - **Payload decoding**: Temperature, humidity and pressure from broadcasts
//! - **Identity reads**: Connect, read the device-id characteristic, disconnect
//! - **Mocking**: [`MockRadio`] for tests without hardware
//!
//! # Supported Devices
//!
//! | Device | Sensors |
//! |--------|---------|
//! | HT1 | Temperature, Humidity |
//! | HT.w | Temperature, Humidity |
//! | HTP.xw | Temperature, Humidity, Pressure |
//!
//! # Platform Differences
//!
//! - **macOS**: Devices are identified by a UUID assigned by CoreBluetooth. This
//!   UUID is stable for a given device on a given Mac, but differs between Macs.
//! - **Linux/Windows**: Devices are identified by their Bluetooth MAC address
//!   (e.g., `AA:BB:CC:DD:EE:FF`).
//!
//! # Quick Start
//!
//! ```no_run
//! use sensorpush_core::device::ConnectionConfig;
//! use sensorpush_core::{BleRadio, Radio, parse_advertisement};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let radio = BleRadio::open(0, ConnectionConfig::default()).await?;
//!     let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//!     radio.advertisement_pump(tx).start(CancellationToken::new());
//!     radio.resume_scan().await?;
//!
//!     while let Some(adv) = rx.recv().await {
//!         if let Some(decoded) = parse_advertisement(&adv) {
//!             println!("{}: {:?}", adv.radio_address, decoded.climate());
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod advertisement;
pub mod device;
pub mod error;
pub mod mock;
pub mod radio;
pub mod scan;
pub mod traits;

pub use advertisement::{
    SensorAdvertisement, decode_manufacturer_data, encode_manufacturer_data, parse_advertisement,
};
pub use device::{ConnectionConfig, ConnectionGuard, Disconnect};
pub use error::{DeviceNotFoundReason, Error, Result};
pub use mock::MockRadio;
pub use radio::BleRadio;
pub use scan::{AdvertisementPump, create_identifier, format_peripheral_id, get_adapter};
pub use traits::Radio;

// Re-export from sensorpush-types
pub use sensorpush_types::uuids;
pub use sensorpush_types::{DeviceNumber, DeviceType, RawAdvertisement};

/// Type alias for a shared radio reference.
pub type SharedRadio = std::sync::Arc<dyn Radio>;
