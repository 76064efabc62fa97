//! Local persistence for SensorPush devices and samples.
//!
//! This crate provides SQLite-based storage for the ingestion service:
//! registered devices, their friendly names, and time-ordered samples.
//!
//! # Features
//!
//! - Register devices once their identity has been read
//! - Upsert friendly names
//! - Record samples with millisecond timestamps
//! - Latest sample per device, and inclusive time-range queries
//! - CSV export
//!
//! # Example
//!
//! ```
//! use sensorpush_store::Store;
//! use sensorpush_types::DeviceNumber;
//!
//! let store = Store::open_in_memory()?;
//! store.add_device(DeviceNumber::new(1), "AA:BB:CC:DD:EE:FF")?;
//! store.add_sample(DeviceNumber::new(1), 23.5, 45.2)?;
//!
//! let latest = store.latest_sample_per_device()?;
//! assert_eq!(latest[&DeviceNumber::new(1)].temperature_c, 23.5);
//! # Ok::<(), sensorpush_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod store;

pub use error::{Error, Result};
pub use models::{NamedDevice, NamedSample, StoredSample};
pub use queries::SampleQuery;
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/sensorpush/sensor_data.db`
/// - macOS: `~/Library/Application Support/sensorpush/sensor_data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\sensorpush\sensor_data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("sensorpush")
        .join("sensor_data.db")
}
