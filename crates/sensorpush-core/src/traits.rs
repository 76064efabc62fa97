//! Trait abstractions for the radio transport.
//!
//! This module provides the [`Radio`] trait that abstracts over the real
//! Bluetooth adapter and the mock radio used in tests.

use async_trait::async_trait;

use crate::error::Result;

/// Control surface of the scanning radio.
///
/// Advertisements arrive out of band (see [`crate::scan::AdvertisementPump`]);
/// this trait only covers the operations needed to read a device's identity,
/// which requires the scanner to be stopped while a point-to-point connection
/// is open.
///
/// # Example
///
/// ```ignore
/// use sensorpush_core::{Radio, Result};
/// use sensorpush_types::DeviceNumber;
///
/// async fn identify<R: Radio>(radio: &R, address: &str) -> Result<DeviceNumber> {
///     radio.pause_scan().await?;
///     let bytes = radio.read_identity(address).await;
///     radio.resume_scan().await?;
///     Ok(DeviceNumber::from_identity_bytes(&bytes?)?)
/// }
/// ```
#[async_trait]
pub trait Radio: Send + Sync {
    /// Stop scanning for advertisements.
    async fn pause_scan(&self) -> Result<()>;

    /// Start scanning for advertisements again.
    async fn resume_scan(&self) -> Result<()>;

    /// Connect to the device at `radio_address` and read its identity
    /// characteristic.
    ///
    /// Returns the raw characteristic value. Decoding is left to the caller.
    async fn read_identity(&self, radio_address: &str) -> Result<Vec<u8>>;
}
