//! Point-to-point identity reads.
//!
//! A SensorPush device exposes its permanent device number through a GATT
//! characteristic. Reading it requires a short-lived connection, which most
//! adapters can only open while scanning is stopped.

use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use btleplug::platform::{Adapter, Peripheral};
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::scan::find_peripheral;
use sensorpush_types::uuids::DEVICE_ID;

/// Default timeout for BLE read operations.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for establishing a connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for identity-read timeouts.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use sensorpush_core::device::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connection_timeout(Duration::from_secs(20))
///     .read_timeout(Duration::from_secs(3));
/// assert_eq!(config.read_timeout, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for establishing a BLE connection.
    pub connection_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// Timeout for the characteristic read.
    pub read_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout: DEFAULT_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl ConnectionConfig {
    /// Set the connection timeout.
    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Upper bound for a whole identity read.
    pub fn total(&self) -> Duration {
        self.connection_timeout + self.discovery_timeout + self.read_timeout
    }

    /// Default timeouts, scaled down proportionally so that [`total`](Self::total)
    /// does not exceed `budget`.
    #[must_use]
    pub fn within(budget: Duration) -> Self {
        let config = Self::default();
        let total = config.total().as_nanos();
        if total <= budget.as_nanos() {
            return config;
        }

        let scale = |d: Duration| {
            let nanos = d.as_nanos() * budget.as_nanos() / total;
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        };
        Self {
            connection_timeout: scale(config.connection_timeout),
            discovery_timeout: scale(config.discovery_timeout),
            read_timeout: scale(config.read_timeout),
        }
    }
}

/// Something a [`ConnectionGuard`] can disconnect.
#[async_trait]
pub trait Disconnect: Send + Sync + 'static {
    async fn disconnect(&self) -> Result<()>;
}

#[async_trait]
impl Disconnect for Peripheral {
    async fn disconnect(&self) -> Result<()> {
        btleplug::api::Peripheral::disconnect(self).await?;
        Ok(())
    }
}

/// Disconnects the peripheral when dropped.
///
/// An identity read can be abandoned at any await point, for example when the
/// caller's own timeout fires. The guard makes sure the sensor is released in
/// that case too, so it goes back to advertising.
pub struct ConnectionGuard<P: Disconnect> {
    peripheral: Option<P>,
}

impl<P: Disconnect> ConnectionGuard<P> {
    pub fn new(peripheral: P) -> Self {
        Self {
            peripheral: Some(peripheral),
        }
    }

    /// Disconnect now and wait for it, instead of on drop.
    pub async fn disconnect(mut self) -> Result<()> {
        match self.peripheral.take() {
            Some(peripheral) => peripheral.disconnect().await,
            None => Ok(()),
        }
    }
}

impl<P: Disconnect> Drop for ConnectionGuard<P> {
    fn drop(&mut self) {
        if let Some(peripheral) = self.peripheral.take() {
            if let Ok(handle) = Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = peripheral.disconnect().await {
                        warn!("Failed to disconnect in guard drop: {}", e);
                    }
                });
            } else {
                warn!("No tokio runtime available for disconnect in guard drop");
            }
        }
    }
}

/// Connect to the device at `radio_address`, read its identity
/// characteristic, and disconnect.
///
/// The peripheral is disconnected even when discovery or the read fails, or
/// when the returned future is dropped before completing.
#[tracing::instrument(level = "info", skip(adapter, config))]
pub async fn read_identity(
    adapter: &Adapter,
    radio_address: &str,
    config: &ConnectionConfig,
) -> Result<Vec<u8>> {
    let peripheral = find_peripheral(adapter, radio_address).await?;

    let guard = ConnectionGuard::new(peripheral.clone());

    info!("Connecting to device...");
    timeout(config.connection_timeout, peripheral.connect())
        .await
        .map_err(|_| Error::timeout("connect to device", config.connection_timeout))??;

    let result = read_identity_connected(&peripheral, config).await;

    if let Err(e) = guard.disconnect().await {
        warn!("Failed to disconnect after identity read: {}", e);
    }

    result
}

async fn read_identity_connected(peripheral: &Peripheral, config: &ConnectionConfig) -> Result<Vec<u8>> {
    timeout(config.discovery_timeout, peripheral.discover_services())
        .await
        .map_err(|_| Error::timeout("discover services", config.discovery_timeout))??;

    let services = peripheral.services();
    debug!("Found {} services", services.len());

    let characteristic = peripheral
        .characteristics()
        .into_iter()
        .find(|c| c.uuid == DEVICE_ID)
        .ok_or_else(|| Error::characteristic_not_found(DEVICE_ID.to_string(), services.len()))?;

    let data = timeout(config.read_timeout, peripheral.read(&characteristic))
        .await
        .map_err(|_| Error::timeout("read identity characteristic", config.read_timeout))??;

    debug!("Read {} identity bytes", data.len());
    Ok(data)
}
