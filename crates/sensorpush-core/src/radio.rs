//! btleplug-backed [`Radio`] implementation.

use async_trait::async_trait;
use btleplug::api::{Central, ScanFilter};
use btleplug::platform::Adapter;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::device::{self, ConnectionConfig};
use crate::error::Result;
use crate::scan::{AdvertisementPump, get_adapter_at};
use crate::traits::Radio;
use sensorpush_types::RawAdvertisement;

/// The host's Bluetooth adapter, driven as a SensorPush radio.
///
/// # Example
///
/// ```ignore
/// use sensorpush_core::{BleRadio, Radio};
/// use sensorpush_core::device::ConnectionConfig;
/// use tokio_util::sync::CancellationToken;
///
/// let radio = BleRadio::open(0, ConnectionConfig::default()).await?;
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// radio.advertisement_pump(tx).start(CancellationToken::new());
/// radio.resume_scan().await?;
/// while let Some(adv) = rx.recv().await {
///     println!("{}", adv.radio_address);
/// }
/// ```
#[derive(Debug, Clone)]
pub struct BleRadio {
    adapter: Adapter,
    config: ConnectionConfig,
}

impl BleRadio {
    /// Open the adapter at `adapter_index`.
    pub async fn open(adapter_index: usize, config: ConnectionConfig) -> Result<Self> {
        let adapter = get_adapter_at(adapter_index).await?;
        Ok(Self::from_adapter(adapter, config))
    }

    /// Wrap an already-opened adapter.
    pub fn from_adapter(adapter: Adapter, config: ConnectionConfig) -> Self {
        Self { adapter, config }
    }

    /// The underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Timeouts used for identity reads.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Create a pump forwarding this adapter's advertisements into `sender`.
    pub fn advertisement_pump(&self, sender: UnboundedSender<RawAdvertisement>) -> AdvertisementPump {
        AdvertisementPump::new(self.adapter.clone(), sender)
    }
}

#[async_trait]
impl Radio for BleRadio {
    async fn pause_scan(&self) -> Result<()> {
        debug!("Stopping scan");
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn resume_scan(&self) -> Result<()> {
        info!("Starting scan");
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn read_identity(&self, radio_address: &str) -> Result<Vec<u8>> {
        device::read_identity(&self.adapter, radio_address, &self.config).await
    }
}
