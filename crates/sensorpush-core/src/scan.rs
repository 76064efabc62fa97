//! Adapter discovery and advertisement capture.
//!
//! This module locates the Bluetooth adapter and turns the adapter's event
//! stream into [`RawAdvertisement`]s for the ingestion pipeline.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DeviceNotFoundReason, Error, Result};
use sensorpush_types::RawAdvertisement;

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    get_adapter_at(0).await
}

/// Get the Bluetooth adapter at `index` in the platform's adapter list.
pub async fn get_adapter_at(index: usize) -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters
        .into_iter()
        .nth(index)
        .ok_or(Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter))
}

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Create a stable radio address from a hardware address and peripheral ID.
///
/// On macOS where addresses are 00:00:00:00:00:00, uses the peripheral ID.
/// On other platforms, uses the Bluetooth address.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> String {
    if is_zero_address(address) {
        format_peripheral_id(peripheral_id)
    } else {
        address.to_string()
    }
}

fn is_zero_address(address: &str) -> bool {
    address == "00:00:00:00:00:00"
}

/// Build a [`RawAdvertisement`] from a peripheral's cached properties.
///
/// `manufacturer_data` overrides the cached map when the event carried the
/// freshly received entries.
pub fn advertisement_from_properties(
    identifier: String,
    properties: PeripheralProperties,
    manufacturer_data: Option<HashMap<u16, Vec<u8>>>,
) -> RawAdvertisement {
    RawAdvertisement {
        radio_address: identifier,
        display_name: properties.local_name,
        signal_strength: properties.rssi,
        manufacturer_payload: manufacturer_data.unwrap_or(properties.manufacturer_data),
        service_payload: properties.service_data,
    }
}

/// Find a known peripheral by radio address.
///
/// Only peripherals the adapter has already seen are searched; no scan is
/// started.
pub async fn find_peripheral(adapter: &Adapter, radio_address: &str) -> Result<Peripheral> {
    for peripheral in adapter.peripherals().await? {
        let id = peripheral.id();
        if format_peripheral_id(&id) == radio_address {
            return Ok(peripheral);
        }
        if let Ok(Some(props)) = peripheral.properties().await
            && props.address.to_string().eq_ignore_ascii_case(radio_address)
        {
            return Ok(peripheral);
        }
    }

    Err(Error::device_not_found(radio_address))
}

/// Forwards adapter advertisements into an ingestion channel.
///
/// Only manufacturer-data advertisements are forwarded: every SensorPush
/// broadcast carries one, and each radio report produces exactly one such
/// event.
pub struct AdvertisementPump {
    adapter: Adapter,
    sender: UnboundedSender<RawAdvertisement>,
}

impl AdvertisementPump {
    /// Create a pump from `adapter` into `sender`.
    pub fn new(adapter: Adapter, sender: UnboundedSender<RawAdvertisement>) -> Self {
        Self { adapter, sender }
    }

    /// Spawn the pump on the current runtime.
    ///
    /// The task runs until the cancellation token is triggered, the adapter's
    /// event stream ends, or the receiving side of the channel is dropped.
    pub fn start(self, cancel_token: CancellationToken) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel_token))
    }

    /// Run the pump on the current task.
    pub async fn run(self, cancel_token: CancellationToken) -> Result<()> {
        let mut events = self.adapter.events().await?;
        info!("Advertisement pump started");

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Advertisement pump cancelled");
                    break;
                }
                event = events.next() => {
                    let Some(event) = event else {
                        warn!("Adapter event stream ended");
                        break;
                    };

                    let CentralEvent::ManufacturerDataAdvertisement { id, manufacturer_data } = event else {
                        continue;
                    };

                    match self.advertisement_for(&id, manufacturer_data).await {
                        Ok(Some(adv)) => {
                            if self.sender.send(adv).is_err() {
                                info!("Ingestion queue closed, stopping advertisement pump");
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => debug!("Failed to read peripheral properties: {}", e),
                    }
                }
            }
        }

        Ok(())
    }

    async fn advertisement_for(
        &self,
        id: &PeripheralId,
        manufacturer_data: HashMap<u16, Vec<u8>>,
    ) -> Result<Option<RawAdvertisement>> {
        let peripheral = self.adapter.peripheral(id).await?;
        let Some(properties) = peripheral.properties().await? else {
            return Ok(None);
        };

        let identifier = create_identifier(&properties.address.to_string(), id);
        Ok(Some(advertisement_from_properties(
            identifier,
            properties,
            Some(manufacturer_data),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use btleplug::api::BDAddr;

    fn properties() -> PeripheralProperties {
        let mut props = PeripheralProperties::default();
        props.address = BDAddr::from([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        props.local_name = Some("HT.w 0C3".to_string());
        props.rssi = Some(-64);
        props.manufacturer_data.insert(0x0104, vec![1, 2, 3]);
        props
    }

    #[test]
    fn test_zero_address_detection() {
        assert!(is_zero_address("00:00:00:00:00:00"));
        assert!(!is_zero_address("AA:BB:CC:DD:EE:FF"));
    }

    #[test]
    fn test_advertisement_from_cached_properties() {
        let adv = advertisement_from_properties("AA:BB:CC:DD:EE:FF".to_string(), properties(), None);

        assert_eq!(adv.radio_address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(adv.display_name.as_deref(), Some("HT.w 0C3"));
        assert_eq!(adv.signal_strength, Some(-64));
        assert_eq!(adv.manufacturer_payload.get(&0x0104), Some(&vec![1, 2, 3]));
    }

    #[test]
    fn test_advertisement_prefers_event_payload() {
        let fresh = HashMap::from([(0x0204_u16, vec![9, 9, 9, 9])]);
        let adv = advertisement_from_properties("AA:BB".to_string(), properties(), Some(fresh));

        assert_eq!(adv.manufacturer_payload.len(), 1);
        assert_eq!(adv.manufacturer_payload.get(&0x0204), Some(&vec![9, 9, 9, 9]));
    }
}
