//! btleplug-backed transport
//!
//! Scans, connects and enumerates through the host Bluetooth stack. Address
//! strings follow btleplug: the device MAC where the platform exposes it,
//! otherwise the platform peripheral id (CoreBluetooth UUIDs on macOS).

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, CentralState, CharPropFlags, Manager as _, Peripheral as _,
    PeripheralProperties, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::ble::assigned_numbers::{describe, AttributeKind};
use crate::ble::{
    AttributeStream, RawAdvertisement, RawCharacteristic, RawDescriptor, RawService, ScanHandle,
    Transport, TransportError, SCAN_EVENT_BUFFER,
};

/// btleplug release line this transport is built against
pub const BTLEPLUG_VERSION: &str = "0.11";

/// Property tags in the order of the GATT properties bitfield
const PROPERTY_TAGS: &[(CharPropFlags, &str)] = &[
    (CharPropFlags::BROADCAST, "broadcast"),
    (CharPropFlags::READ, "read"),
    (CharPropFlags::WRITE_WITHOUT_RESPONSE, "write-without-response"),
    (CharPropFlags::WRITE, "write"),
    (CharPropFlags::NOTIFY, "notify"),
    (CharPropFlags::INDICATE, "indicate"),
    (CharPropFlags::AUTHENTICATED_SIGNED_WRITES, "authenticated-signed-writes"),
    (CharPropFlags::EXTENDED_PROPERTIES, "extended-properties"),
];

/// Transport over the platform Bluetooth stack
pub struct BtleplugTransport {
    manager: Manager,
    /// Adapter picked by the last scan, reused for connecting
    adapter: Mutex<Option<Adapter>>,
}

impl BtleplugTransport {
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await?;
        Ok(Self {
            manager,
            adapter: Mutex::new(None),
        })
    }

    /// Find the adapter matching the hint, or the first one when no hint is given
    async fn resolve_adapter(&self, hint: Option<&str>) -> Result<Adapter, TransportError> {
        let adapters = self.manager.adapters().await?;
        let mut available = Vec::new();

        for adapter in adapters {
            let info = adapter
                .adapter_info()
                .await
                .unwrap_or_else(|_| "unknown".to_string());
            let matches = match hint {
                Some(hint) => adapter_matches(&info, hint),
                None => true,
            };
            if matches {
                debug!("Using Bluetooth adapter: {}", info);
                return Ok(adapter);
            }
            available.push(info);
        }

        Err(TransportError::AdapterUnavailable {
            requested: hint.map(str::to_string),
            available,
        })
    }

    async fn current_adapter(&self) -> Result<Adapter, TransportError> {
        let cached = self.lock_adapter()?.clone();
        if let Some(adapter) = cached {
            return Ok(adapter);
        }
        let adapter = self.resolve_adapter(None).await?;
        *self.lock_adapter()? = Some(adapter.clone());
        Ok(adapter)
    }

    fn lock_adapter(&self) -> Result<std::sync::MutexGuard<'_, Option<Adapter>>, TransportError> {
        self.adapter
            .lock()
            .map_err(|_| TransportError::Operation("adapter lock poisoned".to_string()))
    }
}

#[async_trait]
impl Transport for BtleplugTransport {
    type Connection = Peripheral;

    fn engine_version(&self) -> String {
        format!("btleplug {}", BTLEPLUG_VERSION)
    }

    async fn adapters(&self) -> Result<Vec<String>, TransportError> {
        let mut names = Vec::new();
        for adapter in self.manager.adapters().await? {
            names.push(adapter.adapter_info().await?);
        }
        Ok(names)
    }

    async fn start_scan(&self, adapter_hint: Option<&str>) -> Result<ScanHandle, TransportError> {
        let adapter = self.resolve_adapter(adapter_hint).await?;
        *self.lock_adapter()? = Some(adapter.clone());

        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let (event_tx, event_rx) = mpsc::channel(SCAN_EVENT_BUFFER);

        let join = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    maybe_event = events.next() => {
                        match maybe_event {
                            Some(event) => {
                                if forward_event(&adapter, &event_tx, event).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });

        Ok(ScanHandle::new(event_rx, stop_tx, join))
    }

    async fn resolve(&self, address: &str) -> Result<Peripheral, TransportError> {
        let adapter = self.current_adapter().await?;

        for peripheral in adapter.peripherals().await? {
            let lookup = peripheral
                .properties()
                .await
                .map(|properties| properties.map(|p| peripheral_address(&peripheral, &p)));
            let Some(candidate) = known_address(&peripheral.id(), lookup) else {
                continue;
            };
            if candidate.eq_ignore_ascii_case(address) {
                return Ok(peripheral);
            }
        }

        Err(TransportError::PeripheralNotFound(address.to_string()))
    }

    async fn connect(&self, connection: &Peripheral) -> Result<(), TransportError> {
        connection.connect().await?;
        Ok(())
    }

    async fn enumerate_attributes(
        &self,
        connection: &Peripheral,
    ) -> Result<AttributeStream, TransportError> {
        connection.discover_services().await?;
        if !connection.is_connected().await? {
            return Err(TransportError::Disconnected(connection.id().to_string()));
        }

        let services: Vec<Result<RawService, TransportError>> = connection
            .services()
            .iter()
            .map(|service| {
                Ok(RawService {
                    uuid: service.uuid.to_string(),
                    handle: None,
                    description: describe(&service.uuid, AttributeKind::Service)
                        .map(str::to_string),
                    characteristics: service
                        .characteristics
                        .iter()
                        .map(|characteristic| RawCharacteristic {
                            uuid: characteristic.uuid.to_string(),
                            handle: None,
                            description: describe(&characteristic.uuid, AttributeKind::Characteristic)
                                .map(str::to_string),
                            properties: property_tags(characteristic.properties),
                            descriptors: characteristic
                                .descriptors
                                .iter()
                                .map(|descriptor| RawDescriptor {
                                    uuid: descriptor.uuid.to_string(),
                                    handle: None,
                                    description: describe(&descriptor.uuid, AttributeKind::Descriptor)
                                        .map(str::to_string),
                                })
                                .collect(),
                        })
                        .collect(),
                })
            })
            .collect();

        Ok(stream::iter(services).boxed())
    }

    async fn close(&self, connection: Peripheral) -> Result<(), TransportError> {
        // Also aborts a connect still pending in the stack
        if let Err(e) = connection.disconnect().await {
            if connection.is_connected().await.unwrap_or(false) {
                return Err(e.into());
            }
            debug!("Disconnect of idle peripheral {:?}: {}", connection.id(), e);
        }
        Ok(())
    }
}

/// Turn one central event into an advertisement snapshot on the channel.
///
/// Returns `Err` only when the receiving side has gone away.
async fn forward_event(
    adapter: &Adapter,
    sender: &mpsc::Sender<Result<RawAdvertisement, TransportError>>,
    event: CentralEvent,
) -> Result<(), ()> {
    let id = match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. }
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => id,
        CentralEvent::StateUpdate(CentralState::PoweredOff) => {
            let error = TransportError::Operation("adapter powered off during scan".to_string());
            return sender.send(Err(error)).await.map_err(|_| ());
        }
        _ => return Ok(()),
    };

    // Peripherals can vanish between the event and the lookup; skip those.
    let peripheral = match adapter.peripheral(&id).await {
        Ok(peripheral) => peripheral,
        Err(e) => {
            debug!("Skipping advertisement from {:?}: {}", id, e);
            return Ok(());
        }
    };
    let properties = match peripheral.properties().await {
        Ok(Some(properties)) => properties,
        Ok(None) => return Ok(()),
        Err(e) => {
            debug!("No properties for {:?}: {}", id, e);
            return Ok(());
        }
    };

    let advertisement = RawAdvertisement {
        address: peripheral_address(&peripheral, &properties),
        name: properties.local_name.clone(),
        rssi: properties.rssi,
        tx_power: properties.tx_power_level,
        manufacturer_data: properties.manufacturer_data.clone().into_iter().collect(),
        service_data: properties
            .service_data
            .iter()
            .map(|(uuid, data)| (uuid.to_string(), data.clone()))
            .collect(),
        services: properties.services.iter().map(|uuid| uuid.to_string()).collect(),
    };

    sender.send(Ok(advertisement)).await.map_err(|_| ())
}

/// MAC address when the platform reports one, peripheral id otherwise
fn peripheral_address(peripheral: &Peripheral, properties: &PeripheralProperties) -> String {
    if properties.address.into_inner() == [0u8; 6] {
        peripheral.id().to_string()
    } else {
        properties.address.to_string()
    }
}

/// Address of a peripheral whose properties could be read; others are skipped
fn known_address(
    id: &impl Debug,
    lookup: Result<Option<String>, btleplug::Error>,
) -> Option<String> {
    match lookup {
        Ok(address) => address,
        Err(e) => {
            debug!("No properties for {:?}: {}", id, e);
            None
        }
    }
}

fn property_tags(flags: CharPropFlags) -> Vec<String> {
    PROPERTY_TAGS
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

/// Adapter info strings look like "hci0 (usb:v1D6Bp0246d0537)"
fn adapter_matches(info: &str, hint: &str) -> bool {
    let hint = hint.trim();
    if hint.is_empty() {
        return true;
    }
    let first_token = info.split_whitespace().next().unwrap_or("");
    first_token.eq_ignore_ascii_case(hint) || info.to_lowercase().contains(&hint.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_matches_interface_name() {
        assert!(adapter_matches("hci0 (usb:v1D6Bp0246d0537)", "hci0"));
        assert!(adapter_matches("hci0 (usb:v1D6Bp0246d0537)", "HCI0"));
        assert!(!adapter_matches("hci1 (usb:v1D6Bp0246d0537)", "hci0"));
        assert!(adapter_matches("CoreBluetooth", ""));
    }

    #[test]
    fn test_unreadable_peripheral_is_skipped() {
        assert_eq!(known_address(&"p1", Err(btleplug::Error::NotConnected)), None);
        assert_eq!(known_address(&"p2", Ok(None)), None);
        assert_eq!(
            known_address(&"p3", Ok(Some("AA:BB:CC:DD:EE:FF".to_string()))).as_deref(),
            Some("AA:BB:CC:DD:EE:FF")
        );
    }

    #[test]
    fn test_property_tags_follow_flags() {
        let flags = CharPropFlags::READ | CharPropFlags::NOTIFY;
        assert_eq!(property_tags(flags), vec!["read", "notify"]);
        assert!(property_tags(CharPropFlags::empty()).is_empty());
    }
}
