//! Profile type definitions
//!
//! Advertisements gathered during a scan, the GATT tree of a connected
//! peripheral, and the two documents written to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ble::RawAdvertisement;
use crate::profile::normalize::{normalize_map, Key, NormalizeError, Payload};

/// One advertising peripheral seen during a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advertisement {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
    /// Company identifier (`0x004c`) -> hex payload
    pub manufacturer_data: Map<String, Value>,
    /// Vendor data plus transport metadata
    pub metadata: Map<String, Value>,
}

impl Advertisement {
    /// Build the normalized advertisement from a transport snapshot
    pub fn from_raw(raw: &RawAdvertisement) -> Result<Self, NormalizeError> {
        let vendor = vendor_entries(raw);
        let service_data = raw
            .service_data
            .iter()
            .map(|(uuid, data)| (Key::Text(uuid.clone()), Payload::Bytes(data.clone())))
            .collect();
        let services = raw
            .services
            .iter()
            .map(|uuid| Payload::Text(uuid.clone()))
            .collect();

        let metadata = vec![
            (Key::from("manufacturer_data"), Payload::Map(vendor.clone())),
            (Key::from("service_data"), Payload::Map(service_data)),
            (Key::from("service_uuids"), Payload::List(services)),
            (
                Key::from("tx_power"),
                Payload::from(raw.tx_power.map(i64::from)),
            ),
        ];

        Ok(Self {
            name: raw.name.clone(),
            address: raw.address.clone(),
            rssi: raw.rssi,
            manufacturer_data: normalize_map(&vendor)?,
            metadata: normalize_map(&metadata)?,
        })
    }
}

fn vendor_entries(raw: &RawAdvertisement) -> Vec<(Key, Payload)> {
    raw.manufacturer_data
        .iter()
        .map(|(company, data)| (Key::from(*company), Payload::Bytes(data.clone())))
        .collect()
}

/// Leaf of the attribute tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub uuid: String,
    pub handle: Option<u16>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characteristic {
    pub uuid: String,
    pub handle: Option<u16>,
    pub description: Option<String>,
    /// Capability tags, sorted
    pub properties: Vec<String>,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub uuid: String,
    pub handle: Option<u16>,
    pub description: Option<String>,
    pub characteristics: Vec<Characteristic>,
}

/// Identity of the profiled device plus connection-time metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub address: String,
    pub rssi: Option<i16>,
    pub manufacturer_data: Map<String, Value>,
    pub metadata: Map<String, Value>,
    pub engine_version: String,
}

impl DeviceInfo {
    pub fn new(advertisement: &Advertisement, engine_version: &str) -> Self {
        Self {
            name: advertisement.name.clone(),
            address: advertisement.address.clone(),
            rssi: advertisement.rssi,
            manufacturer_data: advertisement.manufacturer_data.clone(),
            metadata: advertisement.metadata.clone(),
            engine_version: engine_version.to_string(),
        }
    }
}

/// Complete GATT profile of one peripheral.
///
/// Built once per connect cycle and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    device: DeviceInfo,
    services: Vec<Service>,
}

impl DeviceProfile {
    pub fn new(device: DeviceInfo, services: Vec<Service>) -> Self {
        Self { device, services }
    }

    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    pub fn engine_version(&self) -> &str {
        &self.device.engine_version
    }
}

/// Everything seen during one scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub generated_at: DateTime<Utc>,
    pub scan_duration_seconds: f64,
    pub device_count: usize,
    pub devices: Vec<Advertisement>,
}

impl DiscoveryDocument {
    pub fn new(devices: Vec<Advertisement>, scan_duration_seconds: f64) -> Self {
        Self::at(Utc::now(), devices, scan_duration_seconds)
    }

    /// Document with an explicit timestamp
    pub fn at(
        generated_at: DateTime<Utc>,
        devices: Vec<Advertisement>,
        scan_duration_seconds: f64,
    ) -> Self {
        Self {
            generated_at,
            scan_duration_seconds,
            device_count: devices.len(),
            devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_advertisement_from_raw() {
        let mut raw = RawAdvertisement::new("AA:BB:CC:DD:EE:FF")
            .with_name("Skelly")
            .with_rssi(-58)
            .with_manufacturer_data(0x004c, vec![0x02, 0x15]);
        raw.service_data
            .insert("0000180f-0000-1000-8000-00805f9b34fb".to_string(), vec![0x64]);
        raw.services.push("0000180a-0000-1000-8000-00805f9b34fb".to_string());
        raw.tx_power = Some(-4);

        let advertisement = Advertisement::from_raw(&raw).unwrap();
        assert_eq!(advertisement.name.as_deref(), Some("Skelly"));
        assert_eq!(advertisement.rssi, Some(-58));
        assert_eq!(Value::Object(advertisement.manufacturer_data), json!({ "0x004c": "0215" }));
        assert_eq!(
            Value::Object(advertisement.metadata),
            json!({
                "manufacturer_data": { "0x004c": "0215" },
                "service_data": { "0000180f-0000-1000-8000-00805f9b34fb": "64" },
                "service_uuids": ["0000180a-0000-1000-8000-00805f9b34fb"],
                "tx_power": -4,
            })
        );
    }

    #[test]
    fn test_missing_optional_fields_serialize_as_null() {
        let descriptor = Descriptor {
            uuid: "00002902-0000-1000-8000-00805f9b34fb".to_string(),
            handle: None,
            description: None,
        };
        assert_eq!(
            serde_json::to_value(&descriptor).unwrap(),
            json!({
                "uuid": "00002902-0000-1000-8000-00805f9b34fb",
                "handle": null,
                "description": null,
            })
        );
    }

    #[test]
    fn test_discovery_document_counts_devices() {
        let raw = RawAdvertisement::new("AA:BB:CC:DD:EE:FF");
        let devices = vec![Advertisement::from_raw(&raw).unwrap()];
        let document = DiscoveryDocument::new(devices, 5.0);
        assert_eq!(document.device_count, 1);

        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["scan_duration_seconds"], json!(5.0));
        assert!(value["generated_at"].as_str().unwrap().ends_with('Z'));
    }
}
