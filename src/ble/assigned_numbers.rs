//! Bluetooth SIG assigned numbers
//!
//! Human-readable names for well-known 16-bit service, characteristic and
//! descriptor UUIDs. btleplug does not report attribute descriptions, so the
//! profile uses these names when the UUID is a SIG-assigned one.

use uuid::Uuid;

/// Bluetooth Base UUID (0000xxxx-0000-1000-8000-00805f9b34fb)
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

const SHORT_UUID_MASK: u128 = 0xffffffff_0000_0000_0000_000000000000;

// Services
const SERVICE_NAMES: &[(u16, &str)] = &[
    (0x1800, "Generic Access"),
    (0x1801, "Generic Attribute"),
    (0x1802, "Immediate Alert"),
    (0x1803, "Link Loss"),
    (0x1804, "Tx Power"),
    (0x1805, "Current Time"),
    (0x180a, "Device Information"),
    (0x180d, "Heart Rate"),
    (0x180f, "Battery Service"),
    (0x1812, "Human Interface Device"),
    (0x1813, "Scan Parameters"),
    (0x1816, "Cycling Speed and Cadence"),
    (0x181a, "Environmental Sensing"),
    (0x181c, "User Data"),
    (0xfe59, "Nordic Secure DFU"),
];

// Characteristics
const CHARACTERISTIC_NAMES: &[(u16, &str)] = &[
    (0x2a00, "Device Name"),
    (0x2a01, "Appearance"),
    (0x2a04, "Peripheral Preferred Connection Parameters"),
    (0x2a05, "Service Changed"),
    (0x2a06, "Alert Level"),
    (0x2a07, "Tx Power Level"),
    (0x2a19, "Battery Level"),
    (0x2a23, "System ID"),
    (0x2a24, "Model Number String"),
    (0x2a25, "Serial Number String"),
    (0x2a26, "Firmware Revision String"),
    (0x2a27, "Hardware Revision String"),
    (0x2a28, "Software Revision String"),
    (0x2a29, "Manufacturer Name String"),
    (0x2a2b, "Current Time"),
    (0x2a37, "Heart Rate Measurement"),
    (0x2a38, "Body Sensor Location"),
    (0x2a4a, "HID Information"),
    (0x2a4b, "Report Map"),
    (0x2a4c, "HID Control Point"),
    (0x2a4d, "Report"),
    (0x2a4e, "Protocol Mode"),
    (0x2a50, "PnP ID"),
    (0x2a6e, "Temperature"),
    (0x2a6f, "Humidity"),
    (0x2aa6, "Central Address Resolution"),
    (0x2b29, "Client Supported Features"),
    (0x2b2a, "Database Hash"),
];

// Descriptors
const DESCRIPTOR_NAMES: &[(u16, &str)] = &[
    (0x2900, "Characteristic Extended Properties"),
    (0x2901, "Characteristic User Description"),
    (0x2902, "Client Characteristic Configuration"),
    (0x2903, "Server Characteristic Configuration"),
    (0x2904, "Characteristic Presentation Format"),
    (0x2905, "Characteristic Aggregate Format"),
    (0x2906, "Valid Range"),
    (0x2907, "External Report Reference"),
    (0x2908, "Report Reference"),
];

/// Attribute kind, used to pick the right name table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Service,
    Characteristic,
    Descriptor,
}

/// Extract the 16-bit alias of a SIG-based UUID
pub fn short_uuid(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !SHORT_UUID_MASK != BLUETOOTH_BASE_UUID {
        return None;
    }
    u16::try_from(value >> 96).ok()
}

/// Expand a 16-bit alias into the full 128-bit UUID
pub fn uuid_from_short(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Look up the assigned name for a UUID
pub fn describe(uuid: &Uuid, kind: AttributeKind) -> Option<&'static str> {
    let short = short_uuid(uuid)?;
    let table = match kind {
        AttributeKind::Service => SERVICE_NAMES,
        AttributeKind::Characteristic => CHARACTERISTIC_NAMES,
        AttributeKind::Descriptor => DESCRIPTOR_NAMES,
    };
    table
        .iter()
        .find(|(id, _)| *id == short)
        .map(|(_, name)| *name)
}
