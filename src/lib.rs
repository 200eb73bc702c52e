//! ble-profiler: BLE discovery and GATT profile generator
//!
//! This library scans for nearby Bluetooth Low Energy peripherals, lets the
//! caller pick one by address or name, connects to it and records its
//! service/characteristic/descriptor tree as a JSON profile.

pub mod ble;
pub mod config;
pub mod error;
pub mod manager;
pub mod profile;

// Re-export commonly used items
pub use ble::{BtleplugTransport, MockPeripheral, MockTransport, Transport, TransportError};
pub use config::{Config, ConfigError};
pub use error::{Outcome, ProfilerError};
pub use manager::{ProfilerManager, RunSummary};
pub use profile::{Advertisement, DeviceProfile, DiscoveryDocument, ProfileBuilder, Target};
