//! Transport abstraction for BLE discovery and GATT enumeration
//!
//! This module defines the capability the profiler core consumes: scanning for
//! advertisements, connecting by address, walking the attribute hierarchy and
//! closing the connection. The btleplug implementation talks to real radios;
//! the mock implementation replays scripted peripherals for tests.

pub mod assigned_numbers;
pub mod btleplug_transport;
pub mod mock_transport;

pub use btleplug_transport::BtleplugTransport;
pub use mock_transport::{MockPeripheral, MockTransport};

use async_trait::async_trait;
use futures::stream::BoxStream;
use log::warn;
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Capacity of the advertisement channel between transport and collector
pub const SCAN_EVENT_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("btleplug error: {0}")]
    Btleplug(#[from] btleplug::Error),

    #[error("no usable Bluetooth adapter{}", requested_suffix(.requested))]
    AdapterUnavailable {
        requested: Option<String>,
        available: Vec<String>,
    },

    #[error("peripheral {0} is not known to the adapter")]
    PeripheralNotFound(String),

    #[error("peripheral {0} disconnected")]
    Disconnected(String),

    #[error("transport operation failed: {0}")]
    Operation(String),
}

fn requested_suffix(requested: &Option<String>) -> String {
    match requested {
        Some(name) => format!(" matching '{}'", name),
        None => String::new(),
    }
}

/// One advertisement snapshot as reported by the transport
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawAdvertisement {
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
    pub tx_power: Option<i16>,
    /// Company identifier -> vendor payload
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Service UUID -> service payload
    pub service_data: BTreeMap<String, Vec<u8>>,
    pub services: Vec<String>,
}

impl RawAdvertisement {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    pub fn with_manufacturer_data(mut self, company_id: u16, data: Vec<u8>) -> Self {
        self.manufacturer_data.insert(company_id, data);
        self
    }
}

/// Attribute tree node as returned by the transport, before validation
#[derive(Debug, Clone, PartialEq)]
pub struct RawDescriptor {
    pub uuid: String,
    pub handle: Option<u16>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawCharacteristic {
    pub uuid: String,
    pub handle: Option<u16>,
    pub description: Option<String>,
    pub properties: Vec<String>,
    pub descriptors: Vec<RawDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawService {
    pub uuid: String,
    pub handle: Option<u16>,
    pub description: Option<String>,
    pub characteristics: Vec<RawCharacteristic>,
}

/// Stream of services produced by one enumeration pass
pub type AttributeStream = BoxStream<'static, Result<RawService, TransportError>>;

/// A running scan.
///
/// Advertisements arrive over a channel from a transport-owned forwarding
/// task. Stopping (or dropping) the handle ends that task and closes the
/// channel.
pub struct ScanHandle {
    events: mpsc::Receiver<Result<RawAdvertisement, TransportError>>,
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl ScanHandle {
    pub fn new(
        events: mpsc::Receiver<Result<RawAdvertisement, TransportError>>,
        stop_tx: oneshot::Sender<()>,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }

    /// Next advertisement, or `None` once the forwarding task has ended
    pub async fn next(&mut self) -> Option<Result<RawAdvertisement, TransportError>> {
        self.events.recv().await
    }

    /// Stop scanning and wait for the forwarding task to finish
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.events.close();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!("Scan forwarding task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ScanHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            join.abort();
        }
    }
}

/// Unified interface for the radio transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open connection to a peripheral
    type Connection: Send + Sync;

    /// Tag identifying the enumeration engine and its version
    fn engine_version(&self) -> String;

    /// Names of the adapters this transport can use
    async fn adapters(&self) -> Result<Vec<String>, TransportError>;

    /// Start scanning on the hinted adapter (or the default one)
    async fn start_scan(&self, adapter_hint: Option<&str>) -> Result<ScanHandle, TransportError>;

    /// Look up the peripheral with the given address without opening a link
    async fn resolve(&self, address: &str) -> Result<Self::Connection, TransportError>;

    /// Open the link to a resolved peripheral.
    ///
    /// Callers pass the handle to `close` afterwards even when this fails or
    /// is abandoned part way, so a link that comes up late is still released.
    async fn connect(&self, connection: &Self::Connection) -> Result<(), TransportError>;

    /// Walk the peripheral's attribute hierarchy in one pass
    async fn enumerate_attributes(
        &self,
        connection: &Self::Connection,
    ) -> Result<AttributeStream, TransportError>;

    /// Release the connection, including one whose connect is still pending
    async fn close(&self, connection: Self::Connection) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_survives_panicked_forwarder() {
        let (_event_tx, event_rx) = mpsc::channel(1);
        let (stop_tx, _stop_rx) = oneshot::channel();
        let join = tokio::spawn(async {
            panic!("forwarder failed");
        });

        let handle = ScanHandle::new(event_rx, stop_tx, join);
        handle.stop().await;
    }

    #[tokio::test]
    async fn test_next_ends_when_forwarder_exits() {
        let (event_tx, event_rx) = mpsc::channel(1);
        let (stop_tx, _stop_rx) = oneshot::channel();
        let join = tokio::spawn(async move {
            let _ = event_tx.send(Ok(RawAdvertisement::new("AA:BB:CC:DD:EE:FF"))).await;
        });

        let mut handle = ScanHandle::new(event_rx, stop_tx, join);
        assert!(handle.next().await.unwrap().is_ok());
        assert!(handle.next().await.is_none());
        handle.stop().await;
    }
}
