//! Mock transport for testing.
//!
//! Replays a scripted sequence of advertisements and serves scripted GATT
//! trees instead of touching a radio. Useful for exercising the collector,
//! builder and pipeline without Bluetooth hardware.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::info;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::ble::{
    AttributeStream, RawAdvertisement, RawService, ScanHandle, Transport, TransportError,
    SCAN_EVENT_BUFFER,
};

/// Scripted GATT server behaviour for one peripheral
#[derive(Debug, Clone, Default)]
pub struct MockPeripheral {
    pub services: Vec<RawService>,
    /// Drop the link after yielding this many services
    pub disconnect_after: Option<usize>,
    pub reject_connection: bool,
    pub connect_delay: Option<Duration>,
    /// Pause before yielding each service
    pub enumerate_delay: Option<Duration>,
}

impl MockPeripheral {
    pub fn new(services: Vec<RawService>) -> Self {
        Self {
            services,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
enum ScanStep {
    Advertise(RawAdvertisement),
    Pause(Duration),
    Fail(String),
}

/// Open mock connection
#[derive(Debug)]
pub struct MockConnection {
    address: String,
    peripheral: MockPeripheral,
}

/// Mock transport that replays scripted scans and GATT trees
#[derive(Debug, Clone)]
pub struct MockTransport {
    adapters: Vec<String>,
    script: Vec<ScanStep>,
    peripherals: HashMap<String, MockPeripheral>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a mock transport with a single adapter named "mock0"
    pub fn new() -> Self {
        Self {
            adapters: vec!["mock0".to_string()],
            script: Vec::new(),
            peripherals: HashMap::new(),
            opened: Arc::new(AtomicUsize::new(0)),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Replace the adapter list (empty means no radio)
    pub fn with_adapters(mut self, adapters: &[&str]) -> Self {
        self.adapters = adapters.iter().map(|a| a.to_string()).collect();
        self
    }

    /// Queue an advertisement
    pub fn advertise(mut self, advertisement: RawAdvertisement) -> Self {
        self.script.push(ScanStep::Advertise(advertisement));
        self
    }

    /// Queue a pause between advertisements
    pub fn pause(mut self, duration: Duration) -> Self {
        self.script.push(ScanStep::Pause(duration));
        self
    }

    /// Queue a transport failure
    pub fn fail_scan(mut self, message: &str) -> Self {
        self.script.push(ScanStep::Fail(message.to_string()));
        self
    }

    /// Register a connectable peripheral
    pub fn with_peripheral(mut self, address: &str, peripheral: MockPeripheral) -> Self {
        self.peripherals.insert(address.to_lowercase(), peripheral);
        self
    }

    /// Number of successful connects so far
    pub fn opened_connections(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of `close` calls so far, whether or not the link came up
    pub fn closed_connections(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Connection = MockConnection;

    fn engine_version(&self) -> String {
        format!("mock {}", env!("CARGO_PKG_VERSION"))
    }

    async fn adapters(&self) -> Result<Vec<String>, TransportError> {
        Ok(self.adapters.clone())
    }

    async fn start_scan(&self, adapter_hint: Option<&str>) -> Result<ScanHandle, TransportError> {
        let usable = match adapter_hint {
            Some(hint) => self.adapters.iter().any(|a| a == hint),
            None => !self.adapters.is_empty(),
        };
        if !usable {
            return Err(TransportError::AdapterUnavailable {
                requested: adapter_hint.map(str::to_string),
                available: self.adapters.clone(),
            });
        }

        info!("[MOCK BLE] Scan started ({} scripted steps)", self.script.len());

        let script = self.script.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (event_tx, event_rx) = mpsc::channel(SCAN_EVENT_BUFFER);

        let join = tokio::spawn(async move {
            for step in script {
                let sent = match step {
                    ScanStep::Advertise(advertisement) => {
                        tokio::select! {
                            _ = &mut stop_rx => return,
                            sent = event_tx.send(Ok(advertisement)) => sent.is_ok(),
                        }
                    }
                    ScanStep::Pause(duration) => {
                        tokio::select! {
                            _ = &mut stop_rx => return,
                            _ = tokio::time::sleep(duration) => true,
                        }
                    }
                    ScanStep::Fail(message) => {
                        let error = TransportError::Operation(message);
                        event_tx.send(Err(error)).await.is_ok()
                    }
                };
                if !sent {
                    return;
                }
            }
            // Keep the channel open until stopped, like a live radio
            let _ = stop_rx.await;
        });

        Ok(ScanHandle::new(event_rx, stop_tx, join))
    }

    async fn resolve(&self, address: &str) -> Result<MockConnection, TransportError> {
        let peripheral = self
            .peripherals
            .get(&address.to_lowercase())
            .cloned()
            .ok_or_else(|| TransportError::PeripheralNotFound(address.to_string()))?;

        Ok(MockConnection {
            address: address.to_string(),
            peripheral,
        })
    }

    async fn connect(&self, connection: &MockConnection) -> Result<(), TransportError> {
        if let Some(delay) = connection.peripheral.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if connection.peripheral.reject_connection {
            return Err(TransportError::Operation("connection rejected by peripheral".to_string()));
        }

        self.opened.fetch_add(1, Ordering::SeqCst);
        info!("[MOCK BLE] Connected to {}", connection.address);
        Ok(())
    }

    async fn enumerate_attributes(
        &self,
        connection: &MockConnection,
    ) -> Result<AttributeStream, TransportError> {
        let services = &connection.peripheral.services;
        let yielded = connection
            .peripheral
            .disconnect_after
            .unwrap_or(services.len())
            .min(services.len());

        let mut items: Vec<Result<RawService, TransportError>> =
            services[..yielded].iter().cloned().map(Ok).collect();
        if connection.peripheral.disconnect_after.is_some() {
            items.push(Err(TransportError::Disconnected(connection.address.clone())));
        }

        let delay = connection.peripheral.enumerate_delay;
        Ok(stream::iter(items)
            .then(move |item| async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                item
            })
            .boxed())
    }

    async fn close(&self, connection: MockConnection) -> Result<(), TransportError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        info!("[MOCK BLE] Closed connection to {}", connection.address);
        Ok(())
    }
}
