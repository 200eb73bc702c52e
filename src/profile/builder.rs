//! Profile builder
//!
//! Connects to the selected peripheral, walks services, characteristics and
//! descriptors in the order the transport yields them, and assembles an
//! immutable [`DeviceProfile`]. Once the peripheral is resolved its handle
//! is closed on every exit path, including timeout and cancellation.

use futures::stream::StreamExt;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ble::{RawCharacteristic, RawDescriptor, RawService, Transport};
use crate::error::{Outcome, ProfilerError};
use crate::profile::normalize::normalize_properties;
use crate::profile::types::{
    Advertisement, Characteristic, Descriptor, DeviceInfo, DeviceProfile, Service,
};

/// Default time allowed for the connect call
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Connection-time settings known at startup
#[derive(Debug, Clone)]
pub struct ProfileOptions {
    /// Tag of the enumeration engine, recorded in the profile
    pub engine_version: String,
    pub connect_timeout: Duration,
}

impl ProfileOptions {
    pub fn new(engine_version: impl Into<String>) -> Self {
        Self {
            engine_version: engine_version.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Builds device profiles over a transport
pub struct ProfileBuilder<'a, T: Transport + ?Sized> {
    transport: &'a T,
    options: ProfileOptions,
}

impl<'a, T: Transport + ?Sized> ProfileBuilder<'a, T> {
    pub fn new(transport: &'a T, options: ProfileOptions) -> Self {
        Self { transport, options }
    }

    /// Connect to the advertised device and enumerate its attribute tree
    pub async fn build(
        &self,
        target: &Advertisement,
        cancel: &CancellationToken,
    ) -> Result<Outcome<DeviceProfile>, ProfilerError> {
        let address = target.address.as_str();
        info!(
            "Connecting to device {} ({})",
            target.name.as_deref().unwrap_or("<unknown>"),
            address
        );

        let connection = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(Outcome::Cancelled),
            result = self.transport.resolve(address) => {
                result.map_err(|e| ProfilerError::ConnectionFailed {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?
            }
        };

        // From here on the handle is released on every path
        let timeout = self.options.connect_timeout;
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = tokio::time::timeout(timeout, self.transport.connect(&connection)) => Some(match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!("timed out after {:.1} seconds", timeout.as_secs_f64())),
            }),
        };

        let walked = match opened {
            None => None,
            Some(Err(reason)) => {
                self.release(address, connection).await;
                return Err(ProfilerError::ConnectionFailed {
                    address: address.to_string(),
                    reason,
                });
            }
            Some(Ok(())) => {
                info!("Connected. Enumerating services...");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    result = self.walk(address, &connection) => Some(result),
                }
            }
        };

        self.release(address, connection).await;

        let services = match walked {
            None => return Ok(Outcome::Cancelled),
            Some(result) => result?,
        };

        info!(
            "Enumerated {} services, {} characteristics",
            services.len(),
            services.iter().map(|s| s.characteristics.len()).sum::<usize>()
        );

        let device = DeviceInfo::new(target, &self.options.engine_version);
        Ok(Outcome::Completed(DeviceProfile::new(device, services)))
    }

    async fn release(&self, address: &str, connection: T::Connection) {
        match self.transport.close(connection).await {
            Ok(()) => debug!("Connection to {} closed", address),
            Err(e) => warn!("Failed to close connection to {}: {}", address, e),
        }
    }

    async fn walk(
        &self,
        address: &str,
        connection: &T::Connection,
    ) -> Result<Vec<Service>, ProfilerError> {
        let failed = |reason: String| ProfilerError::EnumerationFailed {
            address: address.to_string(),
            reason,
        };

        let mut stream = self
            .transport
            .enumerate_attributes(connection)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let mut services = Vec::new();
        let mut handles = SiblingHandles::default();
        while let Some(item) = stream.next().await {
            let raw = item.map_err(|e| failed(e.to_string()))?;
            handles.claim("service", &raw.uuid, raw.handle).map_err(failed)?;
            let service = convert_service(raw).map_err(failed)?;
            debug!(
                "Service {} with {} characteristics",
                service.uuid,
                service.characteristics.len()
            );
            services.push(service);
        }
        Ok(services)
    }
}

/// Handles seen among the children of one parent
#[derive(Debug, Default)]
struct SiblingHandles {
    seen: HashSet<u16>,
}

impl SiblingHandles {
    fn claim(&mut self, kind: &str, uuid: &str, handle: Option<u16>) -> Result<(), String> {
        match handle {
            Some(handle) if !self.seen.insert(handle) => Err(format!(
                "duplicate {} handle {} ({})",
                kind, handle, uuid
            )),
            _ => Ok(()),
        }
    }
}

fn require_identifier(kind: &str, uuid: &str) -> Result<String, String> {
    let uuid = uuid.trim();
    if uuid.is_empty() {
        return Err(format!("{} with empty identifier", kind));
    }
    Ok(uuid.to_string())
}

fn convert_service(raw: RawService) -> Result<Service, String> {
    let uuid = require_identifier("service", &raw.uuid)?;
    let mut handles = SiblingHandles::default();
    let characteristics = raw
        .characteristics
        .into_iter()
        .map(|characteristic| {
            handles.claim("characteristic", &characteristic.uuid, characteristic.handle)?;
            convert_characteristic(characteristic)
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Service {
        uuid,
        handle: raw.handle,
        description: raw.description,
        characteristics,
    })
}

fn convert_characteristic(raw: RawCharacteristic) -> Result<Characteristic, String> {
    let uuid = require_identifier("characteristic", &raw.uuid)?;
    let mut handles = SiblingHandles::default();
    let descriptors = raw
        .descriptors
        .into_iter()
        .map(|descriptor| {
            handles.claim("descriptor", &descriptor.uuid, descriptor.handle)?;
            convert_descriptor(descriptor)
        })
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Characteristic {
        uuid,
        handle: raw.handle,
        description: raw.description,
        properties: normalize_properties(&raw.properties),
        descriptors,
    })
}

fn convert_descriptor(raw: RawDescriptor) -> Result<Descriptor, String> {
    Ok(Descriptor {
        uuid: require_identifier("descriptor", &raw.uuid)?,
        handle: raw.handle,
        description: raw.description,
    })
}
