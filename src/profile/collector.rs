//! Advertisement collector
//!
//! Runs one time-bounded scan. The collector loop is the only writer of the
//! address-keyed store: advertisements reach it over the scan handle's
//! channel, and the loop races that channel against the deadline and the
//! cancellation token.

use log::{debug, info};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::ble::{RawAdvertisement, Transport};
use crate::error::{Outcome, ProfilerError};
use crate::profile::types::Advertisement;

/// Latest snapshot per address, in first-seen order
#[derive(Debug, Default)]
pub struct AdvertisementStore {
    entries: Vec<RawAdvertisement>,
    index: HashMap<String, usize>,
}

impl AdvertisementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one advertisement into the store.
    ///
    /// Returns `true` when the address had not been seen before. A later
    /// advertisement replaces the stored one, except that a missing name
    /// keeps the name seen earlier (names often only arrive in scan responses).
    pub fn record(&mut self, advertisement: RawAdvertisement) -> bool {
        match self.index.get(&advertisement.address) {
            Some(&position) => {
                let entry = &mut self.entries[position];
                let name = advertisement.name.clone().or_else(|| entry.name.take());
                *entry = RawAdvertisement {
                    name,
                    ..advertisement
                };
                false
            }
            None => {
                self.index
                    .insert(advertisement.address.clone(), self.entries.len());
                self.entries.push(advertisement);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Normalize every stored snapshot, keeping first-seen order
    pub fn into_advertisements(self) -> Result<Vec<Advertisement>, ProfilerError> {
        self.entries
            .iter()
            .map(|raw| Advertisement::from_raw(raw).map_err(ProfilerError::from))
            .collect()
    }
}

/// Scan for `duration` and return every unique advertisement seen.
///
/// An empty result is valid. Cancellation stops the scan and yields
/// `Outcome::Cancelled`.
pub async fn collect<T>(
    transport: &T,
    duration: Duration,
    adapter_hint: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Outcome<Vec<Advertisement>>, ProfilerError>
where
    T: Transport + ?Sized,
{
    info!("Scanning for BLE devices for {:.1} seconds...", duration.as_secs_f64());

    let mut handle = transport
        .start_scan(adapter_hint)
        .await
        .map_err(ProfilerError::from_scan)?;

    let mut store = AdvertisementStore::new();
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(Outcome::Cancelled),
            _ = &mut deadline => break Ok(Outcome::Completed(())),
            event = handle.next() => match event {
                Some(Ok(advertisement)) => {
                    let address = advertisement.address.clone();
                    let name = advertisement.name.clone();
                    let rssi = advertisement.rssi;
                    if store.record(advertisement) {
                        info!(
                            "Found device: name={} address={} rssi={}",
                            name.as_deref().unwrap_or("<unknown>"),
                            address,
                            rssi.map(|r| r.to_string()).unwrap_or_else(|| "n/a".to_string()),
                        );
                    } else {
                        debug!("Updated device {} (rssi={:?})", address, rssi);
                    }
                }
                Some(Err(e)) => break Err(ProfilerError::from_scan(e)),
                // Transport ended the scan early; keep what we have
                None => break Ok(Outcome::Completed(())),
            },
        }
    };

    handle.stop().await;

    match result? {
        Outcome::Cancelled => {
            info!("Scan cancelled after {} devices", store.len());
            Ok(Outcome::Cancelled)
        }
        Outcome::Completed(()) => {
            let advertisements = store.into_advertisements()?;
            info!("Discovered {} devices", advertisements.len());
            for advertisement in &advertisements {
                debug!(
                    "  name={:?} address={} rssi={:?}",
                    advertisement.name, advertisement.address, advertisement.rssi
                );
            }
            Ok(Outcome::Completed(advertisements))
        }
    }
}
