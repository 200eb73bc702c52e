//! High-level profiler run
//!
//! Drives one invocation end to end: scan, write the discovery document,
//! select the requested device, build its profile and write it. Phases run
//! strictly one after another.

use log::info;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::ble::Transport;
use crate::config::Config;
use crate::error::{Outcome, ProfilerError};
use crate::profile::{
    collect, select, write_document, DiscoveryDocument, ProfileBuilder, ProfileOptions, Target,
};

/// What a run produced
#[derive(Debug, Clone, PartialEq)]
pub enum RunSummary {
    /// Discovery only; no target was requested
    Discovered {
        device_count: usize,
        scan_path: PathBuf,
    },
    /// Discovery plus a device profile
    Profiled {
        device_count: usize,
        scan_path: PathBuf,
        address: String,
        service_count: usize,
        profile_path: PathBuf,
    },
    /// The operator interrupted the run
    Cancelled,
}

/// Runs the discovery/profile pipeline over a transport
pub struct ProfilerManager<T: Transport> {
    transport: T,
    config: Config,
}

impl<T: Transport> ProfilerManager<T> {
    pub fn new(transport: T, config: Config) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Execute one invocation
    pub async fn run(&self, cancel: &CancellationToken) -> Result<RunSummary, ProfilerError> {
        self.config.validate()?;

        let outcome = collect(
            &self.transport,
            self.config.scan_duration(),
            self.config.scan.adapter.as_deref(),
            cancel,
        )
        .await?;
        let advertisements = match outcome {
            Outcome::Completed(advertisements) => advertisements,
            Outcome::Cancelled => return Ok(RunSummary::Cancelled),
        };

        let scan_path = self.config.output.scan_path.clone();
        let document = DiscoveryDocument::new(advertisements, self.config.scan.duration_secs);
        write_document(&document, &scan_path)?;

        let target = Target::from_parts(
            self.config.target.name.as_deref(),
            self.config.target.address.as_deref(),
        );
        let Some(target) = target else {
            info!("No target specified; skipping device profiling.");
            return Ok(RunSummary::Discovered {
                device_count: document.device_count,
                scan_path,
            });
        };

        let selected = select(&document.devices, &target)?;
        info!("Selected {} for {}", selected.address, target);

        let options = ProfileOptions::new(self.transport.engine_version())
            .with_connect_timeout(self.config.connect_timeout());
        let builder = ProfileBuilder::new(&self.transport, options);
        let profile = match builder.build(selected, cancel).await? {
            Outcome::Completed(profile) => profile,
            Outcome::Cancelled => return Ok(RunSummary::Cancelled),
        };

        let profile_path = self.config.output.profile_path.clone();
        write_document(&profile, &profile_path)?;

        Ok(RunSummary::Profiled {
            device_count: document.device_count,
            scan_path,
            address: selected.address.clone(),
            service_count: profile.services().len(),
            profile_path,
        })
    }
}
