//! BLE Profiler - Main Application
//!
//! Scans for nearby BLE devices and writes what it saw to a discovery file.
//! When a device name or address is given, connects to the matching device
//! and writes its GATT profile as well.

use anyhow::Context;
use ble_profiler::config::{Config, DEFAULT_CONFIG_PATH};
use ble_profiler::{BtleplugTransport, ProfilerError, ProfilerManager, RunSummary, Transport};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

/// Exit status for an operator interrupt (128 + SIGINT)
const EXIT_CANCELLED: u8 = 130;

#[derive(Debug, Parser)]
#[command(
    name = "ble-profiler",
    version,
    about = "Scan for BLE devices and generate a GATT profile for one of them"
)]
struct Args {
    /// Configuration file (optional; defaults are used when missing)
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Target device name to profile once discovered
    #[arg(long)]
    device_name: Option<String>,

    /// Target device MAC address (or platform id). Overrides the device name
    #[arg(long)]
    mac_address: Option<String>,

    /// Where to write the discovery results
    #[arg(long)]
    scan_output: Option<PathBuf>,

    /// Where to write the device profile
    #[arg(long)]
    profile_output: Option<PathBuf>,

    /// Seconds to gather advertisements
    #[arg(long)]
    scan_duration: Option<f64>,

    /// Bluetooth adapter to use (e.g. "hci0")
    #[arg(long)]
    adapter: Option<String>,

    /// Seconds to wait for the connection to the target
    #[arg(long)]
    connect_timeout: Option<f64>,

    /// List the Bluetooth adapters and exit
    #[arg(long)]
    list_adapters: bool,

    /// Increase logging verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Command-line values take precedence over the config file
    fn apply(&self, config: &mut Config) {
        if let Some(name) = &self.device_name {
            config.target.name = Some(name.clone());
        }
        if let Some(address) = &self.mac_address {
            config.target.address = Some(address.clone());
        }
        if let Some(path) = &self.scan_output {
            config.output.scan_path = path.clone();
        }
        if let Some(path) = &self.profile_output {
            config.output.profile_path = path.clone();
        }
        if let Some(seconds) = self.scan_duration {
            config.scan.duration_secs = seconds;
        }
        if let Some(adapter) = &self.adapter {
            config.scan.adapter = Some(adapter.clone());
        }
        if let Some(seconds) = self.connect_timeout {
            config.connection.timeout_secs = seconds;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<ExitCode> {
    let mut config = Config::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    let transport = BtleplugTransport::new()
        .await
        .context("initialising the Bluetooth manager")?;

    if args.list_adapters {
        let adapters = transport.adapters().await?;
        if adapters.is_empty() {
            println!("No Bluetooth adapters found");
        }
        for adapter in adapters {
            println!("{}", adapter);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });

    let scan_path = config.output.scan_path.clone();
    let manager = ProfilerManager::new(transport, config);

    let code = match manager.run(&cancel).await {
        Ok(RunSummary::Discovered {
            device_count,
            scan_path,
        }) => {
            println!(
                "Discovered {} devices; results written to {}",
                device_count,
                scan_path.display()
            );
            ExitCode::SUCCESS
        }
        Ok(RunSummary::Profiled {
            address,
            service_count,
            profile_path,
            ..
        }) => {
            println!(
                "✓ Profiled {} ({} services); profile written to {}",
                address,
                service_count,
                profile_path.display()
            );
            ExitCode::SUCCESS
        }
        Ok(RunSummary::Cancelled) => {
            eprintln!("Scan cancelled by user.");
            ExitCode::from(EXIT_CANCELLED)
        }
        Err(ProfilerError::NotFound { target }) => {
            eprintln!(
                "No device matching {} was found. Review {} to pick a candidate.",
                target,
                scan_path.display()
            );
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    };

    Ok(code)
}
