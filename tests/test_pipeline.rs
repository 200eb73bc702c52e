//! End-to-end tests of the discovery/profile pipeline over the mock transport

use ble_profiler::ble::{RawAdvertisement, RawCharacteristic, RawService};
use ble_profiler::{
    Config, MockPeripheral, MockTransport, ProfilerError, ProfilerManager, RunSummary,
};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

const SKELLY: &str = "AA:BB:CC:DD:EE:FF";

fn init_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn config_in(dir: &Path) -> Config {
    let mut config = Config::default();
    config.scan.duration_secs = 0.1;
    config.output.scan_path = dir.join("config").join("discovered_devices.json");
    config.output.profile_path = dir.join("config").join("device_profile.json");
    config
}

fn service(uuid: &str, characteristics: Vec<RawCharacteristic>) -> RawService {
    RawService {
        uuid: uuid.to_string(),
        handle: None,
        description: None,
        characteristics,
    }
}

fn battery_level() -> RawCharacteristic {
    RawCharacteristic {
        uuid: "2A19".to_string(),
        handle: None,
        description: None,
        properties: vec!["read".to_string()],
        descriptors: Vec::new(),
    }
}

fn skelly_transport(peripheral: MockPeripheral) -> MockTransport {
    MockTransport::new()
        .advertise(RawAdvertisement::new("11:22:33:44:55:66").with_rssi(-90))
        .advertise(
            RawAdvertisement::new(SKELLY)
                .with_name("Skelly")
                .with_rssi(-60)
                .with_manufacturer_data(0x0553, vec![0x01, 0x00, 0x03]),
        )
        .with_peripheral(SKELLY, peripheral)
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_profile_skelly_by_name() {
    init_logging();
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.target.name = Some("skelly".to_string());

    let peripheral = MockPeripheral::new(vec![service("180A", vec![battery_level()])]);
    let manager = ProfilerManager::new(skelly_transport(peripheral), config.clone());

    let summary = manager.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(
        summary,
        RunSummary::Profiled {
            device_count: 2,
            scan_path: config.output.scan_path.clone(),
            address: SKELLY.to_string(),
            service_count: 1,
            profile_path: config.output.profile_path.clone(),
        }
    );

    let profile = read_json(&config.output.profile_path);
    assert_eq!(profile["services"][0]["uuid"], "180A");
    assert_eq!(
        profile["services"][0]["characteristics"][0]["properties"],
        serde_json::json!(["read"])
    );
    assert_eq!(profile["device"]["name"], "Skelly");
    assert_eq!(profile["device"]["manufacturer_data"]["0x0553"], "010003");
    assert!(profile["device"]["engine_version"].as_str().unwrap().starts_with("mock"));
    assert!(profile["services"][0]["handle"].is_null());

    let discovery = read_json(&config.output.scan_path);
    assert_eq!(discovery["device_count"], 2);
    assert_eq!(discovery["devices"][0]["address"], "11:22:33:44:55:66");
    assert!(discovery["devices"][0]["name"].is_null());
    assert_eq!(manager.transport().closed_connections(), 1);
}

#[tokio::test]
async fn test_discovery_only_without_target() {
    let dir = tempdir().unwrap();
    let config = config_in(dir.path());
    let manager = ProfilerManager::new(skelly_transport(MockPeripheral::default()), config.clone());

    let summary = manager.run(&CancellationToken::new()).await.unwrap();
    assert!(matches!(summary, RunSummary::Discovered { device_count: 2, .. }));
    assert!(config.output.scan_path.exists());
    assert!(!config.output.profile_path.exists());
    assert_eq!(manager.transport().opened_connections(), 0);
}

#[tokio::test]
async fn test_unknown_target_is_not_found() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.target.name = Some("Skelly".to_string());
    config.target.address = Some("00:00:00:00:00:01".to_string());
    let manager = ProfilerManager::new(skelly_transport(MockPeripheral::default()), config.clone());

    let result = manager.run(&CancellationToken::new()).await;
    assert!(matches!(result, Err(ProfilerError::NotFound { .. })));
    // The discovery document is still there for review
    assert!(config.output.scan_path.exists());
    assert!(!config.output.profile_path.exists());
}

#[tokio::test]
async fn test_partial_enumeration_writes_no_profile() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.target.address = Some(SKELLY.to_lowercase());

    let services = ["1800", "1801", "180A", "180F", "1812"]
        .iter()
        .map(|uuid| service(uuid, vec![battery_level()]))
        .collect();
    let peripheral = MockPeripheral {
        disconnect_after: Some(2),
        ..MockPeripheral::new(services)
    };
    let manager = ProfilerManager::new(skelly_transport(peripheral), config.clone());

    let result = manager.run(&CancellationToken::new()).await;
    assert!(matches!(result, Err(ProfilerError::EnumerationFailed { .. })));
    assert!(!config.output.profile_path.exists());
    assert_eq!(manager.transport().closed_connections(), 1);
}

#[tokio::test]
async fn test_failed_profile_keeps_previous_document() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.target.name = Some("Skelly".to_string());
    std::fs::create_dir_all(config.output.profile_path.parent().unwrap()).unwrap();
    std::fs::write(&config.output.profile_path, b"{\"previous\": true}\n").unwrap();

    let peripheral = MockPeripheral {
        reject_connection: true,
        ..Default::default()
    };
    let manager = ProfilerManager::new(skelly_transport(peripheral), config.clone());

    let result = manager.run(&CancellationToken::new()).await;
    assert!(matches!(result, Err(ProfilerError::ConnectionFailed { .. })));
    assert_eq!(read_json(&config.output.profile_path)["previous"], true);
}

#[tokio::test]
async fn test_cancelled_scan_writes_nothing() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.scan.duration_secs = 30.0;
    let manager = ProfilerManager::new(skelly_transport(MockPeripheral::default()), config.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let summary = manager.run(&cancel).await.unwrap();
    assert_eq!(summary, RunSummary::Cancelled);
    assert!(!config.output.scan_path.exists());
}

#[tokio::test]
async fn test_missing_adapter_reports_candidates() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.scan.adapter = Some("hci3".to_string());
    let transport = MockTransport::new().with_adapters(&["hci0", "hci1"]);
    let manager = ProfilerManager::new(transport, config);

    let error = manager.run(&CancellationToken::new()).await.unwrap_err();
    let message = error.to_string();
    assert!(matches!(error, ProfilerError::AdapterUnavailable { .. }));
    assert!(message.contains("hci0, hci1"));
    assert!(message.contains("'hci3'"));
}

#[tokio::test]
async fn test_invalid_config_rejected_before_scanning() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.scan.duration_secs = -1.0;
    let manager = ProfilerManager::new(MockTransport::new(), config.clone());

    let result = manager.run(&CancellationToken::new()).await;
    assert!(matches!(result, Err(ProfilerError::Config(_))));
    assert!(!config.output.scan_path.exists());
}

#[tokio::test]
async fn test_unrepresentable_duration_rejected_before_scanning() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.scan.duration_secs = 1e20;
    assert!(config.validate().is_err());

    let manager = ProfilerManager::new(MockTransport::new(), config.clone());
    let result = manager.run(&CancellationToken::new()).await;
    assert!(matches!(result, Err(ProfilerError::Config(_))));
    assert!(!config.output.scan_path.exists());
}

#[tokio::test]
async fn test_cancel_during_enumeration_releases_connection() {
    let dir = tempdir().unwrap();
    let mut config = config_in(dir.path());
    config.target.name = Some("Skelly".to_string());

    let peripheral = MockPeripheral {
        enumerate_delay: Some(Duration::from_secs(30)),
        ..MockPeripheral::new(vec![service("180A", vec![battery_level()])])
    };
    let manager = ProfilerManager::new(skelly_transport(peripheral), config.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let summary = manager.run(&cancel).await.unwrap();
    assert_eq!(summary, RunSummary::Cancelled);
    assert!(config.output.scan_path.exists());
    assert!(!config.output.profile_path.exists());
    assert_eq!(manager.transport().opened_connections(), 1);
    assert_eq!(manager.transport().closed_connections(), 1);
}
