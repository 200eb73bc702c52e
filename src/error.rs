//! Crate-level error type
//!
//! Every failure of the discovery/profile pipeline surfaces as one
//! `ProfilerError` variant carrying the target and the underlying transport
//! message. Operator interrupts are not errors; see [`Outcome`].

use std::path::PathBuf;
use thiserror::Error;

use crate::ble::TransportError;
use crate::config::ConfigError;
use crate::profile::normalize::NormalizeError;

#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("Bluetooth adapter not available: {reason}\n{}", adapter_hints(.requested, .available))]
    AdapterUnavailable {
        requested: Option<String>,
        available: Vec<String>,
        reason: String,
    },

    #[error("BLE scan failed: {0}")]
    ScanFailed(String),

    #[error("No device matching {target} was found")]
    NotFound { target: String },

    #[error("Failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    #[error("Failed to enumerate services of {address}: {reason}")]
    EnumerationFailed { address: String, reason: String },

    #[error("Malformed payload from protocol layer: {0}")]
    MalformedPayload(#[from] NormalizeError),

    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl ProfilerError {
    /// Map a transport failure that happened while starting or running a scan
    pub fn from_scan(error: TransportError) -> Self {
        match error {
            TransportError::AdapterUnavailable {
                requested,
                available,
            } => {
                let reason = match &requested {
                    Some(name) => format!("adapter '{}' not found", name),
                    None => "no powered Bluetooth adapters found".to_string(),
                };
                ProfilerError::AdapterUnavailable {
                    requested,
                    available,
                    reason,
                }
            }
            other => ProfilerError::ScanFailed(other.to_string()),
        }
    }
}

/// Troubleshooting text appended to adapter failures
fn adapter_hints(requested: &Option<String>, available: &[String]) -> String {
    let mut hints = String::from("Troubleshooting steps:\n");
    if available.is_empty() {
        hints.push_str("  No adapters detected by the Bluetooth stack.\n");
    } else {
        hints.push_str(&format!("  Found adapters: {}\n", available.join(", ")));
        match requested {
            Some(name) => {
                hints.push_str(&format!("  Specified adapter '{}' not found.\n", name));
            }
            None => {
                let first = available[0].split_whitespace().next().unwrap_or(&available[0]);
                hints.push_str(&format!(
                    "  Try specifying the adapter explicitly: --adapter {}\n",
                    first
                ));
            }
        }
    }
    hints.push_str("  Check that the bluetooth service is running and the adapter is powered on.");
    hints
}

/// Result of an operation that the operator may interrupt
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    /// The completed value, if any
    pub fn completed(self) -> Option<T> {
        match self {
            Outcome::Completed(value) => Some(value),
            Outcome::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_error_lists_candidates() {
        let error = ProfilerError::from_scan(TransportError::AdapterUnavailable {
            requested: None,
            available: vec!["hci1 (usb:v1D6B)".to_string()],
        });
        let message = error.to_string();
        assert!(message.contains("no powered Bluetooth adapters found"));
        assert!(message.contains("--adapter hci1"));
    }

    #[test]
    fn test_adapter_error_names_requested_adapter() {
        let error = ProfilerError::from_scan(TransportError::AdapterUnavailable {
            requested: Some("hci7".to_string()),
            available: vec![],
        });
        let message = error.to_string();
        assert!(message.contains("adapter 'hci7' not found"));
        assert!(message.contains("No adapters detected"));
    }

    #[test]
    fn test_other_transport_errors_are_scan_failures() {
        let error = ProfilerError::from_scan(TransportError::Operation("boom".to_string()));
        assert!(matches!(error, ProfilerError::ScanFailed(ref m) if m.contains("boom")));
    }
}
