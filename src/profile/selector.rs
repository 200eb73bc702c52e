//! Device selection
//!
//! Picks the advertisement the operator asked for. An address, when given,
//! is the only criterion; otherwise the name is matched. Both comparisons are
//! case-insensitive and exact, and the first match in scan order wins, so two
//! devices sharing a name are resolved by whichever advertised first.

use std::fmt;

use crate::error::ProfilerError;
use crate::profile::types::Advertisement;

/// What the operator asked to profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Address(String),
    Name(String),
}

impl Target {
    /// Build the target from optional name and address.
    ///
    /// Returns `None` when neither is given (discovery-only run). Blank
    /// strings count as absent.
    pub fn from_parts(name: Option<&str>, address: Option<&str>) -> Option<Self> {
        let present = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        match (present(address), present(name)) {
            (Some(address), _) => Some(Target::Address(address)),
            (None, Some(name)) => Some(Target::Name(name)),
            (None, None) => None,
        }
    }

    pub fn matches(&self, advertisement: &Advertisement) -> bool {
        match self {
            Target::Address(address) => {
                normalize_address(&advertisement.address) == normalize_address(address)
            }
            Target::Name(name) => advertisement
                .name
                .as_deref()
                .map(|n| n.to_lowercase() == name.to_lowercase())
                .unwrap_or(false),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Address(address) => write!(f, "address {}", address),
            Target::Name(name) => write!(f, "name '{}'", name),
        }
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}

/// Return the first advertisement matching the target
pub fn select<'a>(
    advertisements: &'a [Advertisement],
    target: &Target,
) -> Result<&'a Advertisement, ProfilerError> {
    advertisements
        .iter()
        .find(|advertisement| target.matches(advertisement))
        .ok_or_else(|| ProfilerError::NotFound {
            target: target.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::RawAdvertisement;

    fn advertisement(address: &str, name: Option<&str>) -> Advertisement {
        let mut raw = RawAdvertisement::new(address);
        raw.name = name.map(str::to_string);
        Advertisement::from_raw(&raw).unwrap()
    }

    #[test]
    fn test_target_from_parts() {
        assert_eq!(Target::from_parts(None, None), None);
        assert_eq!(Target::from_parts(Some("  "), Some("")), None);
        assert_eq!(
            Target::from_parts(Some("Skelly"), None),
            Some(Target::Name("Skelly".to_string()))
        );
        assert_eq!(
            Target::from_parts(Some("Skelly"), Some("AA:BB:CC:DD:EE:FF")),
            Some(Target::Address("AA:BB:CC:DD:EE:FF".to_string()))
        );
    }

    #[test]
    fn test_name_match_is_case_insensitive() {
        let devices = vec![
            advertisement("11:22:33:44:55:66", None),
            advertisement("AA:BB:CC:DD:EE:FF", Some("Skelly")),
        ];
        let target = Target::Name("skelly".to_string());
        assert_eq!(select(&devices, &target).unwrap().address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_address_wins_over_name() {
        let devices = vec![
            advertisement("11:22:33:44:55:66", Some("Skelly")),
            advertisement("AA:BB:CC:DD:EE:FF", Some("Other")),
        ];
        let target = Target::from_parts(Some("Skelly"), Some("aa:bb:cc:dd:ee:ff")).unwrap();
        assert_eq!(select(&devices, &target).unwrap().address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_address_given_ignores_name_even_without_match() {
        let devices = vec![advertisement("11:22:33:44:55:66", Some("Skelly"))];
        let target = Target::from_parts(Some("Skelly"), Some("AA:BB:CC:DD:EE:FF")).unwrap();
        assert!(matches!(
            select(&devices, &target),
            Err(ProfilerError::NotFound { ref target }) if target.contains("AA:BB:CC:DD:EE:FF")
        ));
    }

    #[test]
    fn test_first_match_wins_for_duplicate_names() {
        let devices = vec![
            advertisement("11:22:33:44:55:66", Some("Skelly")),
            advertisement("AA:BB:CC:DD:EE:FF", Some("SKELLY")),
        ];
        let target = Target::Name("Skelly".to_string());
        assert_eq!(select(&devices, &target).unwrap().address, "11:22:33:44:55:66");
    }

    #[test]
    fn test_no_fuzzy_matching() {
        let devices = vec![advertisement("AA:BB:CC:DD:EE:FF", Some("Skelly 2"))];
        let target = Target::Name("Skelly".to_string());
        assert!(select(&devices, &target).is_err());
    }
}
