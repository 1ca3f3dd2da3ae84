//! The tracker company directory: which hostnames belong to which tracker
//! companies, and which apps those companies own.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use blanket::blanket;
use serde::{Deserialize, Serialize};

use crate::utils::{normalize_hostname, open_file, parent_domains};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerOwner {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppTracker {
    /// The blocklist hostname that matched, may be a parent of the queried one
    pub hostname: String,
    pub tracker_company_id: i32,
    pub owner: TrackerOwner,
}

/// Result of classifying a hostname for a given app
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppTrackerType {
    NotTracker,
    /// The company owning the tracker also owns the requesting app
    FirstParty(AppTracker),
    ThirdParty(AppTracker),
}

#[blanket(derive(Ref, Box, Arc))]
pub trait TrackerDirectory: Send + Sync {
    fn find_tracker(&self, hostname: &str, package_id: &str) -> AppTrackerType;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrackerJson {
    company_id: i32,
    owner: TrackerOwner,
}

#[derive(Debug, Default, Deserialize)]
struct BlocklistJson {
    #[serde(default)]
    trackers: HashMap<String, TrackerJson>,
    /// package id -> owning entity name
    #[serde(default)]
    packages: HashMap<String, String>,
}

/// In memory [TrackerDirectory] loaded from a JSON blocklist:
///
/// ```json
/// {
///   "trackers": {
///     "doubleclick.net": { "companyId": 1, "owner": { "name": "Google LLC", "displayName": "Google" } }
///   },
///   "packages": { "com.google.android.youtube": "Google LLC" }
/// }
/// ```
///
/// Hostname lookups are case insensitive and also match any subdomain of a
/// blocklisted hostname.
#[derive(Debug, Default, Clone)]
pub struct TrackerBlocklist {
    trackers: HashMap<String, (i32, TrackerOwner)>,
    packages: HashMap<String, String>,
}

impl TrackerBlocklist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let f = open_file(path)?;
        Self::from_reader(f).map_err(|e| crate::Error::new_data(path, &e))
    }

    pub fn from_reader<R: Read>(reader: R) -> crate::Result<Self> {
        let parsed: BlocklistJson = serde_json::from_reader(reader)?;
        let mut list = Self::new();
        for (hostname, tracker) in parsed.trackers {
            list.add_tracker(&hostname, tracker.company_id, tracker.owner);
        }
        for (package, entity) in parsed.packages {
            list.add_package_owner(package, entity);
        }
        log::debug!(
            "loaded blocklist with {} trackers and {} packages",
            list.trackers.len(),
            list.packages.len()
        );
        Ok(list)
    }

    pub fn add_tracker(&mut self, hostname: &str, company_id: i32, owner: TrackerOwner) {
        self.trackers
            .insert(normalize_hostname(hostname), (company_id, owner));
    }

    /// Mark `package_id` as owned by the entity `entity_name`
    pub fn add_package_owner<P: Into<String>, E: Into<String>>(
        &mut self,
        package_id: P,
        entity_name: E,
    ) {
        self.packages.insert(package_id.into(), entity_name.into());
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    fn lookup(&self, hostname: &str) -> Option<AppTracker> {
        let normalized = normalize_hostname(hostname);
        if normalized.is_empty() {
            return None;
        }
        let found = parent_domains(&normalized).find_map(|candidate| {
            self.trackers
                .get(candidate)
                .map(|(company_id, owner)| AppTracker {
                    hostname: candidate.into(),
                    tracker_company_id: *company_id,
                    owner: owner.clone(),
                })
        });
        found
    }
}

impl TrackerDirectory for TrackerBlocklist {
    fn find_tracker(&self, hostname: &str, package_id: &str) -> AppTrackerType {
        let tracker = match self.lookup(hostname) {
            Some(v) => v,
            None => return AppTrackerType::NotTracker,
        };

        let same_owner = self
            .packages
            .get(package_id)
            .map_or(false, |entity| *entity == tracker.owner.name);

        if same_owner {
            AppTrackerType::FirstParty(tracker)
        } else {
            AppTrackerType::ThirdParty(tracker)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rstest::*;

    const BLOCKLIST: &str = r#"{
  "trackers": {
    "doubleclick.net": { "companyId": 1, "owner": { "name": "Google LLC", "displayName": "Google" } },
    "Tracker.Example.com": { "companyId": 7, "owner": { "name": "Example Corp", "displayName": "Example" } }
  },
  "packages": {
    "com.google.android.youtube": "Google LLC"
  }
}"#;

    #[fixture]
    fn blocklist() -> TrackerBlocklist {
        TrackerBlocklist::from_reader(BLOCKLIST.as_bytes()).expect("valid blocklist")
    }

    #[rstest]
    fn test_third_party(blocklist: TrackerBlocklist) {
        match blocklist.find_tracker("tracker.example.com", "com.example.app") {
            AppTrackerType::ThirdParty(t) => {
                assert_eq!(t.hostname, "tracker.example.com");
                assert_eq!(t.tracker_company_id, 7);
                assert_eq!(t.owner.display_name, "Example");
            }
            other => panic!("expected third party, got {:?}", other),
        }
    }

    #[rstest]
    #[case("ads.doubleclick.net")]
    #[case("a.b.doubleclick.net.")]
    #[case("DoubleClick.NET")]
    fn test_subdomain_match(blocklist: TrackerBlocklist, #[case] hostname: &str) {
        match blocklist.find_tracker(hostname, "com.example.app") {
            AppTrackerType::ThirdParty(t) => assert_eq!(t.hostname, "doubleclick.net"),
            other => panic!("expected third party for {}, got {:?}", hostname, other),
        }
    }

    #[rstest]
    fn test_first_party(blocklist: TrackerBlocklist) {
        assert!(matches!(
            blocklist.find_tracker("ads.doubleclick.net", "com.google.android.youtube"),
            AppTrackerType::FirstParty(_)
        ));
    }

    #[rstest]
    #[case("example.com")]
    #[case("notdoubleclick.net")]
    #[case("net")]
    #[case("")]
    fn test_not_tracker(blocklist: TrackerBlocklist, #[case] hostname: &str) {
        assert_eq!(
            blocklist.find_tracker(hostname, "com.example.app"),
            AppTrackerType::NotTracker
        );
    }

    #[test]
    fn test_invalid_json() {
        assert!(TrackerBlocklist::from_reader("{\"trackers\": 1}".as_bytes()).is_err());
    }
}
