//! Decides whether a connection from an app to a domain is a third party
//! tracker that should be blocked.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::apps::{AppNameResolver, OriginatingApp, PackagesList};
use crate::cache::{LruCache, DEFAULT_APP_NAME_CACHE_SIZE};
use crate::config::DetectorConfig;
use crate::exclusion::{
    exclusion_reason, ExclusionLists, ExclusionReason, ExclusionStore, FirstPartyApps,
    PackageManager, PackageSet, SystemPackages,
};
use crate::features::{FeatureSet, VpnFeature, VpnFeaturesRegistry};
use crate::recorder::{AppTrackerRecorder, TrackingApp, VpnTracker};
use crate::rules::{ExceptionRuleStore, ExceptionRules};
use crate::trackers::{AppTrackerType, TrackerBlocklist, TrackerDirectory};

/// A tracker that should be blocked for the app owning `uid`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppTrackerSighting {
    /// The blocklist hostname that matched
    pub domain: String,
    pub uid: i32,
    pub tracker_company_display_name: String,
    pub tracking_app_id: String,
    pub tracking_app_name: String,
}

pub trait AppTrackerDetector: Send + Sync {
    /// Returns `Some` only when the connection should be blocked. Any failure
    /// along the way lets the connection through.
    fn evaluate(&self, domain: &str, uid: i32) -> Option<AppTrackerSighting>;
}

pub struct RealAppTrackerDetector {
    features: Box<dyn VpnFeaturesRegistry>,
    app_name_resolver: Box<dyn AppNameResolver>,
    package_manager: Box<dyn PackageManager>,
    exclusions: Box<dyn ExclusionStore>,
    tracker_directory: Box<dyn TrackerDirectory>,
    exception_rules: Box<dyn ExceptionRuleStore>,
    recorder: Box<dyn AppTrackerRecorder>,
    first_party: FirstPartyApps,
    app_names_cache: LruCache<String, OriginatingApp>,
}

impl RealAppTrackerDetector {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        features: Box<dyn VpnFeaturesRegistry>,
        app_name_resolver: Box<dyn AppNameResolver>,
        package_manager: Box<dyn PackageManager>,
        exclusions: Box<dyn ExclusionStore>,
        tracker_directory: Box<dyn TrackerDirectory>,
        exception_rules: Box<dyn ExceptionRuleStore>,
        recorder: Box<dyn AppTrackerRecorder>,
    ) -> Self {
        Self {
            features,
            app_name_resolver,
            package_manager,
            exclusions,
            tracker_directory,
            exception_rules,
            recorder,
            first_party: FirstPartyApps::default(),
            app_names_cache: LruCache::new(DEFAULT_APP_NAME_CACHE_SIZE),
        }
    }

    pub fn with_first_party_apps(mut self, first_party: FirstPartyApps) -> Self {
        self.first_party = first_party;
        self
    }

    /// Replaces the app name cache with an empty one holding `size` apps
    pub fn with_cache_size(mut self, size: usize) -> Self {
        self.app_names_cache = LruCache::new(size);
        self
    }

    pub fn is_app_tp_disabled(&self) -> bool {
        !self.features.is_feature_registered(&VpnFeature::APPTP_VPN)
    }

    /// Why `package_id` is never blocked, if it isn't
    pub fn package_exclusion(&self, package_id: &str) -> crate::Result<Option<ExclusionReason>> {
        if self.first_party.is_first_party(package_id) {
            return Ok(Some(ExclusionReason::FirstPartyApp));
        }
        exclusion_reason(
            package_id,
            self.package_manager.as_ref(),
            self.exclusions.as_ref(),
        )
    }

    fn is_tracker_in_exception_rules(&self, hostname: &str, package_id: &str) -> bool {
        match self.exception_rules.rule_for_hostname(hostname) {
            Some(rule) => {
                debug!("found exception rule for {}: {:?}", hostname, rule);
                rule.exempts(package_id)
            }
            None => false,
        }
    }

    fn resolve_app(&self, package_id: &str) -> OriginatingApp {
        let app = match self.app_names_cache.get(package_id) {
            Some(app) => app,
            None => self.app_name_resolver.app_name_for_package_id(package_id),
        };
        self.app_names_cache.put(package_id.into(), app.clone());
        app
    }
}

impl AppTrackerDetector for RealAppTrackerDetector {
    fn evaluate(&self, domain: &str, uid: i32) -> Option<AppTrackerSighting> {
        if self.is_app_tp_disabled() {
            debug!("app tracker detector is disabled");
            return None;
        }

        // Unknown app, don't block
        let package_id = self.app_name_resolver.package_id_for_uid(uid)?;

        match self.package_exclusion(&package_id) {
            Ok(None) => {}
            Ok(Some(reason)) => {
                debug!("{} is excluded ({}), allowing {}", package_id, reason, domain);
                return None;
            }
            Err(e) => {
                warn!(
                    "failed to check exclusions for {}, allowing {}: {}",
                    package_id, domain, e
                );
                return None;
            }
        }

        let tracker = match self.tracker_directory.find_tracker(domain, &package_id) {
            AppTrackerType::ThirdParty(tracker) => tracker,
            AppTrackerType::NotTracker | AppTrackerType::FirstParty(_) => return None,
        };

        if self.is_tracker_in_exception_rules(domain, &package_id) {
            debug!("{} is exempt for {}", domain, package_id);
            return None;
        }

        let app = self.resolve_app(&package_id);
        if app.is_unknown() {
            debug!("no app name for {}, allowing {}", package_id, domain);
            return None;
        }

        self.recorder.insert_tracker(VpnTracker {
            tracker_company_id: tracker.tracker_company_id,
            company: tracker.owner.name.clone(),
            company_display_name: tracker.owner.display_name.clone(),
            domain: tracker.hostname.clone(),
            tracking_app: TrackingApp {
                package_id: app.package_id.clone(),
                app_name: app.app_name.clone(),
            },
        });

        Some(AppTrackerSighting {
            domain: tracker.hostname,
            uid,
            tracker_company_display_name: tracker.owner.display_name,
            tracking_app_id: app.package_id,
            tracking_app_name: app.app_name,
        })
    }
}

/// Loads all the data files named in `cfg` and builds a detector from them
pub fn detector_from_config(
    cfg: &DetectorConfig,
    recorder: Box<dyn AppTrackerRecorder>,
) -> crate::Result<RealAppTrackerDetector> {
    let data = &cfg.data;

    let features = FeatureSet::new();
    if cfg.enabled {
        features.register(VpnFeature::APPTP_VPN);
    }

    let mut packages = PackagesList::from_path(&data.packages_list)?;
    if let Some(labels) = &data.app_labels {
        packages.load_labels(labels)?;
    }
    debug!("loaded {} packages", packages.len());

    let blocklist = TrackerBlocklist::from_path(&data.blocklist)?;
    debug!("loaded {} tracker hostnames", blocklist.len());

    let rules = match &data.exception_rules {
        Some(path) => ExceptionRules::from_path(path)?,
        None => ExceptionRules::new(),
    };

    let mut exclusions = ExclusionLists::new().with_manual_exclusions(cfg.manual_exclusions.clone());
    if let Some(path) = &data.system_app_overrides {
        exclusions = exclusions.with_system_app_overrides(PackageSet::from_path(path)?);
    }
    if let Some(path) = &data.app_exclusions {
        exclusions = exclusions.with_app_exclusions(PackageSet::from_path(path)?);
    }

    let package_manager = package_manager_from_config(cfg)?;

    Ok(RealAppTrackerDetector::new(
        Box::new(features),
        Box::new(packages),
        package_manager,
        Box::new(exclusions),
        Box::new(blocklist),
        Box::new(rules),
        recorder,
    )
    .with_first_party_apps(FirstPartyApps::new(cfg.first_party_prefixes.iter().cloned()))
    .with_cache_size(cfg.cache_size))
}

fn package_manager_from_config(cfg: &DetectorConfig) -> crate::Result<Box<dyn PackageManager>> {
    if let Some(path) = &cfg.data.system_packages {
        return Ok(Box::new(SystemPackages::from_path(path)?));
    }
    adb_package_manager(cfg)
}

#[cfg(feature = "adb")]
fn adb_package_manager(cfg: &DetectorConfig) -> crate::Result<Box<dyn PackageManager>> {
    use crate::adb::{AdbPackageManager, ExecAdb};

    let adb = match &cfg.adb {
        Some(adb_cfg) => ExecAdb::from_config(adb_cfg)?,
        None => ExecAdb::from_env()?,
    };
    debug!("querying system packages through {:?}", adb);
    Ok(Box::new(AdbPackageManager::new(adb)))
}

#[cfg(not(feature = "adb"))]
fn adb_package_manager(_cfg: &DetectorConfig) -> crate::Result<Box<dyn PackageManager>> {
    Err(crate::Error::new_generic(
        "data.system-packages must be set when built without adb support",
    ))
}
