#![allow(unused)]
use mockall::mock;
use rstest::fixture;

use crate::apps::OriginatingApp;
use crate::exclusion::ManualAppExclusion;
use crate::features::VpnFeature;
use crate::recorder::VpnTracker;
use crate::rules::ExceptionRule;
use crate::trackers::AppTrackerType;

mock! {
    pub FeaturesRegistry {}

    impl crate::features::VpnFeaturesRegistry for FeaturesRegistry {
        fn is_feature_registered(&self, feature: &VpnFeature) -> bool;
    }
}

mock! {
    pub AppNameResolver {}

    impl crate::apps::AppNameResolver for AppNameResolver {
        fn package_id_for_uid(&self, uid: i32) -> Option<String>;
        fn app_name_for_package_id(&self, package_id: &str) -> OriginatingApp;
    }
}

mock! {
    pub PackageManager {}

    impl crate::exclusion::PackageManager for PackageManager {
        fn is_system_app(&self, package_id: &str) -> crate::Result<bool>;
    }
}

mock! {
    pub ExclusionStore {}

    impl crate::exclusion::ExclusionStore for ExclusionStore {
        fn system_app_overrides(&self) -> Vec<String>;
        fn manual_exclusions(&self) -> Vec<ManualAppExclusion>;
        fn app_exclusions(&self) -> Vec<String>;
    }
}

mock! {
    pub TrackerDirectory {}

    impl crate::trackers::TrackerDirectory for TrackerDirectory {
        fn find_tracker(&self, hostname: &str, package_id: &str) -> AppTrackerType;
    }
}

mock! {
    pub ExceptionRuleStore {}

    impl crate::rules::ExceptionRuleStore for ExceptionRuleStore {
        fn rule_for_hostname(&self, hostname: &str) -> Option<ExceptionRule>;
    }
}

mock! {
    pub AppTrackerRecorder {}

    impl crate::recorder::AppTrackerRecorder for AppTrackerRecorder {
        fn insert_tracker(&self, tracker: VpnTracker);
    }
}

#[fixture]
pub fn mock_features_registry() -> MockFeaturesRegistry {
    MockFeaturesRegistry::new()
}

#[fixture]
pub fn mock_app_name_resolver() -> MockAppNameResolver {
    MockAppNameResolver::new()
}

#[fixture]
pub fn mock_package_manager() -> MockPackageManager {
    MockPackageManager::new()
}

#[fixture]
pub fn mock_exclusion_store() -> MockExclusionStore {
    MockExclusionStore::new()
}

#[fixture]
pub fn mock_tracker_directory() -> MockTrackerDirectory {
    MockTrackerDirectory::new()
}

#[fixture]
pub fn mock_exception_rule_store() -> MockExceptionRuleStore {
    MockExceptionRuleStore::new()
}

#[fixture]
pub fn mock_recorder() -> MockAppTrackerRecorder {
    MockAppTrackerRecorder::new()
}
