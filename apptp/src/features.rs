use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::RwLock;

use blanket::blanket;

/// Identifies a feature running on top of the VPN
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VpnFeature(Cow<'static, str>);

impl VpnFeature {
    /// App tracking protection
    pub const APPTP_VPN: VpnFeature = VpnFeature(Cow::Borrowed("apptp_vpn"));
    pub const NETP_VPN: VpnFeature = VpnFeature(Cow::Borrowed("netp_vpn"));

    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(Cow::Owned(id.into()))
    }

    pub fn id(&self) -> &str {
        self.0.as_ref()
    }
}

impl Display for VpnFeature {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Keeps track of which VPN features are currently registered
#[blanket(derive(Ref, Box, Arc))]
pub trait VpnFeaturesRegistry: Send + Sync {
    fn is_feature_registered(&self, feature: &VpnFeature) -> bool;
}

/// In memory [VpnFeaturesRegistry]
#[derive(Default)]
pub struct FeatureSet {
    registered: RwLock<HashSet<VpnFeature>>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_features<I: IntoIterator<Item = VpnFeature>>(features: I) -> Self {
        Self {
            registered: RwLock::new(features.into_iter().collect()),
        }
    }

    pub fn register(&self, feature: VpnFeature) {
        log::debug!("registering feature {}", feature);
        match self.registered.write() {
            Ok(mut guard) => guard.insert(feature),
            Err(poisoned) => poisoned.into_inner().insert(feature),
        };
    }

    pub fn unregister(&self, feature: &VpnFeature) {
        log::debug!("unregistering feature {}", feature);
        match self.registered.write() {
            Ok(mut guard) => guard.remove(feature),
            Err(poisoned) => poisoned.into_inner().remove(feature),
        };
    }
}

impl VpnFeaturesRegistry for FeatureSet {
    fn is_feature_registered(&self, feature: &VpnFeature) -> bool {
        match self.registered.read() {
            Ok(guard) => guard.contains(feature),
            Err(poisoned) => poisoned.into_inner().contains(feature),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_unregister() {
        let features = FeatureSet::new();
        assert!(!features.is_feature_registered(&VpnFeature::APPTP_VPN));

        features.register(VpnFeature::APPTP_VPN);
        assert!(features.is_feature_registered(&VpnFeature::APPTP_VPN));
        assert!(!features.is_feature_registered(&VpnFeature::NETP_VPN));

        features.unregister(&VpnFeature::APPTP_VPN);
        assert!(!features.is_feature_registered(&VpnFeature::APPTP_VPN));
    }

    #[test]
    fn test_owned_and_const_ids_match() {
        let features = FeatureSet::with_features([VpnFeature::new("apptp_vpn")]);
        assert!(features.is_feature_registered(&VpnFeature::APPTP_VPN));
        assert_eq!(VpnFeature::APPTP_VPN.to_string(), "apptp_vpn");
    }

    #[test]
    fn test_arc_registry() {
        let features = Arc::new(FeatureSet::with_features([VpnFeature::APPTP_VPN]));
        let registry: Box<dyn VpnFeaturesRegistry> = Box::new(Arc::clone(&features));
        assert!(registry.is_feature_registered(&VpnFeature::APPTP_VPN));
        features.unregister(&VpnFeature::APPTP_VPN);
        assert!(!registry.is_feature_registered(&VpnFeature::APPTP_VPN));
    }
}
