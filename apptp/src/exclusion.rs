//! Apps that are never subject to tracker blocking.
//!
//! A package is excluded when, checked in order:
//!
//! 1. it is a system app that hasn't been overridden back into protection
//! 2. the user manually unprotected it (a manual entry marked protected wins
//!    over everything below)
//! 3. it is on the general exclusion list
//!
//! The product's own apps are handled separately by [FirstPartyApps].

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::io::{self, Read};
use std::path::Path;

use blanket::blanket;
use serde::{Deserialize, Serialize};

use crate::utils::{open_file, NewlineReader};

/// Package id prefix shared by the product's own apps
pub const DEFAULT_FIRST_PARTY_PREFIX: &str = "com.duckduckgo.mobile";

/// The subset of the platform package manager needed for exclusions
#[blanket(derive(Ref, Box, Arc))]
pub trait PackageManager: Send + Sync {
    /// Returns an error if the package manager can't be queried, or
    /// [crate::Error::PackageNotFound] if it doesn't know the package.
    fn is_system_app(&self, package_id: &str) -> crate::Result<bool>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAppExclusion {
    pub package_id: String,
    /// `false` means the user turned protection off for this app
    pub is_protected: bool,
}

#[blanket(derive(Ref, Box, Arc))]
pub trait ExclusionStore: Send + Sync {
    /// System apps that should be protected anyway
    fn system_app_overrides(&self) -> Vec<String>;

    fn manual_exclusions(&self) -> Vec<ManualAppExclusion>;

    fn app_exclusions(&self) -> Vec<String>;
}

/// A set of package ids
#[derive(Default, Clone, PartialEq, Eq)]
pub struct PackageSet {
    values: HashSet<String>,
}

impl Debug for PackageSet {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.values.fmt(f)
    }
}

impl Extend<String> for PackageSet {
    #[inline]
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        self.values.extend(iter)
    }
}

impl<'a, I> From<I> for PackageSet
where
    I: IntoIterator<Item = &'a str>,
{
    fn from(it: I) -> Self {
        Self {
            values: it.into_iter().map(String::from).collect(),
        }
    }
}

impl PackageSet {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains<Q: ?Sized>(&self, val: &Q) -> bool
    where
        String: Borrow<Q>,
        Q: std::hash::Hash + Eq,
    {
        self.values.contains(val)
    }

    #[inline]
    pub fn insert<S: Into<String>>(&mut self, val: S) {
        self.values.insert(val.into());
    }

    #[inline]
    pub fn remove(&mut self, val: &str) {
        self.values.remove(val);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.values.iter()
    }

    /// Read a newline separated list of package ids, `#` starts a comment
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let f = open_file(path)?;
        Ok(Self::from_reader(f)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> io::Result<Self> {
        let mut values = HashSet::new();
        for l in NewlineReader::new(reader) {
            values.insert(l?);
        }
        Ok(Self { values })
    }
}

/// [PackageManager] for a fixed, known set of system packages. Any package
/// not in the set is assumed to be a regular app.
#[derive(Debug, Default, Clone)]
pub struct SystemPackages(PackageSet);

impl SystemPackages {
    pub fn new(packages: PackageSet) -> Self {
        Self(packages)
    }

    pub fn from_path(path: &Path) -> crate::Result<Self> {
        Ok(Self(PackageSet::from_path(path)?))
    }
}

impl PackageManager for SystemPackages {
    fn is_system_app(&self, package_id: &str) -> crate::Result<bool> {
        Ok(self.0.contains(package_id))
    }
}

/// In memory [ExclusionStore]
#[derive(Debug, Default, Clone)]
pub struct ExclusionLists {
    system_app_overrides: PackageSet,
    manual: HashMap<String, bool>,
    app_exclusions: PackageSet,
}

impl ExclusionLists {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_app_overrides(mut self, overrides: PackageSet) -> Self {
        self.system_app_overrides = overrides;
        self
    }

    pub fn with_app_exclusions(mut self, exclusions: PackageSet) -> Self {
        self.app_exclusions = exclusions;
        self
    }

    /// `manual` maps package id -> is_protected
    pub fn with_manual_exclusions(mut self, manual: HashMap<String, bool>) -> Self {
        self.manual = manual;
        self
    }

    pub fn set_manual_exclusion<S: Into<String>>(&mut self, package_id: S, is_protected: bool) {
        self.manual.insert(package_id.into(), is_protected);
    }

    pub fn add_system_app_override<S: Into<String>>(&mut self, package_id: S) {
        self.system_app_overrides.insert(package_id);
    }

    pub fn add_app_exclusion<S: Into<String>>(&mut self, package_id: S) {
        self.app_exclusions.insert(package_id);
    }
}

impl ExclusionStore for ExclusionLists {
    fn system_app_overrides(&self) -> Vec<String> {
        self.system_app_overrides.iter().cloned().collect()
    }

    fn manual_exclusions(&self) -> Vec<ManualAppExclusion> {
        self.manual
            .iter()
            .map(|(package_id, is_protected)| ManualAppExclusion {
                package_id: package_id.clone(),
                is_protected: *is_protected,
            })
            .collect()
    }

    fn app_exclusions(&self) -> Vec<String> {
        self.app_exclusions.iter().cloned().collect()
    }
}

/// Detects the product's own apps by package id prefix
#[derive(Debug, Clone)]
pub struct FirstPartyApps {
    prefixes: Vec<String>,
}

impl Default for FirstPartyApps {
    fn default() -> Self {
        Self {
            prefixes: vec![DEFAULT_FIRST_PARTY_PREFIX.into()],
        }
    }
}

impl FirstPartyApps {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_first_party(&self, package_id: &str) -> bool {
        self.prefixes.iter().any(|p| package_id.starts_with(p.as_str()))
    }
}

/// Why a package is excluded from protection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    /// One of the product's own apps
    FirstPartyApp,
    SystemApp,
    ManuallyUnprotected,
    ExclusionList,
}

impl Display for ExclusionReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::FirstPartyApp => "first party app",
            Self::SystemApp => "system app",
            Self::ManuallyUnprotected => "manually unprotected",
            Self::ExclusionList => "on the exclusion list",
        })
    }
}

/// Checks `package_id` against all the exclusion lists, see the module docs
/// for the precedence. Errors from the package manager are returned as is.
///
/// Never returns [ExclusionReason::FirstPartyApp], that is up to the caller.
pub fn exclusion_reason(
    package_id: &str,
    pm: &dyn PackageManager,
    store: &dyn ExclusionStore,
) -> crate::Result<Option<ExclusionReason>> {
    if pm.is_system_app(package_id)? {
        let overridden = store
            .system_app_overrides()
            .iter()
            .any(|it| it == package_id);
        if !overridden {
            return Ok(Some(ExclusionReason::SystemApp));
        }
    }

    if let Some(manual) = store
        .manual_exclusions()
        .into_iter()
        .find(|it| it.package_id == package_id)
    {
        return Ok(if manual.is_protected {
            None
        } else {
            Some(ExclusionReason::ManuallyUnprotected)
        });
    }

    if store.app_exclusions().iter().any(|it| it == package_id) {
        return Ok(Some(ExclusionReason::ExclusionList));
    }

    Ok(None)
}

/// Convenience wrapper around [exclusion_reason]
pub fn is_excluded(
    package_id: &str,
    pm: &dyn PackageManager,
    store: &dyn ExclusionStore,
) -> crate::Result<bool> {
    exclusion_reason(package_id, pm, store).map(|it| it.is_some())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{mock_package_manager, MockPackageManager};
    use rstest::*;

    const APP: &str = "com.example.app";

    fn system_pm(is_system: bool) -> MockPackageManager {
        let mut pm = MockPackageManager::new();
        pm.expect_is_system_app().returning(move |_| Ok(is_system));
        pm
    }

    #[rstest]
    fn test_system_app_excluded() {
        let store = ExclusionLists::new();
        assert_eq!(
            exclusion_reason(APP, &system_pm(true), &store).unwrap(),
            Some(ExclusionReason::SystemApp)
        );
    }

    #[rstest]
    fn test_system_app_overridden() {
        let mut store = ExclusionLists::new();
        store.add_system_app_override(APP);
        assert_eq!(exclusion_reason(APP, &system_pm(true), &store).unwrap(), None);

        // an override doesn't protect an app that is also manually unprotected
        store.set_manual_exclusion(APP, false);
        assert_eq!(
            exclusion_reason(APP, &system_pm(true), &store).unwrap(),
            Some(ExclusionReason::ManuallyUnprotected)
        );
    }

    #[rstest]
    #[case::unprotected(false, Some(ExclusionReason::ManuallyUnprotected))]
    #[case::protected(true, None)]
    fn test_manual_exclusion(
        #[case] is_protected: bool,
        #[case] expected: Option<ExclusionReason>,
    ) {
        let mut store = ExclusionLists::new();
        store.set_manual_exclusion(APP, is_protected);
        // the general list never applies once there is a manual entry
        store.add_app_exclusion(APP);
        assert_eq!(
            exclusion_reason(APP, &system_pm(false), &store).unwrap(),
            expected
        );
    }

    #[rstest]
    fn test_exclusion_list() {
        let store = ExclusionLists::new().with_app_exclusions(PackageSet::from([APP]));
        assert!(is_excluded(APP, &system_pm(false), &store).unwrap());
        assert!(!is_excluded("com.example.other", &system_pm(false), &store).unwrap());
    }

    #[rstest]
    fn test_package_manager_error(mut mock_package_manager: MockPackageManager) {
        mock_package_manager
            .expect_is_system_app()
            .returning(|p| Err(crate::Error::PackageNotFound(p.into())));
        let store = ExclusionLists::new();
        assert!(matches!(
            is_excluded(APP, &mock_package_manager, &store),
            Err(crate::Error::PackageNotFound(_))
        ));
    }

    #[test]
    fn test_system_packages() {
        let content = "# system apps\ncom.android.systemui\n\ncom.android.phone\n";
        let pm = SystemPackages::new(PackageSet::from_reader(content.as_bytes()).unwrap());
        assert!(pm.is_system_app("com.android.phone").unwrap());
        assert!(!pm.is_system_app(APP).unwrap());
    }

    #[test]
    fn test_first_party_apps() {
        let fp = FirstPartyApps::default();
        assert!(fp.is_first_party("com.duckduckgo.mobile.android"));
        assert!(fp.is_first_party("com.duckduckgo.mobile.android.debug"));
        assert!(!fp.is_first_party(APP));

        let fp = FirstPartyApps::new(["com.example"]);
        assert!(fp.is_first_party(APP));
    }
}
