//! Resolution of the app behind a connection: uid -> package id -> app name.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use blanket::blanket;
use serde::{Deserialize, Serialize};

use crate::utils::{open_file, read_file, NewlineReader};

/// Name given to apps whose label couldn't be resolved
pub const UNKNOWN_APP_NAME: &str = "unknown";

/// The app that originated a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginatingApp {
    pub package_id: String,
    pub app_name: String,
    #[serde(default)]
    pub unknown: bool,
}

impl OriginatingApp {
    pub fn new<P: Into<String>, N: Into<String>>(package_id: P, app_name: N) -> Self {
        Self {
            package_id: package_id.into(),
            app_name: app_name.into(),
            unknown: false,
        }
    }

    /// An app we know the package of but couldn't name
    pub fn unknown<P: Into<String>>(package_id: P) -> Self {
        Self {
            package_id: package_id.into(),
            app_name: UNKNOWN_APP_NAME.into(),
            unknown: true,
        }
    }

    #[inline]
    pub fn is_unknown(&self) -> bool {
        self.unknown
    }
}

/// Maps a process owner (uid) to the installed package and that package to a
/// human readable app.
#[blanket(derive(Ref, Box, Arc))]
pub trait AppNameResolver: Send + Sync {
    /// `None` means the uid doesn't belong to any known package
    fn package_id_for_uid(&self, uid: i32) -> Option<String>;

    /// Always returns an app, possibly an unknown one
    fn app_name_for_package_id(&self, package_id: &str) -> OriginatingApp;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageEntry {
    pub package_id: String,
    pub uid: i32,
    pub debuggable: bool,
    pub data_dir: String,
}

impl PackageEntry {
    /// Parse one line of `/data/system/packages.list`:
    ///
    /// `com.example.app 10123 0 /data/user/0/com.example.app default:targetSdkVersion=33 3003`
    ///
    /// Only the first four fields are used, the rest are optional.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut split = line.split_ascii_whitespace();
        let package_id = split.next()?;
        let uid = split.next()?.parse::<i32>().ok()?;
        let debuggable = match split.next() {
            Some("1") => true,
            Some(_) | None => false,
        };
        let data_dir = split.next().unwrap_or("");
        Some(Self {
            package_id: package_id.into(),
            uid,
            debuggable,
            data_dir: data_dir.into(),
        })
    }
}

#[derive(Deserialize)]
struct LabelsFile {
    #[serde(default)]
    labels: HashMap<String, String>,
}

/// [AppNameResolver] backed by the contents of Android's `packages.list` and
/// an optional set of app labels.
///
/// Packages without a label resolve to an unknown app, so the detector
/// never attributes a tracker to an app it can't name.
#[derive(Debug, Default, Clone)]
pub struct PackagesList {
    /// uid -> package, the first package listed wins for shared uids
    by_uid: HashMap<i32, String>,
    labels: HashMap<String, String>,
}

impl PackagesList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let f = open_file(path)?;
        Self::from_reader(f)
    }

    pub fn from_reader<R: Read>(reader: R) -> crate::Result<Self> {
        let mut list = Self::new();
        for line in NewlineReader::new(reader) {
            let line = line?;
            match PackageEntry::parse_line(&line) {
                Some(entry) => list.add_package(entry.uid, entry.package_id),
                None => log::warn!("skipping malformed packages.list line: {}", line),
            }
        }
        Ok(list)
    }

    /// Load labels from a TOML file with a `[labels]` table of
    /// `"package.id" = "App Name"` entries
    pub fn load_labels(&mut self, path: &Path) -> crate::Result<()> {
        let content = read_file(path)?;
        let parsed: LabelsFile =
            toml::from_str(&content).map_err(|e| crate::Error::new_data(path, &e))?;
        self.labels.extend(parsed.labels);
        Ok(())
    }

    pub fn add_package<S: Into<String>>(&mut self, uid: i32, package_id: S) {
        self.by_uid.entry(uid).or_insert_with(|| package_id.into());
    }

    pub fn set_label<P: Into<String>, L: Into<String>>(&mut self, package_id: P, label: L) {
        self.labels.insert(package_id.into(), label.into());
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

impl AppNameResolver for PackagesList {
    fn package_id_for_uid(&self, uid: i32) -> Option<String> {
        self.by_uid.get(&uid).cloned()
    }

    fn app_name_for_package_id(&self, package_id: &str) -> OriginatingApp {
        match self.labels.get(package_id) {
            Some(label) if !label.is_empty() => OriginatingApp::new(package_id, label.as_str()),
            _ => OriginatingApp::unknown(package_id),
        }
    }
}
