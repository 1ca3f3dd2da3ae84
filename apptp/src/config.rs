use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

use crate::cache::DEFAULT_APP_NAME_CACHE_SIZE;
use crate::exclusion::DEFAULT_FIRST_PARTY_PREFIX;
use crate::utils::{path_str, read_file, resolve_relative};

#[derive(Debug)]
pub enum Error {
    InvalidType,
    MissingKey,
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::InvalidType => "InvalidType",
                Self::MissingKey => "MissingKey",
            }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// A view into one table of a parsed TOML config file. Keeps track of the
/// dotted path to the table so errors can name the offending key.
pub struct ConfigMap<'c> {
    path: &'c Path,
    name: Option<Cow<'c, str>>,
    table: &'c Table,
}

#[derive(Clone)]
pub struct Config {
    path: PathBuf,
    base: Table,
}

impl Config {
    pub fn parse(source: &Path) -> crate::Result<Self> {
        let as_str = read_file(source)?;
        Self::parse_str(source, &as_str)
    }

    /// Parse config content that claims to come from `source`. Relative paths
    /// in the config are resolved against the parent of `source`.
    pub fn parse_str(source: &Path, content: &str) -> crate::Result<Self> {
        let base: Table = match toml::from_str(content) {
            Ok(v) => v,
            Err(e) => return Err(crate::Error::new_cfg(source, &e)),
        };
        Ok(Self {
            base,
            path: PathBuf::from(source),
        })
    }

    pub fn get_map(&self) -> ConfigMap {
        ConfigMap {
            name: None,
            path: &self.path,
            table: &self.base,
        }
    }
}

impl<'c> ConfigMap<'c> {
    fn get_full_path<'a>(&'a self) -> Option<&'a str> {
        self.name.as_ref().map(|it| it.as_ref())
    }

    fn key_path<'a>(&self, key: &'a str) -> Cow<'a, str> {
        match self.get_full_path() {
            None => Cow::Borrowed(key),
            Some(v) => Cow::Owned(format!("{}.{}", v, key)),
        }
    }

    /// Helper to create a crate::Error for a missing key
    pub fn missing_key(&self, key: &str) -> crate::Error {
        let path = self.key_path(key);
        crate::Error::InvalidConfig(
            path_str(self.path).into_owned(),
            format!("missing key: {}", path),
        )
    }

    /// Helper to create a crate::Error for an invalid key
    pub fn invalid_key(&self, key: &str, expected: &str) -> crate::Error {
        let path = self.key_path(key);
        crate::Error::InvalidConfig(
            path_str(self.path).into_owned(),
            format!(
                "invalid value for key: {} (expected type: {})",
                path, expected
            ),
        )
    }

    fn get(&self, key: &str) -> Option<&'c Value> {
        self.table.get(key)
    }

    /// Iterate over the raw entries of this table
    pub fn entries(&self) -> impl Iterator<Item = (&'c String, &'c Value)> {
        self.table.iter()
    }

    pub fn maybe_get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            Some(v) => match v.as_integer() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_int_typecheck(&self, key: &str) -> crate::Result<Option<i64>> {
        self.maybe_get_int(key)
            .map_err(|_| self.invalid_key(key, "int"))
    }

    pub fn maybe_get_str(&self, key: &str) -> Result<Option<&'c str>> {
        match self.get(key) {
            Some(v) => match v.as_str() {
                Some(v) => Ok(Some(v)),
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn maybe_get_str_typecheck(&self, key: &str) -> crate::Result<Option<&'c str>> {
        self.maybe_get_str(key)
            .map_err(|_| self.invalid_key(key, "string"))
    }

    /// Get an array of strings, every element must be a string
    pub fn maybe_get_str_array(&self, key: &str) -> Result<Option<Vec<&'c str>>> {
        let arr = match self.get(key) {
            Some(v) => v.as_array().ok_or(Error::InvalidType)?,
            None => return Ok(None),
        };
        let mut strs = Vec::with_capacity(arr.len());
        for v in arr {
            strs.push(v.as_str().ok_or(Error::InvalidType)?);
        }
        Ok(Some(strs))
    }

    pub fn maybe_get_str_array_typecheck(&self, key: &str) -> crate::Result<Option<Vec<&'c str>>> {
        self.maybe_get_str_array(key)
            .map_err(|_| self.invalid_key(key, "array of strings"))
    }

    /// Get a path value, resolved relative to the config file's directory
    pub fn maybe_get_path(&self, key: &str) -> crate::Result<Option<PathBuf>> {
        let raw = match self.maybe_get_str_typecheck(key)? {
            Some(v) => v,
            None => return Ok(None),
        };
        Ok(Some(resolve_relative(self.path.parent(), Path::new(raw))))
    }

    pub fn must_get_path(&self, key: &str) -> crate::Result<PathBuf> {
        self.maybe_get_path(key)?
            .ok_or_else(|| self.missing_key(key))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.get(key)
            .ok_or(Error::MissingKey)?
            .as_bool()
            .ok_or(Error::InvalidType)
    }

    pub fn maybe_get_map(&'c self, key: &'c str) -> Result<Option<ConfigMap<'c>>> {
        match self.get(key) {
            Some(v) => match v.as_table() {
                Some(table) => {
                    let name = match &self.get_full_path() {
                        Some(parents) => Cow::Owned(format!("{parents}.{key}")),
                        None => Cow::Borrowed(key),
                    };
                    Ok(Some(Self {
                        name: Some(name),
                        path: self.path,
                        table,
                    }))
                }
                None => Err(Error::InvalidType),
            },
            None => Ok(None),
        }
    }

    pub fn get_map(&'c self, key: &'c str) -> Result<ConfigMap<'c>> {
        self.maybe_get_map(key)?.ok_or(Error::MissingKey)
    }

    pub fn maybe_get_map_typecheck(&'c self, key: &'c str) -> crate::Result<Option<ConfigMap<'c>>> {
        self.maybe_get_map(key)
            .map_err(|_| self.invalid_key(key, "table"))
    }

    pub fn must_get_map(&'c self, key: &'c str) -> crate::Result<ConfigMap<'c>> {
        match self.get_map(key) {
            Err(Error::InvalidType) => Err(self.invalid_key(key, "table")),
            Err(Error::MissingKey) => Err(self.missing_key(key)),
            Ok(v) => Ok(v),
        }
    }
}

/// Where the data backing each port lives
#[derive(Debug, Clone, PartialEq)]
pub struct DataConfig {
    pub blocklist: PathBuf,
    pub exception_rules: Option<PathBuf>,
    pub packages_list: PathBuf,
    pub app_labels: Option<PathBuf>,
    /// Newline separated list of system packages. When this isn't set system
    /// apps are queried through adb.
    pub system_packages: Option<PathBuf>,
    pub system_app_overrides: Option<PathBuf>,
    pub app_exclusions: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AdbConfig {
    pub executable: Option<String>,
    pub serial: Option<String>,
}

/// Everything needed to wire up a detector, parsed from:
///
/// ```toml
/// [detector]
/// enabled = true
/// cache-size = 100
/// first-party-prefixes = ["com.duckduckgo.mobile"]
///
/// [data]
/// blocklist = "blocklist.json"
/// packages-list = "packages.list"
///
/// [manual-exclusions]
/// "com.example.app" = false
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub enabled: bool,
    pub cache_size: usize,
    pub first_party_prefixes: Vec<String>,
    pub data: DataConfig,
    /// package id -> is_protected
    pub manual_exclusions: HashMap<String, bool>,
    pub adb: Option<AdbConfig>,
}

impl DetectorConfig {
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let cfg = Config::parse(path)?;
        Self::from_config(&cfg)
    }

    pub fn from_config(cfg: &Config) -> crate::Result<Self> {
        let base = cfg.get_map();

        let (enabled, cache_size, first_party_prefixes) =
            match base.maybe_get_map_typecheck("detector")? {
                Some(detector) => {
                    let enabled = match detector.get_bool("enabled") {
                        Ok(v) => v,
                        Err(Error::MissingKey) => true,
                        Err(Error::InvalidType) => {
                            return Err(detector.invalid_key("enabled", "bool"))
                        }
                    };
                    let cache_size = match detector.maybe_get_int_typecheck("cache-size")? {
                        Some(v) if v > 0 => v as usize,
                        Some(_) => return Err(detector.invalid_key("cache-size", "positive int")),
                        None => DEFAULT_APP_NAME_CACHE_SIZE,
                    };
                    let prefixes = match detector
                        .maybe_get_str_array_typecheck("first-party-prefixes")?
                    {
                        Some(v) => v.into_iter().map(String::from).collect(),
                        None => vec![DEFAULT_FIRST_PARTY_PREFIX.into()],
                    };
                    (enabled, cache_size, prefixes)
                }
                None => (
                    true,
                    DEFAULT_APP_NAME_CACHE_SIZE,
                    vec![DEFAULT_FIRST_PARTY_PREFIX.into()],
                ),
            };

        let data = base.must_get_map("data")?;
        let data = DataConfig {
            blocklist: data.must_get_path("blocklist")?,
            exception_rules: data.maybe_get_path("exception-rules")?,
            packages_list: data.must_get_path("packages-list")?,
            app_labels: data.maybe_get_path("app-labels")?,
            system_packages: data.maybe_get_path("system-packages")?,
            system_app_overrides: data.maybe_get_path("system-app-overrides")?,
            app_exclusions: data.maybe_get_path("app-exclusions")?,
        };

        let mut manual_exclusions = HashMap::new();
        if let Some(manual) = base.maybe_get_map_typecheck("manual-exclusions")? {
            for (package, value) in manual.entries() {
                let is_protected = value
                    .as_bool()
                    .ok_or_else(|| manual.invalid_key(package, "bool"))?;
                manual_exclusions.insert(package.clone(), is_protected);
            }
        }

        let adb = match base.maybe_get_map_typecheck("adb")? {
            Some(adb) => Some(AdbConfig {
                executable: adb.maybe_get_str_typecheck("executable")?.map(String::from),
                serial: adb.maybe_get_str_typecheck("serial")?.map(String::from),
            }),
            None => None,
        };

        Ok(Self {
            enabled,
            cache_size,
            first_party_prefixes,
            data,
            manual_exclusions,
            adb,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testing::{tmp_dir, TmpDir};
    use rstest::*;

    fn parse(content: &str) -> crate::Result<DetectorConfig> {
        let cfg = Config::parse_str(Path::new("/etc/apptp/apptp.toml"), content)?;
        DetectorConfig::from_config(&cfg)
    }

    #[test]
    fn test_config_map() {
        let content = r#"
base = 12
[foo]
bar = "baz"
list = ["a", "b"]
[foo.quux]
neato = true
"#;
        let cfg = Config::parse_str(Path::new("test.toml"), content).expect("valid toml");
        let map = cfg.get_map();
        assert_eq!(map.maybe_get_int("base").expect("getting base"), Some(12));
        let foo = map.get_map("foo").expect("getting foo");
        assert_eq!(foo.maybe_get_str("bar").expect("getting bar"), Some("baz"));
        assert_eq!(foo.maybe_get_str("ohno").expect("getting ohno"), None);
        assert_eq!(
            foo.maybe_get_str_array("list").expect("getting list"),
            Some(vec!["a", "b"])
        );
        assert!(foo.maybe_get_str_array("bar").is_err());
        let quux = foo.get_map("quux").expect("getting foo.quux");
        assert_eq!(quux.get_bool("neato").expect("getting neato"), true);
        assert!(matches!(quux.get_bool("ohno"), Err(Error::MissingKey)));
    }

    #[test]
    fn test_detector_config_defaults() {
        let cfg = parse(
            r#"
[data]
blocklist = "blocklist.json"
packages-list = "/data/system/packages.list"
"#,
        )
        .expect("valid config");

        assert!(cfg.enabled);
        assert_eq!(cfg.cache_size, DEFAULT_APP_NAME_CACHE_SIZE);
        assert_eq!(cfg.first_party_prefixes, vec![DEFAULT_FIRST_PARTY_PREFIX]);
        assert_eq!(cfg.data.blocklist, PathBuf::from("/etc/apptp/blocklist.json"));
        assert_eq!(
            cfg.data.packages_list,
            PathBuf::from("/data/system/packages.list")
        );
        assert!(cfg.data.exception_rules.is_none());
        assert!(cfg.manual_exclusions.is_empty());
        assert!(cfg.adb.is_none());
    }

    #[test]
    fn test_detector_config_full() {
        let cfg = parse(
            r#"
[detector]
enabled = false
cache-size = 5
first-party-prefixes = ["com.example.mine"]

[data]
blocklist = "blocklist.json"
exception-rules = "rules.json"
packages-list = "packages.list"
app-labels = "labels.toml"
system-packages = "system.txt"
system-app-overrides = "overrides.txt"
app-exclusions = "exclusions.txt"

[manual-exclusions]
"com.example.unprotected" = false
"com.example.protected" = true

[adb]
serial = "emulator-5554"
"#,
        )
        .expect("valid config");

        assert!(!cfg.enabled);
        assert_eq!(cfg.cache_size, 5);
        assert_eq!(cfg.first_party_prefixes, vec!["com.example.mine"]);
        assert_eq!(
            cfg.data.exception_rules,
            Some(PathBuf::from("/etc/apptp/rules.json"))
        );
        assert_eq!(
            cfg.manual_exclusions.get("com.example.unprotected"),
            Some(&false)
        );
        assert_eq!(cfg.manual_exclusions.get("com.example.protected"), Some(&true));
        assert_eq!(
            cfg.adb,
            Some(AdbConfig {
                executable: None,
                serial: Some("emulator-5554".into())
            })
        );
    }

    #[rstest]
    #[case::missing_data("[detector]\nenabled = true\n", "missing key: data")]
    #[case::missing_blocklist(
        "[data]\npackages-list = \"p\"\n",
        "missing key: data.blocklist"
    )]
    #[case::bad_cache_size(
        "[detector]\ncache-size = \"big\"\n[data]\nblocklist = \"b\"\npackages-list = \"p\"\n",
        "detector.cache-size"
    )]
    #[case::zero_cache_size(
        "[detector]\ncache-size = 0\n[data]\nblocklist = \"b\"\npackages-list = \"p\"\n",
        "detector.cache-size"
    )]
    #[case::bad_manual(
        "[data]\nblocklist = \"b\"\npackages-list = \"p\"\n[manual-exclusions]\n\"com.a\" = \"yes\"\n",
        "manual-exclusions.com.a"
    )]
    fn test_detector_config_errors(#[case] content: &str, #[case] needle: &str) {
        match parse(content) {
            Err(crate::Error::InvalidConfig(_, msg)) => {
                assert!(msg.contains(needle), "{} should contain {}", msg, needle)
            }
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[rstest]
    fn test_config_from_file(tmp_dir: TmpDir) {
        let path = tmp_dir.create_file_name(
            "apptp.toml",
            Some("[data]\nblocklist = \"bl.json\"\npackages-list = \"packages.list\"\n"),
        );
        let cfg = DetectorConfig::from_file(&path).expect("valid config");
        assert_eq!(cfg.data.blocklist, tmp_dir.get_path().join("bl.json"));
    }

    #[test]
    fn test_config_invalid_toml() {
        let res = Config::parse_str(Path::new("bad.toml"), "this is = = not toml");
        assert!(matches!(res, Err(crate::Error::InvalidConfig(_, _))));
    }
}
