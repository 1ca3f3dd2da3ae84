use std::collections::HashSet;
use std::env;
use std::io;

use blanket::blanket;
use lazy_static::lazy_static;
use once_cell::sync::OnceCell;
use regex::Regex;
use which::which;

use crate::command::{run_cmd, CmdOutput};
use crate::config::AdbConfig;
use crate::exclusion::PackageManager;

lazy_static! {
    static ref DEVICE_NOT_FOUND: Regex =
        Regex::new(r"device\s+'([^']+)'\s+not\s+found").expect("valid regex");
}

/// The Adb trait just abstracts the `adb` commands we need
#[blanket(derive(Ref, Box, Arc))]
pub trait Adb: Send + Sync {
    /// Essentially the same as running `adb shell '...'`
    fn shell(&self, shell_cmd: &str) -> io::Result<CmdOutput>;
}

/// An `Adb` implementation that just invokes the external `adb` command.
#[derive(Clone, Debug)]
pub struct ExecAdb {
    bin: String,
    serial: Option<String>,
}

impl Default for ExecAdb {
    fn default() -> Self {
        Self {
            bin: "adb".into(),
            serial: None,
        }
    }
}

impl ExecAdb {
    /// Find `adb` on the `PATH` and pick up `ANDROID_SERIAL` if it is set
    pub fn from_env() -> crate::Result<Self> {
        let bin = which("adb")
            .map_err(|_| crate::Error::MissingBin("adb".into()))?
            .to_string_lossy()
            .into_owned();
        let serial = env::var("ANDROID_SERIAL").ok();
        Ok(Self { bin, serial })
    }

    /// Use the `[adb]` config section, falling back to the environment for
    /// anything it doesn't set
    pub fn from_config(cfg: &AdbConfig) -> crate::Result<Self> {
        let mut adb = match &cfg.executable {
            Some(exe) => Self {
                bin: exe.clone(),
                serial: env::var("ANDROID_SERIAL").ok(),
            },
            None => Self::from_env()?,
        };
        if let Some(serial) = &cfg.serial {
            adb.serial = Some(serial.clone());
        }
        Ok(adb)
    }
}

impl Adb for ExecAdb {
    fn shell(&self, shell_cmd: &str) -> io::Result<CmdOutput> {
        match &self.serial {
            Some(serial) => run_cmd(&self.bin, &["-s", serial.as_str(), "shell", shell_cmd]),
            None => run_cmd(&self.bin, &["shell", shell_cmd]),
        }
    }
}

/// Turn adb's own complaints into errors, otherwise defer to the exit status
fn check_adb_output(output: CmdOutput) -> crate::Result<CmdOutput> {
    if !output.ok() {
        let stderr = output.stderr_utf8_lossy();
        if stderr.contains("no devices/emulators") {
            return Err(crate::Error::NoAdbDevice);
        }
        if let Some(caps) = DEVICE_NOT_FOUND.captures(&stderr) {
            let serial = caps
                .get(1)
                .map(|m| String::from(m.as_str()))
                .unwrap_or_else(|| "?".into());
            return Err(crate::Error::AdbDeviceNotFound(serial));
        }
    }
    output.err_on_status()
}

/// Parse the output of `pm list packages`, one `package:<id>` per line
pub fn parse_pm_list_packages(output: &str) -> HashSet<String> {
    output
        .lines()
        .filter_map(|l| l.trim().strip_prefix("package:"))
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// [PackageManager] that asks the device which packages are system packages.
///
/// The list is fetched on first use and kept for the lifetime of the
/// manager. A failed fetch is not cached, the next call tries again.
pub struct AdbPackageManager<A: Adb> {
    adb: A,
    system_packages: OnceCell<HashSet<String>>,
}

impl<A: Adb> AdbPackageManager<A> {
    pub fn new(adb: A) -> Self {
        Self {
            adb,
            system_packages: OnceCell::new(),
        }
    }

    fn system_packages(&self) -> crate::Result<&HashSet<String>> {
        self.system_packages.get_or_try_init(|| {
            let output = check_adb_output(self.adb.shell("pm list packages -s")?)?;
            let packages = parse_pm_list_packages(&output.stdout_utf8_lossy());
            log::debug!("device reported {} system packages", packages.len());
            Ok(packages)
        })
    }
}

impl<A: Adb> PackageManager for AdbPackageManager<A> {
    fn is_system_app(&self, package_id: &str) -> crate::Result<bool> {
        Ok(self.system_packages()?.contains(package_id))
    }
}
