//! Domain models for the LED module installer.
//!
//! These types describe the OS version being provisioned, where the matching
//! module lives upstream, and the on-disk layout of the persistent directory.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use super::error::{AppError, Result};

/// Kernel module name as passed to `modprobe`.
pub const MODULE_NAME: &str = "led-ugreen";

/// Kernel module name as reported by `lsmod`.
pub const LOADED_MODULE_NAME: &str = "led_ugreen";

/// File name of the prebuilt module.
pub const MODULE_FILE: &str = "led-ugreen.ko";

/// Modules the LED driver depends on at runtime.
pub const MODULE_DEPENDENCIES: &[&str] = &["i2c-dev", "ledtrig-oneshot", "ledtrig-netdev"];

/// Prefix shared by every helper script and systemd unit.
pub const UNIT_PREFIX: &str = "ugreen-";

/// Built-in mapping from version series to upstream codename directory.
const DEFAULT_CODENAMES: &[(&str, &str)] = &[
    ("23.10", "TrueNAS-SCALE-Cobia"),
    ("24.04", "TrueNAS-SCALE-Dragonfish"),
    ("24.10", "TrueNAS-SCALE-ElectricEel"),
    ("25.04", "TrueNAS-SCALE-Fangtooth"),
    ("25.10", "TrueNAS-SCALE-Goldeye"),
];

#[allow(clippy::expect_used)]
fn version_regex() -> &'static Regex {
    static VERSION_REGEX: OnceLock<Regex> = OnceLock::new();
    VERSION_REGEX.get_or_init(|| {
        Regex::new(r"(\d+)\.(\d+)[0-9A-Za-z.\-]*").expect("version pattern is valid")
    })
}

/// A TrueNAS Scale release version such as `24.10.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OsVersion {
    raw: String,
    series: String,
}

impl OsVersion {
    /// Parse a version from `/etc/version` content or a `-v` argument.
    ///
    /// Product prefixes (`TrueNAS-SCALE-24.04.2`) and trailing text are ignored.
    ///
    /// # Errors
    /// Returns error if no `MAJOR.MINOR` version can be found.
    pub fn parse(text: &str) -> Result<Self> {
        let token = text.split_whitespace().next().unwrap_or_default();
        let caps = version_regex()
            .captures(token)
            .ok_or_else(|| AppError::InvalidData {
                message: format!("Unrecognized TrueNAS version string: '{}'", text.trim()),
            })?;

        let raw = caps
            .get(0)
            .map(|m| m.as_str().trim_end_matches(['.', '-']).to_string())
            .unwrap_or_default();
        let series = format!("{}.{}", &caps[1], &caps[2]);

        Ok(Self { raw, series })
    }

    /// Full version string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// `MAJOR.MINOR` release series used as the fallback table key.
    #[must_use]
    pub fn series(&self) -> &str {
        &self.series
    }
}

impl std::fmt::Display for OsVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Outcome of comparing the version marker with the running OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionState {
    /// Marker matches and the module file is present.
    UpToDate,
    /// Marker records a different version.
    Stale {
        /// Version found in the marker.
        recorded: String,
    },
    /// No marker, or the module file is gone.
    Missing,
}

impl VersionState {
    /// Whether a fresh module has to be fetched.
    #[must_use]
    pub const fn needs_download(&self, force: bool) -> bool {
        force || !matches!(self, Self::UpToDate)
    }
}

impl std::fmt::Display for VersionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "up to date"),
            Self::Stale { recorded } => write!(f, "stale (installed for {recorded})"),
            Self::Missing => write!(f, "missing"),
        }
    }
}

/// Whether system paths can be written during this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsMode {
    /// System paths are writable; files are mirrored into them.
    Writable,
    /// Only the persistent directory is written.
    ReadOnly,
}

impl FsMode {
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl std::fmt::Display for FsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Writable => write!(f, "writable"),
            Self::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// How a module location was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleSource {
    /// Confirmed against the upstream directory listing.
    Remote,
    /// Taken from the codename table without contacting upstream.
    Fallback,
}

/// Location of a prebuilt module inside the upstream repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    /// Codename directory, e.g. `TrueNAS-SCALE-ElectricEel`.
    pub codename: String,
    /// Version directory inside the codename directory.
    pub version: String,
    /// Repository-relative path of the module file.
    pub path: String,
    pub source: ModuleSource,
}

impl ModuleLocation {
    #[must_use]
    pub fn new(module_root: &str, codename: &str, version: &str, source: ModuleSource) -> Self {
        let root = module_root.trim_matches('/');
        Self {
            codename: codename.to_string(),
            version: version.to_string(),
            path: format!("{root}/{codename}/{version}/{MODULE_FILE}"),
            source,
        }
    }
}

/// Version series to codename lookup, built-in entries plus config overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodenameTable {
    entries: BTreeMap<String, String>,
}

impl Default for CodenameTable {
    fn default() -> Self {
        Self {
            entries: DEFAULT_CODENAMES
                .iter()
                .map(|(series, name)| ((*series).to_string(), (*name).to_string()))
                .collect(),
        }
    }
}

impl CodenameTable {
    /// Built-in table extended (or overridden) by `overrides`.
    #[must_use]
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut table = Self::default();
        for (series, name) in overrides {
            table.entries.insert(series.clone(), name.clone());
        }
        table
    }

    #[must_use]
    pub fn codename_for(&self, version: &OsVersion) -> Option<&str> {
        self.entries.get(version.series()).map(String::as_str)
    }

    /// All supported series, oldest first.
    pub fn series(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// File layout inside the persistent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistLayout {
    root: PathBuf,
}

impl PersistLayout {
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Marker holding the OS version the module was fetched for.
    #[must_use]
    pub fn version_marker(&self) -> PathBuf {
        self.root.join(".installed-version")
    }

    #[must_use]
    pub fn module_file(&self) -> PathBuf {
        self.root.join(MODULE_FILE)
    }

    #[must_use]
    pub fn led_config(&self) -> PathBuf {
        self.root.join("ugreen-leds.conf")
    }

    #[must_use]
    pub fn installer_config(&self) -> PathBuf {
        self.root.join("installer.toml")
    }

    #[must_use]
    pub fn installer_copy(&self) -> PathBuf {
        self.root.join("ugreen-leds-installer")
    }

    #[must_use]
    pub fn scripts_dir(&self) -> PathBuf {
        self.root.join("scripts")
    }

    #[must_use]
    pub fn systemd_dir(&self) -> PathBuf {
        self.root.join("systemd")
    }

    /// Clone of the upstream repository.
    #[must_use]
    pub fn repo_dir(&self) -> PathBuf {
        self.root.join("ugreen_leds_controller")
    }

    #[must_use]
    pub fn repo_scripts_dir(&self) -> PathBuf {
        self.repo_dir().join("scripts")
    }

    #[must_use]
    pub fn repo_units_dir(&self) -> PathBuf {
        self.repo_scripts_dir().join("systemd")
    }

    #[must_use]
    pub fn repo_config_template(&self) -> PathBuf {
        self.repo_scripts_dir().join("ugreen-leds.conf")
    }

    /// Whether the directory holds files only an install run creates.
    #[must_use]
    pub fn has_install_markers(&self) -> bool {
        self.version_marker().is_file()
            || self.installer_config().is_file()
            || self.repo_dir().is_dir()
    }
}
