//! Installer configuration model.
//!
//! Every field has a default so a partial (or absent) `installer.toml`
//! still yields a complete configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::models::CodenameTable;

/// Where the upstream repository and its prebuilt modules live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    #[serde(default = "default_owner")]
    pub owner: String,

    #[serde(default = "default_repo_name")]
    pub name: String,

    /// Branch carrying the prebuilt modules.
    #[serde(default = "default_branch")]
    pub branch: String,

    #[serde(default = "default_clone_url")]
    pub clone_url: String,

    /// Repository directory holding one subdirectory per codename.
    #[serde(default = "default_module_root")]
    pub module_root: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    #[serde(default = "default_raw_base")]
    pub raw_base: String,

    /// HTTP timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            name: default_repo_name(),
            branch: default_branch(),
            clone_url: default_clone_url(),
            module_root: default_module_root(),
            api_base: default_api_base(),
            raw_base: default_raw_base(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_owner() -> String {
    "miskcoo".into()
}

fn default_repo_name() -> String {
    "ugreen_leds_controller".into()
}

fn default_branch() -> String {
    "gh-pages".into()
}

fn default_clone_url() -> String {
    "https://github.com/miskcoo/ugreen_leds_controller.git".into()
}

fn default_module_root() -> String {
    "build-scripts/truenas/build".into()
}

fn default_api_base() -> String {
    "https://api.github.com".into()
}

fn default_raw_base() -> String {
    "https://raw.githubusercontent.com".into()
}

const fn default_timeout() -> u64 {
    30
}

/// Placement rules for the persistent directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Directory name used under a pool or the working directory.
    #[serde(default = "default_dir_name")]
    pub dir_name: String,

    /// Mount prefix pools live under.
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: PathBuf,

    /// Path whose mount decides read-only mode.
    #[serde(default = "default_readonly_probe")]
    pub readonly_probe: PathBuf,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            dir_name: default_dir_name(),
            mount_prefix: default_mount_prefix(),
            readonly_probe: default_readonly_probe(),
        }
    }
}

fn default_dir_name() -> String {
    "ugreen-leds".into()
}

fn default_mount_prefix() -> PathBuf {
    PathBuf::from("/mnt")
}

fn default_readonly_probe() -> PathBuf {
    PathBuf::from("/usr")
}

/// Network LED settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Interface for the netdev monitor; autodetected when unset.
    #[serde(default)]
    pub interface: Option<String>,
}

/// Complete installer configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerConfig {
    #[serde(default)]
    pub repository: RepositoryConfig,

    #[serde(default)]
    pub install: InstallConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    /// Extra or replacement `series = codename` fallback entries.
    #[serde(default)]
    pub codenames: BTreeMap<String, String>,
}

impl InstallerConfig {
    /// Fallback table with this config's overrides applied.
    #[must_use]
    pub fn codename_table(&self) -> CodenameTable {
        CodenameTable::with_overrides(&self.codenames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OsVersion;

    #[test]
    fn test_default_config() {
        let config = InstallerConfig::default();
        assert_eq!(config.repository.branch, "gh-pages");
        assert_eq!(config.install.dir_name, "ugreen-leds");
        assert_eq!(config.install.mount_prefix, PathBuf::from("/mnt"));
        assert!(config.network.interface.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: InstallerConfig = toml::from_str(
            r#"
            [repository]
            branch = "testing"

            [codenames]
            "26.04" = "TrueNAS-SCALE-Halfmoon"
            "#,
        )
        .unwrap();

        assert_eq!(config.repository.branch, "testing");
        assert_eq!(config.repository.owner, "miskcoo");
        assert_eq!(config.repository.timeout_secs, 30);

        let v = OsVersion::parse("26.04.1").unwrap();
        assert_eq!(
            config.codename_table().codename_for(&v),
            Some("TrueNAS-SCALE-Halfmoon")
        );
    }
}
