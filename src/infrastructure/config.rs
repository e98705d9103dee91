//! Installer configuration file management.
//!
//! Handles loading the TOML configuration and writing the commented default.

use std::fs;
use std::path::Path;

use crate::domain::{AppError, InstallerConfig, Result};

use super::host::Host;

/// Default configuration file content.
pub const DEFAULT_CONFIG: &str = r#"# UGREEN LED installer configuration
# Auto-generated - edit as needed

[repository]
# Upstream repository carrying the helper scripts and prebuilt modules
owner = "miskcoo"
name = "ugreen_leds_controller"
branch = "gh-pages"
clone_url = "https://github.com/miskcoo/ugreen_leds_controller.git"
module_root = "build-scripts/truenas/build"
api_base = "https://api.github.com"
raw_base = "https://raw.githubusercontent.com"

# HTTP timeout in seconds
timeout_secs = 30

[install]
# Directory name created under a pool or the working directory
dir_name = "ugreen-leds"

# Pools are mounted below this prefix
mount_prefix = "/mnt"

# Mount checked for read-only mode
readonly_probe = "/usr"

[network]
# Interface for the netdev LED (autodetected when unset)
# interface = "enp1s0"

[codenames]
# Extra version series -> upstream codename entries for offline fallback
# "26.04" = "TrueNAS-SCALE-Halfmoon"
"#;

/// Load configuration from `path`, or defaults when the file does not exist.
///
/// # Errors
/// Returns error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<InstallerConfig> {
    if path.exists() {
        load_config_from_file(path)
    } else {
        tracing::debug!(path = %path.display(), "No installer config, using defaults");
        Ok(InstallerConfig::default())
    }
}

/// Load configuration from a specific file.
///
/// # Errors
/// Returns error if file cannot be read or parsed.
pub fn load_config_from_file(path: &Path) -> Result<InstallerConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| AppError::io(format!("Failed to read config file: {}", path.display()), e))?;

    let config = toml::from_str(&content).map_err(|e| AppError::Config {
        message: format!("Failed to parse config file {}: {e}", path.display()),
    })?;

    tracing::info!(path = %path.display(), "Loaded installer configuration");
    Ok(config)
}

/// Create default configuration file if it doesn't exist.
///
/// # Errors
/// Returns error if file cannot be created.
pub fn ensure_config_exists(host: &Host, path: &Path) -> Result<()> {
    if !path.exists() {
        host.write(path, DEFAULT_CONFIG.as_bytes())?;
        tracing::info!(path = %path.display(), "Created default configuration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_parses() {
        let config: InstallerConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config, InstallerConfig::default());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = load_config(&dir.path().join("installer.toml")).unwrap();
        assert_eq!(config.repository.owner, "miskcoo");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("installer.toml");
        fs::write(&path, "[install\ndir_name = 3").unwrap();
        assert!(matches!(load_config(&path), Err(AppError::Config { .. })));
    }

    #[test]
    fn test_ensure_config_exists_keeps_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("installer.toml");
        let host = Host::new(false);

        ensure_config_exists(&host, &path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);

        fs::write(&path, "[install]\ndir_name = \"leds\"\n").unwrap();
        ensure_config_exists(&host, &path).unwrap();
        assert_eq!(load_config(&path).unwrap().install.dir_name, "leds");
    }
}
