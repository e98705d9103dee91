//! Systemd service integration.
//!
//! Renders the upstream unit templates for this install, places them in the
//! system unit directory and drives `systemctl`.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{AppError, LedConfig, Result, UNIT_PREFIX};

use super::host::{Host, HostPaths};

/// Disk activity monitor, always enabled.
pub const DISKIOMON_SERVICE: &str = "ugreen-diskiomon.service";

/// Power LED service, enabled unless `BLINK_TYPE_POWER=none`.
pub const POWER_LED_SERVICE: &str = "ugreen-power-led.service";

/// Instance name of the netdev monitor for `iface`.
#[must_use]
pub fn netdevmon_service(iface: &str) -> String {
    format!("ugreen-netdevmon@{iface}.service")
}

#[allow(clippy::expect_used)]
fn script_path_regex() -> &'static Regex {
    static SCRIPT_PATH: OnceLock<Regex> = OnceLock::new();
    SCRIPT_PATH.get_or_init(|| {
        Regex::new(r"/usr/bin/(ugreen-[A-Za-z0-9_.\-]+)").expect("script path pattern is valid")
    })
}

/// Rewrite helper script references to live in `scripts_dir`.
///
/// With `None` the template is returned unchanged (scripts are in `/usr/bin`).
#[must_use]
pub fn render_unit(template: &str, scripts_dir: Option<&Path>) -> String {
    match scripts_dir {
        Some(dir) => {
            let replacement = format!("{}/$1", dir.display());
            script_path_regex()
                .replace_all(template, replacement.as_str())
                .into_owned()
        }
        None => template.to_string(),
    }
}

/// Units to enable for this configuration.
#[must_use]
pub fn plan_services(led: &LedConfig, interface: Option<&str>) -> Vec<String> {
    let mut units = vec![DISKIOMON_SERVICE.to_string()];
    if let Some(iface) = interface {
        units.push(netdevmon_service(iface));
    }
    if led.power_led_enabled() {
        units.push(POWER_LED_SERVICE.to_string());
    } else {
        tracing::info!("BLINK_TYPE_POWER is none, power LED service not enabled");
    }
    units
}

/// Unit names from `systemctl list-units --no-legend --plain` output.
#[must_use]
pub fn parse_unit_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            line.split_whitespace()
                .find(|w| *w != "●" && *w != "*")
                .map(str::to_string)
        })
        .filter(|name| name.starts_with(UNIT_PREFIX))
        .collect()
}

/// Systemd service manager for the LED units.
pub struct SystemdService<'a> {
    host: &'a Host,
    unit_dir: PathBuf,
}

impl<'a> SystemdService<'a> {
    /// Create a new systemd service manager.
    #[must_use]
    pub fn new(host: &'a Host, paths: &HostPaths) -> Self {
        Self {
            host,
            unit_dir: paths.systemd_unit_dir(),
        }
    }

    /// Render every `*.service` template and install it.
    ///
    /// Rendered units are kept in `staging_dir` (persistent) and copied into
    /// the system unit directory.
    ///
    /// # Errors
    /// Returns error if templates cannot be read or units cannot be written.
    pub fn install_units(
        &self,
        templates_dir: &Path,
        staging_dir: &Path,
        scripts_dir: Option<&Path>,
    ) -> Result<Vec<InstallResult>> {
        let mut templates: Vec<PathBuf> = fs::read_dir(templates_dir)
            .map_err(|e| {
                AppError::io(format!("Failed to read unit templates in {}", templates_dir.display()), e)
            })?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "service"))
            .collect();
        templates.sort();

        self.host.create_dir_all(staging_dir)?;
        self.host.create_dir_all(&self.unit_dir)?;

        let mut installed = Vec::with_capacity(templates.len());
        for template_path in templates {
            let Some(file_name) = template_path.file_name() else {
                continue;
            };
            let template = fs::read_to_string(&template_path).map_err(|e| {
                AppError::io(format!("Failed to read {}", template_path.display()), e)
            })?;
            let unit_content = render_unit(&template, scripts_dir);

            let staged = staging_dir.join(file_name);
            self.host.write(&staged, unit_content.as_bytes())?;

            let service_path = self.unit_dir.join(file_name);
            self.host.write(&service_path, unit_content.as_bytes())?;
            tracing::info!(path = %service_path.display(), "Service file written");

            installed.push(InstallResult {
                service_path,
                unit_content,
            });
        }

        Ok(installed)
    }

    /// Reload systemd's unit cache.
    ///
    /// # Errors
    /// Returns error if `systemctl daemon-reload` fails.
    pub fn daemon_reload(&self) -> Result<()> {
        self.host.run_checked("systemctl", &["daemon-reload"])?;
        Ok(())
    }

    /// Enable and start a unit. Failures are logged, not raised.
    pub fn enable_now(&self, unit: &str) -> bool {
        match self.host.run("systemctl", &["enable", "--now", unit]) {
            Ok(output) if output.success => {
                tracing::info!(unit, "Service enabled and started");
                true
            }
            Ok(output) => {
                tracing::warn!(unit, stderr = %output.stderr.trim(), "Failed to enable service");
                false
            }
            Err(e) => {
                tracing::warn!(unit, error = %e, "Failed to enable service");
                false
            }
        }
    }

    /// Stop and disable a unit (ignore errors if not running).
    pub fn stop_and_disable(&self, unit: &str) {
        let _ = self.host.run("systemctl", &["stop", unit]);

        match self.host.run("systemctl", &["disable", unit]) {
            Ok(output) if output.success => tracing::info!(unit, "Service stopped and disabled"),
            _ => tracing::warn!(unit, "Service may not have been fully disabled"),
        }
    }

    /// Get service status.
    #[must_use]
    pub fn get_status(&self, unit: &str) -> ServiceStatus {
        let template_name = unit
            .split_once('@')
            .map_or_else(|| unit.to_string(), |(base, _)| format!("{base}@.service"));
        let is_installed = self.unit_dir.join(unit).exists()
            || self.unit_dir.join(&template_name).exists();

        if !is_installed {
            return ServiceStatus {
                is_installed: false,
                is_enabled: false,
                is_running: false,
                status_text: "not installed".into(),
            };
        }

        let check = |verb: &str| {
            self.host
                .query("systemctl", &[verb, unit])
                .map(|o| (o.success, o.stdout.trim().to_string()))
                .unwrap_or((false, String::new()))
        };
        let (is_enabled, _) = check("is-enabled");
        let (is_running, status_text) = check("is-active");

        ServiceStatus {
            is_installed,
            is_enabled,
            is_running,
            status_text,
        }
    }

    /// LED unit files present in the system unit directory.
    #[must_use]
    pub fn installed_unit_files(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(&self.unit_dir) else {
            return Vec::new();
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(UNIT_PREFIX))
            .map(|e| e.path())
            .collect();
        files.sort();
        files
    }

    /// LED units systemd currently knows about, in any state.
    #[must_use]
    pub fn list_loaded_units(&self) -> Vec<String> {
        let pattern = format!("{UNIT_PREFIX}*");
        match self.host.query(
            "systemctl",
            &["list-units", pattern.as_str(), "--all", "--no-legend", "--plain"],
        ) {
            Ok(output) => parse_unit_list(&output.stdout),
            Err(e) => {
                tracing::debug!(error = %e, "systemctl unavailable");
                Vec::new()
            }
        }
    }

    /// Stop, disable and remove every LED unit.
    ///
    /// Returns the unit names that were handled.
    ///
    /// # Errors
    /// Returns error if a unit file cannot be removed.
    pub fn uninstall_all(&self) -> Result<Vec<String>> {
        let mut units = self.list_loaded_units();
        for file in self.installed_unit_files() {
            if let Some(name) = file.file_name().map(|n| n.to_string_lossy().to_string()) {
                if !units.contains(&name) {
                    units.push(name);
                }
            }
        }

        for unit in &units {
            self.stop_and_disable(unit);
        }

        for file in self.installed_unit_files() {
            self.host.remove(&file)?;
        }

        // Reload daemon
        let _ = self.host.run("systemctl", &["daemon-reload"]);
        let _ = self.host.run("systemctl", &["reset-failed"]);

        tracing::info!(count = units.len(), "Services uninstalled");

        Ok(units)
    }
}

/// Result of installing a unit file.
#[derive(Debug)]
pub struct InstallResult {
    /// Path where service file was written.
    pub service_path: PathBuf,
    /// Content of the unit file.
    pub unit_content: String,
}

/// Service status information.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    /// Whether the service file is installed.
    pub is_installed: bool,
    /// Whether the service is enabled to start on boot.
    pub is_enabled: bool,
    /// Whether the service is currently running.
    pub is_running: bool,
    /// Output of `systemctl is-active`.
    pub status_text: String,
}

impl ServiceStatus {
    /// Get a short status string.
    #[must_use]
    pub const fn short_status(&self) -> &'static str {
        match (self.is_installed, self.is_enabled, self.is_running) {
            (false, _, _) => "not installed",
            (true, false, false) => "installed, disabled",
            (true, true, false) => "enabled, stopped",
            (true, false, true) => "running (not enabled)",
            (true, true, true) => "running",
        }
    }
}
