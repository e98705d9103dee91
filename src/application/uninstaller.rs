//! Removal of everything the installer placed on the host.

use std::fs;
use std::path::PathBuf;

use crate::domain::{PersistLayout, Result, LOADED_MODULE_NAME, MODULE_FILE, UNIT_PREFIX};
use crate::infrastructure::kernel_module::{self, lsmod_contains};
use crate::infrastructure::systemd::parse_unit_list;
use crate::infrastructure::{Host, HostPaths, SystemdService};

/// Units or modules still present after an uninstall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Leftovers {
    pub units: Vec<String>,
    pub module_loaded: bool,
}

impl Leftovers {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.units.is_empty() && !self.module_loaded
    }
}

/// Evaluate `systemctl list-units` and `lsmod` output.
#[must_use]
pub fn find_leftovers(units_output: &str, lsmod_output: &str) -> Leftovers {
    Leftovers {
        units: parse_unit_list(units_output),
        module_loaded: lsmod_contains(lsmod_output, LOADED_MODULE_NAME),
    }
}

/// What an uninstall run did.
#[derive(Debug, Clone, Default)]
pub struct UninstallReport {
    pub units_removed: Vec<String>,
    pub files_removed: Vec<PathBuf>,
    pub purged: Option<PathBuf>,
    /// `None` in dry-run, where nothing is verified.
    pub leftovers: Option<Leftovers>,
}

/// Removes services, the module and installed files.
pub struct Uninstaller<'a> {
    host: &'a Host,
    paths: &'a HostPaths,
    kernel_release: String,
    /// Persistent directory to delete, when purging.
    purge: Option<PersistLayout>,
}

impl<'a> Uninstaller<'a> {
    #[must_use]
    pub const fn new(
        host: &'a Host,
        paths: &'a HostPaths,
        kernel_release: String,
        purge: Option<PersistLayout>,
    ) -> Self {
        Self {
            host,
            paths,
            kernel_release,
            purge,
        }
    }

    /// Remove everything, then verify.
    ///
    /// # Errors
    /// Returns error if an installed file cannot be removed.
    pub fn run(&self) -> Result<UninstallReport> {
        let mut report = UninstallReport::default();

        let systemd = SystemdService::new(self.host, self.paths);
        report.units_removed = systemd.uninstall_all()?;

        kernel_module::unload(self.host);

        let module_in_tree = self
            .paths
            .modules_extra_dir(&self.kernel_release)
            .join(MODULE_FILE);
        let had_module_in_tree = module_in_tree.exists();

        let mut targets = vec![
            self.paths.modules_load_conf(),
            self.paths.etc_led_config(),
            module_in_tree,
        ];
        targets.extend(self.system_scripts());

        for path in targets {
            if path.exists() {
                self.host.remove(&path)?;
                report.files_removed.push(path);
            }
        }

        if had_module_in_tree {
            if let Err(e) = self.host.run("depmod", &["-a", self.kernel_release.as_str()]) {
                tracing::warn!(error = %e, "depmod failed");
            }
        }

        if let Some(layout) = &self.purge {
            if layout.has_install_markers() {
                self.host.remove(layout.root())?;
                tracing::info!(path = %layout.root().display(), "Persistent directory removed");
                report.purged = Some(layout.root().to_path_buf());
            } else {
                tracing::warn!(
                    path = %layout.root().display(),
                    "Directory does not look like an installer directory, keeping it"
                );
            }
        }

        report.leftovers = if self.host.is_dry_run() {
            None
        } else {
            Some(self.verify())
        };

        tracing::info!(
            units = report.units_removed.len(),
            files = report.files_removed.len(),
            "Uninstall complete"
        );
        Ok(report)
    }

    /// Helper scripts installed in `/usr/bin`.
    fn system_scripts(&self) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(self.paths.usr_bin()) else {
            return Vec::new();
        };
        let mut scripts: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(UNIT_PREFIX))
            .map(|e| e.path())
            .collect();
        scripts.sort();
        scripts
    }

    fn verify(&self) -> Leftovers {
        let pattern = format!("{UNIT_PREFIX}*");
        let units = self
            .host
            .query(
                "systemctl",
                &["list-units", pattern.as_str(), "--all", "--no-legend", "--plain"],
            )
            .map(|o| o.stdout)
            .unwrap_or_default();
        let lsmod = self
            .host
            .query("lsmod", &[])
            .map(|o| o.stdout)
            .unwrap_or_default();

        let leftovers = find_leftovers(&units, &lsmod);
        if leftovers.is_clean() {
            tracing::info!("No LED units or modules remain");
        } else {
            tracing::warn!(
                units = ?leftovers.units,
                module_loaded = leftovers.module_loaded,
                "Uninstall left components behind"
            );
        }
        leftovers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::host::Action;
    use tempfile::tempdir;

    const LSMOD_LOADED: &str = "\
Module                  Size  Used by
led_ugreen             16384  0
ledtrig_netdev         16384  0
";

    #[test]
    fn test_find_leftovers_clean() {
        let leftovers = find_leftovers("", "Module Size Used by\ni2c_dev 28672 0\n");
        assert!(leftovers.is_clean());
    }

    #[test]
    fn test_find_leftovers_reports_units_and_module() {
        let units = "ugreen-diskiomon.service loaded active running UGREEN LEDs daemon\n";
        let leftovers = find_leftovers(units, LSMOD_LOADED);
        assert_eq!(leftovers.units, vec!["ugreen-diskiomon.service"]);
        assert!(leftovers.module_loaded);
        assert!(!leftovers.is_clean());
    }

    #[test]
    fn test_dry_run_removes_nothing() {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path());
        fs::create_dir_all(paths.usr_bin()).unwrap();
        fs::create_dir_all(paths.systemd_unit_dir()).unwrap();
        fs::write(paths.usr_bin().join("ugreen-diskiomon"), "#!/bin/sh\n").unwrap();
        fs::write(paths.usr_bin().join("bash"), "").unwrap();
        fs::write(paths.etc_led_config(), "BLINK_TYPE_POWER=none\n").unwrap();
        fs::write(
            paths.systemd_unit_dir().join("ugreen-diskiomon.service"),
            "[Unit]\n",
        )
        .unwrap();

        let persist = dir.path().join("persist");
        fs::create_dir_all(&persist).unwrap();
        fs::write(persist.join(".installed-version"), "24.10.2\n").unwrap();

        let host = Host::new(true);
        let uninstaller = Uninstaller::new(
            &host,
            &paths,
            "6.6.44-production+truenas".into(),
            Some(PersistLayout::new(persist.clone())),
        );
        let report = uninstaller.run().unwrap();

        assert!(paths.usr_bin().join("ugreen-diskiomon").exists());
        assert!(paths.etc_led_config().exists());
        assert!(persist.exists());
        assert!(report.leftovers.is_none());
        assert_eq!(report.purged, Some(persist));
        assert!(report
            .files_removed
            .contains(&paths.usr_bin().join("ugreen-diskiomon")));
        assert!(!report.files_removed.contains(&paths.usr_bin().join("bash")));
        assert!(report
            .units_removed
            .contains(&"ugreen-diskiomon.service".to_string()));

        let actions = host.actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Run { program, .. } if program == "rmmod")));
    }

    #[test]
    fn test_purge_keeps_unrelated_directory() {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path().join("root"));
        let tank = dir.path().join("tank");
        fs::create_dir_all(tank.join("family-photos")).unwrap();
        fs::write(tank.join("family-photos/a.jpg"), b"jpeg").unwrap();

        let host = Host::new(true);
        let uninstaller = Uninstaller::new(
            &host,
            &paths,
            "6.6.44-production+truenas".into(),
            Some(PersistLayout::new(tank.clone())),
        );
        let report = uninstaller.run().unwrap();

        assert!(report.purged.is_none());
        assert!(!host.actions().contains(&Action::Remove(tank.clone())));
        assert!(tank.join("family-photos/a.jpg").exists());
    }
}
