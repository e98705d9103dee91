//! Terminal output for install, uninstall and status reports.

use std::fmt::Write as _;

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Table};

use crate::domain::ModuleSource;

use super::installer::InstallReport;
use super::status::StatusReport;
use super::uninstaller::UninstallReport;

fn yes_no(value: bool) -> String {
    if value {
        "yes".green().to_string()
    } else {
        "no".red().to_string()
    }
}

/// Formats the status report as a table.
#[must_use]
pub fn format_status_table(report: &StatusReport) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Item", "State"]);

    let dir = if report.persist_dir_exists {
        report.persist_dir.display().to_string()
    } else {
        format!("{} (missing)", report.persist_dir.display())
    };
    table.add_row(vec!["Persistent directory".to_string(), dir]);
    table.add_row(vec![
        "OS version".to_string(),
        report
            .os_version
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string),
    ]);
    table.add_row(vec![
        "Recorded module version".to_string(),
        report.recorded_version.clone().unwrap_or_else(|| "-".into()),
    ]);
    table.add_row(vec![
        "Module version state".to_string(),
        report
            .version_state
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string),
    ]);
    table.add_row(vec![
        "Module file present".to_string(),
        yes_no(report.module_file_present),
    ]);
    table.add_row(vec!["Module loaded".to_string(), yes_no(report.module_loaded)]);
    table.add_row(vec![
        "Network interface".to_string(),
        report.interface.clone().unwrap_or_else(|| "-".into()),
    ]);

    for (unit, status) in &report.services {
        table.add_row(vec![unit.clone(), status.short_status().to_string()]);
    }

    table.to_string()
}

/// Formats the end-of-install summary.
#[must_use]
pub fn format_install_summary(report: &InstallReport) -> String {
    let mut out = String::new();
    let title = if report.dry_run {
        "📋 Dry run complete, no changes were made"
    } else {
        "✅ Installation complete"
    };
    let _ = writeln!(out, "{}", title.bold());
    let _ = writeln!(out, "  Persistent directory: {}", report.persist_dir.display().to_string().cyan());
    let _ = writeln!(out, "  TrueNAS version: {}", report.version.to_string().cyan());
    let _ = writeln!(out, "  Filesystem mode: {}", report.mode.to_string().yellow());

    match &report.module {
        Some(location) => {
            let origin = match location.source {
                ModuleSource::Remote => "upstream listing",
                ModuleSource::Fallback => "fallback table",
            };
            let verb = if report.dry_run { "Would download" } else { "Downloaded" };
            let _ = writeln!(
                out,
                "  {verb} module: {}/{} ({origin})",
                location.codename,
                location.version
            );
        }
        None => {
            let _ = writeln!(out, "  Module: {}", report.version_state.to_string().green());
        }
    }

    let _ = writeln!(out, "  LED config based on: {:?}", report.config_base);
    let _ = writeln!(
        out,
        "  Network interface: {}",
        report.interface.as_deref().unwrap_or("none detected")
    );

    for unit in &report.services_enabled {
        let _ = writeln!(out, "  {} {unit}", "●".green());
    }
    for unit in &report.services_failed {
        let _ = writeln!(out, "  {} {unit} (failed to enable)", "●".red());
    }

    match report.post_init_registered {
        Some(true) => {
            let _ = writeln!(out, "  Post-init command: {}", "registered".green());
        }
        Some(false) => {
            let _ = writeln!(out, "  Post-init command: already registered");
        }
        None => {}
    }

    out.trim_end().to_string()
}

/// Formats the uninstall summary.
#[must_use]
pub fn format_uninstall_summary(report: &UninstallReport, dry_run: bool) -> String {
    let mut out = String::new();
    let title = if dry_run {
        "📋 Dry run complete, no changes were made"
    } else {
        "🧹 Uninstall complete"
    };
    let _ = writeln!(out, "{}", title.bold());
    let _ = writeln!(out, "  Units removed: {}", report.units_removed.len().to_string().cyan());
    let _ = writeln!(out, "  Files removed: {}", report.files_removed.len().to_string().cyan());
    if let Some(path) = &report.purged {
        let _ = writeln!(out, "  Persistent directory removed: {}", path.display());
    }

    if let Some(leftovers) = &report.leftovers {
        if leftovers.is_clean() {
            let _ = writeln!(out, "  {}", "Nothing left behind".green());
        } else {
            for unit in &leftovers.units {
                let _ = writeln!(out, "  {} unit still present: {unit}", "⚠".yellow());
            }
            if leftovers.module_loaded {
                let _ = writeln!(out, "  {} kernel module still loaded", "⚠".yellow());
            }
        }
    }

    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::config_merge::ConfigBase;
    use crate::application::uninstaller::Leftovers;
    use crate::domain::{FsMode, ModuleLocation, OsVersion, VersionState};
    use crate::infrastructure::ServiceStatus;
    use std::path::PathBuf;

    fn install_report(dry_run: bool) -> InstallReport {
        InstallReport {
            persist_dir: PathBuf::from("/mnt/tank/ugreen-leds"),
            version: OsVersion::parse("24.10.2").unwrap(),
            version_state: VersionState::Missing,
            module: Some(ModuleLocation::new(
                "build-scripts/truenas/build",
                "TrueNAS-SCALE-ElectricEel",
                "24.10.2",
                ModuleSource::Fallback,
            )),
            mode: FsMode::ReadOnly,
            config_base: ConfigBase::Template,
            interface: Some("enp1s0".into()),
            services_enabled: vec!["ugreen-diskiomon.service".into()],
            services_failed: vec!["ugreen-netdevmon@enp1s0.service".into()],
            post_init_registered: None,
            dry_run,
        }
    }

    #[test]
    fn test_install_summary() {
        colored::control::set_override(false);
        let summary = format_install_summary(&install_report(true));
        assert!(summary.contains("Dry run"));
        assert!(summary.contains("Would download module: TrueNAS-SCALE-ElectricEel/24.10.2 (fallback table)"));
        assert!(summary.contains("ugreen-netdevmon@enp1s0.service (failed to enable)"));

        let summary = format_install_summary(&install_report(false));
        assert!(summary.contains("Installation complete"));
    }

    #[test]
    fn test_uninstall_summary_lists_leftovers() {
        colored::control::set_override(false);
        let report = UninstallReport {
            units_removed: vec!["ugreen-diskiomon.service".into()],
            files_removed: vec![],
            purged: None,
            leftovers: Some(Leftovers {
                units: vec!["ugreen-power-led.service".into()],
                module_loaded: true,
            }),
        };
        let summary = format_uninstall_summary(&report, false);
        assert!(summary.contains("unit still present: ugreen-power-led.service"));
        assert!(summary.contains("kernel module still loaded"));
    }

    #[test]
    fn test_status_table_lists_services() {
        let report = StatusReport {
            persist_dir: PathBuf::from("/mnt/tank/ugreen-leds"),
            persist_dir_exists: true,
            os_version: OsVersion::parse("24.10.2").ok(),
            recorded_version: Some("24.10.2".into()),
            version_state: Some(VersionState::UpToDate),
            module_file_present: true,
            module_loaded: true,
            interface: Some("enp1s0".into()),
            services: vec![(
                "ugreen-diskiomon.service".into(),
                ServiceStatus {
                    is_installed: true,
                    is_enabled: true,
                    is_running: true,
                    status_text: "active".into(),
                },
            )],
        };
        let table = format_status_table(&report);
        assert!(table.contains("ugreen-diskiomon.service"));
        assert!(table.contains("running"));
        assert!(table.contains("/mnt/tank/ugreen-leds"));
    }
}
