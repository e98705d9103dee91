//! Read-only inspection of an installation.

use std::path::PathBuf;

use crate::domain::{InstallerConfig, OsVersion, PersistLayout, Result, VersionState};
use crate::infrastructure::systemd::{netdevmon_service, DISKIOMON_SERVICE, POWER_LED_SERVICE};
use crate::infrastructure::{kernel_module, network, truenas, Host, HostPaths, ServiceStatus, SystemdService};

use super::persist_resolver::Resolution;
use super::reconciler::{recorded_version, reconcile};

/// Snapshot of the installer's state on this host.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub persist_dir: PathBuf,
    pub persist_dir_exists: bool,
    pub os_version: Option<OsVersion>,
    pub recorded_version: Option<String>,
    pub version_state: Option<VersionState>,
    pub module_file_present: bool,
    pub module_loaded: bool,
    pub interface: Option<String>,
    pub services: Vec<(String, ServiceStatus)>,
}

/// Gather status without changing anything.
///
/// # Errors
/// Returns error if the version marker exists but cannot be read.
pub fn collect_status(
    host: &Host,
    paths: &HostPaths,
    config: &InstallerConfig,
    resolution: &Resolution,
) -> Result<StatusReport> {
    let layout = PersistLayout::new(resolution.path.clone());

    let os_version = match truenas::read_os_version(paths) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error = %e, "Cannot determine OS version");
            None
        }
    };

    let version_state = match &os_version {
        Some(v) => Some(reconcile(&layout, v)?),
        None => None,
    };

    let interface = network::detect_interface(host, paths, config.network.interface.as_deref());

    let systemd = SystemdService::new(host, paths);
    let mut units = vec![DISKIOMON_SERVICE.to_string()];
    if let Some(iface) = &interface {
        units.push(netdevmon_service(iface));
    }
    units.push(POWER_LED_SERVICE.to_string());
    let services = units
        .into_iter()
        .map(|unit| {
            let status = systemd.get_status(&unit);
            (unit, status)
        })
        .collect();

    Ok(StatusReport {
        persist_dir_exists: layout.root().is_dir(),
        persist_dir: layout.root().to_path_buf(),
        os_version,
        recorded_version: recorded_version(&layout)?,
        version_state,
        module_file_present: layout.module_file().is_file(),
        module_loaded: kernel_module::is_loaded(host),
        interface,
        services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::persist_resolver::DirSource;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_status_of_fresh_host() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(root.join("etc/version"), "25.04.1\n").unwrap();
        let paths = HostPaths::rooted(&root);

        let resolution = Resolution {
            path: dir.path().join("ugreen-leds"),
            source: DirSource::Default,
        };
        let config = InstallerConfig {
            network: crate::domain::NetworkConfig {
                interface: Some("enp1s0".into()),
            },
            ..InstallerConfig::default()
        };

        let report = collect_status(&Host::new(true), &paths, &config, &resolution).unwrap();
        assert!(!report.persist_dir_exists);
        assert_eq!(report.os_version.as_ref().map(OsVersion::as_str), Some("25.04.1"));
        assert_eq!(report.version_state, Some(VersionState::Missing));
        assert!(!report.module_file_present);
        assert_eq!(report.services.len(), 3);
        assert!(report.services.iter().all(|(_, s)| !s.is_installed));
    }
}
