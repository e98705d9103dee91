//! Install orchestration.
//!
//! Runs the install phases in order against an explicit [`InstallContext`].
//! Hard failures abort the run; best-effort steps log a warning and continue.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{
    FsMode, InstallerConfig, LedConfig, ModuleLocation, OsVersion, PersistLayout, Result,
    VersionState, UNIT_PREFIX,
};
use crate::infrastructure::systemd::{plan_services, POWER_LED_SERVICE};
use crate::infrastructure::{
    ensure_config_exists, git, kernel_module, mounts, network, truenas, GithubClient, Host,
    HostPaths, SystemdService,
};

use super::config_merge::{merge_led_config, ConfigBase};
use super::discovery::discover_module;
use super::reconciler::{commit_module, reconcile};

/// Everything the install phases need, resolved up front.
pub struct InstallContext {
    pub host: Host,
    pub paths: HostPaths,
    pub config: InstallerConfig,
    pub layout: PersistLayout,
    pub version: OsVersion,
    pub kernel_release: String,
    /// Re-download the module and re-clone the repository.
    pub force: bool,
    /// Register the self-copy as a TrueNAS post-init command.
    pub register_init: bool,
}

/// What an install run did.
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub persist_dir: PathBuf,
    pub version: OsVersion,
    pub version_state: VersionState,
    /// Set when a module was (or in dry-run, would be) downloaded.
    pub module: Option<ModuleLocation>,
    pub mode: FsMode,
    pub config_base: ConfigBase,
    pub interface: Option<String>,
    pub services_enabled: Vec<String>,
    pub services_failed: Vec<String>,
    pub post_init_registered: Option<bool>,
    pub dry_run: bool,
}

/// Runs the install phases.
pub struct Installer {
    ctx: InstallContext,
}

impl Installer {
    #[must_use]
    pub const fn new(ctx: InstallContext) -> Self {
        Self { ctx }
    }

    #[must_use]
    pub const fn context(&self) -> &InstallContext {
        &self.ctx
    }

    /// Run every phase.
    ///
    /// # Errors
    /// Returns the first hard failure (network without fallback, permission,
    /// failed clone or module load).
    pub async fn run(&self) -> Result<InstallReport> {
        let ctx = &self.ctx;
        tracing::info!(
            persist_dir = %ctx.layout.root().display(),
            version = %ctx.version,
            kernel = %ctx.kernel_release,
            dry_run = ctx.host.is_dry_run(),
            "Starting installation"
        );

        let (version_state, module) = self.update_module().await?;

        let mode = mounts::prepare_filesystem(&ctx.host, &ctx.paths, &ctx.config.install.readonly_probe)?;

        self.copy_self();
        ensure_config_exists(&ctx.host, &ctx.layout.installer_config())?;

        git::sync_repository(
            &ctx.host,
            &ctx.config.repository.clone_url,
            &ctx.layout.repo_dir(),
            ctx.force,
        )?;
        let system_scripts = self.install_scripts(mode)?;

        self.install_module(mode)?;

        let merged = merge_led_config(&ctx.host, &ctx.paths, &ctx.layout, mode)?;

        let interface = network::detect_interface(
            &ctx.host,
            &ctx.paths,
            ctx.config.network.interface.as_deref(),
        );

        let (services_enabled, services_failed) =
            self.install_services(system_scripts, &merged.config, interface.as_deref())?;

        let post_init_registered = if ctx.register_init {
            Some(self.register_post_init()?)
        } else {
            None
        };

        Ok(InstallReport {
            persist_dir: ctx.layout.root().to_path_buf(),
            version: ctx.version.clone(),
            version_state,
            module,
            mode,
            config_base: merged.base,
            interface,
            services_enabled,
            services_failed,
            post_init_registered,
            dry_run: ctx.host.is_dry_run(),
        })
    }

    /// Reconcile the marker and fetch a new module when needed.
    async fn update_module(&self) -> Result<(VersionState, Option<ModuleLocation>)> {
        let ctx = &self.ctx;
        let state = reconcile(&ctx.layout, &ctx.version)?;

        if !state.needs_download(ctx.force) {
            tracing::info!("Module is up to date, skipping download");
            return Ok((state, None));
        }

        let client = GithubClient::new(ctx.config.repository.clone())?;
        let location = discover_module(&client, &ctx.version, &ctx.config.codename_table()).await?;

        if ctx.host.is_dry_run() {
            tracing::info!(
                "[dry-run] would download {}",
                client.raw_url(&location.path)
            );
        } else {
            let bytes = client.download(&location.path).await?;
            commit_module(&ctx.host, &ctx.layout, &bytes, &ctx.version)?;
        }

        Ok((state, Some(location)))
    }

    /// Copy the running binary into the persistent directory. Best effort.
    fn copy_self(&self) {
        let ctx = &self.ctx;
        let target = ctx.layout.installer_copy();

        let current = match std::env::current_exe() {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(error = %e, "Cannot locate running executable, skipping self-copy");
                return;
            }
        };

        if same_file(&current, &target) {
            tracing::debug!("Running from the persistent copy, skipping self-copy");
            return;
        }

        let result = ctx
            .host
            .copy(&current, &target)
            .and_then(|()| ctx.host.make_executable(&target));
        match result {
            Ok(()) => tracing::info!(path = %target.display(), "Installer copied to persistent storage"),
            Err(e) => tracing::warn!(error = %e, "Failed to copy installer to persistent storage"),
        }
    }

    /// Copy helper scripts into persistent storage and, when writable, `/usr/bin`.
    ///
    /// Returns whether every script is available under `/usr/bin`.
    fn install_scripts(&self, mode: FsMode) -> Result<bool> {
        let ctx = &self.ctx;
        let source = ctx.layout.repo_scripts_dir();

        let scripts = match list_helper_scripts(&source) {
            Ok(scripts) => scripts,
            Err(e) if ctx.host.is_dry_run() => {
                tracing::info!(
                    "[dry-run] would copy helper scripts from {} ({e})",
                    source.display()
                );
                return Ok(!mode.is_read_only());
            }
            Err(e) => return Err(e),
        };

        let dest = ctx.layout.scripts_dir();
        ctx.host.create_dir_all(&dest)?;

        let mut system_scripts = !mode.is_read_only();
        for script in &scripts {
            let Some(name) = script.file_name() else {
                continue;
            };
            let target = dest.join(name);
            ctx.host.copy(script, &target)?;
            ctx.host.make_executable(&target)?;

            if !mode.is_read_only() {
                let system_target = ctx.paths.usr_bin().join(name);
                let mirrored = ctx
                    .host
                    .copy(script, &system_target)
                    .and_then(|()| ctx.host.make_executable(&system_target));
                if let Err(e) = mirrored {
                    tracing::warn!(error = %e, "Failed to copy helper script to /usr/bin");
                    system_scripts = false;
                }
            }
        }

        tracing::info!(count = scripts.len(), path = %dest.display(), "Helper scripts installed");
        Ok(system_scripts)
    }

    fn install_module(&self, mode: FsMode) -> Result<()> {
        let ctx = &self.ctx;
        let module_file = ctx.layout.module_file();

        match mode {
            FsMode::Writable => kernel_module::install_system_wide(
                &ctx.host,
                &ctx.paths,
                &ctx.kernel_release,
                &module_file,
            ),
            FsMode::ReadOnly => kernel_module::load_from_file(&ctx.host, &module_file),
        }
    }

    /// Install unit files and enable the planned services.
    ///
    /// Returns `(enabled, failed)` unit names.
    fn install_services(
        &self,
        system_scripts: bool,
        led: &LedConfig,
        interface: Option<&str>,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let ctx = &self.ctx;
        let systemd = SystemdService::new(&ctx.host, &ctx.paths);
        let templates = ctx.layout.repo_units_dir();

        if templates.is_dir() {
            let scripts_dir = unit_scripts_dir(&ctx.layout, system_scripts);
            systemd.install_units(&templates, &ctx.layout.systemd_dir(), scripts_dir.as_deref())?;
        } else if ctx.host.is_dry_run() {
            tracing::info!(
                "[dry-run] would install unit files from {}",
                templates.display()
            );
        } else {
            return Err(crate::domain::AppError::InvalidData {
                message: format!("Unit templates not found in {}", templates.display()),
            });
        }

        if let Err(e) = systemd.daemon_reload() {
            tracing::warn!(error = %e, "systemctl daemon-reload failed");
        }

        if !led.power_led_enabled() && systemd.get_status(POWER_LED_SERVICE).is_enabled {
            systemd.stop_and_disable(POWER_LED_SERVICE);
        }

        let mut enabled = Vec::new();
        let mut failed = Vec::new();
        for unit in plan_services(led, interface) {
            if systemd.enable_now(&unit) {
                enabled.push(unit);
            } else {
                failed.push(unit);
            }
        }

        Ok((enabled, failed))
    }

    fn register_post_init(&self) -> Result<bool> {
        let ctx = &self.ctx;
        let command = post_init_command(&ctx.layout);
        truenas::register_post_init(&ctx.host, &command)
    }
}

/// Directory unit files should call helper scripts from, `None` for `/usr/bin`.
fn unit_scripts_dir(layout: &PersistLayout, system_scripts: bool) -> Option<PathBuf> {
    (!system_scripts).then(|| layout.scripts_dir())
}

/// Command line re-running the persistent installer at boot.
#[must_use]
pub fn post_init_command(layout: &PersistLayout) -> String {
    format!(
        "{} --persist-dir {} --yes --config {}",
        shell_quote(&layout.installer_copy()),
        shell_quote(layout.root()),
        shell_quote(&layout.installer_config())
    )
}

fn shell_quote(path: &Path) -> String {
    let s = path.to_string_lossy();
    if s.chars().all(|c| c.is_ascii_alphanumeric() || "/._-+".contains(c)) {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Executable helper scripts (`ugreen-*`) in the repository's scripts directory.
fn list_helper_scripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        crate::domain::AppError::io(format!("Failed to read {}", dir.display()), e)
    })?;

    let mut scripts: Vec<PathBuf> = entries
        .filter_map(std::result::Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| n.starts_with(UNIT_PREFIX) && !n.ends_with(".conf"))
        })
        .collect();
    scripts.sort();
    Ok(scripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RepositoryConfig;
    use crate::infrastructure::host::Action;
    use tempfile::tempdir;

    fn snapshot(root: &Path) -> Vec<PathBuf> {
        fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
            if let Ok(entries) = fs::read_dir(dir) {
                for entry in entries.filter_map(std::result::Result::ok) {
                    let path = entry.path();
                    out.push(path.clone());
                    if path.is_dir() {
                        walk(&path, out);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(root, &mut out);
        out.sort();
        out
    }

    fn offline_config() -> InstallerConfig {
        InstallerConfig {
            repository: RepositoryConfig {
                api_base: "http://127.0.0.1:9".into(),
                timeout_secs: 2,
                ..RepositoryConfig::default()
            },
            ..InstallerConfig::default()
        }
    }

    #[test]
    fn test_post_init_command_quotes_paths() {
        let layout = PersistLayout::new(PathBuf::from("/mnt/tank/my apps/ugreen-leds"));
        let cmd = post_init_command(&layout);
        assert!(cmd.starts_with("'/mnt/tank/my apps/ugreen-leds/ugreen-leds-installer'"));
        assert!(cmd.contains("--yes"));

        let layout = PersistLayout::new(PathBuf::from("/mnt/tank/ugreen-leds"));
        assert_eq!(
            post_init_command(&layout),
            "/mnt/tank/ugreen-leds/ugreen-leds-installer --persist-dir /mnt/tank/ugreen-leds --yes --config /mnt/tank/ugreen-leds/installer.toml"
        );
    }

    #[test]
    fn test_units_use_persistent_scripts_unless_mirrored() {
        let layout = PersistLayout::new(PathBuf::from("/mnt/tank/ugreen-leds"));
        assert_eq!(unit_scripts_dir(&layout, true), None);
        assert_eq!(
            unit_scripts_dir(&layout, false),
            Some(PathBuf::from("/mnt/tank/ugreen-leds/scripts"))
        );
    }

    #[test]
    fn test_failed_mirror_falls_back_to_persistent_scripts() {
        let dir = tempdir().unwrap();
        let layout = PersistLayout::new(dir.path().join("persist"));
        fs::create_dir_all(layout.repo_scripts_dir()).unwrap();
        fs::write(layout.repo_scripts_dir().join("ugreen-diskiomon"), "#!/bin/sh\n").unwrap();

        // usr/bin is a file, so copying into it fails
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("usr")).unwrap();
        fs::write(root.join("usr/bin"), "").unwrap();

        let installer = Installer::new(InstallContext {
            host: Host::new(false),
            paths: HostPaths::rooted(&root),
            config: offline_config(),
            layout: layout.clone(),
            version: OsVersion::parse("24.10.2").unwrap(),
            kernel_release: "6.6.44-production+truenas".into(),
            force: false,
            register_init: false,
        });

        assert!(!installer.install_scripts(FsMode::Writable).unwrap());
        assert!(layout.scripts_dir().join("ugreen-diskiomon").is_file());
        assert!(!installer.install_scripts(FsMode::ReadOnly).unwrap());
    }

    #[test]
    fn test_list_helper_scripts() {
        let dir = tempdir().unwrap();
        for name in ["ugreen-diskiomon", "ugreen-probe-leds", "ugreen-leds.conf", "README.md"] {
            fs::write(dir.path().join(name), "#!/bin/bash\n").unwrap();
        }
        fs::create_dir(dir.path().join("systemd")).unwrap();

        let names: Vec<String> = list_helper_scripts(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["ugreen-diskiomon", "ugreen-probe-leds"]);
    }

    #[tokio::test]
    async fn test_dry_run_mutates_nothing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::create_dir_all(root.join("etc")).unwrap();
        fs::write(
            root.join("proc/mounts"),
            "boot-pool/ROOT/24.10.2 / zfs rw 0 0\nboot-pool/ROOT/24.10.2/usr /usr zfs ro 0 0\n",
        )
        .unwrap();
        fs::write(root.join("etc/version"), "24.10.2").unwrap();

        let before = snapshot(dir.path());
        let ctx = InstallContext {
            host: Host::new(true),
            paths: HostPaths::rooted(&root),
            config: offline_config(),
            layout: PersistLayout::new(dir.path().join("persist")),
            version: OsVersion::parse("24.10.2").unwrap(),
            kernel_release: "6.6.44-production+truenas".into(),
            force: false,
            register_init: false,
        };

        let installer = Installer::new(ctx);
        let report = installer.run().await.unwrap();

        assert_eq!(snapshot(dir.path()), before);
        assert!(report.dry_run);
        assert_eq!(report.mode, FsMode::ReadOnly);
        assert_eq!(report.version_state, VersionState::Missing);
        assert_eq!(
            report.module.as_ref().map(|m| m.codename.as_str()),
            Some("TrueNAS-SCALE-ElectricEel")
        );

        let actions = installer.context().host.actions();
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Run { program, .. } if program == "git")));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Run { program, .. } if program == "insmod")));
    }

    #[tokio::test]
    async fn test_up_to_date_module_is_not_downloaded() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("proc")).unwrap();
        fs::write(root.join("proc/mounts"), "rootfs / zfs ro 0 0\n").unwrap();

        let layout = PersistLayout::new(dir.path().join("persist"));
        fs::create_dir_all(layout.root()).unwrap();
        fs::write(layout.module_file(), b"module").unwrap();
        fs::write(layout.version_marker(), "24.10.2\n").unwrap();

        let ctx = InstallContext {
            host: Host::new(true),
            paths: HostPaths::rooted(&root),
            config: offline_config(),
            layout,
            version: OsVersion::parse("24.10.2").unwrap(),
            kernel_release: "6.6.44-production+truenas".into(),
            force: false,
            register_init: false,
        };

        let report = Installer::new(ctx).run().await.unwrap();
        assert_eq!(report.version_state, VersionState::UpToDate);
        assert!(report.module.is_none());
    }
}
