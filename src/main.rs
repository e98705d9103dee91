//! UGREEN LED installer for TrueNAS SCALE.
//!
//! Fetches the prebuilt `led-ugreen` kernel module for the running TrueNAS
//! release, keeps it with its configuration and helper scripts in a
//! persistent dataset directory, and installs the LED monitoring services.
//! TrueNAS replaces the root filesystem on update, so the installer is meant
//! to be re-run (manually or as a post-init command) after every upgrade.
//!
//!   ugreen-leds-installer --pool-path /mnt/tank       # first install
//!   ugreen-leds-installer --dry-run                   # show what would change
//!   ugreen-leds-installer --status                    # inspect an install
//!   ugreen-leds-installer --uninstall [--force]       # remove (and purge)

mod application;
mod cli;
mod domain;
mod infrastructure;

use std::path::Path;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use application::persist_resolver::Prompt;
use application::{
    check_mount_prefix, collect_status, format_install_summary, format_status_table,
    format_uninstall_summary, prepare_directory, resolve, InstallContext, Installer, Resolution,
    ResolveRequest, Uninstaller,
};
use cli::Cli;
use domain::{AppError, InstallerConfig, OsVersion, PersistLayout, Result};
use infrastructure::{load_config, load_config_from_file, truenas, Host, HostPaths};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Main application logic.
async fn run(cli: Cli) -> Result<()> {
    check_privileges(&cli)?;

    let paths = HostPaths::default();
    let host = Host::new(cli.dry_run);
    let cwd = std::env::current_dir()
        .map_err(|e| AppError::io("Failed to determine current directory", e))?;

    let explicit_config = cli
        .config
        .as_deref()
        .map(load_config_from_file)
        .transpose()?;
    let base_config = explicit_config.clone().unwrap_or_default();

    if cli.status {
        let resolution = resolve_dir(&cli, &cwd, &base_config, None);
        let config = effective_config(explicit_config, &resolution.path)?;
        cmd_status(&host, &paths, &config, &resolution)
    } else if cli.uninstall {
        let resolution = resolve_dir(&cli, &cwd, &base_config, None);
        cmd_uninstall(&cli, &host, &paths, &resolution)
    } else {
        let prompt: Option<Prompt<'_>> = cli
            .interactive()
            .then_some(&cli::prompt_for_directory as Prompt<'_>);
        let resolution = resolve_dir(&cli, &cwd, &base_config, prompt);
        check_mount_prefix(&resolution, &base_config.install.mount_prefix)?;
        prepare_directory(&host, &resolution.path)?;

        let config = effective_config(explicit_config, &resolution.path)?;
        cmd_install(&cli, host, paths, config, &resolution).await
    }
}

fn resolve_dir(
    cli: &Cli,
    cwd: &Path,
    config: &InstallerConfig,
    prompt: Option<Prompt<'_>>,
) -> Resolution {
    let resolution = resolve(&ResolveRequest {
        persist_dir: cli.persist_dir.as_deref(),
        pool_path: cli.pool_path.as_deref(),
        use_current_dir: cli.use_current_dir,
        cwd,
        dir_name: &config.install.dir_name,
        prompt,
    });
    tracing::info!(
        path = %resolution.path.display(),
        source = %resolution.source,
        "Persistent directory"
    );
    resolution
}

/// `--config` wins; otherwise the copy kept in the persistent directory.
fn effective_config(explicit: Option<InstallerConfig>, persist_dir: &Path) -> Result<InstallerConfig> {
    match explicit {
        Some(config) => Ok(config),
        None => load_config(&PersistLayout::new(persist_dir.to_path_buf()).installer_config()),
    }
}

/// Install or refresh the module and services.
async fn cmd_install(
    cli: &Cli,
    host: Host,
    paths: HostPaths,
    config: InstallerConfig,
    resolution: &Resolution,
) -> Result<()> {
    let version = match &cli.os_version {
        Some(raw) => {
            let version = OsVersion::parse(raw)?;
            tracing::info!(%version, "Using version from command line");
            version
        }
        None => truenas::read_os_version(&paths)?,
    };
    let kernel_release = truenas::kernel_release()?;

    let ctx = InstallContext {
        host,
        paths,
        config,
        layout: PersistLayout::new(resolution.path.clone()),
        version,
        kernel_release,
        force: cli.force,
        register_init: cli.register_init,
    };

    let report = Installer::new(ctx).run().await?;
    println!();
    println!("{}", format_install_summary(&report));
    Ok(())
}

/// Remove everything the installer placed on the host.
fn cmd_uninstall(cli: &Cli, host: &Host, paths: &HostPaths, resolution: &Resolution) -> Result<()> {
    let purge = if cli.force && resolution.path.is_dir() {
        Some(PersistLayout::new(resolution.path.clone()))
    } else {
        if cli.force {
            tracing::warn!(path = %resolution.path.display(), "Persistent directory not found, nothing to purge");
        }
        None
    };

    let kernel_release = truenas::kernel_release()?;
    let report = Uninstaller::new(host, paths, kernel_release, purge).run()?;

    println!();
    println!("{}", format_uninstall_summary(&report, host.is_dry_run()));

    match &report.leftovers {
        Some(leftovers) if !leftovers.is_clean() => Err(AppError::Precondition {
            message: "Uninstall verification failed, see the summary above".into(),
        }),
        _ => Ok(()),
    }
}

/// Print the installation state.
fn cmd_status(
    host: &Host,
    paths: &HostPaths,
    config: &InstallerConfig,
    resolution: &Resolution,
) -> Result<()> {
    let report = collect_status(host, paths, config, resolution)?;

    println!("{}", "📟 UGREEN LED installation".bold());
    println!("{}", format_status_table(&report));
    Ok(())
}

/// Root is required for anything that changes the host.
fn check_privileges(cli: &Cli) -> Result<()> {
    if truenas::is_root() {
        return Ok(());
    }

    if cli.dry_run || cli.status {
        tracing::warn!("Not running as root, some checks may be incomplete");
        return Ok(());
    }

    Err(AppError::Precondition {
        message: "This installer must be run as root".into(),
    })
}

/// Setup tracing/logging based on verbosity level.
fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_explicit_config_wins_over_persistent_copy() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("installer.toml"),
            "[install]\ndir_name = \"from-persist\"\n",
        )
        .unwrap();

        let explicit = InstallerConfig::default();
        let config = effective_config(Some(explicit), dir.path()).unwrap();
        assert_eq!(config.install.dir_name, "ugreen-leds");

        let config = effective_config(None, dir.path()).unwrap();
        assert_eq!(config.install.dir_name, "from-persist");
    }

    #[test]
    fn test_missing_persistent_config_gives_defaults() {
        let dir = tempdir().unwrap();
        let missing: PathBuf = dir.path().join("nope");
        let config = effective_config(None, &missing).unwrap();
        assert_eq!(config, InstallerConfig::default());
    }
}
