//! Kernel module placement, loading and unloading.

use std::path::Path;

use crate::domain::{
    Result, LOADED_MODULE_NAME, MODULE_DEPENDENCIES, MODULE_FILE, MODULE_NAME,
};

use super::host::{Host, HostPaths};

/// Modules loaded at boot, in load order.
const BOOT_MODULES: &[&str] = &["i2c-dev", MODULE_NAME, "ledtrig-oneshot", "ledtrig-netdev"];

/// Whether `lsmod` output lists `module`.
#[must_use]
pub fn lsmod_contains(output: &str, module: &str) -> bool {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| name == module)
}

/// Whether the LED module is currently loaded. Unknown counts as not loaded.
#[must_use]
pub fn is_loaded(host: &Host) -> bool {
    match host.query("lsmod", &[]) {
        Ok(output) => lsmod_contains(&output.stdout, LOADED_MODULE_NAME),
        Err(e) => {
            tracing::debug!(error = %e, "lsmod unavailable");
            false
        }
    }
}

/// `modules-load.d` entry loading the driver and its dependencies at boot.
#[must_use]
pub fn modules_load_content() -> String {
    let mut content = String::new();
    for name in BOOT_MODULES {
        content.push_str(name);
        content.push('\n');
    }
    content
}

/// Install the module into the kernel's module tree and load it via `modprobe`.
///
/// # Errors
/// Returns error if the module cannot be copied or loaded.
pub fn install_system_wide(
    host: &Host,
    paths: &HostPaths,
    kernel_release: &str,
    module_file: &Path,
) -> Result<()> {
    let extra = paths.modules_extra_dir(kernel_release);
    host.create_dir_all(&extra)?;
    host.copy(module_file, &extra.join(MODULE_FILE))?;
    host.run_checked("depmod", &["-a", kernel_release])?;

    let load_conf = paths.modules_load_conf();
    if let Some(parent) = load_conf.parent() {
        host.create_dir_all(parent)?;
    }
    host.write(&load_conf, modules_load_content().as_bytes())?;
    tracing::info!(path = %load_conf.display(), "Module load configuration written");

    let mut args = vec!["-a"];
    args.extend_from_slice(BOOT_MODULES);
    host.run_checked("modprobe", &args)?;
    tracing::info!("Kernel module loaded via modprobe");
    Ok(())
}

/// Load the module straight from the persistent directory.
///
/// Does nothing when `lsmod` already lists the module.
///
/// # Errors
/// Returns error if `insmod` fails.
pub fn load_from_file(host: &Host, module_file: &Path) -> Result<()> {
    load_unless_loaded(host, module_file, is_loaded(host))
}

fn load_unless_loaded(host: &Host, module_file: &Path, already_loaded: bool) -> Result<()> {
    if already_loaded {
        tracing::info!("Kernel module already loaded, skipping insmod");
        return Ok(());
    }

    let mut args = vec!["-a"];
    args.extend_from_slice(MODULE_DEPENDENCIES);
    if let Ok(output) = host.run("modprobe", &args) {
        if !output.success {
            tracing::warn!(stderr = %output.stderr.trim(), "Some dependency modules failed to load");
        }
    }

    let path = module_file.to_string_lossy();
    host.run_checked("insmod", &[path.as_ref()])?;
    tracing::info!(path = %module_file.display(), "Kernel module loaded via insmod");
    Ok(())
}

/// Unload the LED module. Best effort.
pub fn unload(host: &Host) {
    match host.run("rmmod", &[LOADED_MODULE_NAME]) {
        Ok(output) if output.success => tracing::info!("Kernel module unloaded"),
        Ok(output) => tracing::warn!(stderr = %output.stderr.trim(), "rmmod failed"),
        Err(e) => tracing::warn!(error = %e, "rmmod failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::host::Action;
    use tempfile::tempdir;

    const LSMOD: &str = "\
Module                  Size  Used by
led_ugreen             16384  0
ledtrig_netdev         20480  0
i2c_dev                28672  0
";

    #[test]
    fn test_lsmod_contains() {
        assert!(lsmod_contains(LSMOD, "led_ugreen"));
        assert!(lsmod_contains(LSMOD, "i2c_dev"));
        assert!(!lsmod_contains(LSMOD, "led-ugreen"));
        assert!(!lsmod_contains(LSMOD, "Module"));
    }

    #[test]
    fn test_modules_load_content() {
        let content = modules_load_content();
        assert_eq!(
            content.lines().collect::<Vec<_>>(),
            vec!["i2c-dev", "led-ugreen", "ledtrig-oneshot", "ledtrig-netdev"]
        );
    }

    #[test]
    fn test_system_wide_install_plan() {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path());
        let host = Host::new(true);
        let module = dir.path().join("led-ugreen.ko");

        install_system_wide(&host, &paths, "6.6.44-production+truenas", &module).unwrap();

        let actions = host.actions();
        let extra = paths.modules_extra_dir("6.6.44-production+truenas");
        assert!(actions.contains(&Action::Copy {
            from: module,
            to: extra.join(MODULE_FILE),
        }));
        assert!(actions.contains(&Action::Write(paths.modules_load_conf())));
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Run { program, .. } if program == "depmod")));
        assert!(!extra.exists());
        assert!(!actions
            .iter()
            .any(|a| matches!(a, Action::Run { program, .. } if program == "rmmod")));
    }

    #[test]
    fn test_loaded_module_is_left_alone() {
        let dir = tempdir().unwrap();
        let module = dir.path().join("led-ugreen.ko");
        let host = Host::new(false);

        load_unless_loaded(&host, &module, true).unwrap();

        assert!(host.actions().is_empty());
    }

    #[test]
    fn test_unloaded_module_is_inserted() {
        let dir = tempdir().unwrap();
        let module = dir.path().join("led-ugreen.ko");
        let host = Host::new(true);

        load_unless_loaded(&host, &module, false).unwrap();

        let programs: Vec<String> = host
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Run { program, .. } => Some(program),
                _ => None,
            })
            .collect();
        assert_eq!(programs, vec!["modprobe", "insmod"]);
    }
}
