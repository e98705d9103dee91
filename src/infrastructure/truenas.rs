//! TrueNAS host facts and middleware integration.

use std::fs;

use nix::sys::utsname::uname;
use nix::unistd::Uid;
use serde_json::json;

use crate::domain::{AppError, OsVersion, Result};

use super::host::{Host, HostPaths};

/// Read the running OS version from `/etc/version`.
///
/// # Errors
/// Returns error if the file is missing or holds no recognizable version.
pub fn read_os_version(paths: &HostPaths) -> Result<OsVersion> {
    let path = paths.os_version_file();
    let content = fs::read_to_string(&path).map_err(|e| {
        AppError::io(
            format!(
                "Failed to read {} (is this TrueNAS Scale? use -v to set the version)",
                path.display()
            ),
            e,
        )
    })?;
    OsVersion::parse(&content)
}

/// Release string of the running kernel (`uname -r`).
///
/// # Errors
/// Returns error if `uname` fails.
pub fn kernel_release() -> Result<String> {
    let info = uname().map_err(|e| AppError::Config {
        message: format!("uname failed: {e}"),
    })?;
    Ok(info.release().to_string_lossy().to_string())
}

/// Whether the process runs with root privileges.
#[must_use]
pub fn is_root() -> bool {
    Uid::effective().is_root()
}

/// Register `command` as a POSTINIT init/shutdown script in the TrueNAS middleware.
///
/// Returns `false` when an identical command is already registered.
///
/// # Errors
/// Returns error if `midclt` cannot be run or rejects the request.
pub fn register_post_init(host: &Host, command: &str) -> Result<bool> {
    let existing = host.query("midclt", &["call", "initshutdownscript.query"])?;
    if !existing.success {
        return Err(AppError::command("midclt call initshutdownscript.query", existing.stderr.trim()));
    }
    if is_registered(&existing.stdout, command)? {
        tracing::info!("Post-init command already registered");
        return Ok(false);
    }

    let payload = json!({
        "type": "COMMAND",
        "command": command,
        "when": "POSTINIT",
        "enabled": true,
        "timeout": 30,
        "comment": "UGREEN LED controller",
    })
    .to_string();

    host.run_checked("midclt", &["call", "initshutdownscript.create", payload.as_str()])?;
    tracing::info!("Post-init command registered");
    Ok(true)
}

/// Whether the `initshutdownscript.query` result already contains `command`.
///
/// # Errors
/// Returns error if the middleware output is not JSON.
pub fn is_registered(query_output: &str, command: &str) -> Result<bool> {
    let scripts: Vec<serde_json::Value> =
        serde_json::from_str(query_output.trim()).map_err(AppError::json_parse)?;
    Ok(scripts
        .iter()
        .any(|s| s.get("command").and_then(serde_json::Value::as_str) == Some(command)))
}
