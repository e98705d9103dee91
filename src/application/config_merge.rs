//! Three-way merge of `ugreen-leds.conf`.
//!
//! The persistent copy wins over the system copy, which wins over the upstream
//! template. Keys new in the template are appended so operator edits survive.

use std::fs;
use std::path::Path;

use chrono::Local;

use crate::domain::{AppError, FsMode, LedConfig, PersistLayout, Result};
use crate::infrastructure::{Host, HostPaths};

/// Which file the merged configuration started from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigBase {
    Persistent,
    System,
    Template,
}

/// Outcome of a config merge.
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub config: LedConfig,
    pub base: ConfigBase,
    pub added_keys: Vec<String>,
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::io(format!("Failed to read {}", path.display()), e)),
    }
}

/// Merge the three sources in memory.
///
/// # Errors
/// Returns error if none of the sources exist.
pub fn merge_sources(
    persistent: Option<&str>,
    system: Option<&str>,
    template: Option<&str>,
) -> Result<MergeResult> {
    let (base_text, base) = persistent
        .map(|t| (t, ConfigBase::Persistent))
        .or_else(|| system.map(|t| (t, ConfigBase::System)))
        .or_else(|| template.map(|t| (t, ConfigBase::Template)))
        .ok_or_else(|| AppError::Config {
            message: "No ugreen-leds.conf found in the persistent directory, /etc, or the repository".into(),
        })?;

    let mut config = LedConfig::parse(base_text);
    let added_keys = match (base, template) {
        (ConfigBase::Template, _) | (_, None) => Vec::new(),
        (_, Some(t)) => config.merge_missing_from(&LedConfig::parse(t)),
    };

    Ok(MergeResult {
        config,
        base,
        added_keys,
    })
}

/// Merge, write the persistent copy, and mirror it to `/etc` when writable.
///
/// # Errors
/// Returns error if no source exists or the persistent copy cannot be written.
pub fn merge_led_config(
    host: &Host,
    paths: &HostPaths,
    layout: &PersistLayout,
    mode: FsMode,
) -> Result<MergeResult> {
    let persistent = read_optional(&layout.led_config())?;
    let system = read_optional(&paths.etc_led_config())?;
    let template = read_optional(&layout.repo_config_template())?;

    if host.is_dry_run() && persistent.is_none() && system.is_none() && template.is_none() {
        tracing::info!("[dry-run] would create ugreen-leds.conf from the repository template");
        return Ok(MergeResult {
            config: LedConfig::default(),
            base: ConfigBase::Template,
            added_keys: Vec::new(),
        });
    }

    let result = merge_sources(persistent.as_deref(), system.as_deref(), template.as_deref())?;
    let rendered = result.config.render();

    tracing::info!(
        base = ?result.base,
        added = ?result.added_keys,
        "LED configuration merged"
    );

    if persistent.as_deref() != Some(rendered.as_str()) {
        host.write(&layout.led_config(), rendered.as_bytes())?;
    }

    if !mode.is_read_only() {
        mirror_to_system(host, paths, system.as_deref(), &rendered);
    }

    Ok(result)
}

/// Best effort: copy the merged config to `/etc`, backing up a differing copy.
fn mirror_to_system(host: &Host, paths: &HostPaths, current: Option<&str>, rendered: &str) {
    let target = paths.etc_led_config();
    if current == Some(rendered) {
        return;
    }

    if current.is_some() {
        let stamp = Local::now().format("%Y%m%d%H%M%S");
        let backup = target.with_file_name(format!("ugreen-leds.conf.bak.{stamp}"));
        if let Err(e) = host.copy(&target, &backup) {
            tracing::warn!(error = %e, "Failed to back up existing system config");
            return;
        }
        tracing::info!(path = %backup.display(), "Backed up system config");
    }

    if let Err(e) = host.write(&target, rendered.as_bytes()) {
        tracing::warn!(error = %e, "Failed to mirror config to /etc");
    }
}
