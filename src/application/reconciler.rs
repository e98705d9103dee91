//! Version marker reconciliation.
//!
//! The marker and the module file form a single-entry cache keyed by OS
//! version. Both are replaced atomically, module first, so an interrupted run
//! can only leave a marker that forces another download.

use std::fs;

use crate::domain::{AppError, OsVersion, PersistLayout, Result, VersionState};
use crate::infrastructure::Host;

/// Version recorded in the marker, if any.
///
/// # Errors
/// Returns error if the marker exists but cannot be read.
pub fn recorded_version(layout: &PersistLayout) -> Result<Option<String>> {
    let marker = layout.version_marker();
    match fs::read_to_string(&marker) {
        Ok(content) => {
            let value = content.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(AppError::io(
            format!("Failed to read version marker {}", marker.display()),
            e,
        )),
    }
}

/// Compare the marker against the running version.
///
/// # Errors
/// Returns error if the marker cannot be read.
pub fn reconcile(layout: &PersistLayout, version: &OsVersion) -> Result<VersionState> {
    let recorded = recorded_version(layout)?;
    let module_present = layout.module_file().is_file();

    let state = match recorded {
        None => VersionState::Missing,
        Some(_) if !module_present => VersionState::Missing,
        Some(recorded) if recorded == version.as_str() => VersionState::UpToDate,
        Some(recorded) => VersionState::Stale { recorded },
    };

    tracing::info!(version = %version, %state, "Module version check");
    Ok(state)
}

/// Store a freshly downloaded module, then record its version.
///
/// # Errors
/// Returns error if either file cannot be replaced.
pub fn commit_module(
    host: &Host,
    layout: &PersistLayout,
    module: &[u8],
    version: &OsVersion,
) -> Result<()> {
    host.write_atomic(&layout.module_file(), module)?;
    host.write_atomic(&layout.version_marker(), format!("{version}\n").as_bytes())?;
    tracing::info!(
        path = %layout.module_file().display(),
        bytes = module.len(),
        %version,
        "Module stored"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_directory_is_missing() {
        let dir = tempdir().unwrap();
        let layout = PersistLayout::new(dir.path().to_path_buf());
        let version = OsVersion::parse("24.10.2").unwrap();
        assert_eq!(reconcile(&layout, &version).unwrap(), VersionState::Missing);
    }

    #[test]
    fn test_unchanged_version_skips_download() {
        let dir = tempdir().unwrap();
        let layout = PersistLayout::new(dir.path().to_path_buf());
        let host = Host::new(false);
        let version = OsVersion::parse("24.10.2").unwrap();

        commit_module(&host, &layout, b"\x7fELF module", &version).unwrap();

        let state = reconcile(&layout, &version).unwrap();
        assert_eq!(state, VersionState::UpToDate);
        assert!(!state.needs_download(false));
    }

    #[test]
    fn test_changed_version_is_stale() {
        let dir = tempdir().unwrap();
        let layout = PersistLayout::new(dir.path().to_path_buf());
        let host = Host::new(false);
        commit_module(&host, &layout, b"module", &OsVersion::parse("24.04.2").unwrap()).unwrap();

        let state = reconcile(&layout, &OsVersion::parse("24.10.0").unwrap()).unwrap();
        assert_eq!(
            state,
            VersionState::Stale {
                recorded: "24.04.2".into()
            }
        );
    }

    #[test]
    fn test_marker_without_module_forces_download() {
        let dir = tempdir().unwrap();
        let layout = PersistLayout::new(dir.path().to_path_buf());
        fs::write(layout.version_marker(), "24.10.2\n").unwrap();

        let state = reconcile(&layout, &OsVersion::parse("24.10.2").unwrap()).unwrap();
        assert_eq!(state, VersionState::Missing);
    }

    #[test]
    fn test_dry_run_commit_writes_nothing() {
        let dir = tempdir().unwrap();
        let layout = PersistLayout::new(dir.path().to_path_buf());
        let host = Host::new(true);
        commit_module(&host, &layout, b"module", &OsVersion::parse("24.10.2").unwrap()).unwrap();
        assert!(!layout.module_file().exists());
        assert!(!layout.version_marker().exists());
    }
}
