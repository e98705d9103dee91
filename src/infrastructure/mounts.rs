//! Mount table inspection and remount attempts.
//!
//! TrueNAS mounts parts of the root filesystem read-only. Before mirroring
//! files into system paths we check the relevant mount and try to remount it.

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{AppError, FsMode, Result};

use super::host::{Host, HostPaths};

/// One line of `/proc/mounts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub device: String,
    pub mount_point: PathBuf,
    pub fs_type: String,
    pub options: Vec<String>,
}

impl MountEntry {
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.options.iter().any(|o| o == "ro")
    }
}

/// Parse `/proc/mounts` content. Malformed lines are skipped.
#[must_use]
pub fn parse_mounts(content: &str) -> Vec<MountEntry> {
    content
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let device = fields.next()?;
            let mount_point = fields.next()?;
            let fs_type = fields.next()?;
            let options = fields.next()?;
            Some(MountEntry {
                device: device.to_string(),
                mount_point: PathBuf::from(unescape_octal(mount_point)),
                fs_type: fs_type.to_string(),
                options: options.split(',').map(str::to_string).collect(),
            })
        })
        .collect()
}

/// The mount responsible for `target`: longest matching mount point, last one wins on ties.
#[must_use]
pub fn find_mount<'a>(entries: &'a [MountEntry], target: &Path) -> Option<&'a MountEntry> {
    entries
        .iter()
        .filter(|e| target.starts_with(&e.mount_point))
        .fold(None, |best: Option<&MountEntry>, e| match best {
            Some(b) if b.mount_point.components().count() > e.mount_point.components().count() => {
                Some(b)
            }
            _ => Some(e),
        })
}

/// `/proc/mounts` escapes spaces and tabs as octal sequences.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\'
            && i + 3 < bytes.len()
            && bytes[i + 1..i + 4].iter().all(u8::is_ascii_digit)
        {
            let digits = &field[i + 1..i + 4];
            if let Ok(value) = u8::from_str_radix(digits, 8) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

/// Decide the filesystem mode for this run, remounting read-write if needed.
///
/// # Errors
/// Returns error if the mount table cannot be read.
pub fn prepare_filesystem(host: &Host, paths: &HostPaths, target: &Path) -> Result<FsMode> {
    let mounts_path = paths.proc_mounts();
    let content = fs::read_to_string(&mounts_path).map_err(|e| {
        AppError::io(format!("Failed to read {}", mounts_path.display()), e)
    })?;
    let entries = parse_mounts(&content);

    let Some(entry) = find_mount(&entries, target) else {
        tracing::warn!(path = %target.display(), "No mount entry found, assuming writable");
        return Ok(FsMode::Writable);
    };

    if !entry.is_read_only() {
        tracing::info!(mount = %entry.mount_point.display(), "Filesystem is writable");
        return Ok(FsMode::Writable);
    }

    let mount_point = entry.mount_point.to_string_lossy().to_string();
    tracing::info!(mount = %mount_point, "Filesystem is read-only, attempting remount");

    if host.is_dry_run() {
        host.run("mount", &["-o", "remount,rw", mount_point.as_str()])?;
        tracing::info!("[dry-run] assuming read-only mode");
        return Ok(FsMode::ReadOnly);
    }

    match host.run("mount", &["-o", "remount,rw", mount_point.as_str()]) {
        Ok(output) if output.success => {
            tracing::info!(mount = %mount_point, "Remounted read-write");
            Ok(FsMode::Writable)
        }
        Ok(output) => {
            tracing::warn!(
                mount = %mount_point,
                stderr = %output.stderr.trim(),
                "Remount failed, continuing in read-only mode"
            );
            Ok(FsMode::ReadOnly)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Remount failed, continuing in read-only mode");
            Ok(FsMode::ReadOnly)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const MOUNTS: &str = "\
boot-pool/ROOT/24.10.2 / zfs rw,relatime,xattr,noacl 0 0
boot-pool/ROOT/24.10.2/usr /usr zfs ro,relatime,xattr,noacl 0 0
boot-pool/ROOT/24.10.2/var /var zfs rw,relatime 0 0
tank /mnt/tank zfs rw,xattr,posixacl 0 0
tank/my\\040data /mnt/tank/my\\040data zfs rw 0 0
";

    #[test]
    fn test_parse_and_find_mount() {
        let entries = parse_mounts(MOUNTS);
        assert_eq!(entries.len(), 5);

        let usr = find_mount(&entries, Path::new("/usr/bin")).unwrap();
        assert_eq!(usr.mount_point, PathBuf::from("/usr"));
        assert!(usr.is_read_only());

        let etc = find_mount(&entries, Path::new("/etc")).unwrap();
        assert_eq!(etc.mount_point, PathBuf::from("/"));
        assert!(!etc.is_read_only());

        // Component-wise prefix: /usrlocal is not under /usr.
        let other = find_mount(&entries, Path::new("/usrlocal")).unwrap();
        assert_eq!(other.mount_point, PathBuf::from("/"));
    }

    #[test]
    fn test_escaped_mount_point() {
        let entries = parse_mounts(MOUNTS);
        let data = find_mount(&entries, Path::new("/mnt/tank/my data/x")).unwrap();
        assert_eq!(data.mount_point, PathBuf::from("/mnt/tank/my data"));
    }

    #[test]
    fn test_writable_mount_needs_no_remount() {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path());
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::write(paths.proc_mounts(), MOUNTS).unwrap();

        let host = Host::new(false);
        let mode = prepare_filesystem(&host, &paths, Path::new("/var/lib")).unwrap();
        assert_eq!(mode, FsMode::Writable);
        assert!(host.actions().is_empty());
    }

    #[test]
    fn test_read_only_mount_in_dry_run() {
        let dir = tempdir().unwrap();
        let paths = HostPaths::rooted(dir.path());
        fs::create_dir_all(dir.path().join("proc")).unwrap();
        fs::write(paths.proc_mounts(), MOUNTS).unwrap();

        let host = Host::new(true);
        let mode = prepare_filesystem(&host, &paths, Path::new("/usr")).unwrap();
        assert_eq!(mode, FsMode::ReadOnly);
        assert_eq!(host.actions().len(), 1);
    }
}
