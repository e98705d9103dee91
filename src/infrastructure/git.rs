//! Upstream repository checkout via the `git` CLI.

use std::path::Path;

use crate::domain::Result;

use super::host::Host;

/// Clone `url` into `dest`, or refresh an existing clone.
///
/// With `force` an existing clone is deleted and cloned again. Otherwise a
/// fast-forward pull is attempted first; if that fails the clone is replaced.
///
/// # Errors
/// Returns error if the final clone fails.
pub fn sync_repository(host: &Host, url: &str, dest: &Path, force: bool) -> Result<()> {
    let dest_str = dest.to_string_lossy().to_string();

    if dest.join(".git").is_dir() {
        if force {
            tracing::info!(path = %dest.display(), "Removing existing clone (--force)");
        } else {
            let pulled = host.run("git", &["-C", dest_str.as_str(), "pull", "--ff-only"]);
            match pulled {
                Ok(output) if output.success => {
                    tracing::info!(path = %dest.display(), "Repository updated");
                    return Ok(());
                }
                Ok(output) => tracing::warn!(
                    stderr = %output.stderr.trim(),
                    "git pull failed, re-cloning"
                ),
                Err(e) => tracing::warn!(error = %e, "git pull failed, re-cloning"),
            }
        }
        host.remove(dest)?;
    } else if dest.exists() {
        tracing::warn!(path = %dest.display(), "Path exists but is not a git clone, replacing");
        host.remove(dest)?;
    }

    host.run_checked("git", &["clone", "--depth", "1", url, dest_str.as_str()])?;
    tracing::info!(%url, path = %dest.display(), "Repository cloned");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::host::Action;
    use tempfile::tempdir;

    #[test]
    fn test_fresh_clone_in_dry_run() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("ugreen_leds_controller");
        let host = Host::new(true);

        sync_repository(&host, "https://example.invalid/repo.git", &dest, false).unwrap();

        let actions = host.actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            Action::Run { program, args } if program == "git" && args[0] == "clone"
        ));
    }

    #[test]
    fn test_existing_clone_is_pulled() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("repo");
        std::fs::create_dir_all(dest.join(".git")).unwrap();
        let host = Host::new(true);

        sync_repository(&host, "https://example.invalid/repo.git", &dest, false).unwrap();

        let actions = host.actions();
        assert_eq!(actions.len(), 1);
        assert!(matches!(
            &actions[0],
            Action::Run { args, .. } if args.contains(&"pull".to_string())
        ));
    }

    #[test]
    fn test_force_reclones() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("repo");
        std::fs::create_dir_all(dest.join(".git")).unwrap();
        let host = Host::new(true);

        sync_repository(&host, "https://example.invalid/repo.git", &dest, true).unwrap();

        let actions = host.actions();
        assert_eq!(actions[0], Action::Remove(dest.clone()));
        assert!(matches!(&actions[1], Action::Run { args, .. } if args[0] == "clone"));
        assert!(dest.exists());
    }
}
