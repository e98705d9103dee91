//! Host access: system paths and a dry-run aware executor.
//!
//! Every mutation of the machine (file writes, deletions, state-changing
//! commands) goes through [`Host`]. In dry-run mode the executor only logs and
//! records what it would do. Read-only queries always run.

use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::NamedTempFile;

use crate::domain::{AppError, Result};

/// Well-known system locations, optionally rooted elsewhere for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPaths {
    root: PathBuf,
}

impl Default for HostPaths {
    fn default() -> Self {
        Self::rooted("/")
    }
}

impl HostPaths {
    /// Paths relative to `root` instead of `/`.
    #[must_use]
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn at(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Map an absolute system path into this root.
    #[must_use]
    pub fn resolve(&self, absolute: &Path) -> PathBuf {
        absolute
            .strip_prefix("/")
            .map_or_else(|_| absolute.to_path_buf(), |rel| self.root.join(rel))
    }

    #[must_use]
    pub fn os_version_file(&self) -> PathBuf {
        self.at("etc/version")
    }

    #[must_use]
    pub fn etc_led_config(&self) -> PathBuf {
        self.at("etc/ugreen-leds.conf")
    }

    #[must_use]
    pub fn modules_load_conf(&self) -> PathBuf {
        self.at("etc/modules-load.d/ugreen-led.conf")
    }

    #[must_use]
    pub fn systemd_unit_dir(&self) -> PathBuf {
        self.at("etc/systemd/system")
    }

    #[must_use]
    pub fn usr_bin(&self) -> PathBuf {
        self.at("usr/bin")
    }

    /// `extra` directory of the running kernel's module tree.
    #[must_use]
    pub fn modules_extra_dir(&self, kernel_release: &str) -> PathBuf {
        self.at("lib/modules").join(kernel_release).join("extra")
    }

    #[must_use]
    pub fn proc_mounts(&self) -> PathBuf {
        self.at("proc/mounts")
    }

    #[must_use]
    pub fn sys_class_net(&self) -> PathBuf {
        self.at("sys/class/net")
    }
}

/// A change the executor made, or would have made in dry-run mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Run { program: String, args: Vec<String> },
    Write(PathBuf),
    Copy { from: PathBuf, to: PathBuf },
    CreateDir(PathBuf),
    Remove(PathBuf),
    MakeExecutable(PathBuf),
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Run { program, args } => write!(f, "run `{program} {}`", args.join(" ")),
            Self::Write(path) => write!(f, "write {}", path.display()),
            Self::Copy { from, to } => write!(f, "copy {} -> {}", from.display(), to.display()),
            Self::CreateDir(path) => write!(f, "create directory {}", path.display()),
            Self::Remove(path) => write!(f, "remove {}", path.display()),
            Self::MakeExecutable(path) => write!(f, "chmod 0755 {}", path.display()),
        }
    }
}

/// Captured result of an external program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    fn planned() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }
}

/// Executes host mutations, or only records them in dry-run mode.
#[derive(Debug, Default)]
pub struct Host {
    dry_run: bool,
    journal: RefCell<Vec<Action>>,
}

impl Host {
    #[must_use]
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            journal: RefCell::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Every action taken (or planned) so far.
    #[must_use]
    pub fn actions(&self) -> Vec<Action> {
        self.journal.borrow().clone()
    }

    /// Record the action; returns `true` when it should actually be performed.
    fn record(&self, action: Action) -> bool {
        if self.dry_run {
            tracing::info!("[dry-run] would {action}");
        } else {
            tracing::debug!("{action}");
        }
        self.journal.borrow_mut().push(action);
        !self.dry_run
    }

    /// Run a state-changing command. Non-zero exit is reported, not raised.
    ///
    /// # Errors
    /// Returns error if the program cannot be started.
    pub fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let action = Action::Run {
            program: program.to_string(),
            args: args.iter().map(ToString::to_string).collect(),
        };
        if !self.record(action) {
            return Ok(CommandOutput::planned());
        }
        execute(program, args)
    }

    /// Run a state-changing command and fail on non-zero exit.
    ///
    /// # Errors
    /// Returns error if the program cannot be started or exits unsuccessfully.
    pub fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(program, args)?;
        if output.success {
            Ok(output)
        } else {
            Err(AppError::command(
                format!("{program} {}", args.join(" ")),
                output.stderr.trim().to_string(),
            ))
        }
    }

    /// Run a read-only command. Executes even in dry-run mode.
    ///
    /// # Errors
    /// Returns error if the program cannot be started.
    pub fn query(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::trace!(program, ?args, "query");
        execute(program, args)
    }

    /// Create a directory and its parents.
    ///
    /// # Errors
    /// Returns error if the directory cannot be created.
    pub fn create_dir_all(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            return Ok(());
        }
        if self.record(Action::CreateDir(path.to_path_buf())) {
            fs::create_dir_all(path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::PermissionDenied {
                    AppError::Permission {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    }
                } else {
                    AppError::io(format!("Failed to create {}", path.display()), e)
                }
            })?;
        }
        Ok(())
    }

    /// Write a file in place.
    ///
    /// # Errors
    /// Returns error if the file cannot be written.
    pub fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if self.record(Action::Write(path.to_path_buf())) {
            fs::write(path, contents)
                .map_err(|e| AppError::io(format!("Failed to write {}", path.display()), e))?;
        }
        Ok(())
    }

    /// Replace a file atomically: write a sibling temp file, then rename.
    ///
    /// # Errors
    /// Returns error if the temp file cannot be written or renamed.
    pub fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if !self.record(Action::Write(path.to_path_buf())) {
            return Ok(());
        }

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)
            .map_err(|e| AppError::io(format!("Failed to create temp file in {}", dir.display()), e))?;
        tmp.write_all(contents)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| AppError::io(format!("Failed to write temp file for {}", path.display()), e))?;
        tmp.persist(path)
            .map_err(|e| AppError::io(format!("Failed to replace {}", path.display()), e.error))?;
        Ok(())
    }

    /// Copy a file, overwriting the destination.
    ///
    /// # Errors
    /// Returns error if the copy fails.
    pub fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let action = Action::Copy {
            from: from.to_path_buf(),
            to: to.to_path_buf(),
        };
        if self.record(action) {
            fs::copy(from, to).map_err(|e| {
                AppError::io(
                    format!("Failed to copy {} to {}", from.display(), to.display()),
                    e,
                )
            })?;
        }
        Ok(())
    }

    /// Set mode 0755 on a file.
    ///
    /// # Errors
    /// Returns error if permissions cannot be changed.
    pub fn make_executable(&self, path: &Path) -> Result<()> {
        if self.record(Action::MakeExecutable(path.to_path_buf())) {
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
                AppError::io(format!("Failed to chmod {}", path.display()), e)
            })?;
        }
        Ok(())
    }

    /// Remove a file or directory tree if it exists.
    ///
    /// # Errors
    /// Returns error if the path exists but cannot be removed.
    pub fn remove(&self, path: &Path) -> Result<()> {
        let Ok(meta) = fs::symlink_metadata(path) else {
            return Ok(());
        };
        if !self.record(Action::Remove(path.to_path_buf())) {
            return Ok(());
        }
        let result = if meta.is_dir() {
            fs::remove_dir_all(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| AppError::io(format!("Failed to remove {}", path.display()), e))
    }
}

fn execute(program: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| AppError::Command {
            program: program.to_string(),
            message: "could not be started".into(),
            source: Some(e),
        })?;

    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Check that a directory accepts new files.
///
/// # Errors
/// Returns a permission error if a probe file cannot be created.
pub fn ensure_writable(dir: &Path) -> Result<()> {
    NamedTempFile::new_in(dir)
        .map(drop)
        .map_err(|e| AppError::Permission {
            path: dir.to_path_buf(),
            message: format!("directory is not writable ({e})"),
        })
}
