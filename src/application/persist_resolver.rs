//! Persistent directory resolution.
//!
//! An ordered chain of strategies, each of which may produce a directory.
//! The first strategy that answers wins; later ones are not consulted.

use std::path::{Path, PathBuf};

use crate::domain::{AppError, Result};
use crate::infrastructure::{ensure_writable, Host};

/// Which rule produced the persistent directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirSource {
    PersistDirFlag,
    PoolPath,
    InsideTarget,
    Sibling,
    CurrentDirFlag,
    Prompt,
    Default,
}

impl DirSource {
    /// Whether the operator named the location on the command line.
    #[must_use]
    pub const fn is_explicit(self) -> bool {
        matches!(self, Self::PersistDirFlag | Self::PoolPath)
    }
}

impl std::fmt::Display for DirSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::PersistDirFlag => "--persist-dir",
            Self::PoolPath => "--pool-path",
            Self::InsideTarget => "current directory",
            Self::Sibling => "existing directory",
            Self::CurrentDirFlag => "--use-current-dir",
            Self::Prompt => "prompt",
            Self::Default => "default",
        };
        f.write_str(label)
    }
}

/// Resolved persistent directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: PathBuf,
    pub source: DirSource,
}

/// Asks the operator for a directory, given the proposed default.
pub type Prompt<'a> = &'a dyn Fn(&Path) -> Option<PathBuf>;

/// Inputs to the strategy chain.
pub struct ResolveRequest<'a> {
    pub persist_dir: Option<&'a Path>,
    pub pool_path: Option<&'a Path>,
    pub use_current_dir: bool,
    pub cwd: &'a Path,
    pub dir_name: &'a str,
    /// Present only when prompting is allowed (terminal and no `--yes`).
    pub prompt: Option<Prompt<'a>>,
}

impl ResolveRequest<'_> {
    fn default_dir(&self) -> PathBuf {
        self.cwd.join(self.dir_name)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        }
    }
}

type Strategy = fn(&ResolveRequest<'_>) -> Option<PathBuf>;

/// Strategies in priority order.
const STRATEGIES: &[(DirSource, Strategy)] = &[
    (DirSource::PersistDirFlag, from_persist_dir_flag),
    (DirSource::PoolPath, from_pool_path),
    (DirSource::InsideTarget, from_inside_target),
    (DirSource::Sibling, from_sibling),
    (DirSource::CurrentDirFlag, from_current_dir_flag),
    (DirSource::Prompt, from_prompt),
    (DirSource::Default, from_default),
];

fn from_persist_dir_flag(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    r.persist_dir.map(|p| r.absolute(p))
}

fn from_pool_path(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    r.pool_path.map(|p| r.absolute(p).join(r.dir_name))
}

fn from_inside_target(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    (r.cwd.file_name()? == r.dir_name).then(|| r.cwd.to_path_buf())
}

fn from_sibling(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    let candidate = r.default_dir();
    candidate.is_dir().then_some(candidate)
}

fn from_current_dir_flag(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    r.use_current_dir.then(|| r.cwd.to_path_buf())
}

fn from_prompt(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    let prompt = r.prompt?;
    let default = r.default_dir();
    let answer = prompt(&default);
    Some(answer.map_or(default, |path| r.absolute(&path)))
}

fn from_default(r: &ResolveRequest<'_>) -> Option<PathBuf> {
    Some(r.default_dir())
}

/// Run the strategy chain.
#[must_use]
pub fn resolve(request: &ResolveRequest<'_>) -> Resolution {
    for (source, strategy) in STRATEGIES {
        if let Some(path) = strategy(request) {
            tracing::debug!(%source, path = %path.display(), "Persistent directory resolved");
            return Resolution {
                path,
                source: *source,
            };
        }
    }

    // Unreachable in practice: the default strategy always answers.
    Resolution {
        path: request.default_dir(),
        source: DirSource::Default,
    }
}

/// Enforce the mount prefix for directories derived from the working directory.
///
/// Explicit locations outside the prefix only produce a warning.
///
/// # Errors
/// Returns a precondition error for a derived location outside `mount_prefix`.
pub fn check_mount_prefix(resolution: &Resolution, mount_prefix: &Path) -> Result<()> {
    if resolution.path.starts_with(mount_prefix) {
        return Ok(());
    }

    if resolution.source.is_explicit() {
        tracing::warn!(
            path = %resolution.path.display(),
            prefix = %mount_prefix.display(),
            "Persistent directory is outside the pool mount prefix and may not survive updates"
        );
        Ok(())
    } else {
        Err(AppError::Precondition {
            message: format!(
                "Persistent directory {} is not under {}. Run from a pool dataset or pass --persist-dir/--pool-path",
                resolution.path.display(),
                mount_prefix.display()
            ),
        })
    }
}

/// Create the directory if needed and make sure it is writable.
///
/// # Errors
/// Returns a permission error if the directory cannot be created or written.
pub fn prepare_directory(host: &Host, path: &Path) -> Result<()> {
    host.create_dir_all(path)?;
    if path.is_dir() {
        ensure_writable(path)?;
    }
    Ok(())
}
