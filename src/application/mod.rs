//! Application layer - use cases and orchestration.
//!
//! This layer resolves the persistent directory, reconciles the module
//! version and drives install, uninstall and status reporting.

pub mod config_merge;
pub mod discovery;
pub mod formatter;
pub mod installer;
pub mod persist_resolver;
pub mod reconciler;
pub mod status;
pub mod uninstaller;

pub use formatter::{format_install_summary, format_status_table, format_uninstall_summary};
pub use installer::{InstallContext, Installer};
pub use persist_resolver::{
    check_mount_prefix, prepare_directory, resolve, Resolution, ResolveRequest,
};
pub use status::collect_status;
pub use uninstaller::Uninstaller;
