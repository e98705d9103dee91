//! Infrastructure layer - external adapters (processes, filesystem, network).
//!
//! This layer handles all I/O operations and external dependencies.

pub mod config;
pub mod git;
pub mod github;
pub mod host;
pub mod kernel_module;
pub mod mounts;
pub mod network;
pub mod systemd;
pub mod truenas;

pub use config::{ensure_config_exists, load_config, load_config_from_file};
pub use github::GithubClient;
pub use host::{ensure_writable, Host, HostPaths};
pub use systemd::{ServiceStatus, SystemdService};
