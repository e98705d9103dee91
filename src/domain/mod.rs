//! Domain layer - core installer types.
//!
//! This layer contains pure models, configuration and error types
//! without any external dependencies (network, processes, etc.).

pub mod config;
pub mod error;
pub mod led_config;
pub mod models;

pub use config::{InstallerConfig, NetworkConfig, RepositoryConfig};
pub use error::{AppError, Result};
pub use led_config::LedConfig;
pub use models::{
    CodenameTable, FsMode, ModuleLocation, ModuleSource, OsVersion, PersistLayout, VersionState,
    LOADED_MODULE_NAME, MODULE_DEPENDENCIES, MODULE_FILE, MODULE_NAME, UNIT_PREFIX,
};
