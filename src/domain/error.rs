//! Domain-level error types for ugreen-leds-installer.
//!
//! All errors are typed with `thiserror` and carry enough context for an
//! operator to act on them without reading the source.

use std::path::PathBuf;
use thiserror::Error;

/// Installer errors. Every variant aborts the run with exit code 1.
#[derive(Error, Debug)]
pub enum AppError {
    /// Environment precondition not met (not root, wrong mount prefix, ...).
    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    /// Remote repository could not be reached or answered unexpectedly.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// A path is not writable and could not be made writable.
    #[error("Permission denied for {}: {message}", path.display())]
    Permission { path: PathBuf, message: String },

    /// An external program failed to start or exited unsuccessfully.
    #[error("Command `{program}` failed: {message}")]
    Command {
        program: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration or environment error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Unexpected content in a file or a remote listing.
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {message}")]
    JsonParse {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    /// IO operation failed.
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },
}

impl AppError {
    /// Create a JSON parse error.
    pub fn json_parse(err: serde_json::Error) -> Self {
        Self::JsonParse {
            message: err.to_string(),
            source: Some(err),
        }
    }

    /// Create an IO error with context.
    pub fn io(message: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(err),
        }
    }

    /// Create a network error from a reqwest failure.
    pub fn network(message: impl Into<String>, err: reqwest::Error) -> Self {
        Self::Network {
            message: format!("{}: {err}", message.into()),
            source: Some(err),
        }
    }

    /// Create a command error for a program that ran but failed.
    pub fn command(program: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            program: program.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Whether the error came from talking to the remote repository.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

/// Result type alias using `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_message() {
        let err = AppError::command("git", "exit status 128");
        assert_eq!(err.to_string(), "Command `git` failed: exit status 128");
        assert!(!err.is_network());
    }

    #[test]
    fn test_permission_error_mentions_path() {
        let err = AppError::Permission {
            path: PathBuf::from("/mnt/tank/ugreen-leds"),
            message: "directory is not writable".into(),
        };
        assert!(err.to_string().contains("/mnt/tank/ugreen-leds"));
    }
}
