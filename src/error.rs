//! Error types for observed-env.
//!
//! All errors are strongly typed using thiserror. The data path has a single
//! error type, [`EnvError`], which is produced by the base environments and
//! passed through the interceptors untouched.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors reported by an environment or one of its writable files.
#[derive(Debug, Error)]
pub enum EnvError {
    #[error("File not found: {}", path.display())]
    NotFound {
        path: PathBuf,
    },

    #[error("File already exists: {}", path.display())]
    AlreadyExists {
        path: PathBuf,
    },

    #[error("Directory not empty: {}", path.display())]
    DirectoryNotEmpty {
        path: PathBuf,
    },

    #[error("File is closed: {}", path.display())]
    Closed {
        path: PathBuf,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
    },

    #[error("Operation not supported: {operation}")]
    NotSupported {
        operation: &'static str,
    },

    #[error("IO error during {operation} on {}: {source}", path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl EnvError {
    /// Maps an OS error onto the environment taxonomy.
    ///
    /// `NotFound` and `AlreadyExists` get their own variants so callers can
    /// match on them without inspecting the IO error kind.
    #[must_use]
    pub fn from_io(operation: &'static str, path: &Path, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                path: path.to_path_buf(),
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists {
                path: path.to_path_buf(),
            },
            _ => Self::Io {
                operation,
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true if the target path did not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the target path already existed.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns true if this wraps a raw OS error.
    #[must_use]
    pub const fn is_io(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

/// Configuration errors raised while building a hooked environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("registry_capacity must be at least {min} (got {actual})")]
    RegistryCapacityTooSmall {
        min: usize,
        actual: usize,
    },

    #[error("Failed to parse configuration: {message}")]
    Parse {
        message: String,
    },
}

/// Result type alias for environment operations.
pub type EnvResult<T> = Result<T, EnvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_io_maps_not_found() {
        let err = EnvError::from_io(
            "delete_file",
            Path::new("/db/000001.log"),
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
        assert!(!err.is_io());
        assert!(format!("{err}").contains("000001.log"));
    }

    #[test]
    fn test_from_io_maps_already_exists() {
        let err = EnvError::from_io(
            "link_file",
            Path::new("CURRENT"),
            io::Error::from(io::ErrorKind::AlreadyExists),
        );
        assert!(err.is_already_exists());
    }

    #[test]
    fn test_from_io_keeps_other_kinds() {
        let err = EnvError::from_io(
            "rename_file",
            Path::new("MANIFEST-000004"),
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(err.is_io());
        let msg = format!("{err}");
        assert!(msg.contains("rename_file"));
        assert!(msg.contains("MANIFEST-000004"));
    }

    #[test]
    fn test_config_error_message() {
        let err = ConfigError::RegistryCapacityTooSmall { min: 1, actual: 0 };
        let msg = format!("{err}");
        assert!(msg.contains("registry_capacity"));
        assert!(msg.contains("got 0"));
    }
}
