//! Error taxonomy shared by every workspace operation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable, caller-visible classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Identity required by the requested scope is absent.
    MissingContext,
    /// Name collision on create.
    AlreadyExists,
    /// Workspace, path, or checkpoint absent.
    NotFound,
    /// Path exists but is not a directory.
    NotADirectory,
    /// Path exists but is not a file.
    NotAFile,
    /// Directory still has entries.
    DirectoryNotEmpty,
    /// Malformed path input.
    InvalidPath,
    /// Malformed non-path input.
    InvalidArgument,
    /// A consistent snapshot could not be captured.
    SnapshotFailed,
    /// A snapshot could not be applied; live state untouched.
    RestoreFailed,
    /// Caller does not own the workspace.
    PermissionDenied,
    /// Backend failure with no narrower classification.
    Storage,
}

impl ErrorKind {
    /// The snake_case wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::MissingContext => "missing_context",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::NotADirectory => "not_a_directory",
            ErrorKind::NotAFile => "not_a_file",
            ErrorKind::DirectoryNotEmpty => "directory_not_empty",
            ErrorKind::InvalidPath => "invalid_path",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::SnapshotFailed => "snapshot_failed",
            ErrorKind::RestoreFailed => "restore_failed",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step of the ordered workspace destruction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestroyStep {
    /// Discarding the workspace's checkpoints.
    Checkpoints,
    /// Deallocating the workspace's storage location.
    Storage,
}

impl fmt::Display for DestroyStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyStep::Checkpoints => f.write_str("checkpoint cleanup"),
            DestroyStep::Storage => f.write_str("storage deallocation"),
        }
    }
}

/// Errors produced by the registry, navigation, checkpoint, and storage layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Required identity absent for the requested scope
    #[error("missing context: {0}")]
    MissingContext(String),
    /// Name already taken
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Workspace, path, or checkpoint not found
    #[error("not found: {0}")]
    NotFound(String),
    /// Path is not a directory
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Path is not a file
    #[error("not a file: {0}")]
    NotAFile(String),
    /// Directory is not empty
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    /// Invalid path format
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Invalid argument
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Snapshot capture failed
    #[error("snapshot failed: {0}")]
    SnapshotFailed(String),
    /// Snapshot restore failed
    #[error("restore failed: {0}")]
    RestoreFailed(String),
    /// Caller does not own the target
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Error from the storage backend
    #[error("storage error: {0}")]
    Storage(String),
    /// A destroy step failed; earlier steps are complete and the workspace is still live
    #[error("destroy stopped at {step}: {source}")]
    Cascade {
        /// The step that failed.
        step: DestroyStep,
        /// The underlying failure.
        source: Box<Error>,
    },
}

impl Error {
    /// Classify this error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingContext(_) => ErrorKind::MissingContext,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::NotADirectory(_) => ErrorKind::NotADirectory,
            Error::NotAFile(_) => ErrorKind::NotAFile,
            Error::DirectoryNotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            Error::InvalidPath(_) => ErrorKind::InvalidPath,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::SnapshotFailed(_) => ErrorKind::SnapshotFailed,
            Error::RestoreFailed(_) => ErrorKind::RestoreFailed,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Cascade { source, .. } => source.kind(),
        }
    }

    /// Map a std I/O error onto the taxonomy.
    ///
    /// Only the virtual path and the error class are kept; host paths never
    /// reach the message.
    pub fn from_io(path: &str, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(path.to_string()),
            std::io::ErrorKind::AlreadyExists => Error::AlreadyExists(path.to_string()),
            std::io::ErrorKind::NotADirectory => Error::NotADirectory(path.to_string()),
            std::io::ErrorKind::IsADirectory => Error::NotAFile(path.to_string()),
            std::io::ErrorKind::DirectoryNotEmpty => Error::DirectoryNotEmpty(path.to_string()),
            kind => Error::Storage(format!("{path}: {kind}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cascade_reports_source_kind() {
        let err = Error::Cascade {
            step: DestroyStep::Storage,
            source: Box::new(Error::Storage("disk gone".to_string())),
        };
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(
            err.to_string(),
            "destroy stopped at storage deallocation: storage error: disk gone"
        );
    }

    #[test]
    fn test_io_mapping_hides_host_detail() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "/var/lib/x");
        let err = Error::from_io("/notes.txt", &io);
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert!(!err.to_string().contains("/var/lib"));

        let io = std::io::Error::from(std::io::ErrorKind::NotFound);
        assert_eq!(Error::from_io("/a", &io).kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&ErrorKind::NotADirectory).unwrap_or_default();
        assert_eq!(json, "\"not_a_directory\"");
        assert_eq!(ErrorKind::PermissionDenied.as_str(), "permission_denied");
    }
}
