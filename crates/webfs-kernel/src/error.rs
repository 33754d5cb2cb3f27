//! Filesystem error types.

use thiserror::Error;
use webfs_types::{NtStatus, OpId};

/// Error raised inside a filesystem implementation.
///
/// Every variant has a fixed status code; the driver boundary only ever sees
/// the [`NtStatus`].
#[derive(Debug, Error)]
pub enum FsError {
    /// File or directory not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A parent directory of the path is missing.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// Path already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Expected a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// Expected a file.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),

    /// Path escapes the root or has an empty component where one is required.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// The write or resize would exceed the volume capacity.
    #[error("disk full: {0}")]
    DiskFull(String),

    /// A call referenced a handle with no open context.
    #[error("no open context for {0}")]
    NoContext(OpId),

    #[error("not implemented")]
    NotImplemented,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::NotFound(path.into())
    }

    pub fn path_not_found(path: impl Into<String>) -> Self {
        Self::PathNotFound(path.into())
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists(path.into())
    }

    pub fn access_denied(path: impl Into<String>) -> Self {
        Self::AccessDenied(path.into())
    }

    pub fn not_a_directory(path: impl Into<String>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn is_a_directory(path: impl Into<String>) -> Self {
        Self::IsADirectory(path.into())
    }

    pub fn directory_not_empty(path: impl Into<String>) -> Self {
        Self::DirectoryNotEmpty(path.into())
    }

    pub fn invalid_path(path: impl Into<String>) -> Self {
        Self::InvalidPath(path.into())
    }

    pub fn disk_full(path: impl Into<String>) -> Self {
        Self::DiskFull(path.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// The status code reported for this error.
    pub fn status(&self) -> NtStatus {
        match self {
            FsError::NotFound(_) => NtStatus::ObjectNameNotFound,
            FsError::PathNotFound(_) => NtStatus::ObjectPathNotFound,
            FsError::AlreadyExists(_) => NtStatus::ObjectNameCollision,
            FsError::AccessDenied(_) => NtStatus::AccessDenied,
            FsError::NotADirectory(_) => NtStatus::NotADirectory,
            FsError::IsADirectory(_) => NtStatus::FileIsADirectory,
            FsError::DirectoryNotEmpty(_) => NtStatus::DirectoryNotEmpty,
            FsError::InvalidPath(_) => NtStatus::InvalidParameter,
            FsError::DiskFull(_) => NtStatus::DiskFull,
            FsError::NoContext(_) => NtStatus::Unsuccessful,
            FsError::NotImplemented => NtStatus::NotImplemented,
            FsError::Other(_) => NtStatus::Unsuccessful,
        }
    }
}

impl From<FsError> for NtStatus {
    fn from(e: FsError) -> Self {
        e.status()
    }
}

/// Result type used inside filesystem implementations.
pub type FsErrorResult<T> = Result<T, FsError>;
