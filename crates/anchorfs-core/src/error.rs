//! Error types for filesystem operations.

use std::io;

use thiserror::Error;

use crate::path::PathError;

/// Result alias used throughout the filesystem layer.
pub type FsResult<T> = Result<T, FsError>;

/// Errors surfaced by the filesystem layer.
///
/// Every native failure is translated into one of these kinds before it
/// leaves the backend. Nothing is retried.
#[derive(Debug, Error)]
pub enum FsError {
    /// A path component, or the target itself, does not exist or is a symlink.
    #[error("Not found: {path}")]
    NotFound { path: String },

    /// The destination already exists and must not be overwritten.
    #[error("Already exists: {path}")]
    AlreadyExists { path: String },

    /// Structurally invalid operation.
    #[error("Bad request at {path}: {reason}")]
    BadRequest { path: String, reason: String },

    /// Unmapped OS error code.
    #[error("Native error {code} at {path}")]
    Native { path: String, code: i32 },

    /// The supplied path could not be parsed.
    #[error(transparent)]
    InvalidPath(#[from] PathError),
}

impl FsError {
    /// Create a not-found error.
    pub fn not_found(path: impl ToString) -> Self {
        Self::NotFound {
            path: path.to_string(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(path: impl ToString) -> Self {
        Self::AlreadyExists {
            path: path.to_string(),
        }
    }

    /// Create a bad-request error.
    pub fn bad_request(path: impl ToString, reason: impl Into<String>) -> Self {
        Self::BadRequest {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// Translate a raw OS error code.
    #[cfg(unix)]
    pub fn from_errno(path: impl ToString, code: i32) -> Self {
        match code {
            libc::ENOENT | libc::ELOOP | libc::ENOTDIR => Self::not_found(path),
            libc::EEXIST => Self::already_exists(path),
            libc::EISDIR => Self::bad_request(path, "target is a directory"),
            libc::ENOTEMPTY => Self::bad_request(path, "directory is not empty"),
            _ => Self::Native {
                path: path.to_string(),
                code,
            },
        }
    }

    /// Translate a std I/O error.
    pub fn from_io(path: impl ToString, err: io::Error) -> Self {
        #[cfg(unix)]
        {
            if let Some(code) = err.raw_os_error() {
                return Self::from_errno(path, code);
            }
        }

        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Self::not_found(path),
            io::ErrorKind::AlreadyExists => Self::already_exists(path),
            io::ErrorKind::IsADirectory => Self::bad_request(path, "target is a directory"),
            io::ErrorKind::DirectoryNotEmpty => Self::bad_request(path, "directory is not empty"),
            _ => Self::Native {
                path: path.to_string(),
                code: err.raw_os_error().unwrap_or(-1),
            },
        }
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this is an already-exists error.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Check if this is a bad-request error.
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest { .. })
    }

    /// The raw OS code for unmapped native errors.
    pub fn native_code(&self) -> Option<i32> {
        match self {
            Self::Native { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<FsError> for io::Error {
    fn from(err: FsError) -> Self {
        let kind = match &err {
            FsError::NotFound { .. } => io::ErrorKind::NotFound,
            FsError::AlreadyExists { .. } => io::ErrorKind::AlreadyExists,
            FsError::BadRequest { .. } | FsError::InvalidPath(_) => io::ErrorKind::InvalidInput,
            FsError::Native { code, .. } => return io::Error::from_raw_os_error(*code),
        };
        io::Error::new(kind, err)
    }
}
