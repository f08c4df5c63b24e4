//! Errors that stop a task as a whole.

use anchorfs_core::FsError;
use thiserror::Error;

use crate::access::Permission;

/// Failures of a task rather than of a single item.
///
/// Per-item filesystem errors never surface here; they are counted in
/// [`TaskComplete::failed`](crate::TaskComplete::failed).
#[derive(Debug, Error)]
pub enum TaskError {
    /// No handler accepts the operation and request.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    /// The request does not decode into the expected shape.
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] serde_json::Error),

    /// The caller may not touch one of the input paths.
    #[error("Permission denied: no {permission} access to {path}")]
    PermissionDenied { path: String, permission: Permission },

    /// A step that the whole task depends on failed.
    #[error(transparent)]
    Fs(#[from] FsError),

    /// Cancelled before any work started.
    #[error("Task was cancelled")]
    Cancelled,

    /// A worker died while processing an item.
    #[error("Task aborted: {0}")]
    Aborted(String),
}

impl TaskError {
    /// Create a permission denied error.
    pub fn permission_denied(path: impl ToString, permission: Permission) -> Self {
        Self::PermissionDenied {
            path: path.to_string(),
            permission,
        }
    }
}
