//! Permission checks on task inputs.

use std::fmt;

use anchorfs_core::InternalPath;
use serde::{Deserialize, Serialize};

use crate::TaskError;

/// The kind of access an input path needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Decides whether a task may touch a path.
///
/// Checked for every input path before a task mutates anything.
pub trait AccessPolicy: Send + Sync {
    fn check(&self, path: &InternalPath, permission: Permission) -> Result<(), TaskError>;
}

/// Grants everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check(&self, _path: &InternalPath, _permission: Permission) -> Result<(), TaskError> {
        Ok(())
    }
}

/// Grants access below a set of root directories.
///
/// A write root also grants read access.
#[derive(Debug, Clone, Default)]
pub struct RootedAccess {
    read_roots: Vec<InternalPath>,
    write_roots: Vec<InternalPath>,
}

impl RootedAccess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow reading below `root`.
    pub fn with_read_root(mut self, root: InternalPath) -> Self {
        self.read_roots.push(root);
        self
    }

    /// Allow reading and writing below `root`.
    pub fn with_write_root(mut self, root: InternalPath) -> Self {
        self.write_roots.push(root);
        self
    }

    fn covered(roots: &[InternalPath], path: &InternalPath) -> bool {
        roots.iter().any(|root| path.starts_with(root))
    }
}

impl AccessPolicy for RootedAccess {
    fn check(&self, path: &InternalPath, permission: Permission) -> Result<(), TaskError> {
        let allowed = match permission {
            Permission::Read => {
                Self::covered(&self.read_roots, path) || Self::covered(&self.write_roots, path)
            }
            Permission::Write => Self::covered(&self.write_roots, path),
        };

        if allowed {
            Ok(())
        } else {
            Err(TaskError::permission_denied(path, permission))
        }
    }
}
