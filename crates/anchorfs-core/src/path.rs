//! Validated absolute paths into the backing filesystem.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reasons a string is rejected as an [`InternalPath`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path does not start with `/`.
    #[error("Path must be absolute: {0}")]
    NotAbsolute(String),

    /// The path contains an empty, `.` or `..` component.
    #[error("Path contains an invalid component: {0}")]
    InvalidComponent(String),

    /// The path contains a NUL byte.
    #[error("Path contains a NUL byte")]
    ContainsNul,

    /// The path is not valid UTF-8.
    #[error("Path is not valid UTF-8: {0}")]
    NotUtf8(String),
}

/// An absolute, slash-separated path identifying a location in the backing
/// filesystem.
///
/// Every `InternalPath` is normalized on construction: it starts with `/`,
/// contains no empty, `.` or `..` components, and has no trailing slash
/// (except for the root itself). Callers can therefore walk
/// [`components`](Self::components) without re-validating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InternalPath(String);

impl InternalPath {
    /// Validate and wrap a path string.
    pub fn new(path: impl Into<String>) -> Result<Self, PathError> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(PathError::NotAbsolute(path));
        }
        if path.contains('\0') {
            return Err(PathError::ContainsNul);
        }

        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        for component in trimmed[1..].split('/') {
            if component.is_empty() || component == "." || component == ".." {
                return Err(PathError::InvalidComponent(path));
            }
        }

        Ok(Self(trimmed.to_string()))
    }

    /// The filesystem root `/`.
    pub fn root() -> Self {
        Self("/".to_string())
    }

    /// Check if this is the filesystem root.
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Get the path as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the path as a std path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    /// Iterate over the components of the path, root excluded.
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|c| !c.is_empty())
    }

    /// Number of components below the root.
    pub fn depth(&self) -> usize {
        self.components().count()
    }

    /// The final component, or `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    /// The parent directory, or `None` for the root.
    pub fn parent(&self) -> Option<InternalPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) => Some(Self::root()),
            Some(idx) => Some(Self(self.0[..idx].to_string())),
            None => None,
        }
    }

    /// Append a single component to this path.
    pub fn join(&self, name: &str) -> Result<InternalPath, PathError> {
        if name.contains('/') || name.is_empty() || name == "." || name == ".." {
            return Err(PathError::InvalidComponent(name.to_string()));
        }
        if name.contains('\0') {
            return Err(PathError::ContainsNul);
        }
        if self.is_root() {
            Ok(Self(format!("/{name}")))
        } else {
            Ok(Self(format!("{}/{name}", self.0)))
        }
    }

    /// Replace the final component.
    pub fn with_file_name(&self, name: &str) -> Result<InternalPath, PathError> {
        match self.parent() {
            Some(parent) => parent.join(name),
            None => Err(PathError::InvalidComponent(name.to_string())),
        }
    }

    /// Component-wise prefix check; `/a/b` starts with `/a` but not with `/a/bc`.
    pub fn starts_with(&self, other: &InternalPath) -> bool {
        if other.is_root() {
            return true;
        }
        self.0 == other.0
            || (self.0.starts_with(&other.0) && self.0.as_bytes().get(other.0.len()) == Some(&b'/'))
    }

    /// Convert into a std path buffer.
    pub fn to_path_buf(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl fmt::Display for InternalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InternalPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for InternalPath {
    type Error = PathError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&Path> for InternalPath {
    type Error = PathError;

    fn try_from(value: &Path) -> Result<Self, Self::Error> {
        match value.to_str() {
            Some(path) => Self::new(path),
            None => Err(PathError::NotUtf8(value.to_string_lossy().into_owned())),
        }
    }
}

impl From<InternalPath> for String {
    fn from(value: InternalPath) -> Self {
        value.0
    }
}

impl AsRef<Path> for InternalPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}
