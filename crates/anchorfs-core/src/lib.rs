//! Core types and errors for anchorfs.
//!
//! This crate provides the value types shared by every layer of the
//! anchorfs workspace: validated internal paths, stat snapshots, conflict
//! policies, the filesystem error taxonomy and backend configuration.

mod config;
mod error;
mod path;
mod stat;

pub use config::{BackendKind, FsConfig, FsConfigBuilder};
pub use config::{
    DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE, DEFAULT_OWNER_UID, POOL_BUFFER_SIZE, POOL_CAPACITY,
    SENSITIVITY_XATTR,
};
pub use error::{FsError, FsResult};
pub use path::{InternalPath, PathError};
pub use stat::{CopyResult, FileStat, FileType, MoveResult, WriteConflictPolicy, rename_candidate};
