//! Stat snapshots, conflict policies and single-entry outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::path::InternalPath;

const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;

/// Type of a filesystem entry as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    File,
    Directory,
}

/// A fresh snapshot of an entry's metadata. Never cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time in milliseconds since the Unix epoch.
    pub modified_at: i64,
    /// File or directory.
    pub file_type: FileType,
    /// Owning user id.
    pub owner_uid: u32,
    /// Owning group id.
    pub owner_gid: u32,
    /// Raw POSIX mode, type bits included.
    pub mode: u32,
    /// Confidentiality label, when the filesystem carries one.
    pub sensitivity: Option<String>,
}

impl FileStat {
    /// Modification time as a UTC timestamp.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.modified_at)
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        self.file_type == FileType::Directory
    }

    /// Check if the mode bits describe a regular file.
    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Permission bits only.
    pub fn permissions(&self) -> u32 {
        self.mode & 0o7777
    }
}

/// What to do when a destination already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteConflictPolicy {
    /// Pick a fresh name such as `file(1).txt`.
    #[default]
    Rename,
    /// Fail with `AlreadyExists`.
    Reject,
    /// Overwrite the existing entry.
    Replace,
    /// Merge directories into an existing one, rename files.
    MergeRename,
}

impl WriteConflictPolicy {
    /// Check if this policy may fall back to a generated name.
    pub fn allows_rename(&self) -> bool {
        matches!(self, Self::Rename | Self::MergeRename)
    }
}

/// Outcome of copying a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyResult {
    /// A regular file was written.
    CreatedFile,
    /// A directory was created (or merged into); its children still need copying.
    CreatedDirectory(InternalPath),
    /// The source was neither a file nor a directory.
    NothingToCreate,
}

/// Outcome of moving a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveResult {
    /// The source directory was merged into an existing destination and its
    /// children must be moved individually.
    pub needs_to_recurse: bool,
}

/// Generate the `attempt`-th alternative for `name`.
///
/// `report.pdf` becomes `report(1).pdf`; names without an extension, or
/// dotfiles such as `.bashrc`, get the counter appended.
pub fn rename_candidate(name: &str, attempt: u32) -> String {
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{}({attempt}){}", &name[..idx], &name[idx..]),
        _ => format!("{name}({attempt})"),
    }
}
