//! Recursive directory statistics for anchorfs.
//!
//! Some filesystems (CephFS in particular) maintain recursive aggregates on
//! every directory and expose them as virtual extended attributes. Reading
//! those is constant time, so callers use them as hints: sizes for listings,
//! entry counts for deciding how heavy a bulk task is.
//!
//! Every value is an `i64` where [`UNKNOWN`] (`-1`) means the value could not
//! be obtained. Nothing in this crate returns an error.
//!
//! # Example
//!
//! ```rust,no_run
//! use anchorfs_core::{FsConfig, InternalPath};
//! use anchorfs_io::FileSystem;
//! use anchorfs_stats::{DirectoryStats, FallbackDirectoryStats};
//!
//! let fs = FileSystem::new(FsConfig::unprivileged()).unwrap();
//! let stats = FallbackDirectoryStats::new(fs);
//! let path = InternalPath::new("/srv/projects").unwrap();
//!
//! let summary = stats.summary(&path);
//! println!("{} bytes in {} files", summary.size, summary.files);
//! ```

mod ceph;
mod inode;
mod walk;

use anchorfs_core::InternalPath;
use anchorfs_io::FileSystem;
use serde::Serialize;
use tracing::debug;

pub use ceph::CephFsDirectoryStats;
pub use inode::{InodeInfo, InodeTracker};
pub use walk::WalkingDirectoryStats;

/// Sentinel for a value that could not be determined.
pub const UNKNOWN: i64 = -1;

/// All recursive aggregates of one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DirectorySummary {
    /// Total bytes of every file below the directory.
    pub size: i64,
    /// Number of non-directory entries below the directory.
    pub files: i64,
    /// Number of directories below the directory, itself excluded.
    pub directories: i64,
    /// `files + directories`.
    pub entries: i64,
    /// Latest change below the directory, in epoch milliseconds.
    pub modified_at: i64,
}

impl DirectorySummary {
    /// A summary where nothing is known.
    pub const UNKNOWN: Self = Self {
        size: UNKNOWN,
        files: UNKNOWN,
        directories: UNKNOWN,
        entries: UNKNOWN,
        modified_at: UNKNOWN,
    };

    /// Check if every value is known.
    pub fn is_complete(&self) -> bool {
        [
            self.size,
            self.files,
            self.directories,
            self.entries,
            self.modified_at,
        ]
        .iter()
        .all(|&v| v != UNKNOWN)
    }

    /// Fill every unknown value from `other`.
    pub fn or(self, other: Self) -> Self {
        let pick = |a: i64, b: i64| if a == UNKNOWN { b } else { a };
        Self {
            size: pick(self.size, other.size),
            files: pick(self.files, other.files),
            directories: pick(self.directories, other.directories),
            entries: pick(self.entries, other.entries),
            modified_at: pick(self.modified_at, other.modified_at),
        }
    }
}

/// Best-effort recursive statistics of a directory.
pub trait DirectoryStats: Send + Sync {
    /// Total bytes below `path`.
    fn recursive_size(&self, path: &InternalPath) -> i64;

    /// Number of files below `path`.
    fn recursive_file_count(&self, path: &InternalPath) -> i64;

    /// Number of directories below `path`.
    fn recursive_directory_count(&self, path: &InternalPath) -> i64;

    /// Number of files and directories below `path`.
    fn recursive_entry_count(&self, path: &InternalPath) -> i64;

    /// Latest change below `path`, in epoch milliseconds.
    fn recursive_modified_at(&self, path: &InternalPath) -> i64;

    /// Every aggregate at once.
    fn summary(&self, path: &InternalPath) -> DirectorySummary {
        DirectorySummary {
            size: self.recursive_size(path),
            files: self.recursive_file_count(path),
            directories: self.recursive_directory_count(path),
            entries: self.recursive_entry_count(path),
            modified_at: self.recursive_modified_at(path),
        }
    }
}

/// Reads CephFS aggregates and walks the tree only when they are missing.
#[derive(Debug, Clone)]
pub struct FallbackDirectoryStats {
    ceph: CephFsDirectoryStats,
    walking: WalkingDirectoryStats,
}

impl FallbackDirectoryStats {
    pub fn new(fs: FileSystem) -> Self {
        Self {
            ceph: CephFsDirectoryStats::new(fs.clone()),
            walking: WalkingDirectoryStats::new(fs),
        }
    }

    fn either(
        &self,
        path: &InternalPath,
        fast: impl FnOnce(&CephFsDirectoryStats) -> i64,
        slow: impl FnOnce(&WalkingDirectoryStats) -> i64,
    ) -> i64 {
        match fast(&self.ceph) {
            UNKNOWN => {
                debug!(path = %path, "No recursive attribute, walking the tree");
                slow(&self.walking)
            }
            value => value,
        }
    }
}

impl DirectoryStats for FallbackDirectoryStats {
    fn recursive_size(&self, path: &InternalPath) -> i64 {
        self.either(path, |c| c.recursive_size(path), |w| w.recursive_size(path))
    }

    fn recursive_file_count(&self, path: &InternalPath) -> i64 {
        self.either(
            path,
            |c| c.recursive_file_count(path),
            |w| w.recursive_file_count(path),
        )
    }

    fn recursive_directory_count(&self, path: &InternalPath) -> i64 {
        self.either(
            path,
            |c| c.recursive_directory_count(path),
            |w| w.recursive_directory_count(path),
        )
    }

    fn recursive_entry_count(&self, path: &InternalPath) -> i64 {
        self.either(
            path,
            |c| c.recursive_entry_count(path),
            |w| w.recursive_entry_count(path),
        )
    }

    fn recursive_modified_at(&self, path: &InternalPath) -> i64 {
        self.either(
            path,
            |c| c.recursive_modified_at(path),
            |w| w.recursive_modified_at(path),
        )
    }

    fn summary(&self, path: &InternalPath) -> DirectorySummary {
        let fast = self.ceph.summary(path);
        if fast.is_complete() {
            return fast;
        }
        debug!(path = %path, "Incomplete recursive attributes, walking the tree");
        fast.or(self.walking.summary(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_or_fills_unknowns() {
        let partial = DirectorySummary {
            size: 10,
            ..DirectorySummary::UNKNOWN
        };
        let full = DirectorySummary {
            size: 99,
            files: 1,
            directories: 2,
            entries: 3,
            modified_at: 4,
        };

        assert!(!partial.is_complete());
        let merged = partial.or(full);
        assert!(merged.is_complete());
        assert_eq!(merged.size, 10);
        assert_eq!(merged.entries, 3);
    }

    #[test]
    fn test_unknown_summary_serializes_sentinels() {
        let json = serde_json::to_value(DirectorySummary::UNKNOWN).unwrap();
        assert_eq!(json["size"], -1);
        assert_eq!(json["modified_at"], -1);
    }
}
