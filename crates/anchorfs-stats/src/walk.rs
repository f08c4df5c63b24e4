//! Statistics computed by walking the tree.

use std::time::{Duration, UNIX_EPOCH};

use anchorfs_core::InternalPath;
use anchorfs_io::FileSystem;
use jwalk::{Parallelism, WalkDir};
use rayon::prelude::*;
use tracing::debug;

use crate::inode::{InodeInfo, InodeTracker, link_count};
use crate::{DirectoryStats, DirectorySummary};

/// Walks the directory in parallel, never following symlinks.
///
/// Hardlinked files contribute their size once. Entries that vanish or cannot
/// be read during the walk are skipped.
#[derive(Debug, Clone)]
pub struct WalkingDirectoryStats {
    fs: FileSystem,
    threads: usize,
}

impl WalkingDirectoryStats {
    pub fn new(fs: FileSystem) -> Self {
        Self { fs, threads: 0 }
    }

    /// Use a dedicated pool of `threads` workers (0 uses the global rayon pool).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Summaries of several directories, walked concurrently.
    pub fn summaries(&self, paths: &[InternalPath]) -> Vec<DirectorySummary> {
        paths.par_iter().map(|path| self.summary(path)).collect()
    }

    fn walk(&self, path: &InternalPath) -> DirectorySummary {
        // The root is resolved through the filesystem so a symlinked root is refused.
        match self.fs.stat(path) {
            Ok(stat) if stat.is_dir() => {}
            Ok(_) => {
                debug!(path = %path, "Not a directory, nothing to walk");
                return DirectorySummary::UNKNOWN;
            }
            Err(e) => {
                debug!(path = %path, "Cannot walk: {e}");
                return DirectorySummary::UNKNOWN;
            }
        }

        let parallelism = match self.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };
        let walker = WalkDir::new(path.as_path())
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false);

        let inodes = InodeTracker::new();
        let mut summary = DirectorySummary {
            size: 0,
            files: 0,
            directories: 0,
            entries: 0,
            modified_at: 0,
        };

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(path = %path, "Skipping unreadable entry: {e}");
                    continue;
                }
            };
            let Ok(metadata) = entry.metadata() else {
                continue;
            };

            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            summary.modified_at = summary.modified_at.max(modified);

            if entry.depth() == 0 {
                continue;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                summary.directories += 1;
            } else {
                summary.files += 1;
                let first_link =
                    link_count(&metadata) <= 1 || inodes.track(InodeInfo::from_metadata(&metadata));
                if file_type.is_file() && first_link {
                    summary.size += metadata.len() as i64;
                }
            }
        }

        summary.entries = summary.files + summary.directories;
        summary
    }
}

impl DirectoryStats for WalkingDirectoryStats {
    fn recursive_size(&self, path: &InternalPath) -> i64 {
        self.walk(path).size
    }

    fn recursive_file_count(&self, path: &InternalPath) -> i64 {
        self.walk(path).files
    }

    fn recursive_directory_count(&self, path: &InternalPath) -> i64 {
        self.walk(path).directories
    }

    fn recursive_entry_count(&self, path: &InternalPath) -> i64 {
        self.walk(path).entries
    }

    fn recursive_modified_at(&self, path: &InternalPath) -> i64 {
        self.walk(path).modified_at
    }

    fn summary(&self, path: &InternalPath) -> DirectorySummary {
        self.walk(path)
    }
}
