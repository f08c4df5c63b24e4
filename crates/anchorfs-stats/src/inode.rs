//! Inode tracking for hardlink deduplication.

use std::fs::Metadata;

use dashmap::DashSet;

/// Identity of a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InodeInfo {
    /// Inode number.
    pub inode: u64,
    /// Device ID.
    pub device: u64,
}

impl InodeInfo {
    pub fn new(inode: u64, device: u64) -> Self {
        Self { inode, device }
    }

    /// Identity of the file described by `metadata`.
    #[cfg(unix)]
    pub fn from_metadata(metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self::new(metadata.ino(), metadata.dev())
    }

    #[cfg(not(unix))]
    pub fn from_metadata(_metadata: &Metadata) -> Self {
        Self::new(0, 0)
    }
}

/// Number of hard links to the file described by `metadata`.
#[cfg(unix)]
pub(crate) fn link_count(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.nlink()
}

#[cfg(not(unix))]
pub(crate) fn link_count(_metadata: &Metadata) -> u64 {
    1
}

/// Tracks seen inodes so hardlinked files are counted once.
#[derive(Debug, Default)]
pub struct InodeTracker {
    seen: DashSet<InodeInfo>,
}

impl InodeTracker {
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Track an inode. Returns `true` the first time it is seen.
    pub fn track(&self, info: InodeInfo) -> bool {
        self.seen.insert(info)
    }

    /// Number of unique inodes tracked.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_counts_once() {
        let tracker = InodeTracker::new();
        let info = InodeInfo::new(12345, 1);

        assert!(tracker.track(info));
        assert!(!tracker.track(info));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_same_inode_on_other_device_is_distinct() {
        let tracker = InodeTracker::new();
        assert!(tracker.track(InodeInfo::new(7, 1)));
        assert!(tracker.track(InodeInfo::new(7, 2)));
        assert!(!tracker.is_empty());
    }
}
