//! CephFS recursive statistics via virtual extended attributes.

use anchorfs_core::InternalPath;
use anchorfs_io::FileSystem;
use tracing::debug;

use crate::{DirectoryStats, UNKNOWN};

const RBYTES: &str = "ceph.dir.rbytes";
const RFILES: &str = "ceph.dir.rfiles";
const RSUBDIRS: &str = "ceph.dir.rsubdirs";
const RENTRIES: &str = "ceph.dir.rentries";
const RCTIME: &str = "ceph.dir.rctime";

/// Reads the `ceph.dir.*` attributes maintained by CephFS.
///
/// On any other filesystem every call returns [`UNKNOWN`].
#[derive(Debug, Clone)]
pub struct CephFsDirectoryStats {
    fs: FileSystem,
}

impl CephFsDirectoryStats {
    pub fn new(fs: FileSystem) -> Self {
        Self { fs }
    }

    fn read(&self, path: &InternalPath, attribute: &str) -> Option<String> {
        match self.fs.get_extended_attribute(path, attribute) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(path = %path, attribute, "Recursive attribute unavailable: {e}");
                None
            }
        }
    }

    fn read_number(&self, path: &InternalPath, attribute: &str) -> i64 {
        self.read(path, attribute)
            .and_then(|value| parse_count(&value))
            .unwrap_or(UNKNOWN)
    }
}

impl DirectoryStats for CephFsDirectoryStats {
    fn recursive_size(&self, path: &InternalPath) -> i64 {
        self.read_number(path, RBYTES)
    }

    fn recursive_file_count(&self, path: &InternalPath) -> i64 {
        self.read_number(path, RFILES)
    }

    fn recursive_directory_count(&self, path: &InternalPath) -> i64 {
        self.read_number(path, RSUBDIRS)
    }

    fn recursive_entry_count(&self, path: &InternalPath) -> i64 {
        self.read_number(path, RENTRIES)
    }

    fn recursive_modified_at(&self, path: &InternalPath) -> i64 {
        self.read(path, RCTIME)
            .and_then(|value| parse_rctime(&value))
            .unwrap_or(UNKNOWN)
    }
}

fn parse_count(value: &str) -> Option<i64> {
    value
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .parse()
        .ok()
}

/// Convert a `seconds.nanoseconds` timestamp into epoch milliseconds.
pub(crate) fn parse_rctime(value: &str) -> Option<i64> {
    let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    let (seconds, fraction) = value.split_once('.').unwrap_or((value, ""));
    let seconds: i64 = seconds.parse().ok()?;

    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // The fraction is nanoseconds; only its first three digits matter.
    let millis = format!("{fraction:0<3}")[..3].parse::<i64>().ok()?;

    seconds.checked_mul(1000)?.checked_add(millis)
}
