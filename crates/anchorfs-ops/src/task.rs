//! The contract between task kinds and the executor.

use std::fmt;

use anchorfs_core::{FsResult, InternalPath};
use anchorfs_io::FileSystem;

use crate::{Permission, TaskError, TaskKind};

/// A unit of work on the shared queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem {
    /// Act on a single path.
    Path(InternalPath),
    /// Transfer one entry to a new location.
    Transfer {
        source: InternalPath,
        destination: InternalPath,
    },
}

impl WorkItem {
    pub fn transfer(source: InternalPath, destination: InternalPath) -> Self {
        Self::Transfer {
            source,
            destination,
        }
    }

    /// The path the item reads from or acts on.
    pub fn path(&self) -> &InternalPath {
        match self {
            Self::Path(path) => path,
            Self::Transfer { source, .. } => source,
        }
    }
}

/// A decoded task, ready to be estimated and executed.
///
/// Every method that touches the filesystem is called from a blocking
/// thread.
pub trait BulkTask: Send + Sync + fmt::Debug {
    fn kind(&self) -> TaskKind;

    /// Every path the task touches and the access it needs.
    fn input_paths(&self) -> Vec<(InternalPath, Permission)>;

    /// Roots whose subtrees make up the work.
    fn estimate_roots(&self) -> Vec<InternalPath>;

    /// Whether the subtrees of [`estimate_roots`](Self::estimate_roots)
    /// contribute to the work, or only the roots themselves.
    fn recursive(&self) -> bool {
        true
    }

    /// Runs once before the first item.
    fn setup(&self, _fs: &FileSystem) -> FsResult<()> {
        Ok(())
    }

    /// The initial queue.
    fn seed(&self, fs: &FileSystem) -> FsResult<Vec<WorkItem>>;

    /// Process one item, returning any follow-up items it discovered.
    fn process(&self, fs: &FileSystem, item: &WorkItem) -> FsResult<Vec<WorkItem>>;

    /// Runs once after the queue has drained.
    fn finish(&self, _fs: &FileSystem) {}
}

/// Turns a named operation and its raw request into a task.
pub trait TaskHandler: Send + Sync {
    /// The operation name this handler answers to.
    fn operation(&self) -> &'static str;

    /// Decode the request.
    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError>;

    /// Cheap structural check: the name matches and the request decodes.
    fn can_handle(&self, operation: &str, raw: &serde_json::Value) -> bool {
        operation == self.operation() && self.prepare(raw).is_ok()
    }
}
