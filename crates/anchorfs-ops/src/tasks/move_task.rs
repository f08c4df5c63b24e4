//! Move entries, merging directories when asked to.

use anchorfs_core::{FsResult, InternalPath, WriteConflictPolicy};
use anchorfs_io::FileSystem;
use parking_lot::Mutex;
use tracing::debug;

use super::ensure_not_nested;
use crate::request::{MoveRequest, decode};
use crate::{BulkTask, Permission, TaskError, TaskHandler, TaskKind, WorkItem};

/// Moves each item with a single rename where possible.
///
/// Under [`WriteConflictPolicy::MergeRename`] a directory landing on an
/// existing directory is merged child by child; the emptied source
/// directories are removed once the queue drains, deepest first.
#[derive(Debug)]
pub struct MoveTask {
    request: MoveRequest,
    merged: Mutex<Vec<InternalPath>>,
}

impl MoveTask {
    pub fn new(request: MoveRequest) -> Self {
        Self {
            request,
            merged: Mutex::new(Vec::new()),
        }
    }
}

impl BulkTask for MoveTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Move
    }

    fn input_paths(&self) -> Vec<(InternalPath, Permission)> {
        self.request
            .items
            .iter()
            .flat_map(|item| {
                [
                    (item.source.clone(), Permission::Write),
                    (item.destination.clone(), Permission::Write),
                ]
            })
            .collect()
    }

    fn estimate_roots(&self) -> Vec<InternalPath> {
        self.request
            .items
            .iter()
            .map(|item| item.source.clone())
            .collect()
    }

    fn recursive(&self) -> bool {
        self.request.policy == WriteConflictPolicy::MergeRename
    }

    fn seed(&self, _fs: &FileSystem) -> FsResult<Vec<WorkItem>> {
        Ok(self
            .request
            .items
            .iter()
            .map(|item| WorkItem::transfer(item.source.clone(), item.destination.clone()))
            .collect())
    }

    fn process(&self, fs: &FileSystem, item: &WorkItem) -> FsResult<Vec<WorkItem>> {
        let WorkItem::Transfer {
            source,
            destination,
        } = item
        else {
            return Ok(Vec::new());
        };
        ensure_not_nested(source, destination)?;

        let result = fs.move_entry(source, destination, self.request.policy)?;
        if !result.needs_to_recurse {
            return Ok(Vec::new());
        }

        let children = fs
            .list_files(source)?
            .into_iter()
            .map(|name| -> FsResult<WorkItem> {
                Ok(WorkItem::transfer(source.join(&name)?, destination.join(&name)?))
            })
            .collect::<FsResult<Vec<_>>>()?;
        self.merged.lock().push(source.clone());
        Ok(children)
    }

    fn finish(&self, fs: &FileSystem) {
        let mut merged = std::mem::take(&mut *self.merged.lock());
        merged.sort_by_key(|path| std::cmp::Reverse(path.depth()));

        for path in merged {
            if let Err(e) = fs.delete(&path) {
                debug!(path = %path, "Leaving merged source directory: {e}");
            }
        }
    }
}

/// Handles `move`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveHandler;

impl TaskHandler for MoveHandler {
    fn operation(&self) -> &'static str {
        TaskKind::Move.operation()
    }

    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError> {
        Ok(Box::new(MoveTask::new(decode(raw)?)))
    }
}
