//! Copy files and directory trees.

use anchorfs_core::{CopyResult, FsResult, InternalPath, WriteConflictPolicy};
use anchorfs_io::FileSystem;

use super::ensure_not_nested;
use crate::request::{CopyRequest, decode};
use crate::{BulkTask, Permission, TaskError, TaskHandler, TaskKind, WorkItem};

#[derive(Debug, Clone)]
pub struct CopyTask {
    request: CopyRequest,
}

impl CopyTask {
    pub fn new(request: CopyRequest) -> Self {
        Self { request }
    }

    fn policy(&self) -> WriteConflictPolicy {
        self.request.policy
    }
}

impl BulkTask for CopyTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Copy
    }

    fn input_paths(&self) -> Vec<(InternalPath, Permission)> {
        self.request
            .items
            .iter()
            .flat_map(|item| {
                [
                    (item.source.clone(), Permission::Read),
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

        match fs.copy(source, destination, self.policy())? {
            CopyResult::CreatedDirectory(created) => fs
                .list_files(source)?
                .into_iter()
                .map(|name| -> FsResult<WorkItem> {
                    Ok(WorkItem::transfer(source.join(&name)?, created.join(&name)?))
                })
                .collect(),
            CopyResult::CreatedFile | CopyResult::NothingToCreate => Ok(Vec::new()),
        }
    }
}

/// Handles `copy`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyHandler;

impl TaskHandler for CopyHandler {
    fn operation(&self) -> &'static str {
        TaskKind::Copy.operation()
    }

    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError> {
        Ok(Box::new(CopyTask::new(decode(raw)?)))
    }
}
