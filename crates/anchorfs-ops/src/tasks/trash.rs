//! Moving entries into a trash directory and emptying it.

use anchorfs_core::{FsError, FsResult, InternalPath, WriteConflictPolicy};
use anchorfs_io::FileSystem;
use tracing::debug;

use super::delete::delete_path;
use crate::request::{EmptyTrashRequest, TrashRequest, decode};
use crate::{BulkTask, Permission, TaskError, TaskHandler, TaskKind, WorkItem};

/// Moves each path to `trash_root/<name>`, renaming on conflict.
#[derive(Debug, Clone)]
pub struct TrashTask {
    trash_root: InternalPath,
    request: TrashRequest,
}

impl TrashTask {
    pub fn new(trash_root: InternalPath, request: TrashRequest) -> Self {
        Self {
            trash_root,
            request,
        }
    }
}

impl BulkTask for TrashTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Trash
    }

    fn input_paths(&self) -> Vec<(InternalPath, Permission)> {
        let mut paths: Vec<_> = self
            .request
            .paths
            .iter()
            .map(|path| (path.clone(), Permission::Write))
            .collect();
        paths.push((self.trash_root.clone(), Permission::Write));
        paths
    }

    fn estimate_roots(&self) -> Vec<InternalPath> {
        self.request.paths.clone()
    }

    fn recursive(&self) -> bool {
        false
    }

    fn setup(&self, fs: &FileSystem) -> FsResult<()> {
        match fs.create_directories(&self.trash_root) {
            Err(e) if e.is_already_exists() => Ok(()),
            result => result,
        }
    }

    fn seed(&self, _fs: &FileSystem) -> FsResult<Vec<WorkItem>> {
        Ok(self.request.paths.iter().cloned().map(WorkItem::Path).collect())
    }

    fn process(&self, fs: &FileSystem, item: &WorkItem) -> FsResult<Vec<WorkItem>> {
        let path = item.path();
        if path.starts_with(&self.trash_root) || self.trash_root.starts_with(path) {
            return Err(FsError::bad_request(path, "cannot move the trash into itself"));
        }
        let name = path
            .file_name()
            .ok_or_else(|| FsError::bad_request(path, "cannot trash the root"))?;

        let destination = self.trash_root.join(name)?;
        fs.move_entry(path, &destination, WriteConflictPolicy::Rename)?;
        Ok(Vec::new())
    }
}

/// Removes everything inside the trash directory, keeping the directory.
#[derive(Debug, Clone)]
pub struct EmptyTrashTask {
    trash_root: InternalPath,
}

impl EmptyTrashTask {
    pub fn new(trash_root: InternalPath) -> Self {
        Self { trash_root }
    }
}

impl BulkTask for EmptyTrashTask {
    fn kind(&self) -> TaskKind {
        TaskKind::EmptyTrash
    }

    fn input_paths(&self) -> Vec<(InternalPath, Permission)> {
        vec![(self.trash_root.clone(), Permission::Write)]
    }

    fn estimate_roots(&self) -> Vec<InternalPath> {
        vec![self.trash_root.clone()]
    }

    fn seed(&self, fs: &FileSystem) -> FsResult<Vec<WorkItem>> {
        let names = match fs.list_files(&self.trash_root) {
            Ok(names) => names,
            Err(e) if e.is_not_found() => {
                debug!(path = %self.trash_root, "No trash to empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        names
            .into_iter()
            .map(|name| -> FsResult<WorkItem> {
                Ok(WorkItem::Path(self.trash_root.join(&name)?))
            })
            .collect()
    }

    fn process(&self, fs: &FileSystem, item: &WorkItem) -> FsResult<Vec<WorkItem>> {
        delete_path(fs, item.path())?;
        Ok(Vec::new())
    }
}

/// Handles `trash`.
#[derive(Debug, Clone)]
pub struct TrashHandler {
    trash_root: InternalPath,
}

impl TrashHandler {
    pub fn new(trash_root: InternalPath) -> Self {
        Self { trash_root }
    }
}

impl TaskHandler for TrashHandler {
    fn operation(&self) -> &'static str {
        TaskKind::Trash.operation()
    }

    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError> {
        Ok(Box::new(TrashTask::new(self.trash_root.clone(), decode(raw)?)))
    }
}

/// Handles `empty_trash`.
#[derive(Debug, Clone)]
pub struct EmptyTrashHandler {
    trash_root: InternalPath,
}

impl EmptyTrashHandler {
    pub fn new(trash_root: InternalPath) -> Self {
        Self { trash_root }
    }
}

impl TaskHandler for EmptyTrashHandler {
    fn operation(&self) -> &'static str {
        TaskKind::EmptyTrash.operation()
    }

    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError> {
        let EmptyTrashRequest {} = decode(raw)?;
        Ok(Box::new(EmptyTrashTask::new(self.trash_root.clone())))
    }
}
