//! Permanent deletion.

use anchorfs_core::{FsResult, InternalPath};
use anchorfs_io::FileSystem;

use crate::request::{DeleteRequest, decode};
use crate::{BulkTask, Permission, TaskError, TaskHandler, TaskKind, WorkItem};

/// Delete `path`, emptying it first if it is a non-empty directory.
pub(crate) fn delete_path(fs: &FileSystem, path: &InternalPath) -> FsResult<()> {
    match fs.delete(path) {
        Err(e) if e.is_bad_request() => remove_tree(fs, path),
        result => result,
    }
}

/// Post-order removal without recursion.
///
/// The first entry that cannot be removed stops the walk; symlinks inside
/// the tree are never followed and cannot be removed through the
/// filesystem layer, so they leave their directory in place.
fn remove_tree(fs: &FileSystem, root: &InternalPath) -> FsResult<()> {
    let mut stack = vec![(root.clone(), false)];

    while let Some((path, expanded)) = stack.pop() {
        if expanded {
            fs.delete(&path)?;
            continue;
        }
        if !fs.stat(&path)?.is_dir() {
            fs.delete(&path)?;
            continue;
        }

        stack.push((path.clone(), true));
        for name in fs.list_files(&path)? {
            stack.push((path.join(&name)?, false));
        }
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DeleteTask {
    request: DeleteRequest,
}

impl DeleteTask {
    pub fn new(request: DeleteRequest) -> Self {
        Self { request }
    }
}

impl BulkTask for DeleteTask {
    fn kind(&self) -> TaskKind {
        TaskKind::Delete
    }

    fn input_paths(&self) -> Vec<(InternalPath, Permission)> {
        self.request
            .paths
            .iter()
            .map(|path| (path.clone(), Permission::Write))
            .collect()
    }

    fn estimate_roots(&self) -> Vec<InternalPath> {
        self.request.paths.clone()
    }

    fn seed(&self, _fs: &FileSystem) -> FsResult<Vec<WorkItem>> {
        Ok(self.request.paths.iter().cloned().map(WorkItem::Path).collect())
    }

    fn process(&self, fs: &FileSystem, item: &WorkItem) -> FsResult<Vec<WorkItem>> {
        delete_path(fs, item.path())?;
        Ok(Vec::new())
    }
}

/// Handles `delete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteHandler;

impl TaskHandler for DeleteHandler {
    fn operation(&self) -> &'static str {
        TaskKind::Delete.operation()
    }

    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError> {
        Ok(Box::new(DeleteTask::new(decode(raw)?)))
    }
}
