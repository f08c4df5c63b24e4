//! Folder creation.

use anchorfs_core::{FsError, FsResult, InternalPath, WriteConflictPolicy, rename_candidate};
use anchorfs_io::FileSystem;

use crate::request::{CreateFolderRequest, decode};
use crate::{BulkTask, Permission, TaskError, TaskHandler, TaskKind, WorkItem};

const MAX_RENAME_ATTEMPTS: u32 = 9_999;

#[derive(Debug, Clone)]
pub struct CreateFolderTask {
    request: CreateFolderRequest,
}

impl CreateFolderTask {
    pub fn new(request: CreateFolderRequest) -> Self {
        Self { request }
    }

    fn create_renamed(&self, fs: &FileSystem, path: &InternalPath) -> FsResult<()> {
        let name = path
            .file_name()
            .ok_or_else(|| FsError::bad_request(path, "cannot rename the root"))?;

        for attempt in 1..=MAX_RENAME_ATTEMPTS {
            let candidate = path.with_file_name(&rename_candidate(name, attempt))?;
            match fs.create_directories(&candidate) {
                Err(e) if e.is_already_exists() => continue,
                result => return result,
            }
        }
        Err(FsError::bad_request(path, "too many files with this name"))
    }
}

impl BulkTask for CreateFolderTask {
    fn kind(&self) -> TaskKind {
        TaskKind::CreateFolder
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

    fn recursive(&self) -> bool {
        false
    }

    fn seed(&self, _fs: &FileSystem) -> FsResult<Vec<WorkItem>> {
        Ok(self.request.paths.iter().cloned().map(WorkItem::Path).collect())
    }

    fn process(&self, fs: &FileSystem, item: &WorkItem) -> FsResult<Vec<WorkItem>> {
        let path = item.path();
        match fs.create_directories(path) {
            Err(e) if e.is_already_exists() => match self.request.policy {
                WriteConflictPolicy::Rename => self.create_renamed(fs, path)?,
                WriteConflictPolicy::Reject => return Err(e),
                WriteConflictPolicy::Replace | WriteConflictPolicy::MergeRename => {
                    if !fs.stat(path)?.is_dir() {
                        return Err(e);
                    }
                }
            },
            result => result?,
        }
        Ok(Vec::new())
    }
}

/// Handles `create_folder`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateFolderHandler;

impl TaskHandler for CreateFolderHandler {
    fn operation(&self) -> &'static str {
        TaskKind::CreateFolder.operation()
    }

    fn prepare(&self, raw: &serde_json::Value) -> Result<Box<dyn BulkTask>, TaskError> {
        Ok(Box::new(CreateFolderTask::new(decode(raw)?)))
    }
}
