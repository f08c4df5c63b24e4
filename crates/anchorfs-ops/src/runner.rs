//! Dispatching named operations to their handlers.

use std::sync::Arc;

use anchorfs_core::InternalPath;
use anchorfs_io::FileSystem;
use anchorfs_stats::{CephFsDirectoryStats, DirectoryStats};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::executor::execute;
use crate::requirements::{ExecutionMode, RequirementLimits, TaskRequirements, collect_requirements};
use crate::tasks::{
    CopyHandler, CreateFolderHandler, DeleteHandler, EmptyTrashHandler, MoveHandler, TrashHandler,
};
use crate::{
    AccessPolicy, BulkTask, PROGRESS_CHANNEL_SIZE, TaskComplete, TaskError, TaskHandler,
    TaskProgress,
};

/// A task handed off to the background.
#[derive(Debug)]
pub struct BackgroundTask {
    pub requirements: TaskRequirements,
    pub progress: mpsc::Receiver<TaskProgress>,
    pub handle: JoinHandle<Result<TaskComplete, TaskError>>,
    pub cancel: CancellationToken,
}

impl BackgroundTask {
    /// Stop starting new items.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to finish.
    pub async fn wait(self) -> Result<TaskComplete, TaskError> {
        self.handle
            .await
            .map_err(|e| TaskError::Aborted(e.to_string()))?
    }
}

/// How a submitted task was run.
#[derive(Debug)]
pub enum TaskOutcome {
    /// Ran inline.
    Completed(TaskComplete),
    /// Still running.
    Background(BackgroundTask),
}

impl TaskOutcome {
    /// Wait for the result, whichever way the task runs.
    pub async fn wait(self) -> Result<TaskComplete, TaskError> {
        match self {
            Self::Completed(complete) => Ok(complete),
            Self::Background(task) => task.wait().await,
        }
    }
}

/// Runs named operations against one filesystem.
pub struct TaskRunner {
    fs: FileSystem,
    access: Arc<dyn AccessPolicy>,
    handlers: Vec<Arc<dyn TaskHandler>>,
    hints: Option<Arc<dyn DirectoryStats>>,
    limits: RequirementLimits,
}

impl TaskRunner {
    /// A runner with the copy, move, delete and create-folder handlers.
    ///
    /// Work estimates use CephFS recursive counts where available.
    pub fn new(fs: FileSystem, access: Arc<dyn AccessPolicy>) -> Self {
        let hints: Arc<dyn DirectoryStats> = Arc::new(CephFsDirectoryStats::new(fs.clone()));
        Self {
            fs,
            access,
            handlers: vec![
                Arc::new(CopyHandler),
                Arc::new(MoveHandler),
                Arc::new(DeleteHandler),
                Arc::new(CreateFolderHandler),
            ],
            hints: Some(hints),
            limits: RequirementLimits::default(),
        }
    }

    /// Enable `trash` and `empty_trash` with `trash_root` as the trash directory.
    pub fn with_trash_root(self, trash_root: InternalPath) -> Self {
        self.with_handler(TrashHandler::new(trash_root.clone()))
            .with_handler(EmptyTrashHandler::new(trash_root))
    }

    /// Register another handler. Earlier handlers win.
    pub fn with_handler(mut self, handler: impl TaskHandler + 'static) -> Self {
        self.handlers.push(Arc::new(handler));
        self
    }

    pub fn with_hints(mut self, hints: Option<Arc<dyn DirectoryStats>>) -> Self {
        self.hints = hints;
        self
    }

    pub fn with_limits(mut self, limits: RequirementLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn filesystem(&self) -> &FileSystem {
        &self.fs
    }

    /// Operation names with a registered handler.
    pub fn operations(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.operation()).collect()
    }

    /// Decode, check and run `operation`.
    ///
    /// Permission failures surface here, before anything is touched.
    /// Small tasks run inline; large ones are spawned and returned as a
    /// [`BackgroundTask`].
    pub async fn submit(
        &self,
        operation: &str,
        raw: &serde_json::Value,
    ) -> Result<TaskOutcome, TaskError> {
        self.submit_with_cancel(operation, raw, CancellationToken::new())
            .await
    }

    /// [`submit`](Self::submit) with a caller-owned token.
    ///
    /// Cancelling `cancel` stops the estimate walk with
    /// [`TaskError::Cancelled`] and stops workers from starting new items.
    /// A background task hands the same token back in
    /// [`BackgroundTask::cancel`].
    pub async fn submit_with_cancel(
        &self,
        operation: &str,
        raw: &serde_json::Value,
        cancel: CancellationToken,
    ) -> Result<TaskOutcome, TaskError> {
        let Some(handler) = self.handlers.iter().find(|h| h.can_handle(operation, raw)) else {
            // A known operation with a malformed request reports the decode error.
            if let Some(owner) = self.handlers.iter().find(|h| h.operation() == operation) {
                owner.prepare(raw)?;
            }
            return Err(TaskError::UnknownOperation(operation.to_string()));
        };
        let task: Arc<dyn BulkTask> = Arc::from(handler.prepare(raw)?);

        let requirements = {
            let task = Arc::clone(&task);
            let access = Arc::clone(&self.access);
            let fs = self.fs.clone();
            let hints = self.hints.clone();
            let limits = self.limits;
            let cancel = cancel.clone();
            tokio::task::spawn_blocking(move || {
                collect_requirements(
                    task.as_ref(),
                    access.as_ref(),
                    &fs,
                    hints.as_deref(),
                    &limits,
                    &cancel,
                )
            })
            .await
            .map_err(|e| TaskError::Aborted(e.to_string()))??
        };

        info!(
            operation,
            estimated_items = requirements.estimated_items,
            workers = requirements.workers,
            mode = ?requirements.mode,
            "Submitting task"
        );

        match requirements.mode {
            ExecutionMode::Foreground => {
                let complete =
                    execute(task, self.fs.clone(), requirements.workers, cancel, None).await?;
                Ok(TaskOutcome::Completed(complete))
            }
            ExecutionMode::Background => {
                let (tx, rx) = mpsc::channel(PROGRESS_CHANNEL_SIZE);
                let handle = tokio::spawn(execute(
                    task,
                    self.fs.clone(),
                    requirements.workers,
                    cancel.clone(),
                    Some(tx),
                ));
                Ok(TaskOutcome::Background(BackgroundTask {
                    requirements,
                    progress: rx,
                    handle,
                    cancel,
                }))
            }
        }
    }
}
