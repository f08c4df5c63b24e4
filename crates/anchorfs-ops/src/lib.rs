//! Bulk file tasks for anchorfs.
//!
//! A task is submitted by operation name with a JSON request. The
//! [`TaskRunner`] finds the handler, checks every input path against an
//! [`AccessPolicy`], estimates the work with a bounded walk, and then runs
//! it on a small pool of workers sharing one queue. Directories discovered
//! along the way are pushed back onto the queue, so a deep tree is
//! processed without recursion.
//!
//! Failures of single items are logged and counted; they never abort a
//! task.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), anchorfs_ops::TaskError> {
//! use std::sync::Arc;
//!
//! use anchorfs_core::FsConfig;
//! use anchorfs_io::FileSystem;
//! use anchorfs_ops::{AllowAll, TaskRunner};
//! use serde_json::json;
//!
//! let fs = FileSystem::new(FsConfig::unprivileged())?;
//! let runner = TaskRunner::new(fs, Arc::new(AllowAll));
//!
//! let outcome = runner
//!     .submit("delete", &json!({ "paths": ["/srv/scratch/old"] }))
//!     .await?;
//! println!("{}", outcome.wait().await?.summary());
//! # Ok(())
//! # }
//! ```

mod access;
mod error;
mod executor;
mod progress;
mod request;
mod requirements;
mod runner;
mod task;
pub mod tasks;

pub use access::{AccessPolicy, AllowAll, Permission, RootedAccess};
pub use error::TaskError;
pub use executor::execute;
pub use progress::{TaskComplete, TaskKind, TaskProgress};
pub use request::{
    CopyRequest, CreateFolderRequest, DeleteRequest, EmptyTrashRequest, MoveRequest,
    TransferItem, TrashRequest,
};
pub use requirements::{
    ExecutionMode, MAX_ESTIMATE_ITEMS, MAX_WORKERS, RequirementLimits, TaskRequirements,
    collect_requirements, workers_for,
};
pub use runner::{BackgroundTask, TaskOutcome, TaskRunner};
pub use task::{BulkTask, TaskHandler, WorkItem};

/// Default channel buffer size for task progress updates.
pub const PROGRESS_CHANNEL_SIZE: usize = 100;
