//! Progress reporting types for bulk tasks.

use std::time::Duration;

use anchorfs_core::InternalPath;
use serde::{Deserialize, Serialize};

/// The kind of task being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Copy,
    Move,
    Delete,
    Trash,
    EmptyTrash,
    CreateFolder,
}

impl TaskKind {
    /// The operation name handlers answer to.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Move => "move",
            Self::Delete => "delete",
            Self::Trash => "trash",
            Self::EmptyTrash => "empty_trash",
            Self::CreateFolder => "create_folder",
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Copy => write!(f, "Copy"),
            Self::Move => write!(f, "Move"),
            Self::Delete => write!(f, "Delete"),
            Self::Trash => write!(f, "Move to trash"),
            Self::EmptyTrash => write!(f, "Empty trash"),
            Self::CreateFolder => write!(f, "Create folder"),
        }
    }
}

/// Snapshot of a running task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    /// The kind of task.
    pub kind: TaskKind,
    /// Items processed successfully so far.
    pub succeeded: usize,
    /// Items that failed so far.
    pub failed: usize,
    /// Items queued or in flight. Grows as directories are expanded.
    pub pending: usize,
    /// The item that was just processed.
    pub current: Option<InternalPath>,
}

impl TaskProgress {
    /// Items processed, successful or not.
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Result of a finished task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskComplete {
    /// The kind of task.
    pub kind: TaskKind,
    /// Number of items successfully processed.
    pub succeeded: usize,
    /// Number of items that failed.
    pub failed: usize,
    /// The task stopped early because it was cancelled.
    pub cancelled: bool,
    /// Wall-clock time spent executing.
    pub elapsed: Duration,
}

impl TaskComplete {
    /// Check if every item was processed without error.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }

    /// Get a human-readable summary of the task.
    pub fn summary(&self) -> String {
        let action = match self.kind {
            TaskKind::Copy => "Copied",
            TaskKind::Move => "Moved",
            TaskKind::Delete => "Deleted",
            TaskKind::Trash => "Trashed",
            TaskKind::EmptyTrash => "Removed",
            TaskKind::CreateFolder => "Created",
        };

        let mut summary = if self.failed == 0 {
            format!("{} {} items", action, self.succeeded)
        } else {
            format!("{} {} items, {} failed", action, self.succeeded, self.failed)
        };
        if self.cancelled {
            summary.push_str(" (cancelled)");
        }
        summary
    }
}
