//! Up-front permission checks and a bounded estimate of the work.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use anchorfs_core::InternalPath;
use anchorfs_io::FileSystem;
use anchorfs_stats::{DirectoryStats, UNKNOWN};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{AccessPolicy, BulkTask, TaskError};

/// Stop counting after this many items.
pub const MAX_ESTIMATE_ITEMS: usize = 10_000;

/// Stop counting after this long.
pub const ESTIMATE_TIME_BUDGET: Duration = Duration::from_secs(2);

/// Tasks estimated above this run in the background.
pub const FOREGROUND_ITEM_LIMIT: usize = 1_000;

/// Each worker is expected to handle about this many items.
pub const ITEMS_PER_WORKER: usize = 50;

/// Upper bound on concurrent workers for one task.
pub const MAX_WORKERS: usize = 10;

/// Bounds on requirement collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequirementLimits {
    pub max_items: usize,
    pub time_budget: Duration,
    pub foreground_items: usize,
}

impl Default for RequirementLimits {
    fn default() -> Self {
        Self {
            max_items: MAX_ESTIMATE_ITEMS,
            time_budget: ESTIMATE_TIME_BUDGET,
            foreground_items: FOREGROUND_ITEM_LIMIT,
        }
    }
}

/// Where a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Inline; the caller waits for the result.
    Foreground,
    /// On a spawned task; the caller gets a handle.
    Background,
}

/// What a task needs before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskRequirements {
    /// Items counted, a lower bound when `limit_reached`.
    pub estimated_items: usize,
    /// Counting stopped at the item cap or the time budget.
    pub limit_reached: bool,
    pub mode: ExecutionMode,
    pub workers: usize,
}

/// Number of workers for `items` items.
pub fn workers_for(items: usize) -> usize {
    if items <= ITEMS_PER_WORKER {
        1
    } else {
        items.div_ceil(ITEMS_PER_WORKER).min(MAX_WORKERS)
    }
}

/// Check every input path against `access`, then estimate the work.
///
/// Nothing is mutated. The estimate is a breadth-first count bounded by
/// `limits`; a directory whose `hints` report a recursive entry count is
/// not walked.
pub fn collect_requirements(
    task: &dyn BulkTask,
    access: &dyn AccessPolicy,
    fs: &FileSystem,
    hints: Option<&dyn DirectoryStats>,
    limits: &RequirementLimits,
    cancel: &CancellationToken,
) -> Result<TaskRequirements, TaskError> {
    for (path, permission) in task.input_paths() {
        access.check(&path, permission)?;
    }
    if cancel.is_cancelled() {
        return Err(TaskError::Cancelled);
    }

    let roots = task.estimate_roots();
    let (estimated_items, limit_reached) = if task.recursive() {
        estimate(fs, roots, hints, limits, cancel)?
    } else {
        (roots.len(), false)
    };

    let mode = if limit_reached || estimated_items > limits.foreground_items {
        ExecutionMode::Background
    } else {
        ExecutionMode::Foreground
    };
    let workers = if limit_reached {
        MAX_WORKERS
    } else {
        workers_for(estimated_items)
    };

    debug!(
        kind = %task.kind(),
        estimated_items,
        limit_reached,
        ?mode,
        workers,
        "Collected task requirements"
    );

    Ok(TaskRequirements {
        estimated_items,
        limit_reached,
        mode,
        workers,
    })
}

fn estimate(
    fs: &FileSystem,
    roots: Vec<InternalPath>,
    hints: Option<&dyn DirectoryStats>,
    limits: &RequirementLimits,
    cancel: &CancellationToken,
) -> Result<(usize, bool), TaskError> {
    let deadline = Instant::now() + limits.time_budget;
    let mut count = 0usize;
    let mut queue = VecDeque::new();

    for root in roots {
        match hints.map(|h| h.recursive_entry_count(&root)) {
            Some(hint) if hint != UNKNOWN => {
                count = count.saturating_add(1 + hint as usize);
            }
            _ => queue.push_back(root),
        }
    }
    if count >= limits.max_items {
        return Ok((count, true));
    }

    while let Some(path) = queue.pop_front() {
        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }
        count += 1;
        if count >= limits.max_items || Instant::now() >= deadline {
            return Ok((count, true));
        }

        // Files and missing paths fail to list and count as one item.
        if let Ok(children) = fs.list_files(&path) {
            for name in children {
                if let Ok(child) = path.join(&name) {
                    queue.push_back(child);
                }
            }
        }
    }

    Ok((count, false))
}
