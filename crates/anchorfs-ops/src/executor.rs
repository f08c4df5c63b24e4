//! Bounded worker pool over a shared work queue.
//!
//! Workers pull items from one unbounded channel and push whatever an item
//! discovers (the children of a copied directory, for instance) back onto
//! it. A pending counter tracks queued and in-flight items; the worker that
//! brings it to zero signals the others to stop.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use anchorfs_io::FileSystem;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{BulkTask, TaskComplete, TaskError, TaskProgress, WorkItem};

struct Shared {
    queue: Mutex<mpsc::UnboundedReceiver<WorkItem>>,
    sender: mpsc::UnboundedSender<WorkItem>,
    pending: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    drained: CancellationToken,
    progress: Option<mpsc::Sender<TaskProgress>>,
}

impl Shared {
    fn report(&self, task: &dyn BulkTask, current: &WorkItem) {
        let Some(progress) = &self.progress else {
            return;
        };
        let snapshot = TaskProgress {
            kind: task.kind(),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            pending: self.pending.load(Ordering::Relaxed),
            current: Some(current.path().clone()),
        };
        // Progress is lossy; a slow or dropped receiver never stalls workers.
        let _ = progress.try_send(snapshot);
    }
}

/// Run `task` to completion on `workers` concurrent workers.
///
/// Per-item failures are logged and counted. Cancelling `cancel` stops
/// workers from starting new items; items already in flight finish. A
/// worker that panics aborts the task with [`TaskError::Aborted`].
pub async fn execute(
    task: Arc<dyn BulkTask>,
    fs: FileSystem,
    workers: usize,
    cancel: CancellationToken,
    progress: Option<mpsc::Sender<TaskProgress>>,
) -> Result<TaskComplete, TaskError> {
    let started = Instant::now();
    let kind = task.kind();

    let seeds = {
        let task = Arc::clone(&task);
        let fs = fs.clone();
        tokio::task::spawn_blocking(move || {
            task.setup(&fs)?;
            task.seed(&fs)
        })
        .await
        .map_err(|e| TaskError::Aborted(e.to_string()))??
    };

    let (sender, receiver) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        queue: Mutex::new(receiver),
        sender,
        pending: AtomicUsize::new(seeds.len()),
        succeeded: AtomicUsize::new(0),
        failed: AtomicUsize::new(0),
        drained: CancellationToken::new(),
        progress,
    });
    if seeds.is_empty() {
        shared.drained.cancel();
    }
    for item in seeds {
        // The receiver lives in `shared`, so the channel is open.
        let _ = shared.sender.send(item);
    }

    let stop = cancel.child_token();
    let mut pool = JoinSet::new();
    for id in 0..workers.max(1) {
        pool.spawn(worker(
            id,
            Arc::clone(&shared),
            Arc::clone(&task),
            fs.clone(),
            stop.clone(),
        ));
    }

    let mut aborted = None;
    while let Some(joined) = pool.join_next().await {
        let result = joined.map_err(|e| TaskError::Aborted(e.to_string()));
        if let Err(e) = result.and_then(|r| r) {
            warn!(%kind, "Worker failed: {e}");
            stop.cancel();
            aborted.get_or_insert(e);
        }
    }
    if let Some(e) = aborted {
        return Err(e);
    }

    {
        let task = Arc::clone(&task);
        let fs = fs.clone();
        tokio::task::spawn_blocking(move || task.finish(&fs))
            .await
            .map_err(|e| TaskError::Aborted(e.to_string()))?;
    }

    let complete = TaskComplete {
        kind,
        succeeded: shared.succeeded.load(Ordering::Acquire),
        failed: shared.failed.load(Ordering::Acquire),
        cancelled: cancel.is_cancelled() && !shared.drained.is_cancelled(),
        elapsed: started.elapsed(),
    };
    info!(%kind, elapsed = ?complete.elapsed, "{}", complete.summary());
    Ok(complete)
}

async fn worker(
    id: usize,
    shared: Arc<Shared>,
    task: Arc<dyn BulkTask>,
    fs: FileSystem,
    stop: CancellationToken,
) -> Result<(), TaskError> {
    loop {
        let item = {
            let mut queue = shared.queue.lock().await;
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!(worker = id, "Stopping before the queue drained");
                    return Ok(());
                }
                _ = shared.drained.cancelled() => return Ok(()),
                item = queue.recv() => match item {
                    Some(item) => item,
                    None => return Ok(()),
                },
            }
        };

        let outcome = {
            let task = Arc::clone(&task);
            let fs = fs.clone();
            let item = item.clone();
            tokio::task::spawn_blocking(move || task.process(&fs, &item)).await
        };

        match outcome {
            Ok(Ok(children)) => {
                shared.succeeded.fetch_add(1, Ordering::AcqRel);
                // Count children before this item leaves the pending set.
                shared.pending.fetch_add(children.len(), Ordering::AcqRel);
                for child in children {
                    let _ = shared.sender.send(child);
                }
            }
            Ok(Err(e)) => {
                debug!(worker = id, item = %item.path(), "Skipping item: {e}");
                shared.failed.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                return Err(TaskError::Aborted(format!(
                    "worker {id} panicked on {}: {e}",
                    item.path()
                )));
            }
        }

        shared.report(task.as_ref(), &item);
        if shared.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            shared.drained.cancel();
        }
    }
}
