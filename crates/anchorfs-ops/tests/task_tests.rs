#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anchorfs_core::{FsConfig, FsResult, InternalPath};
use anchorfs_io::FileSystem;
use anchorfs_ops::tasks::DeleteTask;
use anchorfs_ops::{
    AllowAll, BulkTask, DeleteRequest, ExecutionMode, MAX_WORKERS, Permission, RequirementLimits,
    RootedAccess, TaskError, TaskKind, TaskOutcome, TaskRunner, WorkItem, collect_requirements,
    execute,
};
use anchorfs_stats::DirectoryStats;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Fixture {
    _temp: TempDir,
    real: PathBuf,
    root: InternalPath,
    fs: FileSystem,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let real = temp.path().canonicalize().unwrap();
        let root = InternalPath::try_from(real.as_path()).unwrap();
        let fs = FileSystem::new(FsConfig::unprivileged()).unwrap();
        Self {
            _temp: temp,
            real,
            root,
            fs,
        }
    }

    fn path(&self, relative: &str) -> InternalPath {
        InternalPath::new(format!("{}/{relative}", self.root)).unwrap()
    }

    fn runner(&self) -> TaskRunner {
        TaskRunner::new(self.fs.clone(), Arc::new(AllowAll))
            .with_trash_root(self.path("Trash"))
    }

    fn write(&self, relative: &str, content: &str) {
        let path = self.real.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn exists(&self, relative: &str) -> bool {
        self.real.join(relative).symlink_metadata().is_ok()
    }
}

fn names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn completed(outcome: TaskOutcome) -> anchorfs_ops::TaskComplete {
    match outcome {
        TaskOutcome::Completed(complete) => complete,
        TaskOutcome::Background(_) => panic!("expected a foreground task"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_copy_three_levels_with_fifty_files() {
    let fx = Fixture::new();
    let dirs = ["src", "src/l1", "src/l1/l2", "src/l1/l2/l3"];
    let per_dir = [10, 15, 15, 10];
    let mut n = 0;
    for (dir, count) in dirs.iter().zip(per_dir) {
        for _ in 0..count {
            fx.write(&format!("{dir}/f{n}.txt"), &format!("content {n}"));
            n += 1;
        }
    }

    let request = json!({
        "items": [{ "source": fx.path("src"), "destination": fx.path("dst") }],
        "policy": "REJECT",
    });
    let complete = completed(fx.runner().submit("copy", &request).await.unwrap());

    assert_eq!(complete.kind, TaskKind::Copy);
    assert_eq!(complete.succeeded, 54);
    assert_eq!(complete.failed, 0);

    for (i, (dir, count)) in dirs.iter().zip(per_dir).enumerate() {
        let copied = fx.real.join(dir.replacen("src", "dst", 1));
        let files = names(&copied)
            .into_iter()
            .filter(|name| name.ends_with(".txt"))
            .count();
        assert_eq!(files, count, "level {i}");
    }
    let copied = std::fs::read_to_string(fx.real.join("dst/l1/l2/l3/f49.txt")).unwrap();
    assert_eq!(copied, "content 49");
    assert!(fx.exists("src/l1/l2/l3/f49.txt"));
}

#[tokio::test]
async fn test_copy_with_rename_policy_duplicates() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");

    let request = json!({
        "items": [{ "source": fx.path("a.txt"), "destination": fx.path("a.txt") }],
    });
    let complete = completed(fx.runner().submit("copy", &request).await.unwrap());

    assert_eq!(complete.succeeded, 1);
    assert_eq!(names(&fx.real), vec!["a(1).txt", "a.txt"]);
}

#[tokio::test]
async fn test_copy_onto_itself_with_replace_keeps_data() {
    let fx = Fixture::new();
    fx.write("d/a.txt", "important");
    fx.write("x.txt", "also important");

    for source in ["d", "x.txt"] {
        let request = json!({
            "items": [{ "source": fx.path(source), "destination": fx.path(source) }],
            "policy": "REPLACE",
        });
        let complete = completed(fx.runner().submit("copy", &request).await.unwrap());
        assert_eq!(complete.succeeded, 0, "{source}");
        assert_eq!(complete.failed, 1, "{source}");
    }

    assert_eq!(std::fs::read_to_string(fx.real.join("d/a.txt")).unwrap(), "important");
    assert_eq!(std::fs::read_to_string(fx.real.join("x.txt")).unwrap(), "also important");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_tree_containing_a_fifo() {
    let fx = Fixture::new();
    fx.write("d/a.txt", "x");
    nix::unistd::mkfifo(&fx.real.join("d/pipe"), nix::sys::stat::Mode::S_IRWXU).unwrap();

    let runner = fx.runner().with_hints(None);
    let request = json!({ "paths": [fx.path("d")] });
    let outcome = tokio::time::timeout(Duration::from_secs(10), runner.submit("delete", &request))
        .await
        .expect("delete returned")
        .unwrap();
    let complete = completed(outcome);

    assert_eq!(complete.succeeded, 1);
    assert_eq!(complete.failed, 0);
    assert!(!fx.exists("d"));
}

#[tokio::test]
async fn test_delete_counts_missing_paths_as_failures() {
    let fx = Fixture::new();
    let mut paths = Vec::new();
    for i in 0..6 {
        fx.write(&format!("file{i}"), "x");
        paths.push(fx.path(&format!("file{i}")));
    }
    fx.write("tree/a/b/deep.txt", "x");
    fx.write("tree/top.txt", "x");
    paths.push(fx.path("tree"));
    for i in 0..3 {
        paths.push(fx.path(&format!("missing{i}")));
    }

    let request = json!({ "paths": paths });
    let complete = completed(fx.runner().submit("delete", &request).await.unwrap());

    assert_eq!(complete.succeeded, 7);
    assert_eq!(complete.failed, 3);
    assert_eq!(complete.summary(), "Deleted 7 items, 3 failed");
    assert!(names(&fx.real).is_empty());
}

#[tokio::test]
async fn test_move_merges_into_existing_directory() {
    let fx = Fixture::new();
    fx.write("src/dir/a.txt", "new a");
    fx.write("src/dir/b.txt", "b");
    fx.write("src/dir/sub/c.txt", "c");
    fx.write("dst/dir/a.txt", "old a");

    let request = json!({
        "items": [{ "source": fx.path("src/dir"), "destination": fx.path("dst/dir") }],
        "policy": "MERGE_RENAME",
    });
    let complete = completed(fx.runner().submit("move", &request).await.unwrap());

    assert_eq!(complete.failed, 0);
    assert_eq!(
        names(&fx.real.join("dst/dir")),
        vec!["a(1).txt", "a.txt", "b.txt", "sub"]
    );
    assert_eq!(
        std::fs::read_to_string(fx.real.join("dst/dir/a.txt")).unwrap(),
        "old a"
    );
    assert!(fx.exists("dst/dir/sub/c.txt"));
    assert!(!fx.exists("src/dir"));
}

#[tokio::test]
async fn test_move_into_itself_is_refused() {
    let fx = Fixture::new();
    fx.write("dir/file", "x");

    let request = json!({
        "items": [{ "source": fx.path("dir"), "destination": fx.path("dir/inner") }],
    });
    let complete = completed(fx.runner().submit("move", &request).await.unwrap());

    assert_eq!(complete.succeeded, 0);
    assert_eq!(complete.failed, 1);
    assert_eq!(names(&fx.real.join("dir")), vec!["file"]);
}

#[tokio::test]
async fn test_trash_then_empty_trash() {
    let fx = Fixture::new();
    let runner = fx.runner();
    fx.write("a.txt", "first");
    fx.write("dir/x", "x");

    let request = json!({ "paths": [fx.path("a.txt"), fx.path("dir")] });
    let complete = completed(runner.submit("trash", &request).await.unwrap());
    assert_eq!(complete.succeeded, 2);
    assert_eq!(names(&fx.real.join("Trash")), vec!["a.txt", "dir"]);

    fx.write("a.txt", "second");
    let request = json!({ "paths": [fx.path("a.txt")] });
    completed(runner.submit("trash", &request).await.unwrap());
    assert_eq!(
        names(&fx.real.join("Trash")),
        vec!["a(1).txt", "a.txt", "dir"]
    );

    let complete = completed(runner.submit("empty_trash", &json!({})).await.unwrap());
    assert_eq!(complete.kind, TaskKind::EmptyTrash);
    assert_eq!(complete.succeeded, 3);
    assert!(fx.exists("Trash"));
    assert!(names(&fx.real.join("Trash")).is_empty());
}

#[tokio::test]
async fn test_trashing_the_trash_is_refused() {
    let fx = Fixture::new();
    fx.write("Trash/old", "x");

    let request = json!({ "paths": [fx.path("Trash")] });
    let complete = completed(fx.runner().submit("trash", &request).await.unwrap());

    assert_eq!(complete.failed, 1);
    assert!(fx.exists("Trash/old"));
}

#[tokio::test]
async fn test_create_folder_policies() {
    let fx = Fixture::new();
    let runner = fx.runner();
    let target = fx.path("x/y/z");

    let create = |policy: &str| json!({ "paths": [target], "policy": policy });

    let complete = completed(runner.submit("create_folder", &create("REJECT")).await.unwrap());
    assert_eq!(complete.succeeded, 1);
    assert!(fx.real.join("x/y/z").is_dir());

    let complete = completed(runner.submit("create_folder", &create("REJECT")).await.unwrap());
    assert_eq!(complete.failed, 1);

    let complete = completed(runner.submit("create_folder", &create("RENAME")).await.unwrap());
    assert_eq!(complete.succeeded, 1);
    assert_eq!(names(&fx.real.join("x/y")), vec!["z", "z(1)"]);

    let complete =
        completed(runner.submit("create_folder", &create("MERGE_RENAME")).await.unwrap());
    assert_eq!(complete.succeeded, 1);
    assert_eq!(names(&fx.real.join("x/y")), vec!["z", "z(1)"]);
}

#[tokio::test]
async fn test_permission_denied_before_anything_changes() {
    let fx = Fixture::new();
    fx.write("allowed/a", "x");
    fx.write("forbidden/b", "x");

    let access = RootedAccess::new().with_write_root(fx.path("allowed"));
    let runner = TaskRunner::new(fx.fs.clone(), Arc::new(access));

    let request = json!({ "paths": [fx.path("allowed/a"), fx.path("forbidden/b")] });
    let err = runner.submit("delete", &request).await.unwrap_err();

    assert!(matches!(
        err,
        TaskError::PermissionDenied {
            permission: Permission::Write,
            ..
        }
    ));
    assert!(fx.exists("allowed/a"));
    assert!(fx.exists("forbidden/b"));
}

#[tokio::test]
async fn test_copy_needs_read_on_source_and_write_on_destination() {
    let fx = Fixture::new();
    fx.write("shared/doc", "x");

    let access = RootedAccess::new()
        .with_read_root(fx.path("shared"))
        .with_write_root(fx.path("home"));
    let runner = TaskRunner::new(fx.fs.clone(), Arc::new(access));

    let allowed = json!({
        "items": [{ "source": fx.path("shared/doc"), "destination": fx.path("home/doc") }],
    });
    std::fs::create_dir(fx.real.join("home")).unwrap();
    let complete = completed(runner.submit("copy", &allowed).await.unwrap());
    assert_eq!(complete.succeeded, 1);

    let reversed = json!({
        "items": [{ "source": fx.path("home/doc"), "destination": fx.path("shared/copy") }],
    });
    assert!(matches!(
        runner.submit("copy", &reversed).await.unwrap_err(),
        TaskError::PermissionDenied { .. }
    ));
    assert!(!fx.exists("shared/copy"));
}

#[tokio::test]
async fn test_unknown_operation_and_malformed_request() {
    let fx = Fixture::new();
    let runner = fx.runner();

    assert!(matches!(
        runner.submit("explode", &json!({})).await.unwrap_err(),
        TaskError::UnknownOperation(_)
    ));
    assert!(matches!(
        runner
            .submit("delete", &json!({ "items": [] }))
            .await
            .unwrap_err(),
        TaskError::InvalidRequest(_)
    ));
    assert!(matches!(
        runner
            .submit("delete", &json!({ "paths": ["not/absolute"] }))
            .await
            .unwrap_err(),
        TaskError::InvalidRequest(_)
    ));
}

#[tokio::test]
async fn test_trash_requires_a_trash_root() {
    let fx = Fixture::new();
    let runner = TaskRunner::new(fx.fs.clone(), Arc::new(AllowAll));

    assert!(!runner.operations().contains(&"trash"));
    let err = runner
        .submit("trash", &json!({ "paths": [fx.path("a")] }))
        .await
        .unwrap_err();
    assert!(matches!(err, TaskError::UnknownOperation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_large_task_runs_in_background() {
    let fx = Fixture::new();
    let mut paths = Vec::new();
    for i in 0..10 {
        fx.write(&format!("file{i}"), "x");
        paths.push(fx.path(&format!("file{i}")));
    }

    let runner = fx.runner().with_limits(RequirementLimits {
        foreground_items: 5,
        ..RequirementLimits::default()
    });
    let outcome = runner
        .submit("delete", &json!({ "paths": paths }))
        .await
        .unwrap();

    let TaskOutcome::Background(mut task) = outcome else {
        panic!("expected a background task");
    };
    assert_eq!(task.requirements.mode, ExecutionMode::Background);
    assert_eq!(task.requirements.estimated_items, 10);

    let first = task.progress.recv().await.unwrap();
    assert_eq!(first.kind, TaskKind::Delete);
    assert!(first.processed() >= 1);

    let complete = task.wait().await.unwrap();
    assert_eq!(complete.succeeded, 10);
    assert!(names(&fx.real).is_empty());
}

fn delete_task(paths: Vec<InternalPath>) -> DeleteTask {
    DeleteTask::new(DeleteRequest { paths })
}

#[test]
fn test_estimate_stops_at_the_item_limit() {
    let fx = Fixture::new();
    for i in 0..30 {
        fx.write(&format!("tree/f{i}"), "x");
    }
    let task = delete_task(vec![fx.path("tree")]);
    let limits = RequirementLimits {
        max_items: 20,
        ..RequirementLimits::default()
    };

    let requirements = collect_requirements(
        &task,
        &AllowAll,
        &fx.fs,
        None,
        &limits,
        &CancellationToken::new(),
    )
    .unwrap();

    assert!(requirements.limit_reached);
    assert_eq!(requirements.estimated_items, 20);
    assert_eq!(requirements.mode, ExecutionMode::Background);
    assert_eq!(requirements.workers, MAX_WORKERS);
}

#[test]
fn test_estimate_counts_the_whole_tree() {
    let fx = Fixture::new();
    for i in 0..60 {
        fx.write(&format!("tree/sub{}/f{i}", i % 3), "x");
    }
    let task = delete_task(vec![fx.path("tree"), fx.path("missing")]);

    let requirements = collect_requirements(
        &task,
        &AllowAll,
        &fx.fs,
        None,
        &RequirementLimits::default(),
        &CancellationToken::new(),
    )
    .unwrap();

    // tree, 3 subdirectories, 60 files and the missing path
    assert_eq!(requirements.estimated_items, 65);
    assert!(!requirements.limit_reached);
    assert_eq!(requirements.mode, ExecutionMode::Foreground);
    assert_eq!(requirements.workers, 2);
}

struct FixedHint(i64);

impl DirectoryStats for FixedHint {
    fn recursive_size(&self, _path: &InternalPath) -> i64 {
        -1
    }

    fn recursive_file_count(&self, _path: &InternalPath) -> i64 {
        -1
    }

    fn recursive_directory_count(&self, _path: &InternalPath) -> i64 {
        -1
    }

    fn recursive_entry_count(&self, _path: &InternalPath) -> i64 {
        self.0
    }

    fn recursive_modified_at(&self, _path: &InternalPath) -> i64 {
        -1
    }
}

#[test]
fn test_estimate_prefers_entry_count_hint() {
    let fx = Fixture::new();
    fx.write("tree/only", "x");
    let task = delete_task(vec![fx.path("tree")]);

    let requirements = collect_requirements(
        &task,
        &AllowAll,
        &fx.fs,
        Some(&FixedHint(4_999)),
        &RequirementLimits::default(),
        &CancellationToken::new(),
    )
    .unwrap();

    assert_eq!(requirements.estimated_items, 5_000);
    assert_eq!(requirements.mode, ExecutionMode::Background);
    assert_eq!(requirements.workers, MAX_WORKERS);
}

#[test]
fn test_estimate_honours_cancellation() {
    let fx = Fixture::new();
    fx.write("tree/f", "x");
    let task = delete_task(vec![fx.path("tree")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = collect_requirements(
        &task,
        &AllowAll,
        &fx.fs,
        None,
        &RequirementLimits::default(),
        &cancel,
    )
    .unwrap_err();
    assert!(matches!(err, TaskError::Cancelled));
}

#[tokio::test]
async fn test_runner_cancel_stops_collection() {
    let fx = Fixture::new();
    fx.write("tree/f", "x");
    fx.write("Trash/old", "x");
    let runner = fx.runner().with_hints(None);
    let cancel = CancellationToken::new();
    cancel.cancel();

    for (operation, request) in [
        ("delete", json!({ "paths": [fx.path("tree")] })),
        ("empty_trash", json!({})),
    ] {
        let err = runner
            .submit_with_cancel(operation, &request, cancel.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::Cancelled), "{operation}");
    }
    assert!(fx.exists("tree/f"));
    assert!(fx.exists("Trash/old"));
}

#[tokio::test]
async fn test_cancelled_task_starts_nothing() {
    let fx = Fixture::new();
    fx.write("a", "x");
    fx.write("b", "x");
    let task = Arc::new(delete_task(vec![fx.path("a"), fx.path("b")]));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let complete = execute(task, fx.fs.clone(), 2, cancel, None).await.unwrap();

    assert!(complete.cancelled);
    assert_eq!(complete.succeeded + complete.failed, 0);
    assert!(fx.exists("a"));
    assert!(fx.exists("b"));
}

#[tokio::test]
async fn test_empty_task_completes_immediately() {
    let fx = Fixture::new();
    let task = Arc::new(delete_task(Vec::new()));

    let complete = execute(task, fx.fs.clone(), 3, CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(complete.succeeded, 0);
    assert!(!complete.cancelled);
}

#[derive(Debug)]
struct Exploding;

impl BulkTask for Exploding {
    fn kind(&self) -> TaskKind {
        TaskKind::Delete
    }

    fn input_paths(&self) -> Vec<(InternalPath, Permission)> {
        Vec::new()
    }

    fn estimate_roots(&self) -> Vec<InternalPath> {
        Vec::new()
    }

    fn seed(&self, _fs: &FileSystem) -> FsResult<Vec<WorkItem>> {
        Ok(vec![WorkItem::Path(InternalPath::root())])
    }

    fn process(&self, _fs: &FileSystem, _item: &WorkItem) -> FsResult<Vec<WorkItem>> {
        panic!("boom");
    }
}

#[tokio::test]
async fn test_panicking_item_aborts_the_task() {
    let fx = Fixture::new();

    let err = execute(Arc::new(Exploding), fx.fs.clone(), 1, CancellationToken::new(), None)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::Aborted(_)));
}
