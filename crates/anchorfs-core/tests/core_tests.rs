use anchorfs_core::{
    BackendKind, CopyResult, FileStat, FileType, FsConfig, FsError, InternalPath, MoveResult,
    PathError, WriteConflictPolicy, rename_candidate, DEFAULT_DIRECTORY_MODE, DEFAULT_FILE_MODE,
    POOL_BUFFER_SIZE, POOL_CAPACITY,
};

#[test]
fn test_internal_path_round_trips_through_serde() {
    let path = InternalPath::new("/projects/alpha/data.csv").unwrap();
    let json = serde_json::to_string(&path).unwrap();
    assert_eq!(json, "\"/projects/alpha/data.csv\"");

    let back: InternalPath = serde_json::from_str(&json).unwrap();
    assert_eq!(back, path);
}

#[test]
fn test_internal_path_deserialize_rejects_traversal() {
    let result: Result<InternalPath, _> = serde_json::from_str("\"/projects/../etc/passwd\"");
    assert!(result.is_err());

    let result: Result<InternalPath, _> = serde_json::from_str("\"relative/path\"");
    assert!(result.is_err());
}

#[test]
fn test_internal_path_navigation() {
    let path = InternalPath::new("/root/a/b/c").unwrap();

    let mut ancestors = Vec::new();
    let mut current = Some(path.clone());
    while let Some(p) = current {
        ancestors.push(p.to_string());
        current = p.parent();
    }

    assert_eq!(ancestors, vec!["/root/a/b/c", "/root/a/b", "/root/a", "/root", "/"]);
    assert_eq!(
        path.with_file_name("d").unwrap().as_str(),
        "/root/a/b/d"
    );
    assert!(matches!(
        InternalPath::root().with_file_name("x"),
        Err(PathError::InvalidComponent(_))
    ));
}

#[test]
fn test_file_stat_serializes_type_names() {
    let stat = FileStat {
        size: 4096,
        modified_at: 0,
        file_type: FileType::Directory,
        owner_uid: 11042,
        owner_gid: 11042,
        mode: 0o040750,
        sensitivity: Some("CONFIDENTIAL".to_string()),
    };

    let value = serde_json::to_value(&stat).unwrap();
    assert_eq!(value["file_type"], "DIRECTORY");
    assert_eq!(value["sensitivity"], "CONFIDENTIAL");
    assert!(stat.is_dir());
    assert!(!stat.is_regular());
    assert_eq!(stat.permissions(), 0o750);
}

#[test]
fn test_conflict_policy_default_is_rename() {
    assert_eq!(WriteConflictPolicy::default(), WriteConflictPolicy::Rename);
    assert!(WriteConflictPolicy::Rename.allows_rename());
    assert!(!WriteConflictPolicy::Reject.allows_rename());
}

#[test]
fn test_rename_candidates_are_distinct() {
    let names: Vec<_> = (1..=3).map(|i| rename_candidate("notes.txt", i)).collect();
    assert_eq!(names, vec!["notes(1).txt", "notes(2).txt", "notes(3).txt"]);
}

#[test]
fn test_single_entry_outcomes() {
    let dir = InternalPath::new("/dest/folder").unwrap();
    let result = CopyResult::CreatedDirectory(dir.clone());
    assert_eq!(result, CopyResult::CreatedDirectory(dir));
    assert_ne!(CopyResult::CreatedFile, CopyResult::NothingToCreate);

    let moved = MoveResult {
        needs_to_recurse: true,
    };
    assert!(moved.needs_to_recurse);
}

#[test]
fn test_fs_config_defaults() {
    let config = FsConfig::default();
    assert_eq!(config.backend, BackendKind::Auto);
    assert_eq!(config.directory_mode, DEFAULT_DIRECTORY_MODE);
    assert_eq!(config.file_mode, DEFAULT_FILE_MODE);
    assert_eq!(config.pool_buffer_size, POOL_BUFFER_SIZE);
    assert_eq!(config.pool_capacity, POOL_CAPACITY);
    assert!(!config.disable_chown);

    let portable = FsConfig::unprivileged().with_backend(BackendKind::Portable);
    assert_eq!(portable.backend, BackendKind::Portable);
    assert!(portable.disable_chown);
}

#[test]
fn test_fs_error_classification() {
    let err: FsError = InternalPath::new("nope").unwrap_err().into();
    assert!(matches!(err, FsError::InvalidPath(_)));

    let io: std::io::Error = FsError::not_found("/missing").into();
    assert_eq!(io.kind(), std::io::ErrorKind::NotFound);

    let io: std::io::Error = FsError::bad_request("/dir", "directory is not empty").into();
    assert_eq!(io.kind(), std::io::ErrorKind::InvalidInput);
}
