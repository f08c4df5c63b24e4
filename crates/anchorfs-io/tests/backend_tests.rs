#![cfg(unix)]

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use anchorfs_core::BackendKind;
use anchorfs_io::{
    CopyResult, FileSystem, FsConfig, InternalPath, WriteConflictPolicy, WriteOptions,
};
use tempfile::TempDir;

fn backends() -> Vec<BackendKind> {
    if cfg!(target_os = "linux") {
        vec![BackendKind::Native, BackendKind::Portable]
    } else {
        vec![BackendKind::Portable]
    }
}

/// Run `test` once per available backend against a fresh temporary root.
fn for_each_backend(test: impl Fn(&FileSystem, &InternalPath, &Path)) {
    for kind in backends() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().canonicalize().unwrap();
        let root = InternalPath::try_from(real.as_path()).unwrap();
        let fs = FileSystem::new(FsConfig::unprivileged().with_backend(kind)).unwrap();
        test(&fs, &root, &real);
    }
}

fn child(root: &InternalPath, relative: &str) -> InternalPath {
    InternalPath::new(format!("{root}/{relative}")).unwrap()
}

#[test]
fn test_write_then_read_round_trips() {
    for_each_backend(|fs, root, _| {
        let path = child(root, "data.bin");
        let content: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();

        let name = fs.write_all(&path, &content, WriteConflictPolicy::Reject).unwrap();
        assert_eq!(name, "data.bin");
        assert_eq!(fs.read_to_vec(&path).unwrap(), content);
        assert_eq!(fs.stat(&path).unwrap().size, content.len() as u64);
    });
}

#[test]
fn test_symlinks_are_never_followed() {
    for_each_backend(|fs, root, real| {
        std::fs::create_dir(real.join("target")).unwrap();
        std::fs::write(real.join("target/secret.txt"), b"secret").unwrap();
        std::os::unix::fs::symlink(real.join("target"), real.join("dir_link")).unwrap();
        std::os::unix::fs::symlink(real.join("target/secret.txt"), real.join("file_link")).unwrap();

        let through_dir = child(root, "dir_link/secret.txt");
        let leaf_link = child(root, "file_link");
        let elsewhere = child(root, "elsewhere.txt");

        for path in [&through_dir, &leaf_link] {
            assert!(fs.stat(path).unwrap_err().is_not_found(), "stat {path}");
            assert!(fs.open_for_reading(path).unwrap_err().is_not_found(), "read {path}");
            assert!(fs.delete(path).unwrap_err().is_not_found(), "delete {path}");
            assert!(
                fs.copy(path, &elsewhere, WriteConflictPolicy::Reject)
                    .unwrap_err()
                    .is_not_found(),
                "copy {path}"
            );
            assert!(
                fs.move_entry(path, &elsewhere, WriteConflictPolicy::Reject)
                    .unwrap_err()
                    .is_not_found(),
                "move {path}"
            );
        }

        assert!(fs.list_files(&child(root, "dir_link")).unwrap_err().is_not_found());
        assert!(
            fs.open_for_writing(&child(root, "dir_link/new.txt"), WriteConflictPolicy::Reject)
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            fs.open_for_writing(&leaf_link, WriteConflictPolicy::Replace)
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            fs.open_for_writing(&leaf_link, WriteConflictPolicy::Reject)
                .unwrap_err()
                .is_not_found()
        );
        assert!(
            fs.create_directories(&child(root, "dir_link/sub"))
                .unwrap_err()
                .is_not_found()
        );

        // Nothing behind the links was touched.
        assert_eq!(std::fs::read(real.join("target/secret.txt")).unwrap(), b"secret");
        assert!(!real.join("target/new.txt").exists());
        assert!(!real.join("target/sub").exists());
        assert!(!real.join("elsewhere.txt").exists());
    });
}

#[test]
fn test_move_reject_leaves_both_sides_unchanged() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("a.txt"), b"source").unwrap();
        std::fs::write(real.join("b.txt"), b"destination").unwrap();

        let err = fs
            .move_entry(&child(root, "a.txt"), &child(root, "b.txt"), WriteConflictPolicy::Reject)
            .unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(std::fs::read(real.join("a.txt")).unwrap(), b"source");
        assert_eq!(std::fs::read(real.join("b.txt")).unwrap(), b"destination");
    });
}

#[test]
fn test_move_replace_overwrites_destination() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("x.txt"), b"new content").unwrap();
        std::fs::write(real.join("y.txt"), b"old").unwrap();

        let result = fs
            .move_entry(&child(root, "x.txt"), &child(root, "y.txt"), WriteConflictPolicy::Replace)
            .unwrap();
        assert!(!result.needs_to_recurse);
        assert_eq!(std::fs::read(real.join("y.txt")).unwrap(), b"new content");
        assert!(!real.join("x.txt").exists());
    });
}

#[test]
fn test_move_rename_picks_free_name() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("a.txt"), b"one").unwrap();
        std::fs::create_dir(real.join("dest")).unwrap();
        std::fs::write(real.join("dest/a.txt"), b"two").unwrap();

        fs.move_entry(&child(root, "a.txt"), &child(root, "dest/a.txt"), WriteConflictPolicy::Rename)
            .unwrap();
        assert_eq!(std::fs::read(real.join("dest/a.txt")).unwrap(), b"two");
        assert_eq!(std::fs::read(real.join("dest/a(1).txt")).unwrap(), b"one");
    });
}

#[test]
fn test_move_merge_rename_asks_to_recurse_for_directories() {
    for_each_backend(|fs, root, real| {
        std::fs::create_dir_all(real.join("src/inner")).unwrap();
        std::fs::create_dir_all(real.join("dst/inner")).unwrap();

        let result = fs
            .move_entry(
                &child(root, "src/inner"),
                &child(root, "dst/inner"),
                WriteConflictPolicy::MergeRename,
            )
            .unwrap();
        assert!(result.needs_to_recurse);
        // Nothing was moved yet.
        assert!(real.join("src/inner").is_dir());
    });
}

#[test]
fn test_delete_distinguishes_non_empty_directories() {
    for_each_backend(|fs, root, real| {
        std::fs::create_dir_all(real.join("full")).unwrap();
        std::fs::write(real.join("full/file"), b"x").unwrap();
        std::fs::create_dir(real.join("empty")).unwrap();

        assert!(fs.delete(&child(root, "full")).unwrap_err().is_bad_request());
        fs.delete(&child(root, "empty")).unwrap();
        assert!(!real.join("empty").exists());
        assert!(fs.delete(&child(root, "missing")).unwrap_err().is_not_found());
        fs.delete(&child(root, "full/file")).unwrap();
        fs.delete(&child(root, "full")).unwrap();
    });
}

#[test]
fn test_create_directories_rejects_existing_leaf() {
    for_each_backend(|fs, root, real| {
        let path = child(root, "a/b/c");
        fs.create_directories(&path).unwrap();
        assert!(real.join("a").is_dir());
        assert!(real.join("a/b").is_dir());
        assert!(real.join("a/b/c").is_dir());

        assert!(fs.create_directories(&path).unwrap_err().is_already_exists());

        // A regular file in the middle of the path cannot be descended into.
        std::fs::write(real.join("plain"), b"x").unwrap();
        assert!(fs.create_directories(&child(root, "plain/sub")).unwrap_err().is_not_found());
    });
}

#[test]
fn test_list_files_excludes_dot_entries() {
    for_each_backend(|fs, root, real| {
        std::fs::create_dir(real.join("a")).unwrap();
        std::fs::write(real.join("b"), b"").unwrap();

        let names: HashSet<String> = fs.list_files(root).unwrap().into_iter().collect();
        assert_eq!(names, HashSet::from(["a".to_string(), "b".to_string()]));

        assert!(fs.list_files(&child(root, "b")).unwrap_err().is_bad_request());
    });
}

#[test]
fn test_open_for_writing_policies() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("report.pdf"), b"original").unwrap();
        let path = child(root, "report.pdf");

        assert!(
            fs.open_for_writing(&path, WriteConflictPolicy::Reject)
                .unwrap_err()
                .is_already_exists()
        );

        let (name, mut stream) = fs.open_for_writing(&path, WriteConflictPolicy::Rename).unwrap();
        assert_eq!(name, "report(1).pdf");
        stream.write_all(b"renamed").unwrap();
        stream.close().unwrap();

        fs.write_all(&path, b"replaced", WriteConflictPolicy::Replace).unwrap();
        assert_eq!(std::fs::read(real.join("report.pdf")).unwrap(), b"replaced");
        assert_eq!(std::fs::read(real.join("report(1).pdf")).unwrap(), b"renamed");

        std::fs::create_dir(real.join("folder")).unwrap();
        assert!(
            fs.open_for_writing(&child(root, "folder"), WriteConflictPolicy::Replace)
                .unwrap_err()
                .is_bad_request()
        );
    });
}

#[test]
fn test_open_for_writing_at_offset_and_append() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("log"), b"0123456789").unwrap();
        let path = child(root, "log");

        let options = WriteOptions::default().at_offset(2);
        let (_, mut stream) = fs
            .open_for_writing_with(&path, WriteConflictPolicy::Replace, &options)
            .unwrap();
        stream.write_all(b"ab").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read(real.join("log")).unwrap(), b"01ab456789");

        let (_, mut stream) = fs
            .open_for_writing_with(&path, WriteConflictPolicy::Replace, &WriteOptions::default().appending())
            .unwrap();
        stream.write_all(b"!").unwrap();
        stream.close().unwrap();
        assert_eq!(std::fs::read(real.join("log")).unwrap(), b"01ab456789!");

        let invalid = WriteOptions {
            offset: Some(1),
            ..WriteOptions::default()
        };
        assert!(
            fs.open_for_writing_with(&path, WriteConflictPolicy::Replace, &invalid)
                .unwrap_err()
                .is_bad_request()
        );
    });
}

#[test]
fn test_copy_single_entries() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("file.txt"), b"payload").unwrap();
        std::fs::create_dir(real.join("dir")).unwrap();

        let copied = fs
            .copy(&child(root, "file.txt"), &child(root, "copy.txt"), WriteConflictPolicy::Reject)
            .unwrap();
        assert_eq!(copied, CopyResult::CreatedFile);
        assert_eq!(std::fs::read(real.join("copy.txt")).unwrap(), b"payload");
        assert_eq!(std::fs::read(real.join("file.txt")).unwrap(), b"payload");

        let copied = fs
            .copy(&child(root, "dir"), &child(root, "dir"), WriteConflictPolicy::Rename)
            .unwrap();
        assert_eq!(copied, CopyResult::CreatedDirectory(child(root, "dir(1)")));
        assert!(real.join("dir(1)").is_dir());

        let merged = fs
            .copy(&child(root, "dir"), &child(root, "dir"), WriteConflictPolicy::MergeRename)
            .unwrap();
        assert_eq!(merged, CopyResult::CreatedDirectory(child(root, "dir")));

        assert!(
            fs.copy(&child(root, "file.txt"), &child(root, "copy.txt"), WriteConflictPolicy::Reject)
                .unwrap_err()
                .is_already_exists()
        );
    });
}

#[test]
fn test_copy_never_truncates_its_own_source() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("x.txt"), b"important").unwrap();
        std::fs::hard_link(real.join("x.txt"), real.join("alias.txt")).unwrap();
        let source = child(root, "x.txt");

        for policy in [WriteConflictPolicy::Replace, WriteConflictPolicy::Reject] {
            assert!(fs.copy(&source, &source, policy).unwrap_err().is_bad_request());
        }
        assert!(
            fs.copy(&source, &child(root, "alias.txt"), WriteConflictPolicy::Replace)
                .unwrap_err()
                .is_bad_request()
        );
        assert_eq!(std::fs::read(real.join("x.txt")).unwrap(), b"important");

        // Replacing a different file still truncates it first.
        std::fs::write(real.join("longer.txt"), b"a much longer payload").unwrap();
        fs.copy(&source, &child(root, "longer.txt"), WriteConflictPolicy::Replace)
            .unwrap();
        assert_eq!(std::fs::read(real.join("longer.txt")).unwrap(), b"important");
    });
}

#[test]
fn test_fifos_are_treated_as_plain_leaves() {
    use nix::sys::stat::Mode;

    for_each_backend(|fs, root, real| {
        nix::unistd::mkfifo(&real.join("pipe"), Mode::S_IRWXU).unwrap();
        let pipe = child(root, "pipe");

        let stat = fs.stat(&pipe).unwrap();
        assert!(!stat.is_dir());
        assert_eq!(stat.size, 0);
        assert!(fs.list_files(&pipe).unwrap_err().is_bad_request());
        assert!(fs.open_for_reading(&pipe).unwrap_err().is_bad_request());
        assert_eq!(
            fs.copy(&pipe, &child(root, "pipe_copy"), WriteConflictPolicy::Reject)
                .unwrap(),
            CopyResult::NothingToCreate
        );

        fs.delete(&pipe).unwrap();
        assert!(!real.join("pipe").exists());
    });
}

#[test]
fn test_read_stream_helpers() {
    for_each_backend(|fs, root, real| {
        std::fs::write(real.join("bytes"), b"abcdef").unwrap();
        let mut stream = fs.open_for_reading(&child(root, "bytes")).unwrap();
        assert_eq!(stream.read_byte().unwrap(), Some(b'a'));
        assert_eq!(stream.skip(3).unwrap(), 3);
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"ef");
        stream.close().unwrap();

        assert!(fs.open_for_reading(root).unwrap_err().is_bad_request());
    });
}

#[cfg(target_os = "linux")]
#[test]
fn test_native_extended_attributes() {
    let temp = TempDir::new().unwrap();
    let real = temp.path().canonicalize().unwrap();
    std::fs::write(real.join("doc"), b"x").unwrap();
    let path = InternalPath::try_from(real.join("doc").as_path()).unwrap();
    let fs = FileSystem::new(FsConfig::unprivileged().with_backend(BackendKind::Native)).unwrap();

    if let Err(e) = fs.set_extended_attribute(&path, "user.sensitivity", "CONFIDENTIAL", false) {
        // Filesystem without user xattr support.
        assert!(e.native_code().is_some());
        return;
    }

    assert_eq!(fs.get_extended_attribute(&path, "user.sensitivity").unwrap(), "CONFIDENTIAL");
    assert_eq!(fs.stat(&path).unwrap().sensitivity.as_deref(), Some("CONFIDENTIAL"));
    assert!(
        fs.set_extended_attribute(&path, "user.sensitivity", "PUBLIC", false)
            .unwrap_err()
            .is_already_exists()
    );
    fs.set_extended_attribute(&path, "user.sensitivity", "PUBLIC", true).unwrap();
    assert_eq!(fs.sensitivity(&path).unwrap().as_deref(), Some("PUBLIC"));

    fs.remove_extended_attribute(&path, "user.sensitivity").unwrap();
    assert_eq!(fs.sensitivity(&path).unwrap(), None);
}

#[cfg(target_os = "linux")]
#[test]
fn test_native_chmod() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let real = temp.path().canonicalize().unwrap();
    std::fs::write(real.join("f"), b"x").unwrap();
    let path = InternalPath::try_from(real.join("f").as_path()).unwrap();
    let fs = FileSystem::new(FsConfig::unprivileged().with_backend(BackendKind::Native)).unwrap();

    fs.chmod(&path, 0o600).unwrap();
    let mode = std::fs::metadata(real.join("f")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
    assert_eq!(fs.stat(&path).unwrap().permissions(), 0o600);

    // chown is skipped entirely when disabled.
    fs.chown(&path, 0, 0).unwrap();
}
