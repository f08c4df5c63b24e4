//! Backend on top of `std::fs` for platforms without the native syscalls.
//!
//! Symlinks are rejected by inspecting every prefix of the path with
//! `symlink_metadata` before acting. This narrows the window for a symlink
//! swap but cannot close it; use the native backend where available.

use std::fs::{self, DirBuilder, File, OpenOptions};
use std::io::{self, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anchorfs_core::{
    CopyResult, FileStat, FileType, FsConfig, FsError, FsResult, InternalPath, MoveResult,
    WriteConflictPolicy, rename_candidate,
};
use tracing::{debug, warn};

use super::{FsBackend, WriteOptions};
use crate::pool::BufferPool;
use crate::stream::copy_stream;

const MAX_RENAME_ATTEMPTS: u32 = 10_000;

#[cfg(unix)]
const UNSUPPORTED: i32 = libc::ENOTSUP;
#[cfg(not(unix))]
const UNSUPPORTED: i32 = 95;

/// Backend using `std::fs` with per-prefix symlink checks.
#[derive(Debug)]
pub struct PortableBackend {
    config: FsConfig,
    pool: Arc<BufferPool>,
}

impl PortableBackend {
    /// Create a portable backend.
    pub fn new(config: FsConfig, pool: Arc<BufferPool>) -> Self {
        Self { config, pool }
    }

    /// Fail with `NotFound` when any prefix of `path` is a symlink. The leaf
    /// is only checked when `include_leaf` is set.
    fn reject_symlinks(&self, path: &InternalPath, include_leaf: bool) -> FsResult<()> {
        let components: Vec<&str> = path.components().collect();
        let checked = if include_leaf {
            components.len()
        } else {
            components.len().saturating_sub(1)
        };

        let mut current = PathBuf::from("/");
        for name in &components[..checked] {
            current.push(name);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(FsError::not_found(path));
                }
                Ok(_) => {}
                // The operation itself reports the missing component.
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
                Err(e) => return Err(FsError::from_io(path, e)),
            }
        }
        Ok(())
    }

    fn dir_builder(&self) -> DirBuilder {
        #[allow(unused_mut)]
        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.config.directory_mode);
        }
        builder
    }

    fn file_options(&self, create_new: bool, truncate: bool) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.truncate(truncate);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options
                .custom_flags(libc::O_NOFOLLOW)
                .mode(self.config.file_mode);
        }
        options
    }

    fn open_nofollow(&self, path: &InternalPath) -> FsResult<File> {
        let mut options = OpenOptions::new();
        options.read(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK);
        }
        options.open(path).map_err(|e| FsError::from_io(path, e))
    }

    /// Open a file for writing below `parent`, resolving conflicts per `policy`.
    ///
    /// An existing file is only truncated after checking it is not the same
    /// inode as `source`.
    fn create_file(
        &self,
        parent: &InternalPath,
        desired: &str,
        policy: WriteConflictPolicy,
        truncate: bool,
        source: Option<&fs::Metadata>,
    ) -> FsResult<(String, File)> {
        let target = parent.join(desired)?;
        match self.file_options(true, truncate).open(&target) {
            Ok(file) => return Ok((desired.to_string(), file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(FsError::from_io(&target, e)),
        }

        match policy {
            WriteConflictPolicy::Replace => {
                let file = self
                    .file_options(false, false)
                    .open(&target)
                    .map_err(|e| FsError::from_io(&target, e))?;
                if let Some(source) = source {
                    let existing = file.metadata().map_err(|e| FsError::from_io(&target, e))?;
                    if same_file(source, &existing) {
                        return Err(FsError::bad_request(
                            &target,
                            "source and destination are the same file",
                        ));
                    }
                }
                if truncate {
                    file.set_len(0).map_err(|e| FsError::from_io(&target, e))?;
                }
                Ok((desired.to_string(), file))
            }
            WriteConflictPolicy::Reject => match fs::symlink_metadata(&target) {
                Ok(meta) if meta.file_type().is_symlink() => Err(FsError::not_found(&target)),
                _ => Err(FsError::already_exists(&target)),
            },
            WriteConflictPolicy::Rename | WriteConflictPolicy::MergeRename => {
                for attempt in 1..MAX_RENAME_ATTEMPTS {
                    let candidate = rename_candidate(desired, attempt);
                    let path = parent.join(&candidate)?;
                    match self.file_options(true, truncate).open(&path) {
                        Ok(file) => return Ok((candidate, file)),
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                        Err(e) => return Err(FsError::from_io(&path, e)),
                    }
                }
                Err(FsError::bad_request(&target, "too many files with this name"))
            }
        }
    }

    /// Create (or reuse) a directory below `parent`, returning its final name.
    fn create_directory(
        &self,
        parent: &InternalPath,
        desired: &str,
        policy: WriteConflictPolicy,
    ) -> FsResult<String> {
        let target = parent.join(desired)?;
        match fs::symlink_metadata(&target) {
            Ok(meta) if meta.is_dir() => {
                if matches!(
                    policy,
                    WriteConflictPolicy::Replace | WriteConflictPolicy::MergeRename
                ) {
                    return Ok(desired.to_string());
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match self.dir_builder().create(&target) {
                    Ok(()) => return Ok(desired.to_string()),
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                    Err(e) => return Err(FsError::from_io(&target, e)),
                }
            }
            Err(e) => return Err(FsError::from_io(&target, e)),
        }

        if !policy.allows_rename() {
            return Err(FsError::already_exists(&target));
        }

        for attempt in 1..MAX_RENAME_ATTEMPTS {
            let candidate = rename_candidate(desired, attempt);
            let path = parent.join(&candidate)?;
            match self.dir_builder().create(&path) {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(FsError::from_io(&path, e)),
            }
        }
        Err(FsError::bad_request(&target, "too many files with this name"))
    }

    fn split_parent<'a>(&self, path: &'a InternalPath) -> FsResult<(InternalPath, &'a str)> {
        match (path.parent(), path.file_name()) {
            (Some(parent), Some(name)) => Ok((parent, name)),
            _ => Err(FsError::bad_request(path, "the root has no parent")),
        }
    }

    fn metadata(&self, path: &InternalPath) -> FsResult<fs::Metadata> {
        self.reject_symlinks(path, true)?;
        let meta = fs::symlink_metadata(path).map_err(|e| FsError::from_io(path, e))?;
        if meta.file_type().is_symlink() {
            return Err(FsError::not_found(path));
        }
        Ok(meta)
    }
}

impl FsBackend for PortableBackend {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn create_directories(&self, path: &InternalPath, _owner: Option<u32>) -> FsResult<()> {
        let components: Vec<&str> = path.components().collect();
        let Some((leaf, ancestors)) = components.split_last() else {
            return Err(FsError::already_exists(path));
        };

        let mut current = PathBuf::from("/");
        for name in ancestors {
            current.push(name);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(FsError::not_found(path)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    match self.dir_builder().create(&current) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                        Err(e) => {
                            debug!(path = %path, "mkdir failed: {e}");
                            return Err(FsError::not_found(path));
                        }
                    }
                }
                Err(e) => return Err(FsError::from_io(path, e)),
            }
        }

        current.push(leaf);
        self.dir_builder()
            .create(&current)
            .map_err(|e| FsError::from_io(path, e))
    }

    fn copy(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
        _owner: Option<u32>,
    ) -> FsResult<CopyResult> {
        let meta = self.metadata(source)?;
        self.reject_symlinks(destination, false)?;
        let (parent, name) = self.split_parent(destination)?;

        if meta.is_file() {
            let mut input = self.open_nofollow(source)?;
            let (_, mut output) = self.create_file(&parent, name, policy, true, Some(&meta))?;
            copy_stream(&self.pool, &mut input, &mut output)
                .map_err(|e| FsError::from_io(source, e))?;
            output
                .set_permissions(meta.permissions())
                .map_err(|e| FsError::from_io(destination, e))?;
            Ok(CopyResult::CreatedFile)
        } else if meta.is_dir() {
            let created = self.create_directory(&parent, name, policy)?;
            Ok(CopyResult::CreatedDirectory(parent.join(&created)?))
        } else {
            Ok(CopyResult::NothingToCreate)
        }
    }

    fn move_entry(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
    ) -> FsResult<MoveResult> {
        let source_meta = self.metadata(source)?;
        self.reject_symlinks(destination, false)?;
        let (parent, name) = self.split_parent(destination)?;

        let existing = match fs::symlink_metadata(destination) {
            Ok(meta) => Some(meta),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(FsError::from_io(destination, e)),
        };
        let moved = MoveResult {
            needs_to_recurse: false,
        };

        match policy {
            WriteConflictPolicy::Replace => {
                fs::rename(source, destination).map_err(|e| FsError::from_io(destination, e))?;
                return Ok(moved);
            }
            WriteConflictPolicy::Reject => {
                if existing.is_some() {
                    return Err(FsError::already_exists(destination));
                }
                fs::rename(source, destination).map_err(|e| FsError::from_io(destination, e))?;
                return Ok(moved);
            }
            WriteConflictPolicy::MergeRename
                if source_meta.is_dir() && existing.as_ref().is_some_and(|m| m.is_dir()) =>
            {
                return Ok(MoveResult {
                    needs_to_recurse: true,
                });
            }
            WriteConflictPolicy::Rename | WriteConflictPolicy::MergeRename => {}
        }

        if existing.is_none() {
            fs::rename(source, destination).map_err(|e| FsError::from_io(destination, e))?;
            return Ok(moved);
        }

        for attempt in 1..MAX_RENAME_ATTEMPTS {
            let candidate = parent.join(&rename_candidate(name, attempt))?;
            match fs::symlink_metadata(&candidate) {
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    fs::rename(source, &candidate).map_err(|e| FsError::from_io(&candidate, e))?;
                    return Ok(moved);
                }
                Err(e) => return Err(FsError::from_io(&candidate, e)),
            }
        }
        Err(FsError::bad_request(destination, "too many files with this name"))
    }

    fn open_for_writing(
        &self,
        path: &InternalPath,
        policy: WriteConflictPolicy,
        options: &WriteOptions,
    ) -> FsResult<(String, File)> {
        options.validate(path)?;
        self.reject_symlinks(path, false)?;
        let (parent, name) = self.split_parent(path)?;
        let (name, mut file) = self.create_file(&parent, name, policy, options.truncate, None)?;

        let position = match options.offset {
            Some(offset) => Some(SeekFrom::Start(offset)),
            None if !options.truncate => Some(SeekFrom::End(0)),
            None => None,
        };
        if let Some(position) = position {
            file.seek(position).map_err(|e| FsError::from_io(path, e))?;
        }
        Ok((name, file))
    }

    fn open_for_reading(&self, path: &InternalPath) -> FsResult<File> {
        let meta = self.metadata(path)?;
        if meta.is_dir() {
            return Err(FsError::bad_request(path, "target is a directory"));
        }
        if !meta.is_file() {
            return Err(FsError::bad_request(path, "not a regular file"));
        }
        self.open_nofollow(path)
    }

    fn list_files(&self, path: &InternalPath) -> FsResult<Vec<String>> {
        let meta = self.metadata(path)?;
        if !meta.is_dir() {
            return Err(FsError::bad_request(path, "not a directory"));
        }

        let mut names = Vec::new();
        let mut skipped = 0usize;
        for entry in fs::read_dir(path).map_err(|e| FsError::from_io(path, e))? {
            let entry = entry.map_err(|e| FsError::from_io(path, e))?;
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %path, skipped, "Skipped entries with non UTF-8 names");
        }
        Ok(names)
    }

    fn delete(&self, path: &InternalPath) -> FsResult<()> {
        let meta = self.metadata(path)?;
        let result = if meta.is_dir() {
            fs::remove_dir(path)
        } else {
            fs::remove_file(path)
        };
        result.map_err(|e| FsError::from_io(path, e))
    }

    fn stat(&self, path: &InternalPath) -> FsResult<FileStat> {
        let meta = self.metadata(path)?;
        let modified_at = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        #[cfg(unix)]
        let (owner_uid, owner_gid, mode) = {
            use std::os::unix::fs::MetadataExt;
            (meta.uid(), meta.gid(), meta.mode())
        };
        #[cfg(not(unix))]
        let (owner_uid, owner_gid, mode) = {
            let type_bits = if meta.is_dir() { 0o040000 } else { 0o100000 };
            (0, 0, type_bits | self.config.file_mode)
        };

        Ok(FileStat {
            size: meta.len(),
            modified_at,
            file_type: if meta.is_dir() {
                FileType::Directory
            } else {
                FileType::File
            },
            owner_uid,
            owner_gid,
            mode,
            sensitivity: None,
        })
    }

    fn get_extended_attribute(&self, path: &InternalPath, _name: &str) -> FsResult<String> {
        Err(FsError::Native {
            path: path.to_string(),
            code: UNSUPPORTED,
        })
    }

    fn set_extended_attribute(
        &self,
        path: &InternalPath,
        _name: &str,
        _value: &str,
        _allow_overwrite: bool,
    ) -> FsResult<()> {
        Err(FsError::Native {
            path: path.to_string(),
            code: UNSUPPORTED,
        })
    }

    fn remove_extended_attribute(&self, path: &InternalPath, _name: &str) -> FsResult<()> {
        Err(FsError::Native {
            path: path.to_string(),
            code: UNSUPPORTED,
        })
    }

    fn chmod(&self, path: &InternalPath, _mode: u32) -> FsResult<()> {
        debug!(path = %path, "chmod is a no-op on the portable backend");
        Ok(())
    }

    fn chown(&self, path: &InternalPath, _uid: u32, _gid: u32) -> FsResult<()> {
        debug!(path = %path, "chown is a no-op on the portable backend");
        Ok(())
    }

    fn change_file_permissions(
        &self,
        path: &InternalPath,
        _mode: u32,
        _uid: u32,
        _gid: u32,
    ) -> FsResult<()> {
        debug!(path = %path, "Permission changes are a no-op on the portable backend");
        Ok(())
    }
}

#[cfg(unix)]
fn same_file(a: &fs::Metadata, b: &fs::Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &fs::Metadata, _b: &fs::Metadata) -> bool {
    false
}
