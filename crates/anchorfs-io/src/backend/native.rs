//! Linux backend built on `openat`-style syscalls.
//!
//! Every operation resolves its path through a [`DescriptorChain`] and acts
//! on the resulting descriptor (or on a name relative to the parent
//! descriptor), never on a path string.

use std::ffi::CString;
use std::fs::File;
use std::io::{self, Seek, SeekFrom};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::sync::Arc;

use anchorfs_core::{
    CopyResult, FileStat, FileType, FsConfig, FsError, FsResult, InternalPath, MoveResult,
    WriteConflictPolicy, rename_candidate,
};
use nix::dir::Dir;
use nix::errno::Errno;
use nix::fcntl::{AtFlags, OFlag, RenameFlags, openat, renameat, renameat2};
use nix::sys::stat::{Mode, fchmod, fstat, fstatat, mkdirat};
use nix::unistd::{Gid, Uid, UnlinkatFlags, fchown, ftruncate, unlinkat};
use tracing::{debug, warn};

use super::{FsBackend, WriteOptions};
use crate::chain::{DIRECTORY_FLAGS, DescriptorChain, LEAF_FLAGS};
use crate::pool::BufferPool;
use crate::stream::copy_stream;

/// Highest suffix tried before giving up on finding a free name.
const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Flags for opens that only inspect an entry. `O_NONBLOCK` keeps a FIFO
/// swapped in after classification from blocking the open.
const INSPECT_FLAGS: OFlag = OFlag::O_RDONLY.union(OFlag::O_NONBLOCK);

/// The leaf of a path, classified before anything is opened.
enum Leaf {
    /// A regular file or directory, opened read-only.
    Opened(OwnedFd),
    /// A FIFO, socket or device node. These are never opened.
    Special(libc::stat),
}

/// Resolve `path` and open its leaf only when it is a regular file or a
/// directory. Symlinks are reported as `NotFound`.
fn open_inspect(path: &InternalPath) -> FsResult<Leaf> {
    if path.file_name().is_none() {
        return DescriptorChain::open(path, INSPECT_FLAGS, 0).map(Leaf::Opened);
    }
    let (parent, name) = DescriptorChain::open_parent(path)?;
    let stat = stat_at(parent.as_fd(), name)
        .map_err(|e| FsError::from_errno(path, e as i32))?
        .ok_or_else(|| FsError::not_found(path))?;
    match stat.st_mode & libc::S_IFMT {
        libc::S_IFLNK => Err(FsError::not_found(path)),
        libc::S_IFREG | libc::S_IFDIR => openat(
            parent.as_fd(),
            name,
            INSPECT_FLAGS | LEAF_FLAGS,
            Mode::empty(),
        )
        .map(Leaf::Opened)
        .map_err(|e| FsError::from_errno(path, e as i32)),
        _ => Ok(Leaf::Special(stat)),
    }
}

/// Like [`open_inspect`], refusing special files.
fn open_regular_or_directory(path: &InternalPath) -> FsResult<OwnedFd> {
    match open_inspect(path)? {
        Leaf::Opened(fd) => Ok(fd),
        Leaf::Special(_) => Err(FsError::bad_request(path, "not a regular file or directory")),
    }
}

/// An entry created (or reused) under a parent descriptor.
struct CreatedEntry {
    name: String,
    fd: OwnedFd,
    created: bool,
}

/// Backend using descriptor-relative Linux syscalls.
#[derive(Debug)]
pub struct NativeBackend {
    config: FsConfig,
    pool: Arc<BufferPool>,
}

impl NativeBackend {
    /// Create a native backend.
    pub fn new(config: FsConfig, pool: Arc<BufferPool>) -> Self {
        Self { config, pool }
    }

    /// Check that descriptor-relative resolution works on this system.
    pub fn probe(&self) -> FsResult<()> {
        let root = DescriptorChain::root()?;
        fstat(root.current()).map_err(|e| FsError::from_errno("/", e as i32))?;
        Ok(())
    }

    fn directory_mode(&self) -> Mode {
        Mode::from_bits_truncate(self.config.directory_mode)
    }

    /// Best-effort ownership change for freshly created entries.
    fn apply_owner(&self, fd: BorrowedFd<'_>, owner: Option<u32>, path: &InternalPath) {
        let Some(uid) = owner else {
            return;
        };
        if self.config.disable_chown {
            return;
        }
        if let Err(e) = fchown(fd, Some(Uid::from_raw(uid)), Some(Gid::from_raw(uid))) {
            warn!(path = %path, uid, "Failed to change owner of new entry: {e}");
        }
    }

    fn read_sensitivity(&self, fd: BorrowedFd<'_>) -> Option<String> {
        read_xattr(&self.pool, fd, &self.config.sensitivity_attribute).ok()
    }

    /// Open a file for writing under `parent`, resolving conflicts per `policy`.
    ///
    /// An existing file is only truncated after checking it is not the same
    /// inode as `source`.
    fn create_file(
        &self,
        parent: BorrowedFd<'_>,
        desired: &str,
        policy: WriteConflictPolicy,
        truncate: bool,
        source: Option<&libc::stat>,
        path: &InternalPath,
    ) -> FsResult<CreatedEntry> {
        let mut flags = OFlag::O_CREAT | OFlag::O_WRONLY | LEAF_FLAGS;
        if truncate {
            flags |= OFlag::O_TRUNC;
        }
        let mode = Mode::from_bits_truncate(self.config.file_mode);

        match openat(parent, desired, flags | OFlag::O_EXCL, mode) {
            Ok(fd) => {
                return Ok(CreatedEntry {
                    name: desired.to_string(),
                    fd,
                    created: true,
                });
            }
            Err(Errno::EEXIST) => {}
            Err(e) => return Err(FsError::from_errno(path, e as i32)),
        }

        match policy {
            WriteConflictPolicy::Replace => {
                let reopen = flags.difference(OFlag::O_CREAT | OFlag::O_TRUNC) | OFlag::O_NONBLOCK;
                let fd = openat(parent, desired, reopen, mode)
                    .map_err(|e| FsError::from_errno(path, e as i32))?;
                let existing = fstat(fd.as_fd()).map_err(|e| FsError::from_errno(path, e as i32))?;
                if existing.st_mode & libc::S_IFMT != libc::S_IFREG {
                    return Err(FsError::bad_request(path, "not a regular file"));
                }
                if source.is_some_and(|source| same_inode(source, &existing)) {
                    return Err(FsError::bad_request(
                        path,
                        "source and destination are the same file",
                    ));
                }
                if truncate {
                    ftruncate(fd.as_fd(), 0).map_err(|e| FsError::from_errno(path, e as i32))?;
                }
                Ok(CreatedEntry {
                    name: desired.to_string(),
                    fd,
                    created: false,
                })
            }
            WriteConflictPolicy::Reject => {
                if is_symlink_at(parent, desired) {
                    Err(FsError::not_found(path))
                } else {
                    Err(FsError::already_exists(path))
                }
            }
            WriteConflictPolicy::Rename | WriteConflictPolicy::MergeRename => {
                for attempt in 1..MAX_RENAME_ATTEMPTS {
                    let candidate = rename_candidate(desired, attempt);
                    match openat(parent, candidate.as_str(), flags | OFlag::O_EXCL, mode) {
                        Ok(fd) => {
                            return Ok(CreatedEntry {
                                name: candidate,
                                fd,
                                created: true,
                            });
                        }
                        Err(Errno::EEXIST) => continue,
                        Err(e) => {
                            warn!(path = %path, candidate, "Creating renamed file failed: {e}");
                            return Err(FsError::from_errno(path, e as i32));
                        }
                    }
                }
                Err(FsError::bad_request(path, "too many files with this name"))
            }
        }
    }

    /// Create (or reuse) a directory under `parent`, resolving conflicts per `policy`.
    fn create_directory(
        &self,
        parent: BorrowedFd<'_>,
        desired: &str,
        policy: WriteConflictPolicy,
        path: &InternalPath,
    ) -> FsResult<CreatedEntry> {
        match openat(parent, desired, DIRECTORY_FLAGS, Mode::empty()) {
            Ok(fd) => {
                if matches!(
                    policy,
                    WriteConflictPolicy::Replace | WriteConflictPolicy::MergeRename
                ) {
                    return Ok(CreatedEntry {
                        name: desired.to_string(),
                        fd,
                        created: false,
                    });
                }
            }
            Err(Errno::ENOENT) => {
                if let Some(fd) = self.make_directory(parent, desired, path)? {
                    return Ok(CreatedEntry {
                        name: desired.to_string(),
                        fd,
                        created: true,
                    });
                }
            }
            // Occupied by a symlink or a non-directory.
            Err(Errno::ELOOP | Errno::ENOTDIR) => {}
            Err(e) => return Err(FsError::from_errno(path, e as i32)),
        }

        if !policy.allows_rename() {
            return Err(FsError::already_exists(path));
        }

        for attempt in 1..MAX_RENAME_ATTEMPTS {
            let candidate = rename_candidate(desired, attempt);
            if let Some(fd) = self.make_directory(parent, &candidate, path)? {
                return Ok(CreatedEntry {
                    name: candidate,
                    fd,
                    created: true,
                });
            }
        }
        Err(FsError::bad_request(path, "too many files with this name"))
    }

    /// `mkdirat` followed by an open of the new directory. `None` when the
    /// name is taken.
    fn make_directory(
        &self,
        parent: BorrowedFd<'_>,
        name: &str,
        path: &InternalPath,
    ) -> FsResult<Option<OwnedFd>> {
        match mkdirat(parent, name, self.directory_mode()) {
            Ok(()) => {}
            Err(Errno::EEXIST) => return Ok(None),
            Err(e) => return Err(FsError::from_errno(path, e as i32)),
        }
        let fd = openat(parent, name, DIRECTORY_FLAGS, Mode::empty())
            .map_err(|e| FsError::from_errno(path, e as i32))?;
        Ok(Some(fd))
    }

    fn copy_file(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
        owner: Option<u32>,
    ) -> FsResult<CopyResult> {
        let input = DescriptorChain::open(source, INSPECT_FLAGS, 0)?;
        let source_stat = fstat(input.as_fd()).map_err(|e| FsError::from_errno(source, e as i32))?;
        if source_stat.st_mode & libc::S_IFMT != libc::S_IFREG {
            return Err(FsError::bad_request(source, "not a regular file"));
        }

        let (parent, name) = DescriptorChain::open_parent(destination)?;
        let entry = self.create_file(
            parent.as_fd(),
            name,
            policy,
            true,
            Some(&source_stat),
            destination,
        )?;
        drop(parent);

        let mut reader = File::from(input);
        let mut writer = File::from(entry.fd);
        copy_stream(&self.pool, &mut reader, &mut writer)
            .map_err(|e| FsError::from_io(source, e))?;

        fchmod(
            writer.as_fd(),
            Mode::from_bits_truncate(source_stat.st_mode & 0o7777),
        )
        .map_err(|e| FsError::from_errno(destination, e as i32))?;
        if entry.created {
            self.apply_owner(writer.as_fd(), owner, destination);
        }

        debug!(source = %source, destination = %destination, name = entry.name, "Copied file");
        Ok(CopyResult::CreatedFile)
    }

    /// Try a no-replace rename, falling back to check-then-rename where
    /// `renameat2` is unsupported.
    fn rename_noreplace(
        &self,
        source_parent: BorrowedFd<'_>,
        source_name: &str,
        target_parent: BorrowedFd<'_>,
        target_name: &str,
    ) -> Result<(), Errno> {
        match renameat2(
            source_parent,
            source_name,
            target_parent,
            target_name,
            RenameFlags::RENAME_NOREPLACE,
        ) {
            Err(Errno::EINVAL | Errno::ENOSYS | Errno::EOPNOTSUPP) => {
                if stat_at(target_parent, target_name)?.is_some() {
                    return Err(Errno::EEXIST);
                }
                renameat(source_parent, source_name, target_parent, target_name)
            }
            result => result,
        }
    }

    /// Open `path` for a metadata change and apply `f` to the descriptor.
    fn with_leaf<T>(
        &self,
        path: &InternalPath,
        f: impl FnOnce(BorrowedFd<'_>) -> Result<T, Errno>,
    ) -> FsResult<T> {
        let fd = open_regular_or_directory(path)?;
        f(fd.as_fd()).map_err(|e| FsError::from_errno(path, e as i32))
    }
}

impl FsBackend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn create_directories(&self, path: &InternalPath, owner: Option<u32>) -> FsResult<()> {
        let components: Vec<&str> = path.components().collect();
        let Some((leaf, ancestors)) = components.split_last() else {
            return Err(FsError::already_exists(path));
        };

        let mut chain = DescriptorChain::root()?;
        for name in ancestors {
            match chain.try_descend(name) {
                Ok(()) => {}
                Err(Errno::ENOENT) => {
                    match mkdirat(chain.current(), *name, self.directory_mode()) {
                        Ok(()) | Err(Errno::EEXIST) => {}
                        Err(e) => {
                            debug!(path = %path, component = name, "mkdirat failed: {e}");
                            return Err(FsError::not_found(path));
                        }
                    }
                    chain
                        .try_descend(name)
                        .map_err(|_| FsError::not_found(path))?;
                    self.apply_owner(chain.current(), owner, path);
                }
                Err(_) => return Err(FsError::not_found(path)),
            }
        }

        mkdirat(chain.current(), *leaf, self.directory_mode())
            .map_err(|e| FsError::from_errno(path, e as i32))?;

        if owner.is_some() && !self.config.disable_chown {
            let fd = chain.open_leaf(leaf, DIRECTORY_FLAGS, 0, path)?;
            self.apply_owner(fd.as_fd(), owner, path);
        }
        Ok(())
    }

    fn copy(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
        owner: Option<u32>,
    ) -> FsResult<CopyResult> {
        let (parent, name) = DescriptorChain::open_parent(source)?;
        let source_stat = stat_at(parent.as_fd(), name)
            .map_err(|e| FsError::from_errno(source, e as i32))?
            .ok_or_else(|| FsError::not_found(source))?;
        drop(parent);

        match source_stat.st_mode & libc::S_IFMT {
            libc::S_IFREG => self.copy_file(source, destination, policy, owner),
            libc::S_IFDIR => {
                let (parent, name) = DescriptorChain::open_parent(destination)?;
                let entry = self.create_directory(parent.as_fd(), name, policy, destination)?;
                if entry.created {
                    self.apply_owner(entry.fd.as_fd(), owner, destination);
                }
                let created = destination.with_file_name(&entry.name)?;
                Ok(CopyResult::CreatedDirectory(created))
            }
            libc::S_IFLNK => Err(FsError::not_found(source)),
            _ => Ok(CopyResult::NothingToCreate),
        }
    }

    fn move_entry(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
    ) -> FsResult<MoveResult> {
        let (source_parent, source_name) = DescriptorChain::open_parent(source)?;
        let (target_parent, target_name) = DescriptorChain::open_parent(destination)?;

        let source_stat = stat_at(source_parent.as_fd(), source_name)
            .map_err(|e| FsError::from_errno(source, e as i32))?
            .ok_or_else(|| FsError::not_found(source))?;
        if is_symlink(&source_stat) {
            return Err(FsError::not_found(source));
        }
        let existing = stat_at(target_parent.as_fd(), target_name)
            .map_err(|e| FsError::from_errno(destination, e as i32))?;

        let moved = MoveResult {
            needs_to_recurse: false,
        };

        match policy {
            WriteConflictPolicy::Replace => {
                renameat(
                    source_parent.as_fd(),
                    source_name,
                    target_parent.as_fd(),
                    target_name,
                )
                .map_err(|e| FsError::from_errno(destination, e as i32))?;
                return Ok(moved);
            }
            WriteConflictPolicy::Reject => {
                if existing.is_some() {
                    return Err(FsError::already_exists(destination));
                }
                self.rename_noreplace(
                    source_parent.as_fd(),
                    source_name,
                    target_parent.as_fd(),
                    target_name,
                )
                .map_err(|e| FsError::from_errno(destination, e as i32))?;
                return Ok(moved);
            }
            WriteConflictPolicy::MergeRename
                if is_directory(&source_stat) && existing.as_ref().is_some_and(is_directory) =>
            {
                return Ok(MoveResult {
                    needs_to_recurse: true,
                });
            }
            WriteConflictPolicy::Rename | WriteConflictPolicy::MergeRename => {}
        }

        if existing.is_none() {
            match self.rename_noreplace(
                source_parent.as_fd(),
                source_name,
                target_parent.as_fd(),
                target_name,
            ) {
                Ok(()) => return Ok(moved),
                Err(Errno::EEXIST) => {}
                Err(e) => return Err(FsError::from_errno(destination, e as i32)),
            }
        }

        for attempt in 1..MAX_RENAME_ATTEMPTS {
            let candidate = rename_candidate(target_name, attempt);
            match self.rename_noreplace(
                source_parent.as_fd(),
                source_name,
                target_parent.as_fd(),
                &candidate,
            ) {
                Ok(()) => {
                    debug!(source = %source, destination = %destination, candidate, "Moved under a new name");
                    return Ok(moved);
                }
                Err(Errno::EEXIST | Errno::ENOTEMPTY) => continue,
                Err(e) => return Err(FsError::from_errno(destination, e as i32)),
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

        let (parent, name) = DescriptorChain::open_parent(path)?;
        let entry = self.create_file(parent.as_fd(), name, policy, options.truncate, None, path)?;
        drop(parent);

        let mut file = File::from(entry.fd);
        if entry.created {
            self.apply_owner(file.as_fd(), options.owner, path);
            if let Some(mode) = options.permissions {
                fchmod(file.as_fd(), Mode::from_bits_truncate(mode))
                    .map_err(|e| FsError::from_errno(path, e as i32))?;
            }
        }

        let position = match options.offset {
            Some(offset) => Some(SeekFrom::Start(offset)),
            None if !options.truncate => Some(SeekFrom::End(0)),
            None => None,
        };
        if let Some(position) = position {
            file.seek(position).map_err(|e| FsError::from_io(path, e))?;
        }

        Ok((entry.name, file))
    }

    fn open_for_reading(&self, path: &InternalPath) -> FsResult<File> {
        let fd = match open_inspect(path)? {
            Leaf::Opened(fd) => fd,
            Leaf::Special(_) => return Err(FsError::bad_request(path, "not a regular file")),
        };
        let stat = fstat(fd.as_fd()).map_err(|e| FsError::from_errno(path, e as i32))?;
        match stat.st_mode & libc::S_IFMT {
            libc::S_IFREG => Ok(File::from(fd)),
            libc::S_IFDIR => Err(FsError::bad_request(path, "target is a directory")),
            _ => Err(FsError::bad_request(path, "not a regular file")),
        }
    }

    fn list_files(&self, path: &InternalPath) -> FsResult<Vec<String>> {
        let Leaf::Opened(fd) = open_inspect(path)? else {
            return Err(FsError::bad_request(path, "not a directory"));
        };
        let stat = fstat(fd.as_fd()).map_err(|e| FsError::from_errno(path, e as i32))?;
        if !is_directory(&stat) {
            return Err(FsError::bad_request(path, "not a directory"));
        }

        let mut dir = Dir::openat(
            fd.as_fd(),
            ".",
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| FsError::from_errno(path, e as i32))?;
        drop(fd);

        let mut names = Vec::new();
        let mut skipped = 0usize;
        for entry in dir.iter() {
            let entry = entry.map_err(|e| FsError::from_errno(path, e as i32))?;
            let Ok(name) = entry.file_name().to_str() else {
                skipped += 1;
                continue;
            };
            if name != "." && name != ".." {
                names.push(name.to_string());
            }
        }
        if skipped > 0 {
            warn!(path = %path, skipped, "Skipped entries with non UTF-8 names");
        }
        Ok(names)
    }

    fn delete(&self, path: &InternalPath) -> FsResult<()> {
        let (parent, name) = DescriptorChain::open_parent(path)?;
        let stat = stat_at(parent.as_fd(), name)
            .map_err(|e| FsError::from_errno(path, e as i32))?
            .ok_or_else(|| FsError::not_found(path))?;
        if is_symlink(&stat) {
            return Err(FsError::not_found(path));
        }

        let flag = if is_directory(&stat) {
            UnlinkatFlags::RemoveDir
        } else {
            UnlinkatFlags::NoRemoveDir
        };
        unlinkat(parent.as_fd(), name, flag).map_err(|e| match e {
            Errno::EEXIST | Errno::ENOTEMPTY => {
                FsError::bad_request(path, "directory is not empty")
            }
            e => FsError::from_errno(path, e as i32),
        })
    }

    fn stat(&self, path: &InternalPath) -> FsResult<FileStat> {
        match open_inspect(path)? {
            Leaf::Opened(fd) => {
                let stat = fstat(fd.as_fd()).map_err(|e| FsError::from_errno(path, e as i32))?;
                Ok(to_file_stat(&stat, self.read_sensitivity(fd.as_fd())))
            }
            Leaf::Special(stat) => Ok(to_file_stat(&stat, None)),
        }
    }

    fn get_extended_attribute(&self, path: &InternalPath, name: &str) -> FsResult<String> {
        let fd = open_regular_or_directory(path)?;
        read_xattr(&self.pool, fd.as_fd(), name).map_err(|e| match e {
            XattrError::InvalidName => FsError::bad_request(path, "invalid attribute name"),
            XattrError::Os(code) => FsError::from_errno(path, code),
        })
    }

    fn set_extended_attribute(
        &self,
        path: &InternalPath,
        name: &str,
        value: &str,
        allow_overwrite: bool,
    ) -> FsResult<()> {
        let fd = open_regular_or_directory(path)?;
        let name = attribute_name(path, name)?;
        let flags = if allow_overwrite { 0 } else { libc::XATTR_CREATE };
        // SAFETY: `fd` is open for the duration of the call and both buffers
        // outlive it.
        let res = unsafe {
            libc::fsetxattr(
                fd.as_raw_fd(),
                name.as_ptr(),
                value.as_ptr() as *const libc::c_void,
                value.len(),
                flags,
            )
        };
        if res < 0 {
            return Err(FsError::from_errno(path, last_errno()));
        }
        Ok(())
    }

    fn remove_extended_attribute(&self, path: &InternalPath, name: &str) -> FsResult<()> {
        let fd = open_regular_or_directory(path)?;
        let name = attribute_name(path, name)?;
        // SAFETY: `fd` is open and `name` is NUL-terminated.
        let res = unsafe { libc::fremovexattr(fd.as_raw_fd(), name.as_ptr()) };
        if res < 0 {
            return Err(FsError::from_errno(path, last_errno()));
        }
        Ok(())
    }

    fn chmod(&self, path: &InternalPath, mode: u32) -> FsResult<()> {
        self.with_leaf(path, |fd| fchmod(fd, Mode::from_bits_truncate(mode)))
    }

    fn chown(&self, path: &InternalPath, uid: u32, gid: u32) -> FsResult<()> {
        if self.config.disable_chown {
            debug!(path = %path, "chown disabled, skipping");
            return Ok(());
        }
        self.with_leaf(path, |fd| {
            fchown(fd, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))
        })
    }

    fn change_file_permissions(
        &self,
        path: &InternalPath,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<()> {
        let disable_chown = self.config.disable_chown;
        self.with_leaf(path, |fd| {
            fchmod(fd, Mode::from_bits_truncate(mode))?;
            if !disable_chown {
                fchown(fd, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)))?;
            }
            Ok(())
        })
    }
}

enum XattrError {
    InvalidName,
    Os(i32),
}

fn attribute_name(path: &InternalPath, name: &str) -> FsResult<CString> {
    CString::new(name).map_err(|_| FsError::bad_request(path, "invalid attribute name"))
}

fn read_xattr(pool: &Arc<BufferPool>, fd: BorrowedFd<'_>, name: &str) -> Result<String, XattrError> {
    let name = CString::new(name).map_err(|_| XattrError::InvalidName)?;
    pool.with_buffer(|buf| {
        // SAFETY: `buf` is valid for `buf.len()` bytes and `fd` is open.
        let res = unsafe {
            libc::fgetxattr(
                fd.as_raw_fd(),
                name.as_ptr(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if res < 0 {
            return Err(XattrError::Os(last_errno()));
        }
        Ok(String::from_utf8_lossy(&buf[..res as usize]).into_owned())
    })
}

fn last_errno() -> i32 {
    io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO)
}

/// `fstatat` without following symlinks; `None` when the name is absent.
fn stat_at(parent: BorrowedFd<'_>, name: &str) -> Result<Option<libc::stat>, Errno> {
    match fstatat(parent, name, AtFlags::AT_SYMLINK_NOFOLLOW) {
        Ok(stat) => Ok(Some(stat)),
        Err(Errno::ENOENT) => Ok(None),
        Err(e) => Err(e),
    }
}

fn is_symlink_at(parent: BorrowedFd<'_>, name: &str) -> bool {
    matches!(stat_at(parent, name), Ok(Some(stat)) if is_symlink(&stat))
}

fn same_inode(a: &libc::stat, b: &libc::stat) -> bool {
    a.st_dev == b.st_dev && a.st_ino == b.st_ino
}

fn is_symlink(stat: &libc::stat) -> bool {
    stat.st_mode & libc::S_IFMT == libc::S_IFLNK
}

fn is_directory(stat: &libc::stat) -> bool {
    stat.st_mode & libc::S_IFMT == libc::S_IFDIR
}

fn to_file_stat(stat: &libc::stat, sensitivity: Option<String>) -> FileStat {
    let millis = (stat.st_mtime as i64) * 1000 + (stat.st_mtime_nsec as i64) / 1_000_000;
    FileStat {
        size: stat.st_size.max(0) as u64,
        modified_at: millis,
        file_type: if is_directory(stat) {
            FileType::Directory
        } else {
            FileType::File
        },
        owner_uid: stat.st_uid,
        owner_gid: stat.st_gid,
        mode: stat.st_mode,
        sensitivity,
    }
}
