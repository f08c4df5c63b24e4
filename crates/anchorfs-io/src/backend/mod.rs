//! Filesystem backends.

#[cfg(target_os = "linux")]
mod native;
mod portable;

use std::fmt;
use std::fs::File;
use std::sync::Arc;

use anchorfs_core::{
    BackendKind, CopyResult, FileStat, FsConfig, FsError, FsResult, InternalPath, MoveResult,
    WriteConflictPolicy,
};
use tracing::{debug, info};

use crate::pool::BufferPool;

#[cfg(target_os = "linux")]
pub use native::NativeBackend;
pub use portable::PortableBackend;

/// How a file is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    /// Owner applied when the file is newly created.
    pub owner: Option<u32>,
    /// Permission bits applied when the file is newly created.
    pub permissions: Option<u32>,
    /// Discard existing content.
    pub truncate: bool,
    /// Start writing at this offset instead of the start or end.
    pub offset: Option<u64>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            owner: None,
            permissions: None,
            truncate: true,
            offset: None,
        }
    }
}

impl WriteOptions {
    /// Options derived from the configured defaults.
    pub fn from_config(config: &FsConfig) -> Self {
        Self {
            owner: config.default_owner,
            permissions: Some(config.file_mode),
            ..Self::default()
        }
    }

    /// Keep existing content and write from `offset`.
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.truncate = false;
        self.offset = Some(offset);
        self
    }

    /// Keep existing content and append to it.
    pub fn appending(mut self) -> Self {
        self.truncate = false;
        self.offset = None;
        self
    }

    pub(crate) fn validate(&self, path: &InternalPath) -> FsResult<()> {
        if self.truncate && self.offset.is_some() {
            return Err(FsError::bad_request(
                path,
                "an offset cannot be combined with truncation",
            ));
        }
        Ok(())
    }
}

/// The operation set every backend provides.
///
/// Implementations must refuse to traverse or act on symbolic links: a
/// symlink anywhere in a path makes the operation fail with `NotFound`.
pub trait FsBackend: Send + Sync + fmt::Debug {
    /// Short backend name for logging.
    fn name(&self) -> &'static str;

    /// Create `path` and any missing ancestors. Fails with `AlreadyExists`
    /// when the final directory is already there.
    fn create_directories(&self, path: &InternalPath, owner: Option<u32>) -> FsResult<()>;

    /// Copy one entry. Directories are created empty; the caller recurses.
    fn copy(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
        owner: Option<u32>,
    ) -> FsResult<CopyResult>;

    /// Move one entry by renaming it.
    fn move_entry(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
    ) -> FsResult<MoveResult>;

    /// Open a file for writing, returning the name actually used.
    fn open_for_writing(
        &self,
        path: &InternalPath,
        policy: WriteConflictPolicy,
        options: &WriteOptions,
    ) -> FsResult<(String, File)>;

    /// Open a regular file for reading.
    fn open_for_reading(&self, path: &InternalPath) -> FsResult<File>;

    /// Names of the entries in a directory, `.` and `..` excluded.
    fn list_files(&self, path: &InternalPath) -> FsResult<Vec<String>>;

    /// Remove a file or an empty directory.
    fn delete(&self, path: &InternalPath) -> FsResult<()>;

    /// Fresh metadata snapshot.
    fn stat(&self, path: &InternalPath) -> FsResult<FileStat>;

    /// Read an extended attribute as UTF-8 text.
    fn get_extended_attribute(&self, path: &InternalPath, name: &str) -> FsResult<String>;

    /// Write an extended attribute.
    fn set_extended_attribute(
        &self,
        path: &InternalPath,
        name: &str,
        value: &str,
        allow_overwrite: bool,
    ) -> FsResult<()>;

    /// Remove an extended attribute.
    fn remove_extended_attribute(&self, path: &InternalPath, name: &str) -> FsResult<()>;

    /// Set permission bits.
    fn chmod(&self, path: &InternalPath, mode: u32) -> FsResult<()>;

    /// Set owner and group.
    fn chown(&self, path: &InternalPath, uid: u32, gid: u32) -> FsResult<()>;

    /// Set permission bits, owner and group through a single open.
    fn change_file_permissions(
        &self,
        path: &InternalPath,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<()>;
}

/// Pick the backend for this process.
///
/// `Auto` probes the native backend once and falls back to the portable one
/// when the platform does not support it.
pub fn select_backend(config: &FsConfig, pool: Arc<BufferPool>) -> FsResult<Arc<dyn FsBackend>> {
    let backend: Arc<dyn FsBackend> = match config.backend {
        BackendKind::Portable => Arc::new(PortableBackend::new(config.clone(), pool)),
        BackendKind::Native => native_backend(config, pool)?,
        BackendKind::Auto => match native_backend(config, Arc::clone(&pool)) {
            Ok(backend) => backend,
            Err(e) => {
                debug!("Native backend unavailable ({e}), using portable backend");
                Arc::new(PortableBackend::new(config.clone(), pool))
            }
        },
    };

    info!(backend = backend.name(), "Filesystem backend selected");
    Ok(backend)
}

#[cfg(target_os = "linux")]
fn native_backend(config: &FsConfig, pool: Arc<BufferPool>) -> FsResult<Arc<dyn FsBackend>> {
    let backend = NativeBackend::new(config.clone(), pool);
    backend.probe()?;
    Ok(Arc::new(backend))
}

#[cfg(not(target_os = "linux"))]
fn native_backend(_config: &FsConfig, _pool: Arc<BufferPool>) -> FsResult<Arc<dyn FsBackend>> {
    Err(FsError::bad_request(
        "/",
        "the native backend is only available on Linux",
    ))
}
