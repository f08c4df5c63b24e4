//! The filesystem facade.

use std::io::{Read, Write};
use std::sync::Arc;

use anchorfs_core::{
    CopyResult, FileStat, FsConfig, FsError, FsResult, InternalPath, MoveResult,
    WriteConflictPolicy,
};
use tracing::debug;

use crate::backend::{FsBackend, WriteOptions, select_backend};
use crate::pool::BufferPool;
use crate::stream::{FsInputStream, FsOutputStream};

/// Entry point for filesystem access.
///
/// Holds the configuration, the buffer pool and the backend chosen at
/// construction. Cheap to clone; clones share the pool and backend.
#[derive(Debug, Clone)]
pub struct FileSystem {
    config: FsConfig,
    pool: Arc<BufferPool>,
    backend: Arc<dyn FsBackend>,
}

impl FileSystem {
    /// Build a filesystem, selecting the backend from `config`.
    pub fn new(config: FsConfig) -> FsResult<Self> {
        let pool = BufferPool::from_config(&config);
        let backend = select_backend(&config, Arc::clone(&pool))?;
        Ok(Self {
            config,
            pool,
            backend,
        })
    }

    /// Build a filesystem around an existing backend.
    pub fn with_backend(config: FsConfig, pool: Arc<BufferPool>, backend: Arc<dyn FsBackend>) -> Self {
        Self {
            config,
            pool,
            backend,
        }
    }

    pub fn config(&self) -> &FsConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Create `path` and its missing ancestors, owned by the configured default owner.
    pub fn create_directories(&self, path: &InternalPath) -> FsResult<()> {
        self.create_directories_owned(path, self.config.default_owner)
    }

    /// Create `path` and its missing ancestors with an explicit owner.
    pub fn create_directories_owned(&self, path: &InternalPath, owner: Option<u32>) -> FsResult<()> {
        debug!(path = %path, "create_directories");
        self.backend.create_directories(path, owner)
    }

    /// Copy a single entry. Directories come back as
    /// [`CopyResult::CreatedDirectory`] and are not filled.
    ///
    /// Copying an entry onto itself only works with a renaming policy.
    pub fn copy(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
    ) -> FsResult<CopyResult> {
        debug!(source = %source, destination = %destination, ?policy, "copy");
        if source == destination && !policy.allows_rename() {
            return Err(FsError::bad_request(
                destination,
                "source and destination are the same path",
            ));
        }
        self.backend
            .copy(source, destination, policy, self.config.default_owner)
    }

    /// Move a single entry.
    pub fn move_entry(
        &self,
        source: &InternalPath,
        destination: &InternalPath,
        policy: WriteConflictPolicy,
    ) -> FsResult<MoveResult> {
        debug!(source = %source, destination = %destination, ?policy, "move");
        self.backend.move_entry(source, destination, policy)
    }

    /// Open a file for writing with the configured owner and mode.
    pub fn open_for_writing(
        &self,
        path: &InternalPath,
        policy: WriteConflictPolicy,
    ) -> FsResult<(String, FsOutputStream)> {
        self.open_for_writing_with(path, policy, &WriteOptions::from_config(&self.config))
    }

    /// Open a file for writing with explicit options.
    pub fn open_for_writing_with(
        &self,
        path: &InternalPath,
        policy: WriteConflictPolicy,
        options: &WriteOptions,
    ) -> FsResult<(String, FsOutputStream)> {
        debug!(path = %path, ?policy, "open_for_writing");
        let (name, file) = self.backend.open_for_writing(path, policy, options)?;
        Ok((name, FsOutputStream::new(file)))
    }

    /// Open a regular file for reading.
    pub fn open_for_reading(&self, path: &InternalPath) -> FsResult<FsInputStream> {
        debug!(path = %path, "open_for_reading");
        let file = self.backend.open_for_reading(path)?;
        Ok(FsInputStream::new(file, &self.pool))
    }

    pub fn list_files(&self, path: &InternalPath) -> FsResult<Vec<String>> {
        self.backend.list_files(path)
    }

    /// Remove a file or an empty directory.
    pub fn delete(&self, path: &InternalPath) -> FsResult<()> {
        debug!(path = %path, "delete");
        self.backend.delete(path)
    }

    pub fn stat(&self, path: &InternalPath) -> FsResult<FileStat> {
        self.backend.stat(path)
    }

    /// Check whether `path` exists, without following symlinks.
    pub fn exists(&self, path: &InternalPath) -> FsResult<bool> {
        match self.backend.stat(path) {
            Ok(_) => Ok(true),
            Err(FsError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn get_extended_attribute(&self, path: &InternalPath, name: &str) -> FsResult<String> {
        self.backend.get_extended_attribute(path, name)
    }

    pub fn set_extended_attribute(
        &self,
        path: &InternalPath,
        name: &str,
        value: &str,
        allow_overwrite: bool,
    ) -> FsResult<()> {
        self.backend
            .set_extended_attribute(path, name, value, allow_overwrite)
    }

    pub fn remove_extended_attribute(&self, path: &InternalPath, name: &str) -> FsResult<()> {
        self.backend.remove_extended_attribute(path, name)
    }

    /// The sensitivity label, or `None` when the attribute is unset or
    /// unsupported.
    pub fn sensitivity(&self, path: &InternalPath) -> FsResult<Option<String>> {
        match self
            .backend
            .get_extended_attribute(path, &self.config.sensitivity_attribute)
        {
            Ok(value) => Ok(Some(value)),
            Err(FsError::Native { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn chmod(&self, path: &InternalPath, mode: u32) -> FsResult<()> {
        self.backend.chmod(path, mode)
    }

    pub fn chown(&self, path: &InternalPath, uid: u32, gid: u32) -> FsResult<()> {
        self.backend.chown(path, uid, gid)
    }

    pub fn change_file_permissions(
        &self,
        path: &InternalPath,
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> FsResult<()> {
        self.backend.change_file_permissions(path, mode, uid, gid)
    }

    /// Read a whole file into memory.
    pub fn read_to_vec(&self, path: &InternalPath) -> FsResult<Vec<u8>> {
        let mut stream = self.open_for_reading(path)?;
        let mut content = Vec::new();
        stream
            .read_to_end(&mut content)
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(content)
    }

    /// Write `content` to a new or replaced file, returning the name used.
    pub fn write_all(
        &self,
        path: &InternalPath,
        content: &[u8],
        policy: WriteConflictPolicy,
    ) -> FsResult<String> {
        let (name, mut stream) = self.open_for_writing(path, policy)?;
        stream
            .write_all(content)
            .map_err(|e| FsError::from_io(path, e))?;
        stream.close().map_err(|e| FsError::from_io(path, e))?;
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anchorfs_core::BackendKind;

    #[test]
    fn test_portable_xattrs_are_unsupported() {
        let temp = tempfile::tempdir().unwrap();
        let fs = FileSystem::new(FsConfig::unprivileged().with_backend(BackendKind::Portable)).unwrap();
        let path = InternalPath::try_from(temp.path().canonicalize().unwrap().as_path()).unwrap();

        let err = fs.get_extended_attribute(&path, "user.test").unwrap_err();
        assert!(err.native_code().is_some());
        assert_eq!(fs.sensitivity(&path).unwrap(), None);
    }

    #[test]
    fn test_exists() {
        let temp = tempfile::tempdir().unwrap();
        let fs = FileSystem::new(FsConfig::unprivileged()).unwrap();
        let dir = InternalPath::try_from(temp.path().canonicalize().unwrap().as_path()).unwrap();

        assert!(fs.exists(&dir).unwrap());
        assert!(!fs.exists(&dir.join("missing").unwrap()).unwrap());
    }
}
