//! Component-by-component path resolution over directory descriptors.

use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use anchorfs_core::{FsError, FsResult, InternalPath};
use nix::errno::Errno;
use nix::fcntl::{OFlag, open, openat};
use nix::sys::stat::Mode;

/// Flags every intermediate directory is opened with.
pub(crate) const DIRECTORY_FLAGS: OFlag = OFlag::O_RDONLY
    .union(OFlag::O_DIRECTORY)
    .union(OFlag::O_NOFOLLOW)
    .union(OFlag::O_CLOEXEC);

/// Flags OR-ed into every leaf open.
pub(crate) const LEAF_FLAGS: OFlag = OFlag::O_NOFOLLOW.union(OFlag::O_CLOEXEC);

/// A walk from `/` down to some directory, holding only the descriptor of the
/// directory reached so far.
///
/// Each step opens the next component relative to the current descriptor and
/// closes the previous one once the new one is open, so at most two
/// descriptors are ever live. Dropping the chain closes whatever it holds.
#[derive(Debug)]
pub struct DescriptorChain {
    current: OwnedFd,
    depth: usize,
}

impl DescriptorChain {
    /// Start a chain at the filesystem root.
    pub fn root() -> FsResult<Self> {
        let fd = open(
            "/",
            OFlag::O_RDONLY | OFlag::O_DIRECTORY | OFlag::O_CLOEXEC,
            Mode::empty(),
        )
        .map_err(|e| FsError::from_errno("/", e as i32))?;
        Ok(Self { current: fd, depth: 0 })
    }

    /// Number of components descended so far.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Descriptor of the directory reached so far.
    pub fn current(&self) -> BorrowedFd<'_> {
        self.current.as_fd()
    }

    /// Open `name` as a directory below the current one and step into it,
    /// reporting the raw errno on failure.
    pub fn try_descend(&mut self, name: &str) -> Result<(), Errno> {
        let next = openat(self.current.as_fd(), name, DIRECTORY_FLAGS, Mode::empty())?;
        // Assigning drops (closes) the previous descriptor.
        self.current = next;
        self.depth += 1;
        Ok(())
    }

    /// Walk every component of `path` as a directory. Any failure is reported
    /// as `NotFound` for the whole path.
    pub fn walk(path: &InternalPath) -> FsResult<Self> {
        let mut chain = Self::root()?;
        for name in path.components() {
            chain
                .try_descend(name)
                .map_err(|_| FsError::not_found(path))?;
        }
        Ok(chain)
    }

    /// Resolve `path` and open its final component with `flags`.
    ///
    /// Intermediate failures (missing directory, symlink, non-directory) are
    /// reported as `NotFound`; failures on the leaf are translated from the
    /// errno. `mode` only matters when `flags` contains `O_CREAT`.
    pub fn open(path: &InternalPath, flags: OFlag, mode: u32) -> FsResult<OwnedFd> {
        let Some(leaf) = path.file_name() else {
            return Self::root().map(|chain| chain.current);
        };

        let chain = match path.parent() {
            Some(parent) => Self::walk(&parent)?,
            None => Self::root()?,
        };
        chain.open_leaf(leaf, flags, mode, path)
    }

    /// Resolve the parent of `path`, returning its descriptor and the leaf name.
    pub fn open_parent(path: &InternalPath) -> FsResult<(OwnedFd, &str)> {
        let (Some(parent), Some(leaf)) = (path.parent(), path.file_name()) else {
            return Err(FsError::bad_request(path, "the root has no parent"));
        };
        let fd = Self::open(&parent, DIRECTORY_FLAGS, 0)?;
        Ok((fd, leaf))
    }

    /// Open `name` below the current directory, consuming the chain.
    pub fn open_leaf(
        self,
        name: &str,
        flags: OFlag,
        mode: u32,
        path: &InternalPath,
    ) -> FsResult<OwnedFd> {
        openat(
            self.current.as_fd(),
            name,
            flags | LEAF_FLAGS,
            Mode::from_bits_truncate(mode),
        )
        .map_err(|e| FsError::from_errno(path, e as i32))
    }

    /// Give up the chain, keeping the current descriptor.
    pub fn into_fd(self) -> OwnedFd {
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn internal(path: &std::path::Path) -> InternalPath {
        InternalPath::try_from(path).unwrap()
    }

    #[test]
    fn test_walk_counts_components() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp.path().join("a/b")).unwrap();

        let path = internal(&temp.path().join("a/b"));
        let chain = DescriptorChain::walk(&path).unwrap();
        assert_eq!(chain.depth(), path.depth());
    }

    #[test]
    fn test_walk_refuses_symlinked_component() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join("real")).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("link")).unwrap();

        let err = DescriptorChain::walk(&internal(&temp.path().join("link"))).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_leaf_errors_are_translated() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join("file"), b"x").unwrap();

        let path = internal(&temp.path().join("file"));
        let err = DescriptorChain::open(
            &path,
            OFlag::O_CREAT | OFlag::O_EXCL | OFlag::O_WRONLY,
            0o600,
        )
        .unwrap_err();
        assert!(err.is_already_exists());

        // A file used as an intermediate directory is simply not found.
        let nested = internal(&temp.path().join("file/child"));
        let err = DescriptorChain::open(&nested, OFlag::O_RDONLY, 0).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_open_parent_of_root_is_bad_request() {
        let err = DescriptorChain::open_parent(&InternalPath::root()).unwrap_err();
        assert!(err.is_bad_request());
    }
}
