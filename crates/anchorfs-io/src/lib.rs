//! Descriptor-anchored filesystem access for anchorfs.
//!
//! Every path handed to this crate is resolved one component at a time,
//! each step opened relative to the previous directory descriptor with
//! `O_NOFOLLOW`. A symlink swapped into the path between two calls can
//! therefore never redirect an operation outside the intended tree.
//!
//! # Overview
//!
//! - [`BufferPool`]: fixed-capacity pool of zeroed-on-return scratch buffers
//! - [`FsBackend`]: the operation set, implemented by a native Linux backend
//!   and a portable std::fs backend, chosen once by [`select_backend`]
//! - [`FsInputStream`] / [`FsOutputStream`]: byte streams owning a descriptor
//! - [`FileSystem`]: the facade callers use
//!
//! # Example
//!
//! ```rust,no_run
//! use anchorfs_core::{FsConfig, InternalPath, WriteConflictPolicy};
//! use anchorfs_io::FileSystem;
//!
//! let fs = FileSystem::new(FsConfig::unprivileged()).unwrap();
//! let dir = InternalPath::new("/srv/data/reports").unwrap();
//! fs.create_directories(&dir).unwrap();
//!
//! let file = dir.join("q1.csv").unwrap();
//! fs.write_all(&file, b"region,total\n", WriteConflictPolicy::Reject).unwrap();
//! assert_eq!(fs.read_to_vec(&file).unwrap(), b"region,total\n");
//! ```

mod backend;
#[cfg(target_os = "linux")]
mod chain;
mod fs;
mod pool;
mod stream;

pub use backend::{FsBackend, PortableBackend, WriteOptions, select_backend};
#[cfg(target_os = "linux")]
pub use backend::NativeBackend;
#[cfg(target_os = "linux")]
pub use chain::DescriptorChain;
pub use fs::FileSystem;
pub use pool::{BufferPool, PooledBuffer};
pub use stream::{FsInputStream, FsOutputStream, copy_stream};

// Re-export core types for convenience
pub use anchorfs_core::{
    CopyResult, FileStat, FileType, FsConfig, FsError, FsResult, InternalPath, MoveResult,
    WriteConflictPolicy,
};
