//! Fixed-capacity pool of reusable scratch buffers.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use anchorfs_core::FsConfig;
use parking_lot::Mutex;

/// Pool of equally sized byte buffers shared by every backend operation.
///
/// Borrowing never blocks: when no idle buffer is available a fresh one is
/// allocated. Returned buffers are zeroed before they become visible to the
/// next borrower, and the pool keeps at most `capacity` idle buffers.
pub struct BufferPool {
    idle: Mutex<Vec<Box<[u8]>>>,
    buffer_size: usize,
    capacity: usize,
}

impl BufferPool {
    /// Create a pool of `capacity` idle buffers of `buffer_size` bytes each.
    pub fn new(buffer_size: usize, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::with_capacity(capacity)),
            buffer_size,
            capacity,
        })
    }

    /// Create a pool sized by the filesystem configuration.
    pub fn from_config(config: &FsConfig) -> Arc<Self> {
        Self::new(config.pool_buffer_size, config.pool_capacity)
    }

    /// Size of every buffer handed out.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Maximum number of idle buffers retained.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of buffers currently waiting in the pool.
    pub fn available(&self) -> usize {
        self.idle.lock().len()
    }

    /// Take a buffer out of the pool. It goes back when the guard is dropped.
    pub fn borrow(self: &Arc<Self>) -> PooledBuffer {
        let buffer = self
            .idle
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0u8; self.buffer_size].into_boxed_slice());

        PooledBuffer {
            buffer: Some(buffer),
            pool: Arc::clone(self),
        }
    }

    /// Run `f` with a borrowed buffer, returning it afterwards.
    pub fn with_buffer<R>(self: &Arc<Self>, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut buffer = self.borrow();
        f(&mut buffer)
    }

    fn give_back(&self, mut buffer: Box<[u8]>) {
        buffer.fill(0);
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(buffer);
        }
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("buffer_size", &self.buffer_size)
            .field("capacity", &self.capacity)
            .field("idle", &self.available())
            .finish()
    }
}

/// A buffer on loan from a [`BufferPool`].
pub struct PooledBuffer {
    buffer: Option<Box<[u8]>>,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buffer.as_deref().unwrap_or_default()
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buffer.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.give_back(buffer);
        }
    }
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.len()).finish()
    }
}
