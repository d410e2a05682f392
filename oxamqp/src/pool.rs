//! Pooled write buffers
//!
//! [`BufferPool::take`] hands out a [`PooledBuffer`] that owns its `BytesMut`. Dropping the
//! handle clears the buffer and returns it to the pool, unless the pool already holds
//! `capacity` idle buffers.

use std::{
    fmt,
    ops::{Deref, DerefMut},
    sync::Arc,
};

use bytes::BytesMut;
use parking_lot::Mutex;

/// Default number of idle buffers kept by a pool
pub const DEFAULT_POOL_CAPACITY: usize = 16;

/// Default size of a buffer handed out by the pool
pub const DEFAULT_BUFFER_SIZE: usize = 16 * 1024;

/// Buffers above this size are dropped instead of being returned to the pool
const MAX_RETAINED_SIZE: usize = 4 * 1024 * 1024;

struct Inner {
    idle: Mutex<Vec<BytesMut>>,
    capacity: usize,
}

/// A pool of reusable byte buffers
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<Inner>,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.inner.capacity)
            .field("idle", &self.idle())
            .finish()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl BufferPool {
    /// Creates a pool keeping at most `capacity` idle buffers
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle: Mutex::new(Vec::with_capacity(capacity)),
                capacity,
            }),
        }
    }

    /// Takes a cleared buffer that can hold at least `size` bytes without reallocating
    pub fn take(&self, size: usize) -> PooledBuffer {
        let mut buf = self.inner.idle.lock().pop().unwrap_or_default();
        buf.reserve(size);
        PooledBuffer {
            buf,
            pool: Arc::clone(&self.inner),
        }
    }

    /// Number of idle buffers currently held
    pub fn idle(&self) -> usize {
        self.inner.idle.lock().len()
    }

    /// Maximum number of idle buffers
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

/// A buffer borrowed from a [`BufferPool`]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<Inner>,
}

impl fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.buf.len())
            .field("capacity", &self.buf.capacity())
            .finish()
    }
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &Self::Target {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        if buf.capacity() > MAX_RETAINED_SIZE {
            return;
        }
        buf.clear();
        let mut idle = self.pool.idle.lock();
        if idle.len() < self.pool.capacity {
            idle.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::BufferPool;

    #[test]
    fn dropped_buffer_returns_to_pool() {
        let pool = BufferPool::new(2);
        {
            let mut buf = pool.take(64);
            buf.put_slice(b"frame");
            assert_eq!(pool.idle(), 0);
        }
        assert_eq!(pool.idle(), 1);

        let buf = pool.take(8);
        assert!(buf.is_empty());
        assert!(buf.capacity() >= 64);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn pool_keeps_at_most_capacity_buffers() {
        let pool = BufferPool::new(1);
        let a = pool.take(16);
        let b = pool.take(16);
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn clones_share_the_same_buffers() {
        let pool = BufferPool::new(4);
        let other = pool.clone();
        drop(other.take(32));
        assert_eq!(pool.idle(), 1);
    }
}
