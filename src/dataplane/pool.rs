//! Shared packet buffer pool
//!
//! Recycles fixed-capacity buffers between queued readers and writers of both
//! directions. The free list is the only state touched by several tasks at
//! once, so it sits behind a single lock.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrency-safe pool of reusable packet buffers
#[derive(Debug)]
pub struct BufferPool {
    /// Idle buffers, LIFO for cache warmth
    free: Mutex<Vec<Vec<u8>>>,
    /// Capacity of every buffer the pool allocates
    buffer_size: usize,
    /// Buffers allocated over the pool's lifetime
    allocated: AtomicU64,
}

impl BufferPool {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            buffer_size,
            allocated: AtomicU64::new(0),
        }
    }

    /// Take an empty buffer with at least `buffer_size` capacity.
    ///
    /// Allocates when no idle buffer is available.
    pub fn acquire(&self) -> Vec<u8> {
        if let Some(buf) = self.free.lock().pop() {
            return buf;
        }
        self.allocated.fetch_add(1, Ordering::Relaxed);
        Vec::with_capacity(self.buffer_size)
    }

    /// Return a buffer. Its capacity is trusted, not re-checked.
    pub fn release(&self, mut buf: Vec<u8>) {
        buf.clear();
        self.free.lock().push(buf);
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Number of idle buffers
    pub fn available(&self) -> usize {
        self.free.lock().len()
    }

    /// Number of buffers allocated so far
    pub fn allocated(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }
}
