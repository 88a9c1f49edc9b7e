//! Fixed-block memory partition and the shared cell carved from it.

use std::mem::size_of;
use std::sync::atomic::{AtomicI16, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::debug;

use super::{Result, SchedulerError};

/// Fixed-block partition.
///
/// Blocks are handed out whole and returned when the owning cell drops.
#[derive(Debug)]
pub struct MemoryPool {
    name: String,
    block_size: usize,
    capacity: usize,
    free: AtomicUsize,
}

impl MemoryPool {
    pub fn new(name: impl Into<String>, blocks: usize, block_size: usize) -> Self {
        Self {
            name: name.into(),
            block_size,
            capacity: blocks,
            free: AtomicUsize::new(blocks),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_blocks(&self) -> usize {
        self.free.load(Ordering::Acquire)
    }

    /// Take one block and place a zeroed `SharedCell` in it.
    pub fn allocate_cell(self: &Arc<Self>) -> Result<Arc<SharedCell>> {
        if self.block_size < size_of::<i16>() {
            return Err(self.exhausted());
        }
        self.free
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |free| free.checked_sub(1))
            .map_err(|_| self.exhausted())?;

        debug!(pool = %self.name, free = self.free_blocks(), "Allocated shared cell");
        Ok(Arc::new(SharedCell {
            value: AtomicI16::new(0),
            pool: Arc::clone(self),
        }))
    }

    fn exhausted(&self) -> SchedulerError {
        SchedulerError::AllocationFailed {
            pool: self.name.clone(),
            block_size: self.block_size,
        }
    }
}

/// A signed 16-bit value shared between the two alternation participants.
///
/// Access is plain load/store with no read-modify-write primitive: the
/// alternation turn is the only thing that keeps the two sides apart, and
/// the semaphore hand-off orders their accesses.
#[derive(Debug)]
pub struct SharedCell {
    value: AtomicI16,
    pool: Arc<MemoryPool>,
}

impl SharedCell {
    pub fn get(&self) -> i16 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn set(&self, value: i16) {
        self.value.store(value, Ordering::Relaxed);
    }
}

impl Drop for SharedCell {
    fn drop(&mut self) {
        self.pool.free.fetch_add(1, Ordering::AcqRel);
    }
}
