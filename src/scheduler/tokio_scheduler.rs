//! Scheduler on the tokio runtime.
//!
//! Tasks are tokio tasks running inside a priority scope, so semaphores
//! order their wait sets by the spawning priority. The executor itself is
//! not priority-preemptive.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::debug;

use super::{
    with_priority, MemoryPool, PrioritySemaphore, Result, Scheduler, SharedCell, TaskHandle,
    TaskSpec,
};

/// Name of the partition the shared cell is allocated from.
pub const CELL_POOL_NAME: &str = "shared-cell";

/// Bytes per cell block (one 16-bit word).
pub const CELL_BLOCK_SIZE: usize = 2;

/// tokio-backed scheduler.
pub struct TokioScheduler {
    cell_pool: Arc<MemoryPool>,
}

impl TokioScheduler {
    /// Create a scheduler whose cell pool holds `cell_blocks` blocks.
    pub fn new(cell_blocks: usize) -> Self {
        Self::with_pool(MemoryPool::new(CELL_POOL_NAME, cell_blocks, CELL_BLOCK_SIZE))
    }

    pub fn with_pool(pool: MemoryPool) -> Self {
        Self {
            cell_pool: Arc::new(pool),
        }
    }

    pub fn cell_pool(&self) -> &Arc<MemoryPool> {
        &self.cell_pool
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
impl Scheduler for TokioScheduler {
    fn spawn_task(&self, spec: TaskSpec, body: BoxFuture<'static, ()>) -> TaskHandle {
        debug!(
            task = %spec.name,
            priority = %spec.priority,
            stack_size = spec.stack_size,
            "Spawning task"
        );
        let join = tokio::spawn(with_priority(spec.priority, body));
        TaskHandle::new(spec, join)
    }

    fn create_semaphore(&self, initial: u16) -> Arc<PrioritySemaphore> {
        Arc::new(PrioritySemaphore::new(initial))
    }

    async fn delay(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(duration).await;
        }
    }

    fn allocate_cell(&self) -> Result<Arc<SharedCell>> {
        self.cell_pool.allocate_cell()
    }
}
