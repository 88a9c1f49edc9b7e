//! Scheduler collaborator.
//!
//! This module contains:
//! - `Scheduler` trait: the primitives the synchronization core consumes
//!   from the underlying kernel (task creation, semaphores, delay,
//!   fixed-block allocation, optional stack inspection)
//! - `PrioritySemaphore`: counting semaphore with a priority-ordered wait set
//! - `MemoryPool` / `SharedCell`: fixed-block partition for the shared cell
//! - `TokioScheduler`: implementation on the tokio runtime

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

mod pool;
mod semaphore;
mod tokio_scheduler;

pub use pool::{MemoryPool, SharedCell};
pub use semaphore::PrioritySemaphore;
pub use tokio_scheduler::TokioScheduler;


// ============================================================================
// Errors
// ============================================================================

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Errors reported by scheduler primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("Wait timed out after {0:?}")]
    WaitTimeout(Duration),

    #[error("Wait failed: {0}")]
    WaitFailed(String),

    #[error("Allocation failed: pool '{pool}' has no free block of {block_size} bytes")]
    AllocationFailed { pool: String, block_size: usize },

    #[error("Semaphore count overflow")]
    SemaphoreOverflow,

    #[error("Semaphore closed")]
    SemaphoreClosed,
}

// ============================================================================
// Task model
// ============================================================================

/// Static task priority.
///
/// Numerically lower values are more urgent, so `Priority(4)` is served
/// before `Priority(6)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
#[serde(transparent)]
pub struct Priority(pub u8);

impl Priority {
    /// Least urgent priority; used for waits outside any spawned task.
    pub const LOWEST: Priority = Priority(u8::MAX);

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

tokio::task_local! {
    static CURRENT_PRIORITY: Priority;
}

/// Priority of the calling task, or `Priority::LOWEST` outside a task
/// spawned through a `Scheduler`.
pub fn current_priority() -> Priority {
    CURRENT_PRIORITY
        .try_with(|priority| *priority)
        .unwrap_or(Priority::LOWEST)
}

/// Run `fut` with `priority` as the caller priority seen by semaphores.
pub async fn with_priority<F: Future>(priority: Priority, fut: F) -> F::Output {
    CURRENT_PRIORITY.scope(priority, fut).await
}

/// How long a semaphore wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitTimeout {
    /// Block until signaled.
    #[default]
    Forever,
    /// Give up once the duration has elapsed.
    After(Duration),
}

impl WaitTimeout {
    /// Kernel convention: a zero timeout means wait forever.
    pub fn from_millis(millis: u64) -> Self {
        if millis == 0 {
            WaitTimeout::Forever
        } else {
            WaitTimeout::After(Duration::from_millis(millis))
        }
    }

    pub fn is_forever(&self) -> bool {
        matches!(self, WaitTimeout::Forever)
    }
}

/// Creation parameters of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    /// Display name.
    pub name: String,
    /// Static priority.
    pub priority: Priority,
    /// Stack budget in bytes.
    pub stack_size: usize,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, priority: Priority, stack_size: usize) -> Self {
        Self {
            name: name.into(),
            priority,
            stack_size,
        }
    }
}

/// Stack usage reported by a stack check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StackUsage {
    pub used: usize,
    pub free: usize,
}

/// Handle to a spawned task.
pub struct TaskHandle {
    spec: TaskSpec,
    join: JoinHandle<()>,
}

impl TaskHandle {
    pub fn new(spec: TaskSpec, join: JoinHandle<()>) -> Self {
        Self { spec, join }
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stop the task at its next suspension point.
    pub fn abort(&self) {
        self.join.abort();
    }

    /// Wait for the task to return.
    pub async fn join(self) -> Result<()> {
        self.join
            .await
            .map_err(|e| SchedulerError::WaitFailed(format!("task '{}': {}", self.spec.name, e)))
    }
}

// ============================================================================
// Trait
// ============================================================================

/// Primitives consumed from the underlying kernel.
///
/// Implementations:
/// - `TokioScheduler`: tokio tasks, timers and `PrioritySemaphore`
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Start `body` as a task with the given priority and stack budget.
    fn spawn_task(&self, spec: TaskSpec, body: BoxFuture<'static, ()>) -> TaskHandle;

    /// Create a semaphore holding `initial` credits.
    fn create_semaphore(&self, initial: u16) -> Arc<PrioritySemaphore>;

    /// Suspend the caller for `duration`.
    async fn delay(&self, duration: Duration);

    /// Take one block from the shared-cell pool.
    fn allocate_cell(&self) -> Result<Arc<SharedCell>>;

    /// Read-only stack check. `None` when the scheduler cannot tell.
    fn stack_usage(&self, _task: &TaskSpec) -> Option<StackUsage> {
        None
    }
}
