//! Counting semaphore with a priority-ordered wait set.
//!
//! A signal hands its credit straight to the most urgent waiter (lowest
//! priority value, FIFO among equals). The credit is only banked in the
//! count when nobody is waiting.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{trace, warn};

use super::{current_priority, Priority, Result, SchedulerError, WaitTimeout};

struct Waiter {
    id: u64,
    priority: Priority,
    wake: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    count: u16,
    /// Sorted by (priority, arrival).
    waiters: Vec<Waiter>,
    next_id: u64,
    closed: bool,
}

/// Counting semaphore.
pub struct PrioritySemaphore {
    state: Mutex<State>,
}

impl PrioritySemaphore {
    /// Create a semaphore holding `initial` credits.
    pub fn new(initial: u16) -> Self {
        Self {
            state: Mutex::new(State {
                count: initial,
                ..State::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Banked credits.
    pub fn count(&self) -> u16 {
        self.lock().count
    }

    /// Number of tasks blocked in `wait`.
    pub fn waiting(&self) -> usize {
        self.lock().waiters.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Take one credit, blocking until one is available or `timeout` elapses.
    ///
    /// The caller is queued with `current_priority()`. Dropping the future
    /// leaves the queue, and a credit that was already handed over is
    /// signaled again.
    pub async fn wait(&self, timeout: WaitTimeout) -> Result<()> {
        let (id, rx) = {
            let mut state = self.lock();
            if state.closed {
                return Err(closed());
            }
            if state.count > 0 {
                state.count -= 1;
                return Ok(());
            }

            let (tx, rx) = oneshot::channel();
            let id = state.next_id;
            state.next_id += 1;
            let priority = current_priority();
            let at = state.waiters.partition_point(|w| w.priority <= priority);
            state.waiters.insert(
                at,
                Waiter {
                    id,
                    priority,
                    wake: tx,
                },
            );
            trace!(waiter = id, priority = %priority, "Semaphore wait queued");
            (id, rx)
        };

        let mut queued = QueuedWait {
            semaphore: self,
            id,
            rx,
            settled: false,
        };
        let outcome = match timeout {
            WaitTimeout::Forever => (&mut queued.rx).await.map_err(|_| closed()),
            WaitTimeout::After(limit) => match tokio::time::timeout(limit, &mut queued.rx).await {
                Ok(woken) => woken.map_err(|_| closed()),
                Err(_) if self.dequeue(id) => Err(SchedulerError::WaitTimeout(limit)),
                // The credit was handed over between the deadline and the lock.
                Err(_) => queued.rx.try_recv().map_err(|_| closed()),
            },
        };
        queued.settled = true;
        outcome
    }

    /// Remove waiter `id` if it is still queued.
    fn dequeue(&self, id: u64) -> bool {
        let mut state = self.lock();
        match state.waiters.iter().position(|w| w.id == id) {
            Some(pos) => {
                state.waiters.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Take one credit if available, without blocking.
    pub fn try_wait(&self) -> bool {
        let mut state = self.lock();
        if !state.closed && state.count > 0 {
            state.count -= 1;
            true
        } else {
            false
        }
    }

    /// Release one credit, waking at most one waiter.
    pub fn signal(&self) -> Result<()> {
        let mut state = self.lock();
        if state.closed {
            return Err(SchedulerError::SemaphoreClosed);
        }
        while !state.waiters.is_empty() {
            let waiter = state.waiters.remove(0);
            // A dropped receiver belongs to an abandoned wait; skip it.
            if waiter.wake.send(()).is_ok() {
                trace!(waiter = waiter.id, priority = %waiter.priority, "Semaphore handed off");
                return Ok(());
            }
        }
        if state.count == u16::MAX {
            return Err(SchedulerError::SemaphoreOverflow);
        }
        state.count += 1;
        Ok(())
    }

    /// Fail every pending and future wait with `WaitFailed`.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.waiters.clear();
    }
}

/// A queued `wait` that has not returned yet.
struct QueuedWait<'a> {
    semaphore: &'a PrioritySemaphore,
    id: u64,
    rx: oneshot::Receiver<()>,
    settled: bool,
}

impl Drop for QueuedWait<'_> {
    fn drop(&mut self) {
        if self.settled || self.semaphore.dequeue(self.id) {
            return;
        }
        if self.rx.try_recv().is_ok() {
            trace!(waiter = self.id, "Cancelled wait passes its credit on");
            if let Err(e) = self.semaphore.signal() {
                warn!(waiter = self.id, error = %e, "Credit lost by cancelled wait");
            }
        }
    }
}

fn closed() -> SchedulerError {
    SchedulerError::WaitFailed("semaphore closed".to_string())
}
