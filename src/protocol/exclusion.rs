//! Binary-semaphore critical section guarding the shared sink.
//!
//! Any number of independent writers contend for one semaphore created with
//! a single credit. The holder writes its whole message one byte at a time,
//! yielding between bytes; the guard keeps other writers out until release.
//! Wake order among contenders follows priority, so a busy high-priority
//! writer can starve the others.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Occupancy, ParticipantReport, RunMode};
use crate::scheduler::{self, PrioritySemaphore, Scheduler, WaitTimeout};
use crate::sink::OutputSink;

/// A participant that repeatedly prints one fixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Writer {
    pub name: String,
    pub message: String,
    /// Pause after each release before contending again.
    pub yield_delay: Duration,
}

impl Writer {
    pub fn new(name: impl Into<String>, message: impl Into<String>, yield_delay: Duration) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            yield_delay,
        }
    }
}

/// The guarded region and the sink behind it.
pub struct MutualExclusionSection {
    lock: Arc<PrioritySemaphore>,
    sink: Arc<dyn OutputSink>,
    scheduler: Arc<dyn Scheduler>,
    occupancy: Occupancy,
}

impl MutualExclusionSection {
    pub fn new(scheduler: Arc<dyn Scheduler>, sink: Arc<dyn OutputSink>) -> Self {
        Self {
            lock: scheduler.create_semaphore(1),
            sink,
            scheduler,
            occupancy: Occupancy::default(),
        }
    }

    /// Writers currently blocked in `acquire`.
    pub fn waiting(&self) -> usize {
        self.lock.waiting()
    }

    /// Most writers ever inside the region at once.
    pub fn peak_holders(&self) -> usize {
        self.occupancy.peak()
    }

    /// Block until the region is free.
    pub async fn acquire(&self, timeout: WaitTimeout) -> scheduler::Result<ExclusionGuard<'_>> {
        self.lock.wait(timeout).await?;
        self.occupancy.enter();
        Ok(ExclusionGuard {
            section: self,
            released: false,
        })
    }

    fn release_lock(&self) -> scheduler::Result<()> {
        self.occupancy.leave();
        self.lock.signal()
    }

    /// Writer loop: acquire, print the message, release, pause.
    ///
    /// A failed acquire skips that round's message; the round still counts.
    pub async fn run_writer(
        &self,
        writer: &Writer,
        mode: RunMode,
        timeout: WaitTimeout,
    ) -> ParticipantReport {
        let mut report = ParticipantReport::default();
        let mut round = 0u64;

        while mode.permits(round) {
            match self.acquire(timeout).await {
                Ok(guard) => {
                    guard.write(&writer.message).await;
                    report.actions += 1;
                    if let Err(e) = guard.release() {
                        warn!(writer = %writer.name, round, error = %e, "Release failed");
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(writer = %writer.name, round, error = %e, "Acquire failed, skipping message");
                }
            }

            if writer.yield_delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                self.scheduler.delay(writer.yield_delay).await;
            }
            round += 1;
            report.rounds = round;
        }

        debug!(
            writer = %writer.name,
            rounds = report.rounds,
            actions = report.actions,
            skipped = report.skipped,
            "Writer loop finished"
        );
        report
    }
}

/// Exclusive access to the sink. Dropping it releases the region.
pub struct ExclusionGuard<'a> {
    section: &'a MutualExclusionSection,
    released: bool,
}

impl ExclusionGuard<'_> {
    /// Write `message` byte by byte, yielding between bytes.
    pub async fn write(&self, message: &str) {
        for unit in message.bytes() {
            self.section.sink.write_unit(unit);
            tokio::task::yield_now().await;
        }
    }

    /// Write one whole line.
    pub fn write_line(&self, line: &str) {
        self.section.sink.write_line(line);
    }

    /// Leave the region, waking the most urgent waiter.
    pub fn release(mut self) -> scheduler::Result<()> {
        self.released = true;
        self.section.release_lock()
    }
}

impl Drop for ExclusionGuard<'_> {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.section.release_lock() {
                warn!(error = %e, "Release on drop failed");
            }
        }
    }
}
