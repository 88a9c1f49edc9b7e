//! Monotonic cycle sources.
//!
//! The instrumentation only ever sees the `CycleSource` trait:
//! - `MonotonicClock`: production source backed by the OS monotonic clock,
//!   one cycle per nanosecond
//! - `VirtualClock`: deterministic source for tests, advanced by hand or by a
//!   fixed step on every read

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Nanosecond resolution of `MonotonicClock`.
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Read-only, monotonically increasing cycle counter.
pub trait CycleSource: Send + Sync {
    /// Current counter value.
    fn now(&self) -> u64;

    /// Counter increments per second.
    fn frequency_hz(&self) -> u64;
}

/// Counter backed by `std::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleSource for MonotonicClock {
    #[inline]
    fn now(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn frequency_hz(&self) -> u64 {
        NANOS_PER_SECOND
    }
}

/// Hand-driven counter.
///
/// Every `now()` returns the current value and then advances it by `step`,
/// so a begin/end pair with nothing in between spans exactly `step` cycles.
#[derive(Debug)]
pub struct VirtualClock {
    cycles: AtomicU64,
    step: AtomicU64,
    frequency_hz: u64,
}

impl VirtualClock {
    /// A stopped clock at zero.
    pub fn new(frequency_hz: u64) -> Self {
        Self::with_step(frequency_hz, 0)
    }

    /// A clock that advances `step` cycles per read.
    pub fn with_step(frequency_hz: u64, step: u64) -> Self {
        Self {
            cycles: AtomicU64::new(0),
            step: AtomicU64::new(step),
            frequency_hz,
        }
    }

    pub fn advance(&self, cycles: u64) {
        self.cycles.fetch_add(cycles, Ordering::SeqCst);
    }

    pub fn set_step(&self, step: u64) {
        self.step.store(step, Ordering::SeqCst);
    }

    /// Current value without advancing.
    pub fn peek(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }
}

impl CycleSource for VirtualClock {
    fn now(&self) -> u64 {
        let step = self.step.load(Ordering::SeqCst);
        self.cycles.fetch_add(step, Ordering::SeqCst)
    }

    fn frequency_hz(&self) -> u64 {
        self.frequency_hz
    }
}
