//! Synchronization protocols built on scheduler semaphores.
//!
//! - `alternation`: strict two-participant turn-taking
//! - `exchange`: shared-cell ping-pong riding on alternation
//! - `exclusion`: binary-semaphore critical section for independent writers

use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

pub mod alternation;
pub mod exchange;
pub mod exclusion;

pub use alternation::{AlternationProtocol, Side, Turn, TurnAction};
pub use exchange::{ExchangeEvent, ExchangeTurn, SharedCellExchange};
pub use exclusion::{ExclusionGuard, MutualExclusionSection, Writer};

/// Iteration policy of a participant loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Exactly `n` rounds, then post completion once.
    Bounded(u32),
    /// Loop forever.
    Unbounded,
}

impl Default for RunMode {
    fn default() -> Self {
        RunMode::Bounded(10)
    }
}

impl RunMode {
    /// Whether round `round` (zero-based) should run.
    pub fn permits(&self, round: u64) -> bool {
        match self {
            RunMode::Bounded(n) => round < u64::from(*n),
            RunMode::Unbounded => true,
        }
    }

    /// Whether round `round` is the final one.
    pub fn is_last(&self, round: u64) -> bool {
        match self {
            RunMode::Bounded(n) => round + 1 == u64::from(*n),
            RunMode::Unbounded => false,
        }
    }

    pub fn bound(&self) -> Option<u32> {
        match self {
            RunMode::Bounded(n) => Some(*n),
            RunMode::Unbounded => None,
        }
    }
}

/// Per-participant loop outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ParticipantReport {
    /// Loop iterations executed.
    pub rounds: u64,
    /// Critical actions performed.
    pub actions: u64,
    /// Rounds whose action was skipped after a failed wait.
    pub skipped: u64,
}

/// Concurrent-holder counter with a high-water mark.
#[derive(Debug, Default)]
pub struct Occupancy {
    holders: AtomicUsize,
    peak: AtomicUsize,
}

impl Occupancy {
    pub fn enter(&self) {
        let holders = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(holders, Ordering::SeqCst);
    }

    pub fn leave(&self) {
        self.holders.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn holders(&self) -> usize {
        self.holders.load(Ordering::SeqCst)
    }

    /// Most holders ever observed at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}
