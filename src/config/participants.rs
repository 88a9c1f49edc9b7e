//! Task and participant configuration types.

use serde::Deserialize;

use crate::protocol::{RunMode, Side};
use crate::scheduler::{Priority, TaskSpec};

/// Stack budget given to every task unless configured otherwise.
pub const DEFAULT_STACK_SIZE: usize = 2048;

// ============================================================================
// Tasks
// ============================================================================

/// Creation parameters of a non-protocol task (reporter, diagnostics).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub name: String,
    pub priority: Priority,
    pub stack_size: usize,
}

impl TaskConfig {
    pub fn new(name: &str, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            priority: Priority(priority),
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    pub fn task_spec(&self) -> TaskSpec {
        TaskSpec::new(&self.name, self.priority, self.stack_size)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self::new("task", 10)
    }
}

/// Reporter defaults: the most urgent task in the session.
pub fn default_reporter() -> TaskConfig {
    TaskConfig::new("measurement-results", 4)
}

/// Periodic stack check over the writers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Spawn the stack-check task. It only prints in debug verbosity.
    pub enabled: bool,
    pub task: TaskConfig,
    /// Pause between sweeps.
    pub interval_ms: u64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            task: TaskConfig::new("statistic-task", 12),
            interval_ms: 1000,
        }
    }
}

// ============================================================================
// Alternation participants
// ============================================================================

/// One alternating participant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    pub name: String,
    pub priority: Priority,
    pub stack_size: usize,
    /// Hold time inside each turn. Unset means the scenario default.
    pub delay_ms: Option<u64>,
    /// Overrides the session-wide run mode.
    pub run_mode: Option<RunMode>,
}

impl ParticipantConfig {
    pub fn new(name: &str, priority: u8) -> Self {
        Self {
            name: name.to_string(),
            priority: Priority(priority),
            stack_size: DEFAULT_STACK_SIZE,
            delay_ms: None,
            run_mode: None,
        }
    }

    pub fn task_spec(&self) -> TaskSpec {
        TaskSpec::new(&self.name, self.priority, self.stack_size)
    }
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self::new("task", 10)
    }
}

/// The two alternating participants.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AlternationConfig {
    /// Participant holding the initial turn.
    pub first: Side,
    pub p0: ParticipantConfig,
    pub p1: ParticipantConfig,
}

impl AlternationConfig {
    pub fn participant(&self, side: Side) -> &ParticipantConfig {
        match side {
            Side::P0 => &self.p0,
            Side::P1 => &self.p1,
        }
    }
}

impl Default for AlternationConfig {
    fn default() -> Self {
        Self {
            first: Side::P0,
            p0: ParticipantConfig::new("task0", 6),
            p1: ParticipantConfig::new("task1", 7),
        }
    }
}

// ============================================================================
// Writers
// ============================================================================

/// One mutual-exclusion writer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    pub name: String,
    pub priority: Priority,
    pub stack_size: usize,
    /// Printed whole inside the critical section.
    pub message: String,
    /// Pause after each release.
    pub yield_delay_ms: u64,
    pub run_mode: Option<RunMode>,
}

impl WriterConfig {
    pub fn new(name: &str, priority: u8, message: &str, yield_delay_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            priority: Priority(priority),
            stack_size: DEFAULT_STACK_SIZE,
            message: message.to_string(),
            yield_delay_ms,
            run_mode: None,
        }
    }

    pub fn task_spec(&self) -> TaskSpec {
        TaskSpec::new(&self.name, self.priority, self.stack_size)
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self::new("writer", 10, "", 0)
    }
}

pub fn default_writers() -> Vec<WriterConfig> {
    vec![
        WriterConfig::new("task1", 6, "Hello from improved Task1\n", 111),
        WriterConfig::new("task2", 7, "Hello from improved Task2\n", 4),
    ]
}
