//! Session-specific participant behaviour.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::{handoff_section, SessionContext};
use crate::config::Verbosity;
use crate::instrumentation::Instrumentation;
use crate::protocol::{MutualExclusionSection, Turn, TurnAction};
use crate::scheduler::{StackUsage, TaskSpec};

/// Printed when the scheduler cannot inspect a task's stack.
pub const STACK_CHECK_UNAVAILABLE: &str = "Stack check unavailable";

/// Brackets every hand-off with the instrumentation.
///
/// The hand-off section opens right before the peer's token is signaled and
/// closes when the peer wakes, so it covers the signal, the switch and the
/// peer's wait return.
pub struct TimedHandoff<A> {
    instrumentation: Arc<Instrumentation>,
    inner: A,
}

impl<A: TurnAction> TimedHandoff<A> {
    pub fn new(instrumentation: Arc<Instrumentation>, inner: A) -> Self {
        Self {
            instrumentation,
            inner,
        }
    }
}

#[async_trait]
impl<A: TurnAction> TurnAction for TimedHandoff<A> {
    fn woke(&self, turn: &Turn) {
        if !turn.opens_exchange {
            // Violations are logged and counted by the instrumentation.
            let _ = self.instrumentation.end(handoff_section(turn.side.peer()));
        }
        self.inner.woke(turn);
    }

    async fn act(&self, turn: &Turn) {
        self.inner.act(turn).await;
    }

    fn handing_off(&self, turn: &Turn) {
        self.inner.handing_off(turn);
        if !turn.closes_exchange {
            let _ = self.instrumentation.begin(handoff_section(turn.side));
        }
    }
}

/// Stack report line for one task.
pub fn stack_report_line(task: &TaskSpec, usage: Option<StackUsage>) -> String {
    match usage {
        Some(usage) => format!(
            "{} (priority {}) - Used: {}; Free: {}",
            task.name, task.priority, usage.used, usage.free
        ),
        None => STACK_CHECK_UNAVAILABLE.to_string(),
    }
}

/// Check the stack of every task in `tasks` forever, pausing `interval`
/// between sweeps.
///
/// Results reach the sink only in debug verbosity, and only while holding
/// the writers' `section`, so they never split a message.
pub async fn run_diagnostics(
    context: Arc<SessionContext>,
    section: Arc<MutualExclusionSection>,
    tasks: Vec<TaskSpec>,
    interval: Duration,
) {
    loop {
        let lines: Vec<_> = tasks
            .iter()
            .map(|task| (task, stack_report_line(task, context.scheduler.stack_usage(task))))
            .collect();
        match context.verbosity {
            Verbosity::Debug => match section.acquire(context.timeout).await {
                Ok(guard) => {
                    for (_, line) in &lines {
                        guard.write_line(line);
                    }
                    if let Err(e) = guard.release() {
                        warn!(error = %e, "Diagnostics release failed");
                    }
                }
                Err(e) => warn!(error = %e, "Diagnostics skipped a sweep"),
            },
            Verbosity::Normal => {
                for (task, line) in &lines {
                    debug!(task = %task.name, stack = %line, "Stack check");
                }
            }
        }
        if interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            context.scheduler.delay(interval).await;
        }
    }
}
