//! Measurement session.
//!
//! Owns everything the participants share (semaphores, the shared cell,
//! the instrumentation) behind one `SessionContext`, spawns the scenario's
//! participants plus a reporter, and collects the outcome once every
//! bounded participant has posted its completion.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Config, ConfigError, ReportFormat, Scenario, Verbosity};
use crate::cycles::CycleSource;
use crate::instrumentation::{Instrumentation, InstrumentationError, SectionId};
use crate::protocol::alternation::Announce;
use crate::protocol::{
    AlternationProtocol, ExchangeTurn, MutualExclusionSection, ParticipantReport, RunMode,
    SharedCellExchange, Side, TurnAction, Writer,
};
use crate::scheduler::{
    PrioritySemaphore, Scheduler, SchedulerError, SharedCell, TaskHandle, WaitTimeout,
};
use crate::sink::OutputSink;

mod participants;
mod report;

pub use participants::{run_diagnostics, stack_report_line, TimedHandoff, STACK_CHECK_UNAVAILABLE};
pub use report::{Report, SectionRow, SwitchLatency};


/// Self-directed signal/wait pairs used as the baseline.
pub const SEM_POST_PEND: SectionId = SectionId(1);
/// Hand-off from P0 to P1.
pub const SWITCH_0_TO_1: SectionId = SectionId(2);
/// Hand-off from P1 to P0.
pub const SWITCH_1_TO_0: SectionId = SectionId(3);

/// Printed once the context-switch participants are spawned.
pub const STARTED: &str = "Started...";

/// Section timing the hand-off that `from` starts.
pub fn handoff_section(from: Side) -> SectionId {
    match from {
        Side::P0 => SWITCH_0_TO_1,
        Side::P1 => SWITCH_1_TO_0,
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("Instrumentation error: {0}")]
    Instrumentation(#[from] InstrumentationError),

    #[error("Report serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Reporter exited without delivering a report")]
    ReporterLost,
}

// ============================================================================
// Shared context
// ============================================================================

/// One participant's loop outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantOutcome {
    pub name: String,
    pub report: ParticipantReport,
}

/// Handles shared by every task of one session.
pub struct SessionContext {
    pub scheduler: Arc<dyn Scheduler>,
    pub sink: Arc<dyn OutputSink>,
    pub instrumentation: Arc<Instrumentation>,
    /// Counts finished participants; the reporter waits on it.
    pub completion: Arc<PrioritySemaphore>,
    pub timeout: WaitTimeout,
    pub verbosity: Verbosity,
    completions_posted: AtomicU32,
    outcomes: Mutex<Vec<ParticipantOutcome>>,
}

impl SessionContext {
    /// Record a finished participant and signal the completion semaphore.
    pub fn post_completion(&self, name: &str, report: ParticipantReport) {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ParticipantOutcome {
                name: name.to_string(),
                report,
            });
        let posted = self.completions_posted.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(participant = name, posted, "Completion posted");
        if let Err(e) = self.completion.signal() {
            error!(participant = name, error = %e, "Failed to post completion");
        }
    }

    pub fn completions_posted(&self) -> u32 {
        self.completions_posted.load(Ordering::SeqCst)
    }

    pub fn outcomes(&self) -> Vec<ParticipantOutcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

// ============================================================================
// Session
// ============================================================================

/// Result of a completed bounded run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub session_id: Uuid,
    pub scenario: Scenario,
    /// In completion order.
    pub outcomes: Vec<ParticipantOutcome>,
    /// Completions the reporter had seen when it unblocked.
    pub completions_before_report: u32,
    /// Latency report; only the context-switch scenario produces one.
    pub report: Option<Report>,
    /// Most participants ever inside the protected region at once.
    pub peak_holders: usize,
    /// Shared-cell value after the last round.
    pub final_cell: Option<i16>,
}

struct Delivery {
    report: Option<Report>,
    completions: u32,
}

enum Arena {
    Alternation(Arc<AlternationProtocol>),
    Exclusion(Arc<MutualExclusionSection>),
}

impl Arena {
    fn peak_holders(&self) -> usize {
        match self {
            Arena::Alternation(protocol) => protocol.peak_holders(),
            Arena::Exclusion(section) => section.peak_holders(),
        }
    }
}

struct Launched {
    participants: Vec<TaskHandle>,
    diagnostics: Option<TaskHandle>,
    arena: Arena,
}

/// Runs one configured scenario.
pub struct MeasurementSession {
    id: Uuid,
    config: Config,
    context: Arc<SessionContext>,
}

impl MeasurementSession {
    /// Validate `config` and build the shared context.
    pub fn new(
        config: Config,
        scheduler: Arc<dyn Scheduler>,
        cycles: Arc<dyn CycleSource>,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        config.validate()?;

        let instrumentation = Arc::new(Instrumentation::new(cycles));
        instrumentation.register(SEM_POST_PEND, "Sem. Post/Pend");
        instrumentation.register(SWITCH_0_TO_1, "Task 0 to 1");
        instrumentation.register(SWITCH_1_TO_0, "Task 1 to 0");

        let context = Arc::new(SessionContext {
            completion: scheduler.create_semaphore(0),
            scheduler,
            sink,
            instrumentation,
            timeout: config.wait_timeout(),
            verbosity: config.verbosity,
            completions_posted: AtomicU32::new(0),
            outcomes: Mutex::new(Vec::new()),
        });

        Ok(Self {
            id: Uuid::new_v4(),
            config,
            context,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.context
    }

    /// Time the configured number of self-directed signal/wait pairs on a
    /// throwaway semaphore. Returns the average, or `None` for zero rounds.
    #[instrument(skip_all, fields(session_id = %self.id))]
    pub async fn calibrate_baseline(&self) -> Result<Option<u64>> {
        let rounds = self.config.measurement.calibration_rounds;
        let instrumentation = &self.context.instrumentation;
        instrumentation.start_measuring();

        let loopback = self.context.scheduler.create_semaphore(0);
        for _ in 0..rounds {
            instrumentation.begin(SEM_POST_PEND)?;
            loopback.signal()?;
            loopback.wait(WaitTimeout::Forever).await?;
            instrumentation.end(SEM_POST_PEND)?;
        }

        let baseline = instrumentation.average_cycles(SEM_POST_PEND)?;
        debug!(rounds, ?baseline, "Baseline calibrated");
        Ok(baseline)
    }

    /// Run the scenario until every bounded participant has completed.
    ///
    /// Unbounded configurations never return.
    #[instrument(skip_all, fields(session_id = %self.id, scenario = ?self.config.scenario))]
    pub async fn run(&self) -> Result<RunSummary> {
        let scenario = self.config.scenario;
        let context = &self.context;
        info!("Session starting");
        context.sink.write_line(scenario.title());

        context.instrumentation.reset();
        context.instrumentation.start_measuring();

        let cell = match scenario {
            Scenario::SharedMemory => Some(context.scheduler.allocate_cell().map_err(|e| {
                error!(error = %e, "Shared cell allocation failed");
                e
            })?),
            _ => None,
        };

        if scenario == Scenario::ContextSwitch {
            self.calibrate_baseline().await?;
        }

        if !context.timeout.is_forever() && scenario == Scenario::SharedMemory {
            warn!(
                timeout = ?context.timeout,
                "Bounded waits on an unguarded cell exchange can break turn exclusivity"
            );
        }

        let modes = self.run_modes();
        let bounded = modes.iter().all(|mode| mode.bound().is_some());
        let (report_tx, report_rx) = oneshot::channel();
        let reporter = if bounded {
            Some(self.spawn_reporter(modes.len() as u32, report_tx))
        } else {
            info!("Unbounded run, no reporter");
            None
        };

        let launched = if scenario.is_alternation() {
            self.spawn_alternation(cell.clone())
        } else {
            self.spawn_writers()
        };
        if scenario == Scenario::ContextSwitch {
            context.sink.write_line(STARTED);
        }

        for handle in launched.participants {
            handle.join().await?;
        }
        if let Some(diagnostics) = launched.diagnostics {
            diagnostics.abort();
        }

        let delivery = match reporter {
            Some(handle) => {
                let delivery = report_rx.await.map_err(|_| SessionError::ReporterLost)?;
                handle.join().await?;
                delivery?
            }
            None => Delivery {
                report: None,
                completions: context.completions_posted(),
            },
        };

        let summary = RunSummary {
            session_id: self.id,
            scenario,
            outcomes: context.outcomes(),
            completions_before_report: delivery.completions,
            report: delivery.report,
            peak_holders: launched.arena.peak_holders(),
            final_cell: cell.as_ref().map(|cell| cell.get()),
        };
        info!(
            completions = summary.completions_before_report,
            peak_holders = summary.peak_holders,
            violations = context.instrumentation.violations(),
            "Session finished"
        );
        Ok(summary)
    }

    fn run_modes(&self) -> Vec<RunMode> {
        if self.config.scenario.is_alternation() {
            vec![
                self.config.participant_run_mode(Side::P0),
                self.config.participant_run_mode(Side::P1),
            ]
        } else {
            self.config
                .writers
                .iter()
                .map(|writer| self.config.writer_run_mode(writer))
                .collect()
        }
    }

    fn spawn_reporter(
        &self,
        expected: u32,
        tx: oneshot::Sender<Result<Delivery>>,
    ) -> TaskHandle {
        let context = Arc::clone(&self.context);
        let format = (self.config.scenario == Scenario::ContextSwitch)
            .then_some(self.config.measurement.report_format);
        self.context.scheduler.spawn_task(
            self.config.reporter.task_spec(),
            Box::pin(async move {
                let result = report_when_done(context, expected, format).await;
                if let Err(e) = &result {
                    error!(error = %e, "Reporter failed");
                }
                let _ = tx.send(result);
            }),
        )
    }

    fn spawn_alternation(&self, cell: Option<Arc<SharedCell>>) -> Launched {
        let protocol = Arc::new(AlternationProtocol::new(
            self.context.scheduler.as_ref(),
            self.config.alternation.first,
            self.context.timeout,
        ));

        let mut participants = Vec::with_capacity(2);
        for side in [Side::P0, Side::P1] {
            let participant = self.config.alternation.participant(side);
            let mode = self.config.participant_run_mode(side);
            let action = self.turn_action(side, cell.clone());
            let protocol = Arc::clone(&protocol);
            let context = Arc::clone(&self.context);
            let name = participant.name.clone();
            debug!(participant = %name, %side, priority = %participant.priority, "Spawning participant");

            participants.push(self.context.scheduler.spawn_task(
                participant.task_spec(),
                Box::pin(async move {
                    let report = protocol.run(side, mode, action.as_ref()).await;
                    context.post_completion(&name, report);
                }),
            ));
        }

        Launched {
            participants,
            diagnostics: None,
            arena: Arena::Alternation(protocol),
        }
    }

    fn turn_action(&self, side: Side, cell: Option<Arc<SharedCell>>) -> Box<dyn TurnAction> {
        let context = &self.context;
        let delay = self.config.participant_delay(side);
        match (self.config.scenario, cell) {
            (Scenario::SharedMemory, Some(cell)) => Box::new(ExchangeTurn::new(
                SharedCellExchange::new(cell),
                Arc::clone(&context.sink),
                Arc::clone(&context.scheduler),
                delay,
            )),
            (Scenario::ContextSwitch, _) => Box::new(TimedHandoff::new(
                Arc::clone(&context.instrumentation),
                Announce::new(
                    Arc::clone(&context.sink),
                    Arc::clone(&context.scheduler),
                    delay,
                ),
            )),
            _ => Box::new(Announce::new(
                Arc::clone(&context.sink),
                Arc::clone(&context.scheduler),
                delay,
            )),
        }
    }

    fn spawn_writers(&self) -> Launched {
        let section = Arc::new(MutualExclusionSection::new(
            Arc::clone(&self.context.scheduler),
            Arc::clone(&self.context.sink),
        ));

        let mut participants = Vec::with_capacity(self.config.writers.len());
        for config in &self.config.writers {
            let writer = Writer::new(
                &config.name,
                &config.message,
                Duration::from_millis(config.yield_delay_ms),
            );
            let mode = self.config.writer_run_mode(config);
            let section = Arc::clone(&section);
            let context = Arc::clone(&self.context);
            debug!(writer = %writer.name, priority = %config.priority, "Spawning writer");

            participants.push(self.context.scheduler.spawn_task(
                config.task_spec(),
                Box::pin(async move {
                    let report = section.run_writer(&writer, mode, context.timeout).await;
                    context.post_completion(&writer.name, report);
                }),
            ));
        }

        let diagnostics = self.config.diagnostics.enabled.then(|| {
            let diagnostics = &self.config.diagnostics;
            let mut checked: Vec<_> = self.config.writers.iter().map(|w| w.task_spec()).collect();
            checked.push(diagnostics.task.task_spec());
            let context = Arc::clone(&self.context);
            let section = Arc::clone(&section);
            let interval = Duration::from_millis(diagnostics.interval_ms);
            self.context.scheduler.spawn_task(
                diagnostics.task.task_spec(),
                Box::pin(run_diagnostics(context, section, checked, interval)),
            )
        });

        Launched {
            participants,
            diagnostics,
            arena: Arena::Exclusion(section),
        }
    }
}

async fn report_when_done(
    context: Arc<SessionContext>,
    expected: u32,
    format: Option<ReportFormat>,
) -> Result<Delivery> {
    if format.is_some() {
        context.sink.write_line("Waiting for measurements..");
    }
    for _ in 0..expected {
        context.completion.wait(WaitTimeout::Forever).await?;
    }
    let completions = context.completions_posted();
    context.instrumentation.stop_measuring();
    info!(completions, expected, "All participants completed");

    let report = match format {
        Some(format) => {
            context.sink.write_line("Measurements done, printing results:");
            let report = Report::build(
                &context.instrumentation,
                SEM_POST_PEND,
                [SWITCH_0_TO_1, SWITCH_1_TO_0],
            )?;
            match format {
                ReportFormat::Text => {
                    for line in report.to_string().lines() {
                        context.sink.write_line(line);
                    }
                }
                ReportFormat::Json => context.sink.write_line(&report.to_json()?),
            }
            Some(report)
        }
        None => None,
    };

    Ok(Delivery {
        report,
        completions,
    })
}
