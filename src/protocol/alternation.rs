//! Strict two-participant alternation.
//!
//! Two tokens, one per participant. A participant waits on its own token,
//! performs its critical action once, then signals the peer's token:
//!
//! ```text
//!   P0: wait(turn_to_p0) -> act -> signal(turn_to_p1)
//!   P1: wait(turn_to_p1) -> act -> signal(turn_to_p0)
//! ```
//!
//! Exactly one token starts with a credit, which decides who acts first.
//! Bounded participants stop after their last round without signaling
//! again, so both sides must run the same number of rounds.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Occupancy, ParticipantReport, RunMode};
use crate::scheduler::{self, PrioritySemaphore, Scheduler, WaitTimeout};
use crate::sink::OutputSink;

/// One of the two alternating participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    #[default]
    P0,
    P1,
}

impl Side {
    pub fn peer(self) -> Side {
        match self {
            Side::P0 => Side::P1,
            Side::P1 => Side::P0,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Side::P0 => 0,
            Side::P1 => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "participant-{}", self.index())
    }
}

/// Context of one granted turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Turn {
    pub side: Side,
    /// Zero-based round of this participant.
    pub round: u64,
    /// The first participant's first turn: nobody handed it over.
    pub opens_exchange: bool,
    /// The second participant's last turn: nobody will take the hand-off.
    pub closes_exchange: bool,
}

/// Work done while holding a turn.
#[async_trait]
pub trait TurnAction: Send + Sync {
    /// Called right after the inbound token was taken.
    fn woke(&self, _turn: &Turn) {}

    /// The critical action, performed exactly once per granted turn.
    async fn act(&self, turn: &Turn);

    /// Called right before the peer's token is signaled.
    fn handing_off(&self, _turn: &Turn) {}
}

/// Turn-taking state shared by both participants.
pub struct AlternationProtocol {
    turn_to_p0: Arc<PrioritySemaphore>,
    turn_to_p1: Arc<PrioritySemaphore>,
    first: Side,
    timeout: WaitTimeout,
    occupancy: Occupancy,
}

impl AlternationProtocol {
    /// Create both tokens; `first` receives the initial credit.
    pub fn new(scheduler: &dyn Scheduler, first: Side, timeout: WaitTimeout) -> Self {
        let (p0_credit, p1_credit) = match first {
            Side::P0 => (1, 0),
            Side::P1 => (0, 1),
        };
        Self {
            turn_to_p0: scheduler.create_semaphore(p0_credit),
            turn_to_p1: scheduler.create_semaphore(p1_credit),
            first,
            timeout,
            occupancy: Occupancy::default(),
        }
    }

    pub fn first(&self) -> Side {
        self.first
    }

    /// Inbound token of `side`.
    pub fn token(&self, side: Side) -> &Arc<PrioritySemaphore> {
        match side {
            Side::P0 => &self.turn_to_p0,
            Side::P1 => &self.turn_to_p1,
        }
    }

    /// Most participants ever holding a turn at once.
    pub fn peak_holders(&self) -> usize {
        self.occupancy.peak()
    }

    /// Block until `side` holds the turn.
    pub async fn wait_turn(&self, side: Side) -> scheduler::Result<()> {
        self.token(side).wait(self.timeout).await?;
        self.occupancy.enter();
        Ok(())
    }

    /// Give the turn to the peer of `side`.
    pub fn signal_turn(&self, side: Side) -> scheduler::Result<()> {
        self.occupancy.leave();
        self.token(side.peer()).signal()
    }

    pub fn turn(&self, side: Side, round: u64, mode: RunMode) -> Turn {
        Turn {
            side,
            round,
            opens_exchange: side == self.first && round == 0,
            closes_exchange: side != self.first && mode.is_last(round),
        }
    }

    /// Participant loop for `side`.
    ///
    /// A failed or timed-out wait skips that round's action and moves on
    /// to the next wait; the round still counts towards the bound.
    pub async fn run<A>(&self, side: Side, mode: RunMode, action: &A) -> ParticipantReport
    where
        A: TurnAction + ?Sized,
    {
        let mut report = ParticipantReport::default();
        let mut round = 0u64;

        while mode.permits(round) {
            let turn = self.turn(side, round, mode);
            match self.wait_turn(side).await {
                Ok(()) => {
                    action.woke(&turn);
                    action.act(&turn).await;
                    report.actions += 1;
                    action.handing_off(&turn);
                    if let Err(e) = self.signal_turn(side) {
                        warn!(participant = %side, round, error = %e, "Turn hand-off failed");
                    }
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(participant = %side, round, error = %e, "Turn wait failed, skipping action");
                }
            }
            round += 1;
            report.rounds = round;
        }

        debug!(
            participant = %side,
            rounds = report.rounds,
            actions = report.actions,
            skipped = report.skipped,
            "Alternation loop finished"
        );
        report
    }
}

/// Announces every granted turn on the sink as `participant-<i>-active`,
/// then holds the turn for `delay`.
pub struct Announce {
    sink: Arc<dyn OutputSink>,
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
}

impl Announce {
    pub fn new(sink: Arc<dyn OutputSink>, scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            sink,
            scheduler,
            delay,
        }
    }
}

/// Line written by `Announce` for `side`.
pub fn active_line(side: Side) -> String {
    format!("{}-active", side)
}

#[async_trait]
impl TurnAction for Announce {
    async fn act(&self, turn: &Turn) {
        self.sink.write_line(&active_line(turn.side));
        if !self.delay.is_zero() {
            self.scheduler.delay(self.delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{Priority, TokioScheduler};
    use crate::sink::MemorySink;

    struct Recorder {
        log: std::sync::Mutex<Vec<(Side, u64)>>,
    }

    #[async_trait]
    impl TurnAction for Recorder {
        async fn act(&self, turn: &Turn) {
            self.log.lock().unwrap().push((turn.side, turn.round));
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_side_peer_and_display() {
        assert_eq!(Side::P0.peer(), Side::P1);
        assert_eq!(Side::P1.peer(), Side::P0);
        assert_eq!(Side::P1.to_string(), "participant-1");
        assert_eq!(active_line(Side::P0), "participant-0-active");
    }

    #[test]
    fn test_initial_credit_goes_to_first() {
        let scheduler = TokioScheduler::default();
        let protocol = AlternationProtocol::new(&scheduler, Side::P1, WaitTimeout::Forever);
        assert_eq!(protocol.token(Side::P0).count(), 0);
        assert_eq!(protocol.token(Side::P1).count(), 1);
    }

    #[test]
    fn test_turn_flags() {
        let scheduler = TokioScheduler::default();
        let protocol = AlternationProtocol::new(&scheduler, Side::P0, WaitTimeout::Forever);
        let mode = RunMode::Bounded(3);

        assert!(protocol.turn(Side::P0, 0, mode).opens_exchange);
        assert!(!protocol.turn(Side::P1, 0, mode).opens_exchange);
        assert!(protocol.turn(Side::P1, 2, mode).closes_exchange);
        assert!(!protocol.turn(Side::P0, 2, mode).closes_exchange);
    }

    #[tokio::test]
    async fn test_rounds_interleave_strictly() {
        let scheduler = TokioScheduler::default();
        let protocol = Arc::new(AlternationProtocol::new(
            &scheduler,
            Side::P0,
            WaitTimeout::Forever,
        ));
        let recorder = Arc::new(Recorder {
            log: std::sync::Mutex::new(Vec::new()),
        });
        let mode = RunMode::Bounded(5);

        // Start the second participant first to show the tokens decide order.
        let p1 = {
            let protocol = Arc::clone(&protocol);
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move { protocol.run(Side::P1, mode, recorder.as_ref()).await })
        };
        let p0 = {
            let protocol = Arc::clone(&protocol);
            let recorder = Arc::clone(&recorder);
            tokio::spawn(async move { protocol.run(Side::P0, mode, recorder.as_ref()).await })
        };

        let p0 = p0.await.unwrap();
        let p1 = p1.await.unwrap();

        assert_eq!(p0.actions, 5);
        assert_eq!(p1.actions, 5);
        let sides: Vec<Side> = recorder.log.lock().unwrap().iter().map(|e| e.0).collect();
        let expected: Vec<Side> = (0..10)
            .map(|i| if i % 2 == 0 { Side::P0 } else { Side::P1 })
            .collect();
        assert_eq!(sides, expected);
        assert_eq!(protocol.peak_holders(), 1);
    }

    #[tokio::test]
    async fn test_failed_wait_skips_action_and_continues() {
        let scheduler = TokioScheduler::default();
        let protocol = AlternationProtocol::new(&scheduler, Side::P1, WaitTimeout::Forever);
        protocol.token(Side::P0).close();
        let recorder = Recorder {
            log: std::sync::Mutex::new(Vec::new()),
        };

        let report = protocol.run(Side::P0, RunMode::Bounded(4), &recorder).await;

        assert_eq!(
            report,
            ParticipantReport {
                rounds: 4,
                actions: 0,
                skipped: 4
            }
        );
        assert!(recorder.log.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_wait_skips_action() {
        let scheduler = TokioScheduler::default();
        let protocol = AlternationProtocol::new(
            &scheduler,
            Side::P1,
            WaitTimeout::After(Duration::from_millis(20)),
        );
        let recorder = Recorder {
            log: std::sync::Mutex::new(Vec::new()),
        };

        let report = crate::scheduler::with_priority(
            Priority(6),
            protocol.run(Side::P0, RunMode::Bounded(2), &recorder),
        )
        .await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.actions, 0);
    }

    #[tokio::test]
    async fn test_announce_writes_active_line() {
        let sink = Arc::new(MemorySink::new());
        let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::default());
        let announce = Announce::new(sink.clone(), scheduler, Duration::ZERO);
        let turn = Turn {
            side: Side::P1,
            round: 0,
            opens_exchange: false,
            closes_exchange: false,
        };

        announce.act(&turn).await;

        assert_eq!(sink.lines(), vec!["participant-1-active"]);
    }
}
