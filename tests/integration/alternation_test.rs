//! Alternation integration tests.
//!
//! Runs both participants on a multi-threaded runtime so the turn tokens,
//! not executor ordering, are what keeps them in lockstep.

use std::sync::Arc;

use rtsync::config::Scenario;
use rtsync::protocol::alternation::active_line;
use rtsync::protocol::{AlternationProtocol, RunMode, Side, Turn, TurnAction};
use rtsync::scheduler::{TokioScheduler, WaitTimeout};

use crate::common::{quick_config, run};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_handshake() {
    let (result, sink) = run(quick_config(Scenario::Handshake)).await;
    let summary = result.unwrap();

    assert_eq!(sink.count_lines(&active_line(Side::P0)), 10);
    assert_eq!(sink.count_lines(&active_line(Side::P1)), 10);
    let lines = sink.lines();
    for pair in lines[1..].chunks(2) {
        assert_eq!(pair, [active_line(Side::P0), active_line(Side::P1)]);
    }
    assert_eq!(summary.completions_before_report, 2);
    assert_eq!(summary.peak_holders, 1);
}

struct Overlap {
    inside: std::sync::atomic::AtomicBool,
    overlaps: std::sync::atomic::AtomicU32,
}

#[async_trait::async_trait]
impl TurnAction for Overlap {
    async fn act(&self, _turn: &Turn) {
        use std::sync::atomic::Ordering;
        if self.inside.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        tokio::task::yield_now().await;
        self.inside.store(false, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_overlap_over_many_rounds() {
    let scheduler = TokioScheduler::default();
    let protocol = Arc::new(AlternationProtocol::new(
        &scheduler,
        Side::P0,
        WaitTimeout::Forever,
    ));
    let action = Arc::new(Overlap {
        inside: Default::default(),
        overlaps: Default::default(),
    });
    let mode = RunMode::Bounded(500);

    let tasks: Vec<_> = [Side::P1, Side::P0]
        .into_iter()
        .map(|side| {
            let protocol = Arc::clone(&protocol);
            let action = Arc::clone(&action);
            tokio::spawn(async move { protocol.run(side, mode, action.as_ref()).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().actions, 500);
    }

    assert_eq!(
        action.overlaps.load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert_eq!(protocol.peak_holders(), 1);
}
