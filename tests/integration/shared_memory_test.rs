//! Shared-cell exchange integration tests.

use rtsync::config::Scenario;
use rtsync::protocol::RunMode;

use crate::common::{quick_config, run};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cell_magnitude_tracks_rounds() {
    let mut config = quick_config(Scenario::SharedMemory);
    config.run_mode = RunMode::Bounded(25);

    let (result, sink) = run(config).await;
    let summary = result.unwrap();

    assert_eq!(summary.final_cell, Some(-25));
    let sent: Vec<i16> = sink
        .lines()
        .iter()
        .filter_map(|l| l.strip_prefix("Sending "))
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(sent, (1..=25).collect::<Vec<i16>>());
    let received: Vec<i16> = sink
        .lines()
        .iter()
        .filter_map(|l| l.strip_prefix("Received "))
        .map(|v| v.parse().unwrap())
        .collect();
    assert_eq!(received, (1..=24).map(|k: i16| -k).collect::<Vec<i16>>());
}

#[tokio::test(start_paused = true)]
async fn test_scenario_delays_are_honoured() {
    // Defaults hold each turn 10 ms on both sides.
    let mut config = quick_config(Scenario::SharedMemory);
    config.alternation.p0.delay_ms = None;
    config.alternation.p1.delay_ms = None;
    config.run_mode = RunMode::Bounded(3);
    let started = tokio::time::Instant::now();

    let (result, _) = run(config).await;

    assert_eq!(result.unwrap().final_cell, Some(-3));
    assert!(started.elapsed() >= std::time::Duration::from_millis(60));
}
