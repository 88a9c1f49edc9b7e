//! Mutual exclusion integration tests.

use rtsync::config::{Scenario, Verbosity, WriterConfig};
use rtsync::session::STACK_CHECK_UNAVAILABLE;
use rtsync::protocol::RunMode;

use crate::common::{quick_config, run};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_three_writers_never_interleave() {
    let mut config = quick_config(Scenario::MutexWriters);
    config.writers.push(WriterConfig::new("task3", 8, "Hello from improved Task3\n", 0));
    config.run_mode = RunMode::Bounded(20);

    let (result, sink) = run(config).await;
    let summary = result.unwrap();

    let lines = sink.lines();
    assert_eq!(lines[0], "Lab 3 - Two Tasks Improved");
    for line in &lines[1..] {
        assert!(
            line.starts_with("Hello from improved Task") && line.len() == 25,
            "interleaved output: {line:?}"
        );
    }
    for n in 1..=3 {
        assert_eq!(sink.count_lines(&format!("Hello from improved Task{n}")), 20);
    }
    assert_eq!(summary.completions_before_report, 3);
    assert_eq!(summary.peak_holders, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_debug_stack_checks_never_split_messages() {
    let mut config = quick_config(Scenario::MutexWriters);
    config.run_mode = RunMode::Bounded(3);
    config.verbosity = Verbosity::Debug;
    config.diagnostics.enabled = true;
    config.diagnostics.interval_ms = 0;

    let (result, sink) = run(config).await;
    result.unwrap();

    for line in &sink.lines()[1..] {
        assert!(
            line == "Hello from improved Task1"
                || line == "Hello from improved Task2"
                || line == STACK_CHECK_UNAVAILABLE,
            "split line: {line:?}"
        );
    }
    assert_eq!(sink.count_lines("Hello from improved Task1"), 3);
    assert_eq!(sink.count_lines("Hello from improved Task2"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_classic_yield_delays() {
    let mut config = quick_config(Scenario::MutexWriters);
    config.writers[0].yield_delay_ms = 111;
    config.writers[1].yield_delay_ms = 4;
    config.run_mode = RunMode::Bounded(3);

    let (result, sink) = run(config).await;

    assert!(result.is_ok());
    assert_eq!(sink.count_lines("Hello from improved Task1"), 3);
    assert_eq!(sink.count_lines("Hello from improved Task2"), 3);
}

#[tokio::test]
async fn test_single_writer_rejected() {
    let mut config = quick_config(Scenario::MutexWriters);
    config.writers.truncate(1);

    let (result, sink) = run(config).await;

    assert!(result.is_err());
    assert!(sink.contents().is_empty());
}
