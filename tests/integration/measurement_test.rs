//! Measurement harness integration tests.

use std::sync::Arc;

use rtsync::config::{ReportFormat, Scenario};
use rtsync::cycles::VirtualClock;
use rtsync::scheduler::{Scheduler, SchedulerError, TokioScheduler};
use rtsync::session::SessionError;

use crate::common::{quick_config, run, run_with};

#[tokio::test]
async fn test_context_switch_report_on_monotonic_clock() {
    let (result, sink) = run(quick_config(Scenario::ContextSwitch)).await;
    let summary = result.unwrap();

    let report = summary.report.unwrap();
    assert_eq!(report.frequency_hz, 1_000_000_000);
    assert_eq!(report.violations, 0);
    assert_eq!(report.sections[0].name, "Sem. Post/Pend");
    assert_eq!(report.sections[0].occurrences, 100);
    assert!(report.sections[0].average_cycles.is_some());
    let switch = report.switch.unwrap();
    assert!(switch.net_cycles <= switch.average_cycles);

    let text = sink.contents();
    assert!(text.contains("--Performance Counter Report--"));
    assert!(text.contains("Context switch average no. of CPU cycles: "));
}

#[tokio::test]
async fn test_report_is_deterministic_on_virtual_clock() {
    let mut config = quick_config(Scenario::ContextSwitch);
    config.measurement.report_format = ReportFormat::Json;
    let clock = Arc::new(VirtualClock::with_step(50_000_000, 1));

    let (result, sink) = run_with(config, Arc::new(TokioScheduler::default()), clock).await;
    let report = result.unwrap().report.unwrap();

    // One read at begin and one at end, nothing else in between.
    assert_eq!(report.sections[0].average_cycles, Some(1));
    assert!(sink.contents().contains("\"frequency_hz\": 50000000"));
}

#[tokio::test]
async fn test_allocation_failure_is_fatal() {
    let scheduler = Arc::new(TokioScheduler::default());
    let _taken = scheduler.allocate_cell().unwrap();

    let (result, _) = run_with(
        quick_config(Scenario::SharedMemory),
        scheduler,
        Arc::new(VirtualClock::new(1_000)),
    )
    .await;

    assert!(matches!(
        result,
        Err(SessionError::Scheduler(SchedulerError::AllocationFailed { .. }))
    ));
}
