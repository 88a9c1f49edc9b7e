//! Shared helpers for integration tests.

use std::sync::Arc;

use rtsync::config::{Config, Scenario};
use rtsync::cycles::{CycleSource, MonotonicClock};
use rtsync::scheduler::TokioScheduler;
use rtsync::session::{MeasurementSession, Result, RunSummary};
use rtsync::sink::MemorySink;

/// Config with no delays and no stack checks.
pub fn quick_config(scenario: Scenario) -> Config {
    Config::for_test(scenario)
}

/// Run `config` on a fresh scheduler with the monotonic clock.
pub async fn run(config: Config) -> (Result<RunSummary>, Arc<MemorySink>) {
    run_with(config, Arc::new(TokioScheduler::default()), Arc::new(MonotonicClock::new())).await
}

pub async fn run_with(
    config: Config,
    scheduler: Arc<TokioScheduler>,
    cycles: Arc<dyn CycleSource>,
) -> (Result<RunSummary>, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let result = match MeasurementSession::new(config, scheduler, cycles, sink.clone()) {
        Ok(session) => session.run().await,
        Err(e) => Err(e),
    };
    (result, sink)
}
