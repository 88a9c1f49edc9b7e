//! rtsync: run one synchronization scenario
//!
//! Loads the configuration, runs the configured scenario on the tokio
//! scheduler with the monotonic clock, and prints participant output and
//! the final report to stdout. Logs go to stderr.
//!
//! ## Configuration
//! - First argument: path to a YAML config file (optional)
//! - RTSYNC_CONFIG: path to a YAML config file (optional)
//! - RTSYNC__*: overrides, e.g. `RTSYNC__SCENARIO=context_switch`
//! - RTSYNC_LOG: tracing filter (default: info)

use std::sync::Arc;

use tracing::{error, info};

use rtsync::config::Config;
use rtsync::cycles::MonotonicClock;
use rtsync::scheduler::TokioScheduler;
use rtsync::session::MeasurementSession;
use rtsync::sink::ConsoleSink;
use rtsync::utils::bootstrap::{config_path_arg, init_tracing};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let path = config_path_arg();
    let config = Config::load(path.as_deref())?;
    info!(scenario = ?config.scenario, run_mode = ?config.run_mode, "rtsync starting");

    let scheduler = Arc::new(TokioScheduler::new(config.cell_pool_blocks));
    let session = MeasurementSession::new(
        config,
        scheduler,
        Arc::new(MonotonicClock::new()),
        Arc::new(ConsoleSink),
    )?;

    match session.run().await {
        Ok(summary) => {
            for outcome in &summary.outcomes {
                info!(
                    participant = %outcome.name,
                    actions = outcome.report.actions,
                    skipped = outcome.report.skipped,
                    "Participant finished"
                );
            }
            Ok(())
        }
        Err(e) => {
            error!(session_id = %session.id(), error = %e, "Session failed");
            Err(e.into())
        }
    }
}
