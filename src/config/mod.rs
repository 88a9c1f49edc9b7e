//! Session configuration.
//!
//! Static, start-time configuration loaded from YAML files and environment
//! variables. Defaults reproduce the classic lab constants: participants at
//! priorities 6 and 7, the reporter at 4, the stack checker at 12, 2048-byte
//! stacks and ten bounded rounds.

mod participants;

pub use participants::{
    default_reporter, default_writers, AlternationConfig, DiagnosticsConfig, ParticipantConfig,
    TaskConfig, WriterConfig, DEFAULT_STACK_SIZE,
};

use std::time::Duration;

use serde::Deserialize;

use crate::protocol::{RunMode, Side};
use crate::scheduler::WaitTimeout;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "rtsync.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "RTSYNC_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "RTSYNC";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "RTSYNC_LOG";

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Alternation bounds differ: {p0:?} vs {p1:?}; the longer participant would block forever")]
    MismatchedBounds { p0: RunMode, p1: RunMode },

    #[error("Mutex scenario needs at least two writers, got {0}")]
    TooFewWriters(usize),

    #[error("Writer '{0}' has an empty message")]
    EmptyMessage(String),

    #[error("Shared-cell pool needs at least one block")]
    EmptyCellPool,
}

// ============================================================================
// Enumerations
// ============================================================================

/// Which program the session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Plain alternation announcing each turn.
    #[default]
    Handshake,
    /// Alternation with instrumented hand-offs and a latency report.
    ContextSwitch,
    /// Signed-cell ping-pong under alternation.
    SharedMemory,
    /// Independent writers sharing the sink under one binary semaphore.
    MutexWriters,
}

impl Scenario {
    /// Whether the scenario runs two alternating participants.
    pub fn is_alternation(self) -> bool {
        !matches!(self, Scenario::MutexWriters)
    }

    /// Default per-turn hold times for P0 and P1, in milliseconds.
    pub fn default_delays_ms(self) -> (u64, u64) {
        match self {
            Scenario::Handshake | Scenario::MutexWriters => (0, 0),
            Scenario::ContextSwitch => (100, 10),
            Scenario::SharedMemory => (10, 10),
        }
    }

    /// Title line printed at startup.
    pub fn title(self) -> &'static str {
        match self {
            Scenario::Handshake | Scenario::ContextSwitch => "Lab 3 - Handshake",
            Scenario::SharedMemory => "Lab 3 - Shared Memory Communication",
            Scenario::MutexWriters => "Lab 3 - Two Tasks Improved",
        }
    }
}

/// Amount of diagnostic console output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Normal,
    /// Also print stack-check results.
    Debug,
}

/// Rendering of the final report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

/// Measurement harness settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MeasurementConfig {
    /// Self-directed signal/wait pairs timed for the baseline.
    pub calibration_rounds: u32,
    pub report_format: ReportFormat,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            calibration_rounds: 100,
            report_format: ReportFormat::Text,
        }
    }
}

// ============================================================================
// Config
// ============================================================================

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scenario: Scenario,
    /// Run mode of every participant without its own override.
    pub run_mode: RunMode,
    pub verbosity: Verbosity,
    /// Semaphore wait timeout; 0 waits forever.
    pub wait_timeout_ms: u64,
    pub alternation: AlternationConfig,
    pub writers: Vec<WriterConfig>,
    pub reporter: TaskConfig,
    pub diagnostics: DiagnosticsConfig,
    pub measurement: MeasurementConfig,
    /// Blocks in the shared-cell pool.
    pub cell_pool_blocks: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scenario: Scenario::default(),
            run_mode: RunMode::default(),
            verbosity: Verbosity::default(),
            wait_timeout_ms: 0,
            alternation: AlternationConfig::default(),
            writers: default_writers(),
            reporter: default_reporter(),
            diagnostics: DiagnosticsConfig::default(),
            measurement: MeasurementConfig::default(),
            cell_pool_blocks: 1,
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `rtsync.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    /// Create config for testing: no delays, no stack checks.
    pub fn for_test(scenario: Scenario) -> Self {
        let mut config = Self {
            scenario,
            ..Self::default()
        };
        config.alternation.p0.delay_ms = Some(0);
        config.alternation.p1.delay_ms = Some(0);
        for writer in &mut config.writers {
            writer.yield_delay_ms = 0;
        }
        config.diagnostics.enabled = false;
        config
    }

    /// Reject configurations that would deadlock or run nothing useful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cell_pool_blocks == 0 {
            return Err(ConfigError::EmptyCellPool);
        }
        if self.scenario.is_alternation() {
            let p0 = self.participant_run_mode(Side::P0);
            let p1 = self.participant_run_mode(Side::P1);
            if p0 != p1 {
                return Err(ConfigError::MismatchedBounds { p0, p1 });
            }
        } else {
            if self.writers.len() < 2 {
                return Err(ConfigError::TooFewWriters(self.writers.len()));
            }
            if let Some(writer) = self.writers.iter().find(|w| w.message.is_empty()) {
                return Err(ConfigError::EmptyMessage(writer.name.clone()));
            }
        }
        Ok(())
    }

    pub fn wait_timeout(&self) -> WaitTimeout {
        WaitTimeout::from_millis(self.wait_timeout_ms)
    }

    pub fn participant_run_mode(&self, side: Side) -> RunMode {
        self.alternation
            .participant(side)
            .run_mode
            .unwrap_or(self.run_mode)
    }

    pub fn writer_run_mode(&self, writer: &WriterConfig) -> RunMode {
        writer.run_mode.unwrap_or(self.run_mode)
    }

    /// Per-turn hold time of `side`, falling back to the scenario default.
    pub fn participant_delay(&self, side: Side) -> Duration {
        let (p0, p1) = self.scenario.default_delays_ms();
        let fallback = match side {
            Side::P0 => p0,
            Side::P1 => p1,
        };
        let millis = self.alternation.participant(side).delay_ms.unwrap_or(fallback);
        Duration::from_millis(millis)
    }
}
