//! Stable event vocabulary for structured logs.
//!
//! Library code logs with `tracing` and uses an event name as the target;
//! the JSONL layer turns the target into the `event` key.

use serde::{Deserialize, Serialize};

/// Log levels as they appear in JSONL output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Phases of an experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and argument handling.
    Init,
    /// Config resolution and validation.
    Config,
    /// Margin computation before the loop.
    Margin,
    /// The BO loop itself.
    Optimize,
    /// Robust regret evaluation.
    Regret,
    /// Writing the run directory.
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Config => "config",
            Stage::Margin => "margin",
            Stage::Optimize => "optimize",
            Stage::Regret => "regret",
            Stage::Persist => "persist",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";
    pub const RUN_PERSISTED: &str = "run.persisted";

    // Config
    pub const CONFIG_LOADED: &str = "config.loaded";

    // Experiment
    pub const MARGIN_COMPUTED: &str = "margin.computed";
    pub const BO_ITERATION: &str = "bo.iteration";
    pub const GP_REFIT: &str = "gp.refit";
    pub const GP_CONVERGENCE_WARNING: &str = "gp.convergence_warning";
    pub const REGRET_COMPUTED: &str = "regret.computed";

    // Error events
    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// Correlation ids attached to events emitted by the CLI.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    /// Span carrying the ids; events inside it inherit them in JSONL output.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("run", run_id = %self.run_id, host_id = %self.host_id)
    }
}
