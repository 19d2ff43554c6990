//! Error types for robust Bayesian optimization runs.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for the driving harness
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Numerical Instability
//!   Reason: posterior variance -3.2e-4 at point 17 is below tolerance
//!   Fix: Increase obs_variance or lengthscale, or disable optimize_gp
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 11,
//!   "category": "input",
//!   "message": "shape mismatch in observer: expected 2, got 3",
//!   "recoverable": false,
//!   "context": { "expected": 2, "actual": 3 }
//! }
//! ```
//!
//! Nothing in the core retries. Range, shape and config errors abort at the
//! boundary; numerical errors abort the whole loop.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for drbo operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Malformed grids, shapes and distributions.
    Input,
    /// Cholesky failures, negative variances, divergent optimization.
    Numerical,
    /// Experiment configuration errors.
    Config,
    /// Run store lookups.
    Store,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Input => write!(f, "input"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Store => write!(f, "store"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Unified error type for drbo.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (10-19)
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("invalid distribution: {0}")]
    InvalidDistribution(String),

    // Numerical errors (30-39)
    #[error("numerical instability detected: {0}")]
    NumericalInstability(String),

    // Configuration errors (40-49)
    #[error("configuration error: {0}")]
    Config(String),

    // Run store errors (50-59)
    #[error("run not found: {run_id}")]
    RunNotFound { run_id: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a [`Error::ShapeMismatch`].
    pub fn shape(context: impl Into<String>, expected: usize, actual: usize) -> Self {
        Error::ShapeMismatch {
            context: context.into(),
            expected,
            actual,
        }
    }

    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Input errors
    /// - 30-39: Numerical errors
    /// - 40-49: Configuration errors
    /// - 50-59: Run store errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::InvalidRange(_) => 10,
            Error::ShapeMismatch { .. } => 11,
            Error::InvalidDistribution(_) => 12,
            Error::NumericalInstability(_) => 30,
            Error::Config(_) => 40,
            Error::RunNotFound { .. } => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidRange(_)
            | Error::ShapeMismatch { .. }
            | Error::InvalidDistribution(_) => ErrorCategory::Input,
            Error::NumericalInstability(_) => ErrorCategory::Numerical,
            Error::Config(_) => ErrorCategory::Config,
            Error::RunNotFound { .. } => ErrorCategory::Store,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether a harness could plausibly recover by changing inputs.
    ///
    /// Invalid configuration is never recoverable inside a run.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::InvalidRange(_) => false,
            Error::ShapeMismatch { .. } => false,
            Error::InvalidDistribution(_) => false,
            Error::NumericalInstability(_) => true, // different seed or noise level
            Error::Config(_) => false,
            Error::RunNotFound { .. } => false,
            Error::Io(_) => true,
            Error::Json(_) => false,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::InvalidRange(_) => {
                "Check lowers/uppers and grid_density_per_dim: bounds must satisfy lower < upper and density >= 2."
            }
            Error::ShapeMismatch { .. } => {
                "Query points must have exactly `dims` coordinates and weight vectors must match the context grid."
            }
            Error::InvalidDistribution(_) => {
                "Distribution weights must be finite, non-negative and sum to 1. Check reference/truth variance > 0."
            }
            Error::NumericalInstability(_) => {
                "Increase obs_variance or lengthscale, disable optimize_gp, or rerun with a different seed."
            }
            Error::Config(_) => "Run 'drbo config validate' to see which field is wrong.",
            Error::RunNotFound { .. } => "List stored runs with 'drbo runs list'.",
            Error::Io(_) => "Check disk space and permissions on the runs directory, then retry.",
            Error::Json(_) => "The stored run file is not valid JSON; inspect or delete it.",
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::InvalidRange(_) => "Invalid Range",
            Error::ShapeMismatch { .. } => "Shape Mismatch",
            Error::InvalidDistribution(_) => "Invalid Distribution",
            Error::NumericalInstability(_) => "Numerical Instability",
            Error::Config(_) => "Configuration Error",
            Error::RunNotFound { .. } => "Run Not Found",
            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
        }
    }

    /// Format for a terminal: headline, reason, fix.
    pub fn to_human(&self) -> String {
        format!(
            "✗ {}\n  Reason: {}\n  Fix: {}",
            self.headline(),
            self,
            self.remediation()
        )
    }
}

/// Soft warning: hyperparameter optimization hit its iteration cap.
///
/// Not an error. The best parameters found so far are kept and the loop
/// continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    /// Iterations spent before the cap was hit.
    pub iterations: usize,
    /// Log marginal likelihood of the kept parameters.
    pub best_log_likelihood: f64,
    /// Norm of the last gradient seen.
    pub gradient_norm: f64,
}

impl std::fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "hyperparameter optimization stopped after {} iterations without converging (lml={:.4}, |grad|={:.3e})",
            self.iterations, self.best_log_likelihood, self.gradient_norm
        )
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error is potentially recoverable.
    pub recoverable: bool,

    /// Additional structured context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::ShapeMismatch {
                context: where_,
                expected,
                actual,
            } => {
                context.insert("where".to_string(), serde_json::json!(where_));
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::RunNotFound { run_id } => {
                context.insert("run_id".to_string(), serde_json::json!(run_id));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}
