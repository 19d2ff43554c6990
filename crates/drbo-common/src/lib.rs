//! drbo common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the drbo crates:
//! - The error taxonomy with stable codes
//! - Run identifiers
//! - Output formats for CLI responses

pub mod error;
pub mod id;
pub mod output;

pub use error::{ConvergenceWarning, Error, ErrorCategory, Result, StructuredError};
pub use id::RunId;
pub use output::OutputFormat;

/// Schema version stamped on persisted run artifacts.
pub const SCHEMA_VERSION: &str = "1.0.0";
