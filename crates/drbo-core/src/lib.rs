//! drbo core library
//!
//! Distributionally robust Bayesian optimization over a 1-D action and a
//! 1-D context:
//! - GP surrogate with exact Cholesky inference
//! - Objectives and a noisy observer
//! - Robust acquisition over an MMD ball around a reference distribution
//! - The sequential loop and robust regret
//! - Experiment wiring, run store, logging and exit codes for the CLI
//!
//! The binary entry point is in `main.rs`.

pub mod acquisition;
pub mod dataset;
pub mod exit_codes;
pub mod experiment;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod objective;
pub mod observer;
pub mod optimization;
pub mod rng;
pub mod runs;
pub mod schedule;

pub use acquisition::{AcquisitionKind, RobustAcquisition};
pub use dataset::Dataset;
pub use experiment::{run_experiment, ExperimentReport};
pub use model::GprModel;
pub use optimization::{LoopOutcome, RobustBOLoop};
