//! drbo experiment configuration loading and validation.
//!
//! This crate provides:
//! - A typed `ExperimentConfig` with serde defaults for every field
//! - Named presets
//! - Config resolution (CLI → preset → env → XDG → defaults) and overrides
//! - Semantic validation
//! - Config snapshots for run manifests

pub mod experiment;
pub mod preset;
pub mod resolve;
pub mod snapshot;
pub mod validate;

pub use experiment::{
    AcquisitionName, BetaConfig, ExperimentConfig, MarginConfig, NormalSpec, ObjectiveName,
};
pub use preset::{get_preset, list_presets, PresetName};
pub use resolve::{load_config, resolve_config, ConfigPaths, ConfigSource, LoadOptions, LoadedConfig};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_experiment, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";

/// JSON Schema of [`ExperimentConfig`].
pub fn experiment_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(ExperimentConfig)).unwrap_or_default()
}
