//! Named experiment configurations.
//!
//! - gpucb: the non-robust GP-UCB baseline, 100 iterations
//! - drucb: the same run with the worst-case acquisition
//! - quick: 10 iterations on the 20×20 grid, for smoke tests

use crate::experiment::{AcquisitionName, ExperimentConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Available configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetName {
    /// Non-robust GP-UCB baseline
    Gpucb,
    /// Distributionally robust UCB
    Drucb,
    /// Short robust run for smoke tests
    Quick,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] = &[PresetName::Gpucb, PresetName::Drucb, PresetName::Quick];

    /// Get preset name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Gpucb => "gpucb",
            PresetName::Drucb => "drucb",
            PresetName::Quick => "quick",
        }
    }

    /// Parse preset name from string.
    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "gpucb" | "gp-ucb" | "gp_ucb" | "baseline" => Some(PresetName::Gpucb),
            "drucb" | "dr-ucb" | "dr_ucb" | "robust" => Some(PresetName::Drucb),
            "quick" | "smoke" | "scenario" => Some(PresetName::Quick),
            _ => None,
        }
    }

    /// Get a description of the preset.
    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Gpucb => "GP-UCB baseline on a random GP objective, 100 iterations",
            PresetName::Drucb => "Worst-case UCB over the MMD ball, 100 iterations",
            PresetName::Quick => "Worst-case UCB, 10 iterations, for smoke tests",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

/// Errors related to preset operations.
#[derive(Debug, Clone)]
pub enum PresetError {
    /// Unknown preset name.
    UnknownPreset(String),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::UnknownPreset(name) => {
                write!(
                    f,
                    "Unknown preset '{}'. Available: {}",
                    name,
                    PresetName::ALL
                        .iter()
                        .map(|p| p.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }
        }
    }
}

impl std::error::Error for PresetError {}

/// Get the configuration for a preset.
pub fn get_preset(name: PresetName) -> ExperimentConfig {
    match name {
        PresetName::Gpucb => gpucb_preset(),
        PresetName::Drucb => drucb_preset(),
        PresetName::Quick => quick_preset(),
    }
}

fn gpucb_preset() -> ExperimentConfig {
    ExperimentConfig {
        acquisition: AcquisitionName::GpUcb,
        ..ExperimentConfig::default()
    }
}

fn drucb_preset() -> ExperimentConfig {
    ExperimentConfig {
        acquisition: AcquisitionName::DrUcb,
        ..ExperimentConfig::default()
    }
}

fn quick_preset() -> ExperimentConfig {
    ExperimentConfig {
        acquisition: AcquisitionName::DrUcb,
        num_bo_iters: 10,
        ..ExperimentConfig::default()
    }
}

/// Information about a preset for display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: String,
    pub description: String,
    pub acquisition: String,
    pub objective: String,
    pub num_bo_iters: usize,
    pub grid_density_per_dim: usize,
}

impl PresetInfo {
    /// Create info from a preset.
    pub fn from_preset(name: PresetName) -> Self {
        let config = get_preset(name);
        Self {
            name: name.as_str().to_string(),
            description: name.description().to_string(),
            acquisition: config.acquisition.as_str().to_string(),
            objective: config.objective.as_str().to_string(),
            num_bo_iters: config.num_bo_iters,
            grid_density_per_dim: config.grid_density_per_dim,
        }
    }
}

/// List all available presets with summary information.
pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .iter()
        .map(|&name| PresetInfo::from_preset(name))
        .collect()
}
