//! Typed experiment configuration.
//!
//! One flat record consumed once at startup. Every field has a default, so a
//! file only needs the keys it changes.

use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validate::{ValidationError, ValidationResult};

/// Acquisition strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionName {
    /// Non-robust UCB, expected under the reference distribution.
    #[serde(alias = "GP-UCB", alias = "gpucb")]
    GpUcb,
    /// Worst-case expected UCB over the MMD ball.
    #[default]
    #[serde(alias = "DR-UCB", alias = "drucb")]
    DrUcb,
    /// Worst-case expectation of a joint posterior sample.
    #[serde(alias = "DR-TS")]
    DrThompson,
}

impl AcquisitionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionName::GpUcb => "gp_ucb",
            AcquisitionName::DrUcb => "dr_ucb",
            AcquisitionName::DrThompson => "dr_thompson",
        }
    }
}

/// Synthetic objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveName {
    /// Random function drawn from the GP prior, seeded by `seed`.
    #[default]
    RandFunc,
    /// Branin-Hoo, negated for maximization and rescaled to the bounds.
    Branin,
}

impl ObjectiveName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectiveName::RandFunc => "rand_func",
            ObjectiveName::Branin => "branin",
        }
    }
}

/// Exploration weight schedule for UCB.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BetaConfig {
    /// Same beta every iteration.
    Constant { value: f64 },
    /// `sqrt(2 ln(|D| t² π² / (6 δ)))`.
    Srinivas { delta: f64 },
}

impl Default for BetaConfig {
    fn default() -> Self {
        BetaConfig::Constant { value: 2.0 }
    }
}

/// Normal distribution discretized onto the context grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct NormalSpec {
    pub mean: f64,
    pub variance: f64,
}

/// How the MMD ball radius is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarginConfig {
    /// `MMD(reference, truth)`, computed once before the loop.
    #[default]
    Mmd,
    /// Explicit radius.
    Fixed { value: f64 },
}

/// Full experiment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default, deny_unknown_fields)]
pub struct ExperimentConfig {
    pub acquisition: AcquisitionName,
    pub objective: ObjectiveName,
    /// Rescale the objective to zero mean, unit variance over the search space.
    pub standardize_objective: bool,
    /// Input dimensionality: one action plus one context.
    pub dims: usize,
    pub lowers: Vec<f64>,
    pub uppers: Vec<f64>,
    pub grid_density_per_dim: usize,
    /// Support size of the random objective.
    pub rand_func_num_points: usize,
    /// Kernel lengthscale for the surrogate, the random objective and MMD.
    pub lengthscale: f64,
    pub obs_variance: f64,
    pub optimize_gp: bool,
    pub opt_max_iter: usize,
    pub num_bo_iters: usize,
    pub num_init_points: usize,
    /// Seeds the objective.
    pub seed: u64,
    /// Seeds observation noise, initial points and context draws.
    pub sampling_seed: u64,
    pub beta: BetaConfig,
    pub reference: NormalSpec,
    pub truth: NormalSpec,
    pub margin: MarginConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            acquisition: AcquisitionName::DrUcb,
            objective: ObjectiveName::RandFunc,
            standardize_objective: false,
            dims: 2,
            lowers: vec![0.0, 0.0],
            uppers: vec![1.0, 1.0],
            grid_density_per_dim: 20,
            rand_func_num_points: 100,
            lengthscale: 0.1,
            obs_variance: 0.001,
            optimize_gp: false,
            opt_max_iter: 10,
            num_bo_iters: 100,
            num_init_points: 3,
            seed: 1,
            sampling_seed: 0,
            beta: BetaConfig::default(),
            reference: NormalSpec {
                mean: 0.5,
                variance: 0.05,
            },
            truth: NormalSpec {
                mean: 0.49,
                variance: 0.06,
            },
            margin: MarginConfig::Mmd,
        }
    }
}

impl ExperimentConfig {
    /// Load from a file, choosing the parser by extension (`.json` or TOML).
    pub fn from_file(path: &Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> ValidationResult<Self> {
        toml::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> ValidationResult<Self> {
        serde_json::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    pub fn to_toml_string(&self) -> ValidationResult<String> {
        toml::to_string_pretty(self).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    /// Canonical JSON used for hashing and persistence.
    pub fn to_canonical_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Apply one `key=value` override. Keys may be dotted (`beta.value`);
    /// values use TOML syntax and fall back to a bare string.
    pub fn apply_override(&self, assignment: &str) -> ValidationResult<Self> {
        let (key, raw) = assignment.split_once('=').ok_or_else(|| {
            ValidationError::InvalidValue {
                field: assignment.to_string(),
                message: "Override must look like key=value".to_string(),
            }
        })?;
        let key = key.trim();
        let raw = raw.trim();
        if key.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: assignment.to_string(),
                message: "Override key is empty".to_string(),
            });
        }

        let value = parse_override_value(raw);
        let mut root = toml::Value::try_from(self)
            .map_err(|e| ValidationError::ParseError(e.to_string()))?;

        let segments: Vec<&str> = key.split('.').collect();
        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| ValidationError::MissingField(key.to_string()))?;
        let mut table = root
            .as_table_mut()
            .ok_or_else(|| ValidationError::SchemaError("config is not a table".to_string()))?;
        for segment in parents {
            table = table
                .entry(segment.to_string())
                .or_insert(toml::Value::Table(toml::map::Map::new()))
                .as_table_mut()
                .ok_or_else(|| ValidationError::InvalidValue {
                    field: key.to_string(),
                    message: format!("'{segment}' is not a table"),
                })?;
        }
        table.insert(last.to_string(), value);

        root.try_into().map_err(|e: toml::de::Error| ValidationError::InvalidValue {
            field: key.to_string(),
            message: e.to_string(),
        })
    }

    /// Apply overrides in order.
    pub fn with_overrides<S: AsRef<str>>(&self, overrides: &[S]) -> ValidationResult<Self> {
        let mut config = self.clone();
        for assignment in overrides {
            config = config.apply_override(assignment.as_ref())?;
        }
        Ok(config)
    }
}

fn parse_override_value(raw: &str) -> toml::Value {
    let wrapped = format!("v = {raw}");
    match wrapped.parse::<toml::Table>() {
        Ok(mut table) => table
            .remove("v")
            .unwrap_or_else(|| toml::Value::String(raw.to_string())),
        Err(_) => toml::Value::String(raw.to_string()),
    }
}
