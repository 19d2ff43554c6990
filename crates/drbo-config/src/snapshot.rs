//! Configuration snapshots for run manifests and reproducibility.
//!
//! A snapshot captures the exact configuration at the start of a run, so a
//! stored run can be compared with or reproduced from another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::LoadedConfig;

/// A frozen snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Source of the configuration.
    pub source: String,

    /// Path the configuration was loaded from.
    #[serde(default)]
    pub path: Option<String>,

    /// Preset the configuration started from.
    #[serde(default)]
    pub preset: Option<String>,

    /// `key=value` overrides applied on top.
    #[serde(default)]
    pub overrides: Vec<String>,

    /// SHA-256 of the canonical JSON of the final configuration.
    pub config_hash: String,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub acquisition: String,
    pub objective: String,
    pub num_bo_iters: usize,
    pub num_init_points: usize,
    pub grid_density_per_dim: usize,
    pub seed: u64,
    pub sampling_seed: u64,
}

impl ConfigSnapshot {
    /// Create a new snapshot from a loaded configuration.
    pub fn new(loaded: &LoadedConfig) -> Self {
        let config = &loaded.config;
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            source: loaded.source.to_string(),
            path: loaded.path.as_ref().map(|p| p.display().to_string()),
            preset: loaded.preset.map(|p| p.as_str().to_string()),
            overrides: loaded.overrides.clone(),
            config_hash: hash_content(&config.to_canonical_json()),
            summary: ConfigSummary {
                acquisition: config.acquisition.as_str().to_string(),
                objective: config.objective.as_str().to_string(),
                num_bo_iters: config.num_bo_iters,
                num_init_points: config.num_init_points,
                grid_density_per_dim: config.grid_density_per_dim,
                seed: config.seed,
                sampling_seed: config.sampling_seed,
            },
        }
    }

    /// Serialize snapshot to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot matches another (same config).
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.config_hash == other.config_hash
    }

    /// Get a short identifier for this snapshot (first 12 chars of hash).
    pub fn short_id(&self) -> &str {
        &self.config_hash[..12.min(self.config_hash.len())]
    }
}

/// Hash content with SHA-256 and return hex string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::ExperimentConfig;
    use crate::resolve::ConfigSource;

    fn loaded(config: ExperimentConfig) -> LoadedConfig {
        LoadedConfig {
            config,
            source: ConfigSource::BuiltinDefault,
            path: None,
            preset: None,
            overrides: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_short_id() {
        let snapshot = ConfigSnapshot::new(&loaded(ExperimentConfig::default()));
        assert_eq!(snapshot.short_id().len(), 12);
        assert_eq!(snapshot.source, "builtin default");
    }

    #[test]
    fn test_snapshot_matches() {
        let s1 = ConfigSnapshot::new(&loaded(ExperimentConfig::default()));
        let s2 = ConfigSnapshot::new(&loaded(ExperimentConfig::default()));
        assert!(s1.matches(&s2));

        let s3 = ConfigSnapshot::new(&loaded(ExperimentConfig {
            seed: 7,
            ..ExperimentConfig::default()
        }));
        assert!(!s1.matches(&s3));
    }

    #[test]
    fn test_hash_content() {
        let hash1 = hash_content("test");
        let hash2 = hash_content("test");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA-256 produces 64 hex chars
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ConfigSnapshot::new(&loaded(ExperimentConfig::default()));
        let json = snapshot.to_json().unwrap();
        let restored = ConfigSnapshot::from_json(&json).unwrap();
        assert!(snapshot.matches(&restored));
        assert_eq!(restored.summary.num_bo_iters, 100);
    }
}
