//! On-disk run store.
//!
//! Layout:
//!
//! ```text
//! <runs-dir>/
//!   drbo-20261019-143022-a7xq/
//!     manifest.json     summary, written last
//!     config.json       resolved config plus its snapshot
//!     dataset.json      every query point and observation
//!     iterations.json   per-iteration records
//!     regret.json       robust regret curves
//! ```
//!
//! Files are written atomically (temp file + rename). A directory without a
//! readable manifest is not listed.

use std::path::{Path, PathBuf};

use chrono::Utc;
use drbo_common::{Error, Result, RunId, SCHEMA_VERSION};
use drbo_config::{ConfigSnapshot, ExperimentConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dataset::Dataset;
use crate::experiment::{ExperimentReport, MarginSummary};
use crate::logging::event_names;
use crate::metrics::RegretCurve;
use crate::optimization::IterationRecord;

/// Overrides the default runs directory.
pub const ENV_RUNS_DIR: &str = "DRBO_RUNS_DIR";
const DEFAULT_RUNS_DIR: &str = "runs";

const MANIFEST_FILE: &str = "manifest.json";
const CONFIG_FILE: &str = "config.json";
const DATASET_FILE: &str = "dataset.json";
const ITERATIONS_FILE: &str = "iterations.json";
const REGRET_FILE: &str = "regret.json";

/// Summary of a stored run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub schema_version: String,
    pub run_id: String,
    pub created_at: String,
    pub drbo_version: String,
    pub acquisition: String,
    pub objective: String,
    pub config_hash: String,
    pub margin: MarginSummary,
    pub num_init_points: usize,
    pub num_points: usize,
    pub convergence_warnings: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_simple_regret: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_cumulative_regret: Option<f64>,
}

impl RunManifest {
    pub fn new(run_id: &RunId, snapshot: &ConfigSnapshot, report: &ExperimentReport) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            run_id: run_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
            drbo_version: env!("CARGO_PKG_VERSION").to_string(),
            acquisition: snapshot.summary.acquisition.clone(),
            objective: report.objective.clone(),
            config_hash: snapshot.config_hash.clone(),
            margin: report.margin,
            num_init_points: report.num_init_points,
            num_points: report.outcome.dataset.len(),
            convergence_warnings: report.outcome.convergence_warnings(),
            final_simple_regret: report.regret.final_simple(),
            final_cumulative_regret: report.regret.final_cumulative(),
        }
    }
}

/// Contents of `config.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredConfig {
    pub snapshot: ConfigSnapshot,
    pub config: ExperimentConfig,
}

/// One row of `drbo runs list`.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub created_at: String,
    pub acquisition: String,
    pub objective: String,
    pub num_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_simple_regret: Option<f64>,
    pub path: PathBuf,
}

/// Root directory holding one subdirectory per run.
#[derive(Debug, Clone)]
pub struct RunStore {
    root: PathBuf,
}

impl RunStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// CLI path, then `DRBO_RUNS_DIR`, then `./runs`.
    pub fn resolve(cli_path: Option<&Path>) -> Self {
        if let Some(p) = cli_path {
            return Self::new(p);
        }
        match std::env::var(ENV_RUNS_DIR) {
            Ok(dir) if !dir.is_empty() => Self::new(dir),
            _ => Self::new(DEFAULT_RUNS_DIR),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &RunId) -> PathBuf {
        self.root.join(run_id.as_str())
    }

    /// Write every artifact of a finished run. The manifest goes last so a
    /// crash mid-write leaves an unlisted directory.
    pub fn persist(
        &self,
        run_id: &RunId,
        config: &ExperimentConfig,
        snapshot: &ConfigSnapshot,
        report: &ExperimentReport,
    ) -> Result<RunHandle> {
        let dir = self.run_dir(run_id);
        std::fs::create_dir_all(&dir)?;
        let handle = RunHandle {
            id: run_id.clone(),
            dir,
        };

        let stored = StoredConfig {
            snapshot: snapshot.clone(),
            config: config.clone(),
        };
        write_json_pretty_atomic(&handle.path(CONFIG_FILE), &stored)?;
        write_json_pretty_atomic(&handle.path(DATASET_FILE), &report.outcome.dataset)?;
        write_json_pretty_atomic(&handle.path(ITERATIONS_FILE), &report.outcome.iterations)?;
        write_json_pretty_atomic(&handle.path(REGRET_FILE), &report.regret)?;
        let manifest = RunManifest::new(run_id, snapshot, report);
        write_json_pretty_atomic(&handle.path(MANIFEST_FILE), &manifest)?;

        info!(
            target: event_names::RUN_PERSISTED,
            run_id = %run_id,
            path = %handle.dir.display(),
            "run stored"
        );
        Ok(handle)
    }

    pub fn open(&self, run_id: &str) -> Result<RunHandle> {
        let not_found = || Error::RunNotFound {
            run_id: run_id.to_string(),
        };
        let id = RunId::parse(run_id).ok_or_else(not_found)?;
        let dir = self.run_dir(&id);
        if !dir.join(MANIFEST_FILE).is_file() {
            return Err(not_found());
        }
        Ok(RunHandle { id, dir })
    }

    /// Stored runs, newest first.
    pub fn list_runs(&self, limit: Option<usize>) -> Result<Vec<RunSummary>> {
        let mut summaries = Vec::new();
        if !self.root.exists() {
            return Ok(summaries);
        }

        for entry in std::fs::read_dir(&self.root)?.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(id) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(RunId::parse)
            else {
                continue;
            };
            let handle = RunHandle { id, dir: path };
            let Ok(manifest) = handle.read_manifest() else {
                continue;
            };
            summaries.push(RunSummary {
                run_id: manifest.run_id,
                created_at: manifest.created_at,
                acquisition: manifest.acquisition,
                objective: manifest.objective,
                num_points: manifest.num_points,
                final_simple_regret: manifest.final_simple_regret,
                path: handle.dir,
            });
        }

        // Run ids embed the creation time, so id order is time order
        summaries.sort_by(|a, b| b.run_id.cmp(&a.run_id));
        if let Some(limit) = limit {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }
}

/// A run directory.
#[derive(Debug, Clone)]
pub struct RunHandle {
    pub id: RunId,
    pub dir: PathBuf,
}

impl RunHandle {
    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn read_manifest(&self) -> Result<RunManifest> {
        read_json(&self.path(MANIFEST_FILE))
    }

    pub fn read_config(&self) -> Result<StoredConfig> {
        read_json(&self.path(CONFIG_FILE))
    }

    pub fn read_dataset(&self) -> Result<Dataset> {
        read_json(&self.path(DATASET_FILE))
    }

    pub fn read_iterations(&self) -> Result<Vec<IterationRecord>> {
        read_json(&self.path(ITERATIONS_FILE))
    }

    pub fn read_regret(&self) -> Result<RegretCurve> {
        read_json(&self.path(REGRET_FILE))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json_pretty_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_vec_pretty(value)?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("artifact.json");
    let tmp_path = path.with_file_name(format!("{}.tmp.{}", file_name, std::process::id()));
    {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&content)?;
        let _ = file.sync_all();
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::run_experiment;
    use drbo_config::{load_config, LoadOptions, PresetName};
    use tempfile::TempDir;

    fn finished_run() -> (ExperimentConfig, ConfigSnapshot, ExperimentReport) {
        let loaded = load_config(&LoadOptions {
            path: None,
            preset: Some(PresetName::Quick),
            overrides: vec![
                "grid_density_per_dim=8".to_string(),
                "num_bo_iters=2".to_string(),
                "rand_func_num_points=20".to_string(),
            ],
        })
        .unwrap();
        let snapshot = ConfigSnapshot::new(&loaded);
        let report = run_experiment(&loaded.config).unwrap();
        (loaded.config, snapshot, report)
    }

    #[test]
    fn test_persist_and_read_back() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let (config, snapshot, report) = finished_run();
        let id = RunId::new();

        let handle = store.persist(&id, &config, &snapshot, &report).unwrap();
        assert_eq!(handle.read_dataset().unwrap(), report.outcome.dataset);
        assert_eq!(handle.read_iterations().unwrap(), report.outcome.iterations);
        assert_eq!(handle.read_regret().unwrap(), report.regret);
        assert_eq!(handle.read_config().unwrap().config, config);

        let manifest = store.open(id.as_str()).unwrap().read_manifest().unwrap();
        assert_eq!(manifest.run_id, id.to_string());
        assert_eq!(manifest.num_points, report.outcome.dataset.len());
        assert_eq!(manifest.config_hash, snapshot.config_hash);

        let leftovers: Vec<_> = std::fs::read_dir(&handle.dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp."))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_open_missing_run() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        let err = store.open("drbo-20261019-143022-a7xq").unwrap_err();
        assert!(matches!(err, Error::RunNotFound { .. }));
        let err = store.open("../etc").unwrap_err();
        assert!(matches!(err, Error::RunNotFound { .. }));
    }

    #[test]
    fn test_list_skips_junk_and_sorts_newest_first() {
        let tmp = TempDir::new().unwrap();
        let store = RunStore::new(tmp.path());
        assert!(store.list_runs(None).unwrap().is_empty());

        let (config, snapshot, report) = finished_run();
        let older = RunId("drbo-20261018-120000-aaaa".to_string());
        let newer = RunId("drbo-20261019-120000-bbbb".to_string());
        store.persist(&older, &config, &snapshot, &report).unwrap();
        store.persist(&newer, &config, &snapshot, &report).unwrap();

        std::fs::create_dir_all(tmp.path().join("not-a-run")).unwrap();
        std::fs::create_dir_all(tmp.path().join("drbo-20261020-120000-cccc")).unwrap();

        let runs = store.list_runs(None).unwrap();
        let ids: Vec<_> = runs.iter().map(|r| r.run_id.as_str()).collect();
        assert_eq!(ids, vec![newer.as_str(), older.as_str()]);
        assert_eq!(store.list_runs(Some(1)).unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_prefers_cli_path() {
        let store = RunStore::resolve(Some(Path::new("/tmp/drbo-runs")));
        assert_eq!(store.root(), Path::new("/tmp/drbo-runs"));
    }
}
