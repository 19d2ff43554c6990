//! End-to-end tests for the drbo binary.
//!
//! Every test points `--runs-dir` at a temporary directory and shrinks the
//! experiment with `--set` so runs finish quickly.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

const SMALL: [&str; 8] = [
    "--set",
    "grid_density_per_dim=8",
    "--set",
    "num_bo_iters=3",
    "--set",
    "rand_func_num_points=20",
    "--set",
    "num_init_points=2",
];

/// Get a Command for the drbo binary.
fn drbo() -> Command {
    let mut cmd = Command::cargo_bin("drbo").expect("drbo binary should exist");
    cmd.env_remove("DRBO_LOG")
        .env_remove("RUST_LOG")
        .env_remove("DRBO_RUNS_DIR")
        .env_remove("DRBO_CONFIG")
        .env_remove("DRBO_CONFIG_DIR");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command should run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

// ============================================================================
// run
// ============================================================================

mod run {
    use super::*;

    #[test]
    fn run_stores_and_reports() {
        let dir = TempDir::new().unwrap();
        let v = json_stdout(
            drbo()
                .args(["-q", "run", "--runs-dir"])
                .arg(dir.path())
                .args(SMALL),
        );

        assert_eq!(v["acquisition"], "dr_ucb");
        assert_eq!(v["num_points"], 5);
        assert_eq!(v["query_points"].as_array().unwrap().len(), 5);
        assert_eq!(v["margin"]["source"], "mmd");
        assert!(v["regret"]["final_simple"].as_f64().unwrap() >= 0.0);

        let run_id = v["run_id"].as_str().unwrap();
        let run_dir = dir.path().join(run_id);
        assert!(run_dir.join("manifest.json").exists());
    }

    #[test]
    fn no_save_leaves_runs_dir_empty() {
        let dir = TempDir::new().unwrap();
        let v = json_stdout(
            drbo()
                .args(["-q", "run", "--no-save", "--runs-dir"])
                .arg(dir.path())
                .args(SMALL),
        );
        assert!(v["run_dir"].is_null());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn summary_format_is_one_line() {
        let dir = TempDir::new().unwrap();
        drbo()
            .args(["-q", "-f", "summary", "run", "--no-save", "--runs-dir"])
            .arg(dir.path())
            .args(SMALL)
            .assert()
            .success()
            .stdout(predicate::str::contains("dr_ucb"))
            .stdout(predicate::str::contains("simple regret"));
    }

    #[test]
    fn md_format_has_iteration_table() {
        let dir = TempDir::new().unwrap();
        drbo()
            .args(["-q", "-f", "md", "run", "--no-save", "--runs-dir"])
            .arg(dir.path())
            .args(SMALL)
            .assert()
            .success()
            .stdout(predicate::str::contains("# Run drbo-"))
            .stdout(predicate::str::contains("| # | action | context |"));
    }

    #[test]
    fn preset_and_thompson_override() {
        let dir = TempDir::new().unwrap();
        let v = json_stdout(
            drbo()
                .args(["-q", "run", "--no-save", "--preset", "quick", "--runs-dir"])
                .arg(dir.path())
                .args(["--set", "acquisition=dr_thompson"])
                .args(SMALL),
        );
        assert_eq!(v["acquisition"], "dr_thompson");
    }

    #[test]
    fn same_config_same_queries() {
        let dir = TempDir::new().unwrap();
        let first = json_stdout(
            drbo()
                .args(["-q", "run", "--no-save", "--runs-dir"])
                .arg(dir.path())
                .args(SMALL),
        );
        let second = json_stdout(
            drbo()
                .args(["-q", "run", "--no-save", "--runs-dir"])
                .arg(dir.path())
                .args(SMALL),
        );
        assert_eq!(first["query_points"], second["query_points"]);
        assert_ne!(first["run_id"], second["run_id"]);
    }

    #[test]
    fn jsonl_logs_go_to_stderr() {
        let dir = TempDir::new().unwrap();
        let output = drbo()
            .args(["--log-format", "jsonl", "run", "--no-save", "--runs-dir"])
            .arg(dir.path())
            .args(SMALL)
            .output()
            .unwrap();
        assert!(output.status.success());

        let stderr = String::from_utf8_lossy(&output.stderr);
        let events: Vec<Value> = stderr
            .lines()
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        assert!(events.iter().any(|e| e["event"] == "run.started"));
        assert!(events.iter().any(|e| e["event"] == "margin.computed"));
        assert_eq!(
            events.iter().filter(|e| e["event"] == "bo.iteration").count(),
            3
        );
        assert!(serde_json::from_slice::<Value>(&output.stdout).is_ok());
    }
}

// ============================================================================
// margin
// ============================================================================

mod margin {
    use super::*;

    #[test]
    fn margin_reports_mmd() {
        let v = json_stdout(drbo().args(["-q", "margin"]).args(SMALL));
        let m = &v["margin"];
        assert_eq!(m["source"], "mmd");
        assert_eq!(m["value"], m["mmd"]);
        assert_eq!(v["context_grid"].as_array().unwrap().len(), 8);
    }

    #[test]
    fn fixed_margin_override() {
        let v = json_stdout(
            drbo()
                .args(["-q", "margin", "--set", "margin={kind = \"fixed\", value = 0.2}"])
                .args(SMALL),
        );
        assert_eq!(v["margin"]["source"], "fixed");
        assert_eq!(v["margin"]["value"], 0.2);
    }
}

// ============================================================================
// config
// ============================================================================

mod config {
    use super::*;

    #[test]
    fn show_defaults() {
        let v = json_stdout(drbo().args(["config", "show"]));
        assert_eq!(v["config"]["acquisition"], "dr_ucb");
        assert_eq!(v["config"]["grid_density_per_dim"], 20);
        assert!(v["snapshot"]["config_hash"].is_string());
    }

    #[test]
    fn show_md_prints_toml() {
        drbo()
            .args(["-f", "md", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("```toml"))
            .stdout(predicate::str::contains("acquisition = \"dr_ucb\""));
    }

    #[test]
    fn presets_lists_quick() {
        let v = json_stdout(drbo().args(["config", "presets"]));
        let names: Vec<&str> = v["presets"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(names.contains(&"quick"));
    }

    #[test]
    fn validate_good_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exp.toml");
        std::fs::write(&path, "acquisition = \"gp_ucb\"\nnum_bo_iters = 5\n").unwrap();
        let v = json_stdout(drbo().args(["config", "validate"]).arg(&path));
        assert_eq!(v["status"], "valid");
    }

    #[test]
    fn validate_bad_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("exp.toml");
        std::fs::write(&path, "grid_density_per_dim = 0\n").unwrap();
        drbo()
            .args(["config", "validate"])
            .arg(&path)
            .assert()
            .code(11)
            .stderr(predicate::str::contains("grid_density_per_dim"));
    }

    #[test]
    fn unknown_key_is_rejected() {
        drbo()
            .args(["config", "show", "--set", "no_such_key=1"])
            .assert()
            .code(11);
    }

    #[test]
    fn schema_is_json_schema() {
        let v = json_stdout(drbo().args(["config", "schema"]));
        assert!(v["properties"]["acquisition"].is_object());
    }
}

// ============================================================================
// runs
// ============================================================================

mod runs {
    use super::*;

    #[test]
    fn list_then_show() {
        let dir = TempDir::new().unwrap();
        let run = json_stdout(
            drbo()
                .args(["-q", "run", "--runs-dir"])
                .arg(dir.path())
                .args(SMALL),
        );
        let run_id = run["run_id"].as_str().unwrap();

        let list = json_stdout(drbo().args(["runs", "list", "--runs-dir"]).arg(dir.path()));
        let runs = list["runs"].as_array().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0]["run_id"], run_id);

        let show = json_stdout(
            drbo()
                .args(["runs", "show", run_id, "--runs-dir"])
                .arg(dir.path()),
        );
        assert_eq!(show["manifest"]["run_id"], run_id);
        assert_eq!(show["manifest"]["num_points"], 5);
        assert_eq!(show["regret"]["simple"], run["regret"]["simple"]);
    }

    #[test]
    fn runs_dir_from_env() {
        let dir = TempDir::new().unwrap();
        let v = json_stdout(
            drbo()
                .env("DRBO_RUNS_DIR", dir.path())
                .args(["runs", "list"]),
        );
        assert_eq!(v["runs"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn show_missing_run() {
        let dir = TempDir::new().unwrap();
        drbo()
            .args(["runs", "show", "drbo-20260101-000000-abcd", "--runs-dir"])
            .arg(dir.path())
            .assert()
            .code(12)
            .stderr(predicate::str::contains("drbo-20260101-000000-abcd"));
    }
}

// ============================================================================
// errors and misc
// ============================================================================

mod misc {
    use super::*;

    #[test]
    fn unknown_preset_is_args_error() {
        drbo()
            .args(["config", "show", "--preset", "nope"])
            .assert()
            .code(10)
            .stderr(predicate::str::contains("nope"));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        drbo()
            .args(["config", "show", "--config", "/nonexistent/drbo.toml"])
            .assert()
            .code(11);
    }

    #[test]
    fn unknown_command_fails() {
        drbo()
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }

    #[test]
    fn version_json() {
        let v = json_stdout(drbo().arg("version"));
        assert_eq!(v["drbo_version"], env!("CARGO_PKG_VERSION"));
    }
}
