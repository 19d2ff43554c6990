//! drbo - distributionally robust Bayesian optimization experiments
//!
//! The entry point handles:
//! - running an experiment and storing it
//! - computing the margin for a config without running
//! - config inspection, presets, validation and schema
//! - listing and showing stored runs

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};
use drbo_common::{Error, OutputFormat, RunId, StructuredError, SCHEMA_VERSION};
use drbo_config::{
    experiment_schema, list_presets, load_config, ConfigSnapshot, LoadOptions, LoadedConfig,
    PresetName, ValidationError,
};
use drbo_core::exit_codes::ExitCode;
use drbo_core::experiment::{compute_margin, run_experiment, ContextSetup, ExperimentReport};
use drbo_core::log_event;
use drbo_core::logging::{
    event_names, get_host_id, init_logging, LogConfig, LogContext, LogFormat, LogLevel, Stage,
};
use drbo_core::runs::{RunHandle, RunStore};
use serde::Serialize;

/// Distributionally robust Bayesian optimization
#[derive(Parser)]
#[command(name = "drbo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Experiment config file (TOML or JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Start from a named preset instead of a config file
    #[arg(long, global = true)]
    preset: Option<String>,

    /// Override a config key (repeatable), e.g. --set num_bo_iters=20
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Directory holding stored runs
    #[arg(long, global = true)]
    runs_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "json")]
    format: OutputFormat,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q warnings only, -qq errors only, -qqq silent)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    /// Log format on stderr
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an experiment and store it
    Run(RunArgs),

    /// Compute the margin for the resolved config without running
    Margin,

    /// Configuration management
    Config(ConfigArgs),

    /// Inspect stored runs
    Runs(RunsArgs),

    /// Print version information
    Version,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Do not write the run directory
    #[arg(long)]
    no_save: bool,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// List built-in presets
    Presets,
    /// Validate a config file (or the resolved config)
    Validate {
        /// Path to a config file
        path: Option<PathBuf>,
    },
    /// Print the JSON Schema of the config file
    Schema,
}

#[derive(Args, Debug)]
struct RunsArgs {
    #[command(subcommand)]
    command: RunsCommands,
}

#[derive(Subcommand, Debug)]
enum RunsCommands {
    /// List stored runs, newest first
    List {
        /// Show at most this many runs
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show one stored run
    Show {
        /// Run id, e.g. drbo-20261019-143022-a7xq
        run_id: String,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env(
        LogLevel::from_verbosity(cli.global.verbose, cli.global.quiet),
        cli.global.log_format,
    );
    init_logging(&log_config);

    let exit_code = match cli.command {
        None => run_command(&cli.global, &RunArgs { no_save: false }),
        Some(Commands::Run(args)) => run_command(&cli.global, &args),
        Some(Commands::Margin) => run_margin(&cli.global),
        Some(Commands::Config(args)) => run_config(&cli.global, &args),
        Some(Commands::Runs(args)) => run_runs(&cli.global, &args),
        Some(Commands::Version) => print_version(&cli.global),
    };

    std::process::exit(exit_code.as_i32());
}

// ============================================================================
// Helpers
// ============================================================================

fn load_options(global: &GlobalOpts, path: Option<PathBuf>) -> Result<LoadOptions, ExitCode> {
    let preset = match global.preset.as_deref() {
        Some(name) => match PresetName::from_str(name) {
            Ok(p) => Some(p),
            Err(e) => {
                eprintln!("drbo: {}", e);
                return Err(ExitCode::ArgsError);
            }
        },
        None => None,
    };
    Ok(LoadOptions {
        path: path.or_else(|| global.config.clone()),
        preset,
        overrides: global.overrides.clone(),
    })
}

fn load(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    let options = load_options(global, None)?;
    let loaded = load_config(&options).map_err(|e| output_config_error(global, &e))?;
    tracing::debug!(
        target: event_names::CONFIG_LOADED,
        source = %loaded.source,
        preset = ?loaded.preset.map(|p| p.as_str()),
        overrides = loaded.overrides.len(),
        "config loaded"
    );
    Ok(loaded)
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(s) => {
            println!("{}", s);
            ExitCode::Clean
        }
        Err(e) => {
            tracing::error!(target: event_names::INTERNAL_ERROR, error = %e, "output serialization failed");
            ExitCode::InternalError
        }
    }
}

/// Report a library error on stderr in the requested format.
fn output_error(global: &GlobalOpts, error: &Error) -> ExitCode {
    let exit_code = ExitCode::from(error);
    match global.format {
        OutputFormat::Json => {
            let structured = StructuredError::from(error)
                .with_context("exit_code", exit_code.code_name())
                .with_context("remediation", error.remediation());
            eprintln!("{}", structured.to_json_pretty());
        }
        OutputFormat::Summary => eprintln!("drbo error [{}]: {}", error.code(), error),
        OutputFormat::Md => eprintln!("{}", error.to_human()),
    }
    exit_code
}

fn output_config_error(global: &GlobalOpts, error: &ValidationError) -> ExitCode {
    let exit_code = ExitCode::from(error);
    let response = serde_json::json!({
        "schema_version": SCHEMA_VERSION,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "status": "error",
        "error": {
            "code": error.code(),
            "category": "config",
            "message": error.to_string(),
        }
    });

    match global.format {
        OutputFormat::Json => match serde_json::to_string_pretty(&response) {
            Ok(s) => eprintln!("{}", s),
            Err(_) => eprintln!("config error: {}", error),
        },
        OutputFormat::Summary => eprintln!("config error: {}", error),
        OutputFormat::Md => {
            eprintln!("# Configuration Error");
            eprintln!();
            eprintln!("Error: {}", error);
        }
    }
    exit_code
}

// ============================================================================
// run
// ============================================================================

fn run_command(global: &GlobalOpts, args: &RunArgs) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let snapshot = ConfigSnapshot::new(&loaded);
    let config = &loaded.config;

    let run_id = RunId::new();
    let ctx = LogContext::new(run_id.as_str(), get_host_id());
    let _span = ctx.span().entered();
    log_event!(
        ctx,
        INFO,
        event_names::RUN_STARTED,
        Stage::Init,
        "run started",
        acquisition = config.acquisition.as_str(),
        objective = config.objective.as_str(),
        num_bo_iters = config.num_bo_iters,
        config_hash = snapshot.short_id()
    );

    let report = match run_experiment(config) {
        Ok(r) => r,
        Err(e) => {
            log_event!(
                ctx,
                ERROR,
                event_names::RUN_FINISHED,
                Stage::Optimize,
                "run failed",
                error = tracing::field::display(&e)
            );
            return output_error(global, &e);
        }
    };

    let stored = if args.no_save {
        None
    } else {
        let store = RunStore::resolve(global.runs_dir.as_deref());
        match store.persist(&run_id, config, &snapshot, &report) {
            Ok(handle) => Some(handle),
            Err(e) => return output_error(global, &e),
        }
    };

    log_event!(
        ctx,
        INFO,
        event_names::RUN_FINISHED,
        Stage::Persist,
        "run finished",
        num_points = report.outcome.dataset.len(),
        convergence_warnings = report.outcome.convergence_warnings()
    );

    output_run(global, &run_id, &snapshot, &report, stored.as_ref())
}

fn output_run(
    global: &GlobalOpts,
    run_id: &RunId,
    snapshot: &ConfigSnapshot,
    report: &ExperimentReport,
    stored: Option<&RunHandle>,
) -> ExitCode {
    let best = report.best_observation();
    match global.format {
        OutputFormat::Json => {
            let response = serde_json::json!({
                "schema_version": SCHEMA_VERSION,
                "run_id": run_id,
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "config_hash": snapshot.config_hash,
                "acquisition": report.acquisition,
                "objective": report.objective,
                "objective_scale": report.objective_scale,
                "margin": report.margin,
                "num_init_points": report.num_init_points,
                "num_points": report.outcome.dataset.len(),
                "convergence_warnings": report.outcome.convergence_warnings(),
                "hyperparameters": report.outcome.hyperparameters,
                "best": best.map(|(point, value)| serde_json::json!({
                    "point": point,
                    "observation": value,
                })),
                "regret": {
                    "final_simple": report.regret.final_simple(),
                    "final_cumulative": report.regret.final_cumulative(),
                    "simple": report.regret.simple,
                },
                "query_points": report.outcome.dataset.query_points(),
                "run_dir": stored.map(|h| h.dir.display().to_string()),
            });
            print_json(&response)
        }
        OutputFormat::Summary => {
            println!(
                "[{}] run: {} on {}, {} points, margin {:.4}, simple regret {:.4}",
                run_id,
                snapshot.summary.acquisition,
                report.objective,
                report.outcome.dataset.len(),
                report.margin.value,
                report.regret.final_simple().unwrap_or(f64::NAN)
            );
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# Run {}", run_id);
            println!();
            println!("- Acquisition: {}", snapshot.summary.acquisition);
            println!("- Objective: {}", report.objective);
            println!(
                "- Margin: {:.6} ({:?}, MMD(reference, truth) = {:.6})",
                report.margin.value, report.margin.source, report.margin.mmd
            );
            if let Some((point, value)) = best {
                println!("- Best observation: {:.4} at {:?}", value, point);
            }
            if let Some(h) = stored {
                println!("- Stored in: {}", h.dir.display());
            }
            println!();
            println!("| # | action | context | observation | score | simple regret |");
            println!("|---|--------|---------|-------------|-------|---------------|");
            let offset = report.num_init_points;
            for r in &report.outcome.iterations {
                let regret = report
                    .regret
                    .simple
                    .get(offset + r.iteration)
                    .copied()
                    .unwrap_or(f64::NAN);
                println!(
                    "| {} | {:.4} | {:.4} | {:.4} | {:.4} | {:.4} |",
                    r.iteration, r.action, r.context, r.observation, r.score, regret
                );
            }
            ExitCode::Clean
        }
    }
}

// ============================================================================
// margin
// ============================================================================

fn run_margin(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let config = &loaded.config;
    let computed = ContextSetup::from_config(config)
        .and_then(|setup| compute_margin(config, &setup).map(|m| (setup, m)));
    let (setup, margin) = match computed {
        Ok(v) => v,
        Err(e) => return output_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "margin": margin,
            "context_grid": setup.context_grid.points(),
            "reference": setup.reference.weights(),
            "truth": setup.truth.weights(),
        })),
        OutputFormat::Summary => {
            println!("margin {:.6} ({:?}), mmd {:.6}", margin.value, margin.source, margin.mmd);
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# Margin");
            println!();
            println!("- Value: {:.6}", margin.value);
            println!("- Source: {:?}", margin.source);
            println!("- MMD(reference, truth): {:.6}", margin.mmd);
            ExitCode::Clean
        }
    }
}

// ============================================================================
// config
// ============================================================================

fn run_config(global: &GlobalOpts, args: &ConfigArgs) -> ExitCode {
    match &args.command {
        ConfigCommands::Show => run_config_show(global),
        ConfigCommands::Presets => run_config_presets(global),
        ConfigCommands::Validate { path } => run_config_validate(global, path.clone()),
        ConfigCommands::Schema => print_json(&experiment_schema()),
    }
}

fn run_config_show(global: &GlobalOpts) -> ExitCode {
    let loaded = match load(global) {
        Ok(l) => l,
        Err(code) => return code,
    };
    let snapshot = ConfigSnapshot::new(&loaded);

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "generated_at": chrono::Utc::now().to_rfc3339(),
            "snapshot": snapshot,
            "config": loaded.config,
        })),
        OutputFormat::Summary => {
            println!(
                "config {} from {}: {} on {}, {} iterations",
                snapshot.short_id(),
                snapshot.source,
                snapshot.summary.acquisition,
                snapshot.summary.objective,
                snapshot.summary.num_bo_iters
            );
            ExitCode::Clean
        }
        OutputFormat::Md => match loaded.config.to_toml_string() {
            Ok(toml) => {
                println!("# Configuration ({})", snapshot.source);
                println!();
                println!("```toml");
                print!("{}", toml);
                println!("```");
                ExitCode::Clean
            }
            Err(e) => output_config_error(global, &e),
        },
    }
}

fn run_config_presets(global: &GlobalOpts) -> ExitCode {
    let presets = list_presets();
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "presets": presets,
        })),
        OutputFormat::Summary => {
            let names: Vec<_> = presets.iter().map(|p| p.name.as_str()).collect();
            println!("presets: {}", names.join(", "));
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("| preset | acquisition | objective | iterations | description |");
            println!("|--------|-------------|-----------|------------|-------------|");
            for p in &presets {
                println!(
                    "| {} | {} | {} | {} | {} |",
                    p.name, p.acquisition, p.objective, p.num_bo_iters, p.description
                );
            }
            ExitCode::Clean
        }
    }
}

fn run_config_validate(global: &GlobalOpts, path: Option<PathBuf>) -> ExitCode {
    let options = match load_options(global, path) {
        Ok(o) => o,
        Err(code) => return code,
    };
    match load_config(&options) {
        Ok(loaded) => {
            let snapshot = ConfigSnapshot::new(&loaded);
            match global.format {
                OutputFormat::Json => print_json(&serde_json::json!({
                    "schema_version": SCHEMA_VERSION,
                    "generated_at": chrono::Utc::now().to_rfc3339(),
                    "status": "valid",
                    "source": snapshot.source,
                    "path": snapshot.path,
                    "config_hash": snapshot.config_hash,
                })),
                OutputFormat::Summary => {
                    println!("config validate: OK ({})", snapshot.short_id());
                    ExitCode::Clean
                }
                OutputFormat::Md => {
                    println!("# Configuration Validation");
                    println!();
                    println!("Status: ✓ Valid");
                    match &snapshot.path {
                        Some(p) => println!("Path: {}", p),
                        None => println!("Source: {}", snapshot.source),
                    }
                    ExitCode::Clean
                }
            }
        }
        Err(e) => output_config_error(global, &e),
    }
}

// ============================================================================
// runs
// ============================================================================

fn run_runs(global: &GlobalOpts, args: &RunsArgs) -> ExitCode {
    let store = RunStore::resolve(global.runs_dir.as_deref());
    match &args.command {
        RunsCommands::List { limit } => run_runs_list(global, &store, *limit),
        RunsCommands::Show { run_id } => run_runs_show(global, &store, run_id),
    }
}

fn run_runs_list(global: &GlobalOpts, store: &RunStore, limit: Option<usize>) -> ExitCode {
    let runs = match store.list_runs(limit) {
        Ok(r) => r,
        Err(e) => return output_error(global, &e),
    };
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "runs_dir": store.root().display().to_string(),
            "runs": runs,
        })),
        OutputFormat::Summary => {
            println!("{} runs in {}", runs.len(), store.root().display());
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("| run | created | acquisition | objective | points | simple regret |");
            println!("|-----|---------|-------------|-----------|--------|---------------|");
            for r in &runs {
                println!(
                    "| {} | {} | {} | {} | {} | {} |",
                    r.run_id,
                    r.created_at,
                    r.acquisition,
                    r.objective,
                    r.num_points,
                    r.final_simple_regret
                        .map(|v| format!("{:.4}", v))
                        .unwrap_or_else(|| "-".to_string())
                );
            }
            ExitCode::Clean
        }
    }
}

fn run_runs_show(global: &GlobalOpts, store: &RunStore, run_id: &str) -> ExitCode {
    let loaded = store.open(run_id).and_then(|handle| {
        Ok((
            handle.read_manifest()?,
            handle.read_regret()?,
            handle.read_dataset()?,
        ))
    });
    let (manifest, regret, dataset) = match loaded {
        Ok(v) => v,
        Err(e) => return output_error(global, &e),
    };

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "manifest": manifest,
            "regret": regret,
            "dataset": dataset,
        })),
        OutputFormat::Summary => {
            println!(
                "[{}] {} on {}, {} points, simple regret {}",
                manifest.run_id,
                manifest.acquisition,
                manifest.objective,
                manifest.num_points,
                manifest
                    .final_simple_regret
                    .map(|v| format!("{:.4}", v))
                    .unwrap_or_else(|| "-".to_string())
            );
            ExitCode::Clean
        }
        OutputFormat::Md => {
            println!("# Run {}", manifest.run_id);
            println!();
            println!("- Created: {}", manifest.created_at);
            println!("- Acquisition: {}", manifest.acquisition);
            println!("- Objective: {}", manifest.objective);
            println!("- Margin: {:.6}", manifest.margin.value);
            println!("- Points: {}", manifest.num_points);
            println!();
            println!("| # | action | context | observation | simple regret |");
            println!("|---|--------|---------|-------------|---------------|");
            for (i, (p, y)) in dataset
                .query_points()
                .iter()
                .zip(dataset.observations())
                .enumerate()
            {
                let r = regret.simple.get(i).copied().unwrap_or(f64::NAN);
                println!("| {} | {:.4} | {:.4} | {:.4} | {:.4} |", i, p[0], p[1], y, r);
            }
            ExitCode::Clean
        }
    }
}

// ============================================================================
// version
// ============================================================================

fn print_version(global: &GlobalOpts) -> ExitCode {
    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "drbo_version": env!("CARGO_PKG_VERSION"),
            "rust_version": env!("CARGO_PKG_RUST_VERSION"),
        })),
        _ => {
            println!("drbo {}", env!("CARGO_PKG_VERSION"));
            println!("schema version: {}", SCHEMA_VERSION);
            ExitCode::Clean
        }
    }
}
