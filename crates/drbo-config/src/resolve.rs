//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → preset → environment variables → XDG
//! path → built-in defaults. Overrides apply last.

use std::path::{Path, PathBuf};

use crate::experiment::ExperimentConfig;
use crate::preset::{get_preset, PresetName};
use crate::validate::{validate_experiment, ValidationError, ValidationResult};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to the experiment file (or None if not found).
    pub experiment: Option<PathBuf>,

    /// Source of the experiment config (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Named preset.
    Preset,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Using built-in defaults.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Preset => write!(f, "preset"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "DRBO_CONFIG";
pub const ENV_CONFIG_DIR: &str = "DRBO_CONFIG_DIR";

/// Standard config file name.
const EXPERIMENT_FILENAME: &str = "experiment.toml";

/// Application name for XDG directories.
const APP_NAME: &str = "drbo";

/// Resolve the experiment configuration path.
///
/// Resolution order:
/// 1. Explicit CLI path (if provided and present)
/// 2. DRBO_CONFIG environment variable
/// 3. DRBO_CONFIG_DIR environment variable + experiment.toml
/// 4. XDG config directory (~/.config/drbo/experiment.toml)
/// 5. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPaths {
    // 1. CLI argument
    if let Some(path) = cli_path {
        if path.exists() {
            return ConfigPaths {
                experiment: Some(path.to_path_buf()),
                source: ConfigSource::CliArgument,
            };
        }
    }

    // 2. Environment variable (direct path)
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return ConfigPaths {
                experiment: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    // 3. Environment variable (config dir)
    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(EXPERIMENT_FILENAME);
        if path.exists() {
            return ConfigPaths {
                experiment: Some(path),
                source: ConfigSource::Environment,
            };
        }
    }

    // 4. XDG config directory
    if let Some(dir) = xdg_config_dir() {
        let path = dir.join(EXPERIMENT_FILENAME);
        if path.exists() {
            return ConfigPaths {
                experiment: Some(path),
                source: ConfigSource::XdgConfig,
            };
        }
    }

    // 5. Built-in default (None)
    ConfigPaths::default()
}

/// Get the XDG config directory for drbo.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Inputs to [`load_config`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub path: Option<PathBuf>,
    pub preset: Option<PresetName>,
    /// `key=value` assignments, applied in order.
    pub overrides: Vec<String>,
}

/// A resolved, overridden and validated configuration.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ExperimentConfig,
    pub source: ConfigSource,
    pub path: Option<PathBuf>,
    pub preset: Option<PresetName>,
    pub overrides: Vec<String>,
}

/// Resolve, parse, override and validate the experiment configuration.
///
/// An explicit path that does not exist is an error rather than a silent
/// fall-through.
pub fn load_config(options: &LoadOptions) -> ValidationResult<LoadedConfig> {
    if let Some(path) = options.path.as_deref() {
        if !path.exists() {
            return Err(ValidationError::IoError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    }

    let (base, source, path) = match (options.path.as_deref(), options.preset) {
        (Some(path), _) => (
            ExperimentConfig::from_file(path)?,
            ConfigSource::CliArgument,
            Some(path.to_path_buf()),
        ),
        (None, Some(preset)) => (get_preset(preset), ConfigSource::Preset, None),
        (None, None) => {
            let paths = resolve_config(None);
            match paths.experiment {
                Some(found) => (ExperimentConfig::from_file(&found)?, paths.source, Some(found)),
                None => (ExperimentConfig::default(), ConfigSource::BuiltinDefault, None),
            }
        }
    };

    let config = base.with_overrides(&options.overrides)?;
    validate_experiment(&config)?;

    Ok(LoadedConfig {
        config,
        source,
        path,
        preset: if options.path.is_none() {
            options.preset
        } else {
            None
        },
        overrides: options.overrides.clone(),
    })
}
