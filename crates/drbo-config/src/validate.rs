//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::experiment::{BetaConfig, ExperimentConfig, MarginConfig, NormalSpec};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Schema validation failed: {0}")]
    SchemaError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SchemaError(_) => 62,
            ValidationError::SemanticError(_) => 63,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
        }
    }
}

/// Validate an experiment configuration semantically.
///
/// Returns the first problem found, in field order.
pub fn validate_experiment(config: &ExperimentConfig) -> ValidationResult<()> {
    if config.dims != 2 {
        return Err(ValidationError::InvalidValue {
            field: "dims".to_string(),
            message: format!(
                "Must be 2 (one action, one context dimension), got {}",
                config.dims
            ),
        });
    }
    if config.lowers.len() != config.dims {
        return Err(ValidationError::InvalidValue {
            field: "lowers".to_string(),
            message: format!("Expected {} bounds, got {}", config.dims, config.lowers.len()),
        });
    }
    if config.uppers.len() != config.dims {
        return Err(ValidationError::InvalidValue {
            field: "uppers".to_string(),
            message: format!("Expected {} bounds, got {}", config.dims, config.uppers.len()),
        });
    }
    for (d, (lo, hi)) in config.lowers.iter().zip(&config.uppers).enumerate() {
        if !lo.is_finite() || !hi.is_finite() || hi <= lo {
            return Err(ValidationError::SemanticError(format!(
                "Dimension {} bounds must be finite with lower < upper, got [{}, {}]",
                d, lo, hi
            )));
        }
    }
    if config.grid_density_per_dim < 2 {
        return Err(ValidationError::InvalidValue {
            field: "grid_density_per_dim".to_string(),
            message: format!("Must be at least 2, got {}", config.grid_density_per_dim),
        });
    }
    if config.rand_func_num_points == 0 {
        return Err(ValidationError::InvalidValue {
            field: "rand_func_num_points".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }
    validate_positive("lengthscale", config.lengthscale)?;
    if !config.obs_variance.is_finite() || config.obs_variance < 0.0 {
        return Err(ValidationError::InvalidValue {
            field: "obs_variance".to_string(),
            message: format!("Must be finite and >= 0, got {}", config.obs_variance),
        });
    }
    if config.optimize_gp && config.opt_max_iter == 0 {
        return Err(ValidationError::InvalidValue {
            field: "opt_max_iter".to_string(),
            message: "Must be at least 1 when optimize_gp is set".to_string(),
        });
    }

    match config.beta {
        BetaConfig::Constant { value } => {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidValue {
                    field: "beta.value".to_string(),
                    message: format!("Must be finite and >= 0, got {}", value),
                });
            }
        }
        BetaConfig::Srinivas { delta } => {
            if !(delta > 0.0 && delta < 1.0) {
                return Err(ValidationError::InvalidValue {
                    field: "beta.delta".to_string(),
                    message: format!("Must be in (0, 1), got {}", delta),
                });
            }
        }
    }

    validate_normal("reference", &config.reference)?;
    validate_normal("truth", &config.truth)?;

    if let MarginConfig::Fixed { value } = config.margin {
        if !value.is_finite() || value < 0.0 {
            return Err(ValidationError::InvalidValue {
                field: "margin.value".to_string(),
                message: format!("Must be finite and >= 0, got {}", value),
            });
        }
    }

    Ok(())
}

fn validate_positive(field: &str, value: f64) -> ValidationResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(ValidationError::InvalidValue {
            field: field.to_string(),
            message: format!("Must be finite and > 0, got {}", value),
        });
    }
    Ok(())
}

fn validate_normal(name: &str, spec: &NormalSpec) -> ValidationResult<()> {
    if !spec.mean.is_finite() {
        return Err(ValidationError::InvalidValue {
            field: format!("{}.mean", name),
            message: format!("Must be finite, got {}", spec.mean),
        });
    }
    validate_positive(&format!("{}.variance", name), spec.variance)
}
