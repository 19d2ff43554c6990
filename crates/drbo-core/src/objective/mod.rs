//! Black-box objectives over `[action, context]` points.
//!
//! The loop only sees the [`Objective`] trait. Which concrete function runs
//! is decided once from configuration via [`ObjectiveKind`].

pub mod branin;
pub mod rand_func;

pub use branin::Branin;
pub use rand_func::RandFunc;

use drbo_common::{Error, Result};
use drbo_config::{ExperimentConfig, ObjectiveName};
use drbo_math::SquaredExponential;

/// A deterministic function to maximize.
pub trait Objective {
    /// Coordinates per point.
    fn dims(&self) -> usize;

    /// Evaluate every point. Fails with `ShapeMismatch` on wrong arity.
    fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>>;

    fn name(&self) -> &str;
}

/// Reject points whose length differs from `dims`.
pub(crate) fn check_points(context: &str, dims: usize, points: &[Vec<f64>]) -> Result<()> {
    match points.iter().find(|p| p.len() != dims) {
        Some(bad) => Err(Error::shape(context, dims, bad.len())),
        None => Ok(()),
    }
}

/// The objectives a run can be configured with.
#[derive(Debug, Clone)]
pub enum ObjectiveKind {
    RandFunc(RandFunc),
    Branin(Branin),
}

impl ObjectiveKind {
    /// Build the objective named in `config`.
    ///
    /// `rand_func` draws its function from a GP prior with the configured
    /// lengthscale, seeded by `config.seed`.
    pub fn from_config(config: &ExperimentConfig) -> Result<Self> {
        match config.objective {
            ObjectiveName::RandFunc => {
                let kernel = SquaredExponential::isotropic(config.lengthscale, config.dims)?;
                Ok(ObjectiveKind::RandFunc(RandFunc::new(
                    kernel,
                    &config.lowers,
                    &config.uppers,
                    config.rand_func_num_points,
                    config.seed,
                )?))
            }
            ObjectiveName::Branin => Ok(ObjectiveKind::Branin(Branin::new(
                &config.lowers,
                &config.uppers,
            )?)),
        }
    }
}

impl Objective for ObjectiveKind {
    fn dims(&self) -> usize {
        match self {
            ObjectiveKind::RandFunc(f) => f.dims(),
            ObjectiveKind::Branin(f) => f.dims(),
        }
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        match self {
            ObjectiveKind::RandFunc(f) => f.evaluate(points),
            ObjectiveKind::Branin(f) => f.evaluate(points),
        }
    }

    fn name(&self) -> &str {
        match self {
            ObjectiveKind::RandFunc(f) => f.name(),
            ObjectiveKind::Branin(f) => f.name(),
        }
    }
}

/// An objective shifted and scaled to zero mean and unit standard deviation
/// over a reference set of points (the search grid).
#[derive(Debug, Clone)]
pub struct Standardized<O> {
    inner: O,
    mean: f64,
    std: f64,
}

impl<O: Objective> Standardized<O> {
    /// Estimate mean and standard deviation of `inner` on `points`.
    ///
    /// A function that is constant on `points` keeps unit scale.
    pub fn fit(inner: O, points: &[Vec<f64>]) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::InvalidRange(
                "cannot standardize an objective on zero points".to_string(),
            ));
        }
        let values = inner.evaluate(points)?;
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std = if var.sqrt() > f64::EPSILON { var.sqrt() } else { 1.0 };
        Ok(Self { inner, mean, std })
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: Objective> Objective for Standardized<O> {
    fn dims(&self) -> usize {
        self.inner.dims()
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(self
            .inner
            .evaluate(points)?
            .into_iter()
            .map(|v| (v - self.mean) / self.std)
            .collect())
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
