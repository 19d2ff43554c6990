//! Discrete probability distributions over a context grid.

use drbo_common::{Error, Result};
use serde::{Deserialize, Serialize};

use super::stable::{normal_log_pdf, normalize_log_weights};

/// Largest allowed deviation of the raw weight sum from 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Probability mass function over the points of a grid.
///
/// Weights are finite, non-negative and sum to exactly 1 after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct DiscreteDistribution {
    weights: Vec<f64>,
}

impl DiscreteDistribution {
    /// Validate and renormalize a weight vector.
    pub fn new(weights: Vec<f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(Error::InvalidDistribution(
                "distribution needs at least one weight".to_string(),
            ));
        }
        if let Some((i, w)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(Error::InvalidDistribution(format!(
                "weight {i} is {w}; weights must be finite and non-negative"
            )));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::InvalidDistribution(format!(
                "weights sum to {total}, expected 1"
            )));
        }
        let weights = weights.into_iter().map(|w| w / total).collect();
        Ok(Self { weights })
    }

    /// Uniform weights over `n` points.
    pub fn uniform(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(Error::InvalidDistribution(
                "uniform distribution over an empty support".to_string(),
            ));
        }
        Ok(Self {
            weights: vec![1.0 / n as f64; n],
        })
    }

    /// All mass on one point.
    pub fn point_mass(n: usize, index: usize) -> Result<Self> {
        if index >= n {
            return Err(Error::shape("point mass index", n, index));
        }
        let mut weights = vec![0.0; n];
        weights[index] = 1.0;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Expectation of `values` under this distribution.
    pub fn expectation(&self, values: &[f64]) -> Result<f64> {
        if values.len() != self.weights.len() {
            return Err(Error::shape(
                "expectation values",
                self.weights.len(),
                values.len(),
            ));
        }
        Ok(self.weights.iter().zip(values).map(|(w, v)| w * v).sum())
    }

    /// Mean of the support points under this distribution.
    pub fn mean(&self, support: &[f64]) -> Result<f64> {
        self.expectation(support)
    }
}

impl TryFrom<Vec<f64>> for DiscreteDistribution {
    type Error = Error;

    fn try_from(weights: Vec<f64>) -> Result<Self> {
        Self::new(weights)
    }
}

impl From<DiscreteDistribution> for Vec<f64> {
    fn from(d: DiscreteDistribution) -> Self {
        d.weights
    }
}

/// Discretize `N(mean, variance)` onto `support` by normalizing the density.
pub fn discrete_normal(support: &[f64], mean: f64, variance: f64) -> Result<DiscreteDistribution> {
    if support.is_empty() {
        return Err(Error::InvalidDistribution(
            "cannot discretize onto an empty support".to_string(),
        ));
    }
    if !mean.is_finite() {
        return Err(Error::InvalidDistribution(format!(
            "normal mean must be finite, got {mean}"
        )));
    }
    if !(variance.is_finite() && variance > 0.0) {
        return Err(Error::InvalidDistribution(format!(
            "normal variance must be positive, got {variance}"
        )));
    }
    let log_weights: Vec<f64> = support
        .iter()
        .map(|&x| normal_log_pdf(x, mean, variance))
        .collect();
    let weights = normalize_log_weights(&log_weights).ok_or_else(|| {
        Error::NumericalInstability(format!(
            "normal({mean}, {variance}) has no mass on the support"
        ))
    })?;
    Ok(DiscreteDistribution { weights })
}
