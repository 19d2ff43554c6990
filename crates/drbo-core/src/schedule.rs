//! Per-iteration context distributions and margins.
//!
//! Schedules are queried lazily, once per iteration, so a shifting
//! environment or a decaying margin only needs a different schedule.
//! Closures `Fn(usize) -> …` are schedules too.

use drbo_common::{Error, Result};
use drbo_math::DiscreteDistribution;

/// Iteration index → distribution over the context grid.
pub trait ContextSchedule {
    fn distribution(&self, iteration: usize) -> Result<DiscreteDistribution>;
}

/// Iteration index → radius of the MMD ball.
pub trait MarginSchedule {
    fn margin(&self, iteration: usize) -> f64;
}

impl<F> ContextSchedule for F
where
    F: Fn(usize) -> Result<DiscreteDistribution>,
{
    fn distribution(&self, iteration: usize) -> Result<DiscreteDistribution> {
        self(iteration)
    }
}

impl<F> MarginSchedule for F
where
    F: Fn(usize) -> f64,
{
    fn margin(&self, iteration: usize) -> f64 {
        self(iteration)
    }
}

/// The same distribution at every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantContext(DiscreteDistribution);

impl ConstantContext {
    pub fn new(distribution: DiscreteDistribution) -> Self {
        Self(distribution)
    }

    pub fn get(&self) -> &DiscreteDistribution {
        &self.0
    }
}

impl ContextSchedule for ConstantContext {
    fn distribution(&self, _iteration: usize) -> Result<DiscreteDistribution> {
        Ok(self.0.clone())
    }
}

/// The same margin at every iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantMargin(f64);

impl ConstantMargin {
    pub fn new(margin: f64) -> Result<Self> {
        if !(margin.is_finite() && margin >= 0.0) {
            return Err(Error::InvalidRange(format!(
                "margin must be finite and non-negative, got {margin}"
            )));
        }
        Ok(Self(margin))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl MarginSchedule for ConstantMargin {
    fn margin(&self, _iteration: usize) -> f64 {
        self.0
    }
}

/// Fetch and validate the margin for `iteration`.
pub fn checked_margin(schedule: &dyn MarginSchedule, iteration: usize) -> Result<f64> {
    let margin = schedule.margin(iteration);
    if !(margin.is_finite() && margin >= 0.0) {
        return Err(Error::InvalidRange(format!(
            "margin schedule returned {margin} at iteration {iteration}"
        )));
    }
    Ok(margin)
}
