//! Robust regret of a finished run.
//!
//! For query `t` with action `a_t`:
//!
//! ```text
//! W_t(a) = min_{w ∈ Δ, MMD(w, p_t) ≤ ε_t} Σ_c w_c f(a, c)
//! r_t    = max_a W_t(a) − W_t(a_t)
//! ```
//!
//! `f` is the noiseless objective, `p_t` the reference and `ε_t` the margin
//! of the loop iteration that produced the query; the initial design is
//! scored with the iteration-0 schedules. Actions are snapped to the nearest
//! grid action.

use drbo_common::{Error, Result};
use drbo_math::{
    cartesian, worst_case_expectation, DiscreteDistribution, Grid, SolverOptions,
    SquaredExponential,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::logging::event_names;
use crate::objective::Objective;
use crate::schedule::{checked_margin, ContextSchedule, MarginSchedule};

/// Regret per query, in query order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegretCurve {
    pub instantaneous: Vec<f64>,
    /// Running minimum of `instantaneous`.
    pub simple: Vec<f64>,
    /// Running sum of `instantaneous`.
    pub cumulative: Vec<f64>,
    /// `max_a W_t(a)` per query.
    pub robust_optimum: Vec<f64>,
    /// Grid index of the action each query was snapped to.
    pub action_indices: Vec<usize>,
}

impl RegretCurve {
    pub fn len(&self) -> usize {
        self.instantaneous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instantaneous.is_empty()
    }

    pub fn final_simple(&self) -> Option<f64> {
        self.simple.last().copied()
    }

    pub fn final_cumulative(&self) -> Option<f64> {
        self.cumulative.last().copied()
    }
}

/// Robust regret of each query point.
///
/// The first `num_init_points` queries are the initial design; query
/// `num_init_points + t` was chosen in loop iteration `t` and is scored
/// against the schedules at `t`.
///
/// `kernel` is the one-dimensional kernel defining MMD on the context grid.
/// Worst-case values are recomputed only when the reference or the margin
/// changes between queries.
pub fn robust_regret<O: Objective + ?Sized>(
    objective: &O,
    query_points: &[Vec<f64>],
    num_init_points: usize,
    action_grid: &Grid,
    context_grid: &Grid,
    kernel: &SquaredExponential,
    reference: &dyn ContextSchedule,
    margin: &dyn MarginSchedule,
) -> Result<RegretCurve> {
    if objective.dims() != 2 {
        return Err(Error::shape("regret objective dims", 2, objective.dims()));
    }
    if let Some(bad) = query_points.iter().find(|p| p.len() != 2) {
        return Err(Error::shape("regret query point", 2, bad.len()));
    }

    let space = cartesian(action_grid, context_grid);
    let values = objective.evaluate(&space.rows())?;
    let gram = kernel.gram_1d(context_grid.points());
    let solver = SolverOptions::default();

    let mut key: Option<(DiscreteDistribution, f64)> = None;
    let mut worst: Vec<f64> = Vec::with_capacity(action_grid.len());
    let n = query_points.len();
    let mut instantaneous = Vec::with_capacity(n);
    let mut robust_optimum = Vec::with_capacity(n);
    let mut action_indices = Vec::with_capacity(n);

    for (i, point) in query_points.iter().enumerate() {
        let t = i.saturating_sub(num_init_points);
        let p = reference.distribution(t)?;
        if p.len() != context_grid.len() {
            return Err(Error::shape("regret reference distribution", context_grid.len(), p.len()));
        }
        let eps = checked_margin(margin, t)?;

        let stale = key
            .as_ref()
            .map_or(true, |(kp, ke)| *kp != p || *ke != eps);
        if stale {
            worst.clear();
            for a in 0..action_grid.len() {
                let wc = worst_case_expectation(
                    &values[space.context_slice(a)],
                    &p,
                    &gram,
                    eps,
                    &solver,
                )?;
                worst.push(wc.value);
            }
            key = Some((p, eps));
        }

        let best = worst.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let a_t = action_grid.nearest_index(point[0]);
        instantaneous.push((best - worst[a_t]).max(0.0));
        robust_optimum.push(best);
        action_indices.push(a_t);
    }

    let mut simple = Vec::with_capacity(n);
    let mut cumulative = Vec::with_capacity(n);
    let (mut low, mut sum) = (f64::INFINITY, 0.0);
    for r in &instantaneous {
        low = low.min(*r);
        sum += r;
        simple.push(low);
        cumulative.push(sum);
    }

    info!(
        target: event_names::REGRET_COMPUTED,
        num_queries = n,
        simple_regret = simple.last().copied().unwrap_or(f64::NAN),
        cumulative_regret = sum,
        "robust regret computed"
    );

    Ok(RegretCurve {
        instantaneous,
        simple,
        cumulative,
        robust_optimum,
        action_indices,
    })
}
