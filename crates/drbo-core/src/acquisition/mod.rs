//! Robustness-aware acquisition over the action grid.
//!
//! Each acquisition builds a payoff surface `u(a, c)` over the search space
//! and scores an action by an expectation of `u(a, ·)` over contexts:
//!
//! | Kind          | Surface                      | Expectation                    |
//! |---------------|------------------------------|--------------------------------|
//! | `GpUcb`       | `μ + β_t σ`                  | under the reference            |
//! | `DrUcb`       | `μ + β_t σ`                  | worst case over the MMD ball   |
//! | `DrThompson`  | one joint posterior sample   | worst case over the MMD ball   |
//!
//! The next action is the argmax of the score, ties going to the lowest
//! index.

pub mod beta;

pub use beta::BetaSchedule;

use drbo_common::{Error, Result};
use drbo_config::AcquisitionName;
use drbo_math::{worst_case_expectation, DiscreteDistribution, Gram, SearchSpace, SolverOptions};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::GprModel;

/// Acquisition functions a run can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionKind {
    /// Non-robust baseline: expected UCB under the reference distribution.
    GpUcb,
    /// Worst-case expected UCB over the MMD ball.
    #[default]
    DrUcb,
    /// Worst-case expectation of a joint posterior sample.
    DrThompson,
}

impl From<AcquisitionName> for AcquisitionKind {
    fn from(name: AcquisitionName) -> Self {
        match name {
            AcquisitionName::GpUcb => AcquisitionKind::GpUcb,
            AcquisitionName::DrUcb => AcquisitionKind::DrUcb,
            AcquisitionName::DrThompson => AcquisitionKind::DrThompson,
        }
    }
}

impl AcquisitionKind {
    pub fn is_robust(&self) -> bool {
        !matches!(self, AcquisitionKind::GpUcb)
    }

    fn uses_sample(&self) -> bool {
        matches!(self, AcquisitionKind::DrThompson)
    }
}

/// Everything an acquisition reads besides the model.
#[derive(Debug, Clone, Copy)]
pub struct AcquisitionInputs<'a> {
    pub space: &'a SearchSpace,
    /// Kernel matrix on the context grid, defining the MMD ball.
    pub gram: &'a Gram,
    pub reference: &'a DiscreteDistribution,
    pub margin: f64,
    pub beta: f64,
}

/// Score of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionScore {
    pub action_index: usize,
    pub action: f64,
    /// Acquisition value; for robust kinds a feasible worst-case value.
    pub score: f64,
    /// Expectation under the reference distribution.
    pub nominal: f64,
    /// Certified lower bound on the exact worst case (equals `score` when exact).
    pub lower_bound: f64,
    /// Distribution attaining `score`.
    pub witness: Vec<f64>,
}

/// Outcome of one acquisition step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionResult {
    pub chosen: ActionScore,
    /// Score of every action, by action index.
    pub scores: Vec<f64>,
    /// Largest `score − lower_bound` over actions.
    pub max_gap: f64,
}

/// A configured acquisition function.
#[derive(Debug, Clone, Default)]
pub struct RobustAcquisition {
    kind: AcquisitionKind,
    solver: SolverOptions,
}

impl RobustAcquisition {
    pub fn new(kind: AcquisitionKind) -> Self {
        Self {
            kind,
            solver: SolverOptions::default(),
        }
    }

    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    pub fn kind(&self) -> AcquisitionKind {
        self.kind
    }

    /// Score a single action.
    pub fn score<R: Rng + ?Sized>(
        &self,
        action_index: usize,
        model: &GprModel,
        inputs: &AcquisitionInputs<'_>,
        rng: &mut R,
    ) -> Result<ActionScore> {
        let n_actions = inputs.space.action_grid().len();
        if action_index >= n_actions {
            return Err(Error::shape("acquisition action index", n_actions, action_index));
        }
        check_inputs(inputs)?;
        let rows = inputs.space.action_rows(action_index);
        let payoff = self.surface(model, &rows, inputs.beta, rng)?;
        self.score_payoff(action_index, &payoff, inputs)
    }

    /// Score every action and pick the best.
    ///
    /// Reads the model and distributions only; `rng` is touched by
    /// sample-based kinds alone.
    pub fn select_next_action<R: Rng + ?Sized>(
        &self,
        model: &GprModel,
        inputs: &AcquisitionInputs<'_>,
        rng: &mut R,
    ) -> Result<AcquisitionResult> {
        check_inputs(inputs)?;
        let space = inputs.space;
        let surface = self.surface(model, &space.rows(), inputs.beta, rng)?;

        let mut best: Option<ActionScore> = None;
        let mut scores = Vec::with_capacity(space.action_grid().len());
        let mut max_gap = 0.0_f64;
        for a in 0..space.action_grid().len() {
            let scored = self.score_payoff(a, &surface[space.context_slice(a)], inputs)?;
            scores.push(scored.score);
            max_gap = max_gap.max(scored.score - scored.lower_bound);
            match &best {
                Some(b) if scored.score <= b.score => {}
                _ => best = Some(scored),
            }
        }

        let chosen = best.ok_or_else(|| {
            Error::InvalidRange("acquisition over an empty action grid".to_string())
        })?;
        Ok(AcquisitionResult {
            chosen,
            scores,
            max_gap,
        })
    }

    /// Payoff at each row: UCB, or one joint posterior draw.
    fn surface<R: Rng + ?Sized>(
        &self,
        model: &GprModel,
        rows: &[Vec<f64>],
        beta: f64,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        if self.kind.uses_sample() {
            return model.posterior_sample(rows, rng);
        }
        Ok(model
            .predict(rows)?
            .into_iter()
            .map(|p| p.mean + beta * p.variance.sqrt())
            .collect())
    }

    fn score_payoff(
        &self,
        action_index: usize,
        payoff: &[f64],
        inputs: &AcquisitionInputs<'_>,
    ) -> Result<ActionScore> {
        let action = inputs.space.action_grid().points()[action_index];
        if !self.kind.is_robust() {
            let nominal = inputs.reference.expectation(payoff)?;
            return Ok(ActionScore {
                action_index,
                action,
                score: nominal,
                nominal,
                lower_bound: nominal,
                witness: inputs.reference.weights().to_vec(),
            });
        }
        let wc = worst_case_expectation(
            payoff,
            inputs.reference,
            inputs.gram,
            inputs.margin,
            &self.solver,
        )?;
        Ok(ActionScore {
            action_index,
            action,
            score: wc.value,
            nominal: wc.nominal,
            lower_bound: wc.lower_bound,
            witness: wc.witness,
        })
    }
}

fn check_inputs(inputs: &AcquisitionInputs<'_>) -> Result<()> {
    let n_ctx = inputs.space.context_grid().len();
    if inputs.reference.len() != n_ctx {
        return Err(Error::shape(
            "acquisition reference distribution",
            n_ctx,
            inputs.reference.len(),
        ));
    }
    if inputs.gram.dim() != n_ctx {
        return Err(Error::shape("acquisition gram", n_ctx, inputs.gram.dim()));
    }
    if !(inputs.beta.is_finite() && inputs.beta >= 0.0) {
        return Err(Error::InvalidRange(format!(
            "beta must be finite and >= 0, got {}",
            inputs.beta
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;
    use drbo_math::{cartesian, discrete_normal, make_grid, SquaredExponential};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    struct Fixture {
        space: SearchSpace,
        gram: Gram,
        reference: DiscreteDistribution,
    }

    fn fixture() -> Fixture {
        let action = make_grid(0.0, 1.0, 6).unwrap();
        let context = make_grid(0.0, 1.0, 8).unwrap();
        let space = cartesian(&action, &context);
        let gram = SquaredExponential::isotropic(0.1, 1)
            .unwrap()
            .gram_1d(context.points());
        let reference = discrete_normal(context.points(), 0.5, 0.05).unwrap();
        Fixture {
            space,
            gram,
            reference,
        }
    }

    fn inputs(f: &Fixture, margin: f64) -> AcquisitionInputs<'_> {
        AcquisitionInputs {
            space: &f.space,
            gram: &f.gram,
            reference: &f.reference,
            margin,
            beta: 2.0,
        }
    }

    fn model() -> GprModel {
        let data = Dataset::new(
            vec![vec![0.2, 0.5], vec![0.8, 0.4], vec![0.6, 0.9]],
            vec![0.5, 1.2, -0.3],
        )
        .unwrap();
        let kernel = SquaredExponential::isotropic(0.2, 2).unwrap();
        GprModel::new(2, kernel, 1e-3, &data, 10).unwrap()
    }

    #[test]
    fn test_prior_model_ties_pick_first_action() {
        let f = fixture();
        let kernel = SquaredExponential::isotropic(0.2, 2).unwrap();
        let m = GprModel::new(2, kernel, 1e-3, &Dataset::empty(), 10).unwrap();
        let acq = RobustAcquisition::new(AcquisitionKind::GpUcb);
        let r = acq
            .select_next_action(&m, &inputs(&f, 0.0), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert_eq!(r.chosen.action_index, 0);
        assert!(r.scores.iter().all(|s| (s - 2.0).abs() < 1e-12));
    }

    #[test]
    fn test_zero_margin_robust_equals_nominal() {
        let f = fixture();
        let m = model();
        let mut rng = StdRng::seed_from_u64(0);
        let robust = RobustAcquisition::new(AcquisitionKind::DrUcb)
            .select_next_action(&m, &inputs(&f, 0.0), &mut rng)
            .unwrap();
        let nominal = RobustAcquisition::new(AcquisitionKind::GpUcb)
            .select_next_action(&m, &inputs(&f, 0.0), &mut rng)
            .unwrap();
        for (a, b) in robust.scores.iter().zip(&nominal.scores) {
            assert!((a - b).abs() < 1e-9);
        }
        assert_eq!(robust.chosen.action_index, nominal.chosen.action_index);
    }

    #[test]
    fn test_robust_score_below_nominal() {
        let f = fixture();
        let m = model();
        let r = RobustAcquisition::new(AcquisitionKind::DrUcb)
            .select_next_action(&m, &inputs(&f, 0.05), &mut StdRng::seed_from_u64(0))
            .unwrap();
        assert!(r.chosen.score <= r.chosen.nominal + 1e-12);
        assert!(r.chosen.lower_bound <= r.chosen.score + 1e-12);
        let total: f64 = r.chosen.witness.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_matches_select() {
        let f = fixture();
        let m = model();
        let acq = RobustAcquisition::new(AcquisitionKind::DrUcb);
        let mut rng = StdRng::seed_from_u64(0);
        let all = acq.select_next_action(&m, &inputs(&f, 0.05), &mut rng).unwrap();
        let single = acq.score(3, &m, &inputs(&f, 0.05), &mut rng).unwrap();
        assert!((single.score - all.scores[3]).abs() < 1e-9);
        assert_eq!(single.action, f.space.action_grid().points()[3]);
    }

    #[test]
    fn test_chosen_is_argmax() {
        let f = fixture();
        let m = model();
        let r = RobustAcquisition::new(AcquisitionKind::DrUcb)
            .select_next_action(&m, &inputs(&f, 0.02), &mut StdRng::seed_from_u64(0))
            .unwrap();
        let max = r.scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(r.chosen.score, max);
        let first = r.scores.iter().position(|s| *s == max).unwrap();
        assert_eq!(r.chosen.action_index, first);
    }

    #[test]
    fn test_thompson_reproducible_for_seed() {
        let f = fixture();
        let m = model();
        let acq = RobustAcquisition::new(AcquisitionKind::DrThompson);
        let a = acq
            .select_next_action(&m, &inputs(&f, 0.02), &mut StdRng::seed_from_u64(42))
            .unwrap();
        let b = acq
            .select_next_action(&m, &inputs(&f, 0.02), &mut StdRng::seed_from_u64(42))
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shape_checks() {
        let f = fixture();
        let m = model();
        let wrong = DiscreteDistribution::uniform(5).unwrap();
        let bad = AcquisitionInputs {
            reference: &wrong,
            ..inputs(&f, 0.0)
        };
        let err = RobustAcquisition::default()
            .select_next_action(&m, &bad, &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 8, actual: 5, .. }));

        let err = RobustAcquisition::default()
            .score(6, &m, &inputs(&f, 0.0), &mut StdRng::seed_from_u64(0))
            .unwrap_err();
        assert_eq!(err.code(), 11);
    }
}
