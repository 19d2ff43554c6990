//! The sequential robust BO loop.
//!
//! One query per iteration: the acquisition picks an action, the context is
//! drawn from the true distribution of that iteration, the observer returns
//! a noisy value, and the surrogate is refit on the grown dataset.

use drbo_common::{Error, Result};
use drbo_math::{Gram, SearchSpace};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::acquisition::{AcquisitionInputs, BetaSchedule, RobustAcquisition};
use crate::dataset::Dataset;
use crate::logging::event_names;
use crate::model::{FitReport, GprModel, HyperParams};
use crate::objective::Objective;
use crate::observer::NoisyObserver;
use crate::schedule::{checked_margin, ContextSchedule, MarginSchedule};

/// Where the loop reads its per-iteration distributions and margins.
#[derive(Clone, Copy)]
pub struct LoopSchedules<'a> {
    pub reference: &'a dyn ContextSchedule,
    pub truth: &'a dyn ContextSchedule,
    pub margin: &'a dyn MarginSchedule,
}

/// What happened in one iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: usize,
    pub action_index: usize,
    pub action: f64,
    pub context_index: usize,
    pub context: f64,
    pub observation: f64,
    pub score: f64,
    pub nominal: f64,
    pub lower_bound: f64,
    /// Largest solver gap over all actions this iteration.
    pub max_gap: f64,
    pub margin: f64,
    pub beta: f64,
    pub fit: FitReport,
}

/// Result of a completed loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopOutcome {
    pub dataset: Dataset,
    pub hyperparameters: HyperParams,
    pub iterations: Vec<IterationRecord>,
}

impl LoopOutcome {
    pub fn convergence_warnings(&self) -> usize {
        self.iterations
            .iter()
            .filter(|r| r.fit.warning.is_some())
            .count()
    }
}

/// A configured loop over a fixed search space.
pub struct RobustBOLoop<'a> {
    space: &'a SearchSpace,
    gram: &'a Gram,
    schedules: LoopSchedules<'a>,
    acquisition: RobustAcquisition,
    beta: BetaSchedule,
    num_iters: usize,
    optimize_gp: bool,
}

impl<'a> RobustBOLoop<'a> {
    /// `gram` is the kernel matrix on the context grid of `space`.
    pub fn new(
        space: &'a SearchSpace,
        gram: &'a Gram,
        schedules: LoopSchedules<'a>,
        acquisition: RobustAcquisition,
    ) -> Self {
        Self {
            space,
            gram,
            schedules,
            acquisition,
            beta: BetaSchedule::default(),
            num_iters: 0,
            optimize_gp: false,
        }
    }

    pub fn with_beta(mut self, beta: BetaSchedule) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_iterations(mut self, num_iters: usize) -> Self {
        self.num_iters = num_iters;
        self
    }

    pub fn with_gp_optimization(mut self, optimize_gp: bool) -> Self {
        self.optimize_gp = optimize_gp;
        self
    }

    /// Run `num_iters` iterations starting from `initial`.
    ///
    /// The model is fitted on `initial` first. `env_rng` draws contexts;
    /// `acq_rng` feeds sample-based acquisitions. Any error aborts the run.
    pub fn run<O, E, T>(
        &self,
        model: &mut GprModel,
        initial: Dataset,
        observer: &mut NoisyObserver<'_, O>,
        env_rng: &mut E,
        acq_rng: &mut T,
    ) -> Result<LoopOutcome>
    where
        O: Objective + ?Sized,
        E: Rng + ?Sized,
        T: Rng + ?Sized,
    {
        let mut dataset = initial;
        model.refit(&dataset, self.optimize_gp)?;

        let n_ctx = self.space.context_grid().len();
        let contexts = self.space.context_grid().points();
        let mut iterations = Vec::with_capacity(self.num_iters);

        for t in 0..self.num_iters {
            let reference = self.schedules.reference.distribution(t)?;
            let truth = self.schedules.truth.distribution(t)?;
            if truth.len() != n_ctx {
                return Err(Error::shape("true context distribution", n_ctx, truth.len()));
            }
            let margin = checked_margin(self.schedules.margin, t)?;
            let beta = self.beta.beta(t + 1, self.space.len());

            let inputs = AcquisitionInputs {
                space: self.space,
                gram: self.gram,
                reference: &reference,
                margin,
                beta,
            };
            let selected = self.acquisition.select_next_action(model, &inputs, acq_rng)?;

            let sampler = WeightedIndex::new(truth.weights())
                .map_err(|e| Error::InvalidDistribution(format!("true distribution: {e}")))?;
            let context_index = sampler.sample(env_rng);
            let chosen = &selected.chosen;
            let point = vec![chosen.action, contexts[context_index]];

            let observed = observer.observe(std::slice::from_ref(&point))?;
            let observation = observed.observations()[0];
            dataset.extend(observed)?;
            let fit = model.refit(&dataset, self.optimize_gp)?;

            info!(
                target: event_names::BO_ITERATION,
                iteration = t,
                action = chosen.action,
                context = contexts[context_index],
                observation,
                score = chosen.score,
                margin,
                beta,
                "iteration complete"
            );
            debug!(
                target: event_names::GP_REFIT,
                iteration = t,
                num_points = fit.num_points,
                log_marginal_likelihood = fit.log_marginal_likelihood,
                optimized = fit.optimized,
                "surrogate refit"
            );

            iterations.push(IterationRecord {
                iteration: t,
                action_index: chosen.action_index,
                action: chosen.action,
                context_index,
                context: contexts[context_index],
                observation,
                score: chosen.score,
                nominal: chosen.nominal,
                lower_bound: chosen.lower_bound,
                max_gap: selected.max_gap,
                margin,
                beta,
                fit,
            });
        }

        Ok(LoopOutcome {
            hyperparameters: model.hyperparameters().clone(),
            dataset,
            iterations,
        })
    }
}
