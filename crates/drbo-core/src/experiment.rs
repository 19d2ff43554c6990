//! One experiment, end to end, from an [`ExperimentConfig`].
//!
//! Grids, objective, distributions and margin are fixed before the loop;
//! the margin is computed exactly once. The loop then runs for
//! `num_bo_iters` iterations and the whole query history is scored by
//! robust regret.

use drbo_common::{Error, Result};
use drbo_config::{ExperimentConfig, MarginConfig};
use drbo_math::{
    cartesian, discrete_normal, make_grid, mmd, DiscreteDistribution, Gram, Grid, SearchSpace,
    SquaredExponential,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::acquisition::{AcquisitionKind, BetaSchedule, RobustAcquisition};
use crate::dataset::Dataset;
use crate::logging::event_names;
use crate::metrics::{robust_regret, RegretCurve};
use crate::model::GprModel;
use crate::objective::{Objective, ObjectiveKind, Standardized};
use crate::observer::NoisyObserver;
use crate::optimization::{LoopOutcome, LoopSchedules, RobustBOLoop};
use crate::rng::{RngStreams, Stream};
use crate::schedule::{ConstantContext, ConstantMargin};

/// Grids and distributions shared by the loop and the regret metric.
#[derive(Debug, Clone)]
pub struct ContextSetup {
    pub action_grid: Grid,
    pub context_grid: Grid,
    pub space: SearchSpace,
    /// One-dimensional kernel defining MMD on the context grid.
    pub context_kernel: SquaredExponential,
    pub gram: Gram,
    pub reference: DiscreteDistribution,
    pub truth: DiscreteDistribution,
}

impl ContextSetup {
    pub fn from_config(config: &ExperimentConfig) -> Result<Self> {
        if config.dims != 2 || config.lowers.len() != 2 || config.uppers.len() != 2 {
            return Err(Error::Config(format!(
                "experiments need exactly one action and one context dimension, got dims = {} with {} lowers and {} uppers",
                config.dims,
                config.lowers.len(),
                config.uppers.len()
            )));
        }
        let density = config.grid_density_per_dim;
        let action_grid = make_grid(config.lowers[0], config.uppers[0], density)?;
        let context_grid = make_grid(config.lowers[1], config.uppers[1], density)?;
        let space = cartesian(&action_grid, &context_grid);
        let context_kernel = SquaredExponential::isotropic(config.lengthscale, 1)?;
        let gram = context_kernel.gram_1d(context_grid.points());
        let reference = discrete_normal(
            context_grid.points(),
            config.reference.mean,
            config.reference.variance,
        )?;
        let truth = discrete_normal(
            context_grid.points(),
            config.truth.mean,
            config.truth.variance,
        )?;
        Ok(Self {
            action_grid,
            context_grid,
            space,
            context_kernel,
            gram,
            reference,
            truth,
        })
    }
}

/// Where the margin came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarginSource {
    Mmd,
    Fixed,
}

/// The margin used for a run, next to the reference/truth distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginSummary {
    pub value: f64,
    pub source: MarginSource,
    /// `MMD(reference, truth)` on the context grid.
    pub mmd: f64,
}

/// Compute the margin once, before any iteration.
pub fn compute_margin(config: &ExperimentConfig, setup: &ContextSetup) -> Result<MarginSummary> {
    let distance = mmd(
        &setup.reference,
        &setup.truth,
        &setup.context_kernel,
        setup.context_grid.points(),
    )?;
    let (value, source) = match config.margin {
        MarginConfig::Mmd => (distance, MarginSource::Mmd),
        MarginConfig::Fixed { value } => (ConstantMargin::new(value)?.value(), MarginSource::Fixed),
    };
    info!(
        target: event_names::MARGIN_COMPUTED,
        margin = value,
        mmd = distance,
        source = ?source,
        "margin fixed for the run"
    );
    Ok(MarginSummary {
        value,
        source,
        mmd: distance,
    })
}

/// Shift and scale applied to the objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveScale {
    pub mean: f64,
    pub std: f64,
}

/// Everything a finished experiment produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub acquisition: AcquisitionKind,
    pub objective: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective_scale: Option<ObjectiveScale>,
    pub margin: MarginSummary,
    /// The first `num_init_points` rows of the dataset are the initial design.
    pub num_init_points: usize,
    pub outcome: LoopOutcome,
    pub regret: RegretCurve,
}

impl ExperimentReport {
    /// Best noisy observation and where it was taken.
    pub fn best_observation(&self) -> Option<(&[f64], f64)> {
        let data = &self.outcome.dataset;
        data.best_index()
            .map(|i| (data.query_points()[i].as_slice(), data.observations()[i]))
    }
}

/// Run one experiment.
pub fn run_experiment(config: &ExperimentConfig) -> Result<ExperimentReport> {
    let setup = ContextSetup::from_config(config)?;
    let rows = setup.space.rows();

    let kind = ObjectiveKind::from_config(config)?;
    let name = kind.name().to_string();
    let (objective, objective_scale) = if config.standardize_objective {
        let standardized = Standardized::fit(kind, &rows)?;
        let scale = ObjectiveScale {
            mean: standardized.mean(),
            std: standardized.std(),
        };
        (Box::new(standardized) as Box<dyn Objective>, Some(scale))
    } else {
        (Box::new(kind) as Box<dyn Objective>, None)
    };

    let margin = compute_margin(config, &setup)?;

    let streams = RngStreams::new(config.sampling_seed);
    let mut env_rng = streams.stream(Stream::Environment);
    let mut acq_rng = streams.stream(Stream::Thompson);
    let mut observer = NoisyObserver::new(
        objective.as_ref(),
        config.obs_variance,
        streams.stream(Stream::Observer),
    )?;

    // Initial design: grid points drawn with replacement
    let initial_points: Vec<Vec<f64>> = (0..config.num_init_points)
        .map(|_| rows[env_rng.random_range(0..rows.len())].clone())
        .collect();
    let initial = observer.observe(&initial_points)?;

    let surrogate_kernel = SquaredExponential::isotropic(config.lengthscale, config.dims)?;
    let mut model = GprModel::new(
        config.dims,
        surrogate_kernel,
        config.obs_variance,
        &Dataset::empty(),
        config.opt_max_iter,
    )?;

    let reference = ConstantContext::new(setup.reference.clone());
    let truth = ConstantContext::new(setup.truth.clone());
    let margin_schedule = ConstantMargin::new(margin.value)?;
    let schedules = LoopSchedules {
        reference: &reference,
        truth: &truth,
        margin: &margin_schedule,
    };
    let acquisition = AcquisitionKind::from(config.acquisition);
    let bo = RobustBOLoop::new(
        &setup.space,
        &setup.gram,
        schedules,
        RobustAcquisition::new(acquisition),
    )
    .with_beta(BetaSchedule::from(&config.beta))
    .with_iterations(config.num_bo_iters)
    .with_gp_optimization(config.optimize_gp);

    let outcome = bo.run(&mut model, initial, &mut observer, &mut env_rng, &mut acq_rng)?;

    let regret = robust_regret(
        objective.as_ref(),
        outcome.dataset.query_points(),
        config.num_init_points,
        &setup.action_grid,
        &setup.context_grid,
        &setup.context_kernel,
        &reference,
        &margin_schedule,
    )?;

    Ok(ExperimentReport {
        acquisition,
        objective: name,
        objective_scale,
        margin,
        num_init_points: config.num_init_points,
        outcome,
        regret,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use drbo_config::{AcquisitionName, ObjectiveName};

    fn small() -> ExperimentConfig {
        ExperimentConfig {
            grid_density_per_dim: 8,
            rand_func_num_points: 20,
            lengthscale: 0.2,
            num_bo_iters: 3,
            num_init_points: 2,
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_setup_shapes() {
        let setup = ContextSetup::from_config(&small()).unwrap();
        assert_eq!(setup.space.len(), 64);
        assert_eq!(setup.reference.len(), 8);
        assert_eq!(setup.gram.dim(), 8);
    }

    #[test]
    fn test_setup_rejects_three_dims() {
        let config = ExperimentConfig {
            dims: 3,
            lowers: vec![0.0; 3],
            uppers: vec![1.0; 3],
            ..small()
        };
        let err = ContextSetup::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_margin_sources() {
        let config = small();
        let setup = ContextSetup::from_config(&config).unwrap();
        let m = compute_margin(&config, &setup).unwrap();
        assert_eq!(m.source, MarginSource::Mmd);
        assert_eq!(m.value, m.mmd);
        assert!(m.value > 0.0);

        let fixed = ExperimentConfig {
            margin: MarginConfig::Fixed { value: 0.25 },
            ..config
        };
        let m = compute_margin(&fixed, &setup).unwrap();
        assert_eq!(m.value, 0.25);
        assert_eq!(m.source, MarginSource::Fixed);
    }

    #[test]
    fn test_run_shapes() {
        let report = run_experiment(&small()).unwrap();
        assert_eq!(report.outcome.dataset.len(), 2 + 3);
        assert_eq!(report.regret.len(), 5);
        assert_eq!(report.objective, "rand_func");
        assert!(report
            .outcome
            .iterations
            .iter()
            .all(|r| r.margin == report.margin.value));
        assert!(report.best_observation().is_some());
    }

    #[test]
    fn test_run_reproducible() {
        let a = run_experiment(&small()).unwrap();
        let b = run_experiment(&small()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_sampling_seed_changes_queries() {
        let a = run_experiment(&small()).unwrap();
        let b = run_experiment(&ExperimentConfig {
            sampling_seed: 7,
            ..small()
        })
        .unwrap();
        assert_ne!(
            a.outcome.dataset.query_points(),
            b.outcome.dataset.query_points()
        );
    }

    #[test]
    fn test_standardized_branin_thompson() {
        let config = ExperimentConfig {
            objective: ObjectiveName::Branin,
            standardize_objective: true,
            acquisition: AcquisitionName::DrThompson,
            ..small()
        };
        let report = run_experiment(&config).unwrap();
        let scale = report.objective_scale.unwrap();
        assert!(scale.std > 0.0);
        assert_eq!(report.acquisition, AcquisitionKind::DrThompson);
        for w in report.regret.simple.windows(2) {
            assert!(w[1] <= w[0]);
        }
    }
}
