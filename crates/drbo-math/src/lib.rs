//! Grids, kernels, discrete distributions and MMD-ball worst cases for drbo.

pub mod math;

pub use math::distribution::{discrete_normal, DiscreteDistribution, WEIGHT_SUM_TOLERANCE};
pub use math::grid::{cartesian, make_grid, Grid, SearchSpace};
pub use math::kernel::{Gram, SquaredExponential};
pub use math::mmd::{
    kernel_distance, mmd, mmd_squared, mmd_squared_with_gram, mmd_with_gram, MMD_NEGATIVE_TOLERANCE,
};
pub use math::robust::{worst_case_expectation, SolverOptions, WorstCase};
pub use math::simplex::project_onto_simplex;
pub use math::stable::*;
