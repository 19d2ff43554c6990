//! A random smooth function drawn from a GP prior.
//!
//! `num_points` centers are drawn uniformly in the box, function values
//! `f ~ N(0, K + jitter·I)` are sampled at the centers, and the objective is
//! the kernel interpolant `x ↦ k(x, X) (K + jitter·I)⁻¹ f`, which passes
//! through the sampled values and is as smooth as the kernel.

use drbo_common::{Error, Result};
use drbo_math::SquaredExponential;
use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use super::{check_points, Objective};

/// Diagonal jitter on the prior covariance of the centers.
pub const RAND_FUNC_JITTER: f64 = 1e-6;

/// Seeded random function from a squared-exponential GP prior.
#[derive(Debug, Clone)]
pub struct RandFunc {
    kernel: SquaredExponential,
    centers: Vec<Vec<f64>>,
    weights: Vec<f64>,
}

impl RandFunc {
    pub fn new(
        kernel: SquaredExponential,
        lowers: &[f64],
        uppers: &[f64],
        num_points: usize,
        seed: u64,
    ) -> Result<Self> {
        let dims = kernel.dims();
        if lowers.len() != dims {
            return Err(Error::shape("rand_func lowers", dims, lowers.len()));
        }
        if uppers.len() != dims {
            return Err(Error::shape("rand_func uppers", dims, uppers.len()));
        }
        if let Some((lo, hi)) = lowers
            .iter()
            .zip(uppers)
            .find(|(lo, hi)| !(lo.is_finite() && hi.is_finite() && hi > lo))
        {
            return Err(Error::InvalidRange(format!(
                "rand_func bounds must satisfy lower < upper, got [{lo}, {hi}]"
            )));
        }
        if num_points == 0 {
            return Err(Error::InvalidRange(
                "rand_func needs at least one center".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let centers: Vec<Vec<f64>> = (0..num_points)
            .map(|_| {
                lowers
                    .iter()
                    .zip(uppers)
                    .map(|(&lo, &hi)| rng.random_range(lo..hi))
                    .collect()
            })
            .collect();

        let gram = DMatrix::from_fn(num_points, num_points, |i, j| {
            let k = kernel.eval(&centers[i], &centers[j]);
            if i == j {
                k + RAND_FUNC_JITTER
            } else {
                k
            }
        });
        let chol = nalgebra::linalg::Cholesky::new(gram).ok_or_else(|| {
            Error::NumericalInstability(
                "rand_func prior covariance is not positive definite".to_string(),
            )
        })?;

        let z = DVector::from_fn(num_points, |_, _| rng.sample::<f64, _>(StandardNormal));
        let f = chol.l() * z;
        let weights = chol.solve(&f);

        Ok(Self {
            kernel,
            centers,
            weights: weights.iter().copied().collect(),
        })
    }

    pub fn centers(&self) -> &[Vec<f64>] {
        &self.centers
    }

    fn value(&self, x: &[f64]) -> f64 {
        self.centers
            .iter()
            .zip(&self.weights)
            .map(|(c, w)| self.kernel.eval(x, c) * w)
            .sum()
    }
}

impl Objective for RandFunc {
    fn dims(&self) -> usize {
        self.kernel.dims()
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_points("rand_func", self.dims(), points)?;
        Ok(points.iter().map(|p| self.value(p)).collect())
    }

    fn name(&self) -> &str {
        "rand_func"
    }
}
