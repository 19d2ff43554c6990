//! Gaussian-process surrogate of the objective.
//!
//! Zero-mean GP regression with a squared-exponential ARD kernel and
//! Gaussian observation noise, solved exactly through a Cholesky factor of
//! `K + σ²ₙI`.
//!
//! ```text
//! μ(x)  = k(x, X) α,               α = (K + σ²ₙI)⁻¹ y
//! σ²(x) = k(x, x) − k(x, X) (K + σ²ₙI)⁻¹ k(X, x)
//! log p(y | X) = −½ yᵀα − Σ log Lᵢᵢ − n/2 log 2π
//! ```
//!
//! Refits replace the whole fitted state; a failed refit leaves the previous
//! state untouched.

pub mod hyperopt;

use drbo_common::{ConvergenceWarning, Error, Result};
use drbo_math::{SquaredExponential, LOG_SQRT_2PI};
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector, Dyn};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::logging::event_names;

/// Negative variance residues down to `-VARIANCE_TOLERANCE * signal_variance`
/// are clamped to zero; anything below is an error.
pub const VARIANCE_TOLERANCE: f64 = 1e-9;

/// Diagonal jitter tried, in order, when factoring the training covariance.
/// Relative to the signal variance.
const FIT_JITTER: [f64; 4] = [0.0, 1e-10, 1e-8, 1e-6];

/// Diagonal jitter tried, in order, when factoring a posterior covariance.
const SAMPLE_JITTER: [f64; 3] = [1e-8, 1e-6, 1e-4];

/// Kernel and noise parameters of the surrogate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParams {
    pub lengthscales: Vec<f64>,
    pub signal_variance: f64,
    pub noise_variance: f64,
}

impl HyperParams {
    pub fn kernel(&self) -> Result<SquaredExponential> {
        SquaredExponential::new(self.signal_variance, self.lengthscales.clone())
    }
}

/// Marginal posterior at one point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub mean: f64,
    pub variance: f64,
}

/// What a refit did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub hyperparameters: HyperParams,
    pub log_marginal_likelihood: f64,
    pub num_points: usize,
    pub optimized: bool,
    pub optimizer_iterations: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<ConvergenceWarning>,
}

/// Fitted state: parameters, the data they were fitted on, and the factor.
#[derive(Debug, Clone)]
struct Posterior {
    params: HyperParams,
    kernel: SquaredExponential,
    dataset: Dataset,
    factor: Option<Cholesky<f64, Dyn>>,
    alpha: DVector<f64>,
    log_marginal_likelihood: f64,
}

impl Posterior {
    fn fit(params: HyperParams, dataset: Dataset) -> Result<Self> {
        let kernel = params.kernel()?;
        if dataset.is_empty() {
            return Ok(Self {
                params,
                kernel,
                dataset,
                factor: None,
                alpha: DVector::zeros(0),
                log_marginal_likelihood: 0.0,
            });
        }

        let n = dataset.len();
        let k = training_covariance(&kernel, dataset.query_points(), params.noise_variance);
        let factor = factor_with_jitter(k, params.signal_variance, &FIT_JITTER).ok_or_else(|| {
            Error::NumericalInstability(format!(
                "Cholesky factorization of the {n}x{n} training covariance failed"
            ))
        })?;
        let y = DVector::from_column_slice(dataset.observations());
        let alpha = factor.solve(&y);
        let log_det_half: f64 = (0..n).map(|i| factor.l_dirty()[(i, i)].ln()).sum();
        let lml = -0.5 * y.dot(&alpha) - log_det_half - n as f64 * LOG_SQRT_2PI;
        if !lml.is_finite() {
            return Err(Error::NumericalInstability(format!(
                "log marginal likelihood is {lml}"
            )));
        }

        Ok(Self {
            params,
            kernel,
            dataset,
            factor: Some(factor),
            alpha,
            log_marginal_likelihood: lml,
        })
    }

    /// `k(X, P)` as an `n × m` matrix.
    fn cross_covariance(&self, points: &[Vec<f64>]) -> DMatrix<f64> {
        let x = self.dataset.query_points();
        DMatrix::from_fn(x.len(), points.len(), |i, j| self.kernel.eval(&x[i], &points[j]))
    }
}

/// `K(X, X) + noise·I`.
pub(crate) fn training_covariance(
    kernel: &SquaredExponential,
    x: &[Vec<f64>],
    noise_variance: f64,
) -> DMatrix<f64> {
    let n = x.len();
    DMatrix::from_fn(n, n, |i, j| {
        let k = kernel.eval(&x[i], &x[j]);
        if i == j {
            k + noise_variance
        } else {
            k
        }
    })
}

/// Cholesky factor of `matrix + jitter·scale·I` for the first jitter that works.
fn factor_with_jitter(
    matrix: DMatrix<f64>,
    scale: f64,
    ladder: &[f64],
) -> Option<Cholesky<f64, Dyn>> {
    let n = matrix.nrows();
    for &jitter in ladder {
        let mut m = matrix.clone();
        for i in 0..n {
            m[(i, i)] += jitter * scale;
        }
        if let Some(factor) = Cholesky::new(m) {
            if jitter > 0.0 {
                tracing::debug!(jitter, size = n, "cholesky needed diagonal jitter");
            }
            return Some(factor);
        }
    }
    None
}

fn clamp_variance(raw: f64, signal_variance: f64, index: usize) -> Result<f64> {
    if !raw.is_finite() {
        return Err(Error::NumericalInstability(format!(
            "posterior variance at point {index} is {raw}"
        )));
    }
    if raw >= 0.0 {
        Ok(raw)
    } else if raw >= -VARIANCE_TOLERANCE * signal_variance {
        Ok(0.0)
    } else {
        Err(Error::NumericalInstability(format!(
            "posterior variance {raw:e} at point {index} is below tolerance"
        )))
    }
}

/// Exact GP regression model.
#[derive(Debug, Clone)]
pub struct GprModel {
    dims: usize,
    opt_max_iter: usize,
    posterior: Posterior,
}

impl GprModel {
    /// Fit a model on `dataset` with the given kernel and noise.
    ///
    /// An empty dataset is allowed; predictions then come from the prior.
    pub fn new(
        dims: usize,
        kernel: SquaredExponential,
        noise_variance: f64,
        dataset: &Dataset,
        opt_max_iter: usize,
    ) -> Result<Self> {
        if kernel.dims() != dims {
            return Err(Error::shape("model kernel lengthscales", dims, kernel.dims()));
        }
        if !(noise_variance.is_finite() && noise_variance >= 0.0) {
            return Err(Error::InvalidRange(format!(
                "noise variance must be finite and >= 0, got {noise_variance}"
            )));
        }
        check_dataset(dims, dataset)?;
        let params = HyperParams {
            lengthscales: kernel.lengthscales().to_vec(),
            signal_variance: kernel.variance(),
            noise_variance,
        };
        Ok(Self {
            dims,
            opt_max_iter,
            posterior: Posterior::fit(params, dataset.clone())?,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn hyperparameters(&self) -> &HyperParams {
        &self.posterior.params
    }

    pub fn log_marginal_likelihood(&self) -> f64 {
        self.posterior.log_marginal_likelihood
    }

    /// The model's own copy of the data it was last fitted on.
    pub fn dataset(&self) -> &Dataset {
        &self.posterior.dataset
    }

    /// Posterior mean and variance at each point.
    pub fn predict(&self, points: &[Vec<f64>]) -> Result<Vec<Prediction>> {
        self.check_points(points)?;
        let sf = self.posterior.params.signal_variance;
        let Some(factor) = &self.posterior.factor else {
            return Ok(vec![
                Prediction {
                    mean: 0.0,
                    variance: sf,
                };
                points.len()
            ]);
        };

        let k_star = self.posterior.cross_covariance(points);
        let means = k_star.transpose() * &self.posterior.alpha;
        let v = factor.solve(&k_star);

        let mut out = Vec::with_capacity(points.len());
        for j in 0..points.len() {
            let mean = means[j];
            if !mean.is_finite() {
                return Err(Error::NumericalInstability(format!(
                    "posterior mean at point {j} is {mean}"
                )));
            }
            let raw = sf - k_star.column(j).dot(&v.column(j));
            out.push(Prediction {
                mean,
                variance: clamp_variance(raw, sf, j)?,
            });
        }
        Ok(out)
    }

    /// Joint posterior mean and covariance over `points`.
    pub fn predict_joint(&self, points: &[Vec<f64>]) -> Result<(Vec<f64>, DMatrix<f64>)> {
        self.check_points(points)?;
        let m = points.len();
        let kernel = &self.posterior.kernel;
        let prior = DMatrix::from_fn(m, m, |i, j| kernel.eval(&points[i], &points[j]));
        let Some(factor) = &self.posterior.factor else {
            return Ok((vec![0.0; m], prior));
        };

        let k_star = self.posterior.cross_covariance(points);
        let mean = k_star.transpose() * &self.posterior.alpha;
        let v = factor.solve(&k_star);
        let cov = prior - k_star.transpose() * v;
        let cov = (&cov + cov.transpose()) * 0.5;
        if mean.iter().chain(cov.iter()).any(|x| !x.is_finite()) {
            return Err(Error::NumericalInstability(
                "joint posterior contains non-finite entries".to_string(),
            ));
        }
        Ok((mean.iter().copied().collect(), cov))
    }

    /// One joint draw of the latent function at `points`.
    pub fn posterior_sample<R: Rng + ?Sized>(
        &self,
        points: &[Vec<f64>],
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        let (mean, cov) = self.predict_joint(points)?;
        let m = mean.len();
        if m == 0 {
            return Ok(Vec::new());
        }
        let sf = self.posterior.params.signal_variance;
        let factor = factor_with_jitter(cov, sf, &SAMPLE_JITTER).ok_or_else(|| {
            Error::NumericalInstability(format!(
                "posterior covariance over {m} points is not positive definite even with jitter"
            ))
        })?;
        let z = DVector::from_fn(m, |_, _| -> f64 { StandardNormal.sample(&mut *rng) });
        let draw = factor.l() * z;
        Ok(mean.iter().zip(draw.iter()).map(|(mu, d)| mu + d).collect())
    }

    /// Refit on `dataset`, optionally re-estimating hyperparameters first.
    ///
    /// The new state is built completely before it replaces the old one.
    pub fn refit(&mut self, dataset: &Dataset, optimize_hyperparameters: bool) -> Result<FitReport> {
        check_dataset(self.dims, dataset)?;

        let (params, optimizer) = if optimize_hyperparameters && !dataset.is_empty() {
            let outcome = hyperopt::maximize_log_marginal_likelihood(
                &self.posterior.params,
                dataset,
                self.opt_max_iter,
            )?;
            (outcome.params.clone(), Some(outcome))
        } else {
            (self.posterior.params.clone(), None)
        };

        let posterior = Posterior::fit(params, dataset.clone())?;
        let warning = optimizer.as_ref().and_then(|o| o.warning());
        if let Some(w) = &warning {
            tracing::warn!(
                target: event_names::GP_CONVERGENCE_WARNING,
                iterations = w.iterations,
                best_log_likelihood = w.best_log_likelihood,
                gradient_norm = w.gradient_norm,
                message = %w,
            );
        }

        let report = FitReport {
            hyperparameters: posterior.params.clone(),
            log_marginal_likelihood: posterior.log_marginal_likelihood,
            num_points: dataset.len(),
            optimized: optimizer.is_some(),
            optimizer_iterations: optimizer.map(|o| o.iterations).unwrap_or(0),
            warning,
        };
        self.posterior = posterior;
        Ok(report)
    }

    fn check_points(&self, points: &[Vec<f64>]) -> Result<()> {
        match points.iter().find(|p| p.len() != self.dims) {
            Some(bad) => Err(Error::shape("model prediction point", self.dims, bad.len())),
            None => Ok(()),
        }
    }
}

fn check_dataset(dims: usize, dataset: &Dataset) -> Result<()> {
    match dataset.dims() {
        Some(d) if d != dims => Err(Error::shape("model dataset", dims, d)),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn kernel() -> SquaredExponential {
        SquaredExponential::isotropic(0.2, 2).unwrap()
    }

    fn toy_data() -> Dataset {
        Dataset::new(
            vec![vec![0.1, 0.2], vec![0.5, 0.5], vec![0.9, 0.7]],
            vec![0.3, -0.4, 1.1],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_dataset_predicts_prior() {
        let model = GprModel::new(2, kernel(), 1e-3, &Dataset::empty(), 10).unwrap();
        let p = model.predict(&[vec![0.3, 0.3]]).unwrap();
        assert_eq!(p[0].mean, 0.0);
        assert_eq!(p[0].variance, 1.0);
        assert_eq!(model.log_marginal_likelihood(), 0.0);
    }

    #[test]
    fn test_interpolates_with_small_noise() {
        let data = toy_data();
        let model = GprModel::new(2, kernel(), 1e-6, &data, 10).unwrap();
        let p = model.predict(data.query_points()).unwrap();
        for (pred, y) in p.iter().zip(data.observations()) {
            assert!((pred.mean - y).abs() < 1e-3);
            assert!(pred.variance < 1e-3);
        }
    }

    #[test]
    fn test_variance_grows_away_from_data() {
        let model = GprModel::new(2, kernel(), 1e-3, &toy_data(), 10).unwrap();
        let near = model.predict(&[vec![0.5, 0.5]]).unwrap()[0].variance;
        let far = model.predict(&[vec![0.0, 1.0]]).unwrap()[0].variance;
        assert!(far > near);
        assert!(far <= 1.0 + 1e-12);
    }

    #[test]
    fn test_lml_matches_one_point_closed_form() {
        let data = Dataset::new(vec![vec![0.5, 0.5]], vec![0.7]).unwrap();
        let model = GprModel::new(2, kernel(), 0.1, &data, 10).unwrap();
        let var: f64 = 1.1;
        let expected = -0.5 * 0.7 * 0.7 / var - 0.5 * var.ln() - LOG_SQRT_2PI;
        assert!((model.log_marginal_likelihood() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_wrong_dims() {
        let model = GprModel::new(2, kernel(), 1e-3, &toy_data(), 10).unwrap();
        assert!(matches!(
            model.predict(&[vec![0.5]]),
            Err(Error::ShapeMismatch { .. })
        ));
        let bad = Dataset::new(vec![vec![0.5]], vec![1.0]).unwrap();
        assert!(GprModel::new(2, kernel(), 1e-3, &bad, 10).is_err());
    }

    #[test]
    fn test_refit_replaces_state() {
        let mut model = GprModel::new(2, kernel(), 1e-3, &Dataset::empty(), 10).unwrap();
        let report = model.refit(&toy_data(), false).unwrap();
        assert_eq!(report.num_points, 3);
        assert!(!report.optimized);
        assert!(report.warning.is_none());
        assert_eq!(model.dataset().len(), 3);
        assert_eq!(report.log_marginal_likelihood, model.log_marginal_likelihood());
    }

    #[test]
    fn test_refit_with_truncated_optimizer_reports_warning() {
        let far = SquaredExponential::new(100.0, vec![50.0, 50.0]).unwrap();
        let mut model = GprModel::new(2, far, 0.5, &Dataset::empty(), 1).unwrap();
        let report = model.refit(&toy_data(), true).unwrap();
        assert!(report.optimized);
        assert_eq!(report.optimizer_iterations, 1);
        let w = report.warning.unwrap();
        assert_eq!(w.iterations, 1);
        assert_eq!(w.best_log_likelihood, report.log_marginal_likelihood);
        assert_ne!(model.hyperparameters().lengthscales, vec![50.0, 50.0]);
    }

    #[test]
    fn test_failed_refit_keeps_previous_state() {
        let mut model = GprModel::new(2, kernel(), 1e-3, &toy_data(), 10).unwrap();
        let before = model.log_marginal_likelihood();
        let bad = Dataset::new(vec![vec![0.5, 0.5, 0.5]], vec![1.0]).unwrap();
        assert!(model.refit(&bad, false).is_err());
        assert_eq!(model.log_marginal_likelihood(), before);
        assert_eq!(model.dataset().len(), 3);
    }

    #[test]
    fn test_duplicate_points_zero_noise_still_factor() {
        let data = Dataset::new(vec![vec![0.5, 0.5], vec![0.5, 0.5]], vec![1.0, 1.0]).unwrap();
        let model = GprModel::new(2, kernel(), 0.0, &data, 10).unwrap();
        let p = model.predict(&[vec![0.5, 0.5]]).unwrap();
        assert!((p[0].mean - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_posterior_sample_is_reproducible() {
        let model = GprModel::new(2, kernel(), 1e-3, &toy_data(), 10).unwrap();
        let points: Vec<Vec<f64>> = (0..10).map(|i| vec![i as f64 / 9.0, 0.5]).collect();
        let a = model
            .posterior_sample(&points, &mut StdRng::seed_from_u64(5))
            .unwrap();
        let b = model
            .posterior_sample(&points, &mut StdRng::seed_from_u64(5))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
    }

    #[test]
    fn test_posterior_sample_pinned_at_data() {
        let data = toy_data();
        let model = GprModel::new(2, kernel(), 1e-6, &data, 10).unwrap();
        let s = model
            .posterior_sample(data.query_points(), &mut StdRng::seed_from_u64(9))
            .unwrap();
        for (v, y) in s.iter().zip(data.observations()) {
            assert!((v - y).abs() < 0.05);
        }
    }

    #[test]
    fn test_predict_joint_diagonal_matches_predict() {
        let model = GprModel::new(2, kernel(), 1e-3, &toy_data(), 10).unwrap();
        let points = vec![vec![0.2, 0.2], vec![0.6, 0.9]];
        let (mean, cov) = model.predict_joint(&points).unwrap();
        let marg = model.predict(&points).unwrap();
        for j in 0..2 {
            assert!((mean[j] - marg[j].mean).abs() < 1e-10);
            assert!((cov[(j, j)] - marg[j].variance).abs() < 1e-10);
        }
    }

    #[test]
    fn test_clamp_variance() {
        assert_eq!(clamp_variance(-1e-12, 1.0, 0).unwrap(), 0.0);
        assert!(clamp_variance(-1e-3, 1.0, 0).is_err());
        assert!(clamp_variance(f64::NAN, 1.0, 0).is_err());
        assert_eq!(clamp_variance(0.5, 1.0, 0).unwrap(), 0.5);
    }
}
