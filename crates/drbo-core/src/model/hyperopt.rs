//! Type-II maximum likelihood for the surrogate's hyperparameters.
//!
//! Parameters are optimized in log space, `θ = (log l₁ … log l_d, log σ²_f,
//! log σ²ₙ)`, by projected gradient ascent with Armijo backtracking inside a
//! box. The gradient is analytic:
//!
//! ```text
//! ∂ log p(y | X) / ∂θⱼ = ½ tr((ααᵀ − K⁻¹) ∂K/∂θⱼ)
//! ∂K/∂ log l_d   = K_f ∘ (Δ_d² / l_d²)
//! ∂K/∂ log σ²_f  = K_f
//! ∂K/∂ log σ²ₙ   = σ²ₙ I
//! ```
//!
//! Running out of iterations is not an error: the best parameters seen are
//! returned together with a [`ConvergenceWarning`].

use drbo_common::{ConvergenceWarning, Error, Result};
use drbo_math::LOG_SQRT_2PI;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};

use super::{training_covariance, HyperParams};
use crate::dataset::Dataset;

pub const LENGTHSCALE_BOUNDS: (f64, f64) = (1e-3, 1e2);
pub const SIGNAL_VARIANCE_BOUNDS: (f64, f64) = (1e-3, 1e3);
pub const NOISE_VARIANCE_BOUNDS: (f64, f64) = (1e-6, 1.0);

/// Projected gradient norm below which the optimum is considered reached.
const GRADIENT_TOLERANCE: f64 = 1e-5;
/// Relative likelihood change below which the optimum is considered reached.
const LML_TOLERANCE: f64 = 1e-9;
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 30;
const INITIAL_STEP: f64 = 0.1;
const MAX_STEP: f64 = 1.0;

/// Result of [`maximize_log_marginal_likelihood`].
#[derive(Debug, Clone, PartialEq)]
pub struct HyperOptOutcome {
    pub params: HyperParams,
    pub log_marginal_likelihood: f64,
    pub iterations: usize,
    pub converged: bool,
    pub gradient_norm: f64,
}

impl HyperOptOutcome {
    pub fn warning(&self) -> Option<ConvergenceWarning> {
        (!self.converged).then(|| ConvergenceWarning {
            iterations: self.iterations,
            best_log_likelihood: self.log_marginal_likelihood,
            gradient_norm: self.gradient_norm,
        })
    }
}

struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    fn new(dims: usize) -> Self {
        let mut lower = vec![LENGTHSCALE_BOUNDS.0.ln(); dims];
        let mut upper = vec![LENGTHSCALE_BOUNDS.1.ln(); dims];
        lower.push(SIGNAL_VARIANCE_BOUNDS.0.ln());
        upper.push(SIGNAL_VARIANCE_BOUNDS.1.ln());
        lower.push(NOISE_VARIANCE_BOUNDS.0.ln());
        upper.push(NOISE_VARIANCE_BOUNDS.1.ln());
        Self { lower, upper }
    }

    fn project(&self, theta: &mut [f64]) {
        for ((t, lo), hi) in theta.iter_mut().zip(&self.lower).zip(&self.upper) {
            *t = t.clamp(*lo, *hi);
        }
    }

    /// Norm of the step a unit gradient move would take after projection.
    fn projected_gradient_norm(&self, theta: &[f64], grad: &[f64]) -> f64 {
        theta
            .iter()
            .zip(grad)
            .zip(self.lower.iter().zip(&self.upper))
            .map(|((t, g), (lo, hi))| {
                let moved = (t + g).clamp(*lo, *hi);
                (moved - t).powi(2)
            })
            .sum::<f64>()
            .sqrt()
    }
}

fn to_theta(params: &HyperParams) -> Vec<f64> {
    let mut theta: Vec<f64> = params.lengthscales.iter().map(|l| l.ln()).collect();
    theta.push(params.signal_variance.ln());
    theta.push(params.noise_variance.max(NOISE_VARIANCE_BOUNDS.0).ln());
    theta
}

fn from_theta(theta: &[f64]) -> HyperParams {
    let d = theta.len() - 2;
    HyperParams {
        lengthscales: theta[..d].iter().map(|t| t.exp()).collect(),
        signal_variance: theta[d].exp(),
        noise_variance: theta[d + 1].exp(),
    }
}

/// Log marginal likelihood and its gradient with respect to `θ`.
pub fn log_marginal_likelihood_and_gradient(
    params: &HyperParams,
    dataset: &Dataset,
) -> Result<(f64, Vec<f64>)> {
    let kernel = params.kernel()?;
    let x = dataset.query_points();
    let n = x.len();
    let dims = kernel.dims();

    let k_noisy = training_covariance(&kernel, x, params.noise_variance);
    let factor = Cholesky::new(k_noisy).ok_or_else(|| {
        Error::NumericalInstability(format!(
            "training covariance is not positive definite at {params:?}"
        ))
    })?;
    let y = DVector::from_column_slice(dataset.observations());
    let alpha = factor.solve(&y);
    let log_det_half: f64 = (0..n).map(|i| factor.l_dirty()[(i, i)].ln()).sum();
    let lml = -0.5 * y.dot(&alpha) - log_det_half - n as f64 * LOG_SQRT_2PI;
    if !lml.is_finite() {
        return Err(Error::NumericalInstability(format!(
            "log marginal likelihood is {lml} at {params:?}"
        )));
    }

    let w: DMatrix<f64> = &alpha * alpha.transpose() - factor.inverse();
    let mut grad = vec![0.0; dims + 2];
    let mut trace_w = 0.0;
    for i in 0..n {
        trace_w += w[(i, i)];
        for j in 0..n {
            let kf = kernel.eval(&x[i], &x[j]);
            let wk = w[(i, j)] * kf;
            for (d, g) in grad.iter_mut().take(dims).enumerate() {
                let delta = (x[i][d] - x[j][d]) / params.lengthscales[d];
                *g += 0.5 * wk * delta * delta;
            }
            grad[dims] += 0.5 * wk;
        }
    }
    grad[dims + 1] = 0.5 * params.noise_variance * trace_w;

    if grad.iter().any(|g| !g.is_finite()) {
        return Err(Error::NumericalInstability(
            "log marginal likelihood gradient is not finite".to_string(),
        ));
    }
    Ok((lml, grad))
}

/// Maximize the log marginal likelihood from `start` within `max_iter`
/// accepted steps.
///
/// Fails only when the likelihood cannot be evaluated at the (projected)
/// starting point.
pub fn maximize_log_marginal_likelihood(
    start: &HyperParams,
    dataset: &Dataset,
    max_iter: usize,
) -> Result<HyperOptOutcome> {
    let bounds = Bounds::new(start.lengthscales.len());
    let mut theta = to_theta(start);
    bounds.project(&mut theta);

    let (mut lml, mut grad) =
        log_marginal_likelihood_and_gradient(&from_theta(&theta), dataset).map_err(|e| {
            Error::NumericalInstability(format!(
                "hyperparameter optimization cannot start: {e}"
            ))
        })?;

    let mut step = INITIAL_STEP;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iter {
        if bounds.projected_gradient_norm(&theta, &grad) < GRADIENT_TOLERANCE {
            converged = true;
            break;
        }
        iterations += 1;

        let mut accepted = None;
        let mut t = step;
        for _ in 0..MAX_BACKTRACKS {
            let mut candidate: Vec<f64> = theta.iter().zip(&grad).map(|(p, g)| p + t * g).collect();
            bounds.project(&mut candidate);
            let ascent: f64 = candidate
                .iter()
                .zip(&theta)
                .zip(&grad)
                .map(|((c, p), g)| g * (c - p))
                .sum();
            if let Ok((l, g)) = log_marginal_likelihood_and_gradient(&from_theta(&candidate), dataset)
            {
                if l >= lml + ARMIJO * ascent {
                    accepted = Some((candidate, l, g));
                    break;
                }
            }
            t *= 0.5;
        }

        let Some((candidate, new_lml, new_grad)) = accepted else {
            // No ascent direction survives backtracking: stationary to precision.
            converged = true;
            break;
        };
        let improvement = new_lml - lml;
        theta = candidate;
        lml = new_lml;
        grad = new_grad;
        step = (2.0 * t).min(MAX_STEP);

        if improvement.abs() <= LML_TOLERANCE * (1.0 + lml.abs()) {
            converged = true;
            break;
        }
    }

    let gradient_norm = bounds.projected_gradient_norm(&theta, &grad);
    if !converged && gradient_norm < GRADIENT_TOLERANCE {
        converged = true;
    }
    tracing::debug!(iterations, converged, lml, gradient_norm, "hyperparameter optimization done");

    Ok(HyperOptOutcome {
        params: from_theta(&theta),
        log_marginal_likelihood: lml,
        iterations,
        converged,
        gradient_norm,
    })
}
