//! Maximum Mean Discrepancy between discrete distributions on a shared support.
//!
//! ```text
//! MMD²(p, q) = Σ p_i p_j k_ij + Σ q_i q_j k_ij − 2 Σ p_i q_j k_ij
//!            = (p − q)ᵀ K (p − q)
//! ```
//!
//! [`mmd`] returns the **unsquared** distance; [`mmd_squared`] the square.
//! Both are evaluated in the difference form.

use drbo_common::{Error, Result};

use super::distribution::DiscreteDistribution;
use super::kernel::{Gram, SquaredExponential};

/// Relative tolerance for negative squared residues, scaled by `max(1, max|K|)`.
pub const MMD_NEGATIVE_TOLERANCE: f64 = 1e-9;

/// Squared MMD against a precomputed Gram matrix.
pub fn mmd_squared_with_gram(
    p: &DiscreteDistribution,
    q: &DiscreteDistribution,
    gram: &Gram,
) -> Result<f64> {
    let n = gram.dim();
    if p.len() != n {
        return Err(Error::shape("mmd weights p", n, p.len()));
    }
    if q.len() != n {
        return Err(Error::shape("mmd weights q", n, q.len()));
    }
    let diff: Vec<f64> = p
        .weights()
        .iter()
        .zip(q.weights())
        .map(|(a, b)| a - b)
        .collect();
    clamp_squared(gram.quad_form(&diff), gram)
}

/// Unsquared MMD against a precomputed Gram matrix.
pub fn mmd_with_gram(p: &DiscreteDistribution, q: &DiscreteDistribution, gram: &Gram) -> Result<f64> {
    Ok(mmd_squared_with_gram(p, q, gram)?.sqrt())
}

/// Squared MMD, building the Gram matrix on `support`.
pub fn mmd_squared(
    p: &DiscreteDistribution,
    q: &DiscreteDistribution,
    kernel: &SquaredExponential,
    support: &[f64],
) -> Result<f64> {
    if p.len() != support.len() {
        return Err(Error::shape("mmd weights p vs support", support.len(), p.len()));
    }
    if q.len() != support.len() {
        return Err(Error::shape("mmd weights q vs support", support.len(), q.len()));
    }
    mmd_squared_with_gram(p, q, &kernel.gram_1d(support))
}

/// Unsquared MMD, building the Gram matrix on `support`.
pub fn mmd(
    p: &DiscreteDistribution,
    q: &DiscreteDistribution,
    kernel: &SquaredExponential,
    support: &[f64],
) -> Result<f64> {
    Ok(mmd_squared(p, q, kernel, support)?.sqrt())
}

/// RKHS distance `sqrt((w − p)ᵀ K (w − p))` for raw weight vectors.
///
/// Used by the worst-case solver on iterates that are only approximately
/// normalized; applies the same residue policy as [`mmd`].
pub fn kernel_distance(w: &[f64], p: &[f64], gram: &Gram) -> Result<f64> {
    let n = gram.dim();
    if w.len() != n {
        return Err(Error::shape("kernel distance w", n, w.len()));
    }
    if p.len() != n {
        return Err(Error::shape("kernel distance p", n, p.len()));
    }
    let diff: Vec<f64> = w.iter().zip(p).map(|(a, b)| a - b).collect();
    Ok(clamp_squared(gram.quad_form(&diff), gram)?.sqrt())
}

fn clamp_squared(value: f64, gram: &Gram) -> Result<f64> {
    if !value.is_finite() {
        return Err(Error::NumericalInstability(format!(
            "squared MMD is not finite ({value})"
        )));
    }
    if value >= 0.0 {
        return Ok(value);
    }
    let tolerance = MMD_NEGATIVE_TOLERANCE * gram.max_abs().max(1.0);
    if -value <= tolerance {
        Ok(0.0)
    } else {
        Err(Error::NumericalInstability(format!(
            "squared MMD residue {value:.3e} exceeds tolerance {tolerance:.1e}; kernel matrix is not positive semi-definite"
        )))
    }
}
