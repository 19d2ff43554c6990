//! Squared-exponential kernel and dense Gram matrices.
//!
//! `k(x, y) = σ² exp(-½ Σ_d ((x_d - y_d) / l_d)²)`

use drbo_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Squared-exponential (RBF) kernel with ARD lengthscales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "KernelParams")]
pub struct SquaredExponential {
    variance: f64,
    lengthscales: Vec<f64>,
}

#[derive(Deserialize)]
struct KernelParams {
    variance: f64,
    lengthscales: Vec<f64>,
}

impl TryFrom<KernelParams> for SquaredExponential {
    type Error = Error;

    fn try_from(p: KernelParams) -> Result<Self> {
        Self::new(p.variance, p.lengthscales)
    }
}

impl SquaredExponential {
    /// Create a kernel, validating that every parameter is positive and finite.
    pub fn new(variance: f64, lengthscales: Vec<f64>) -> Result<Self> {
        if !(variance.is_finite() && variance > 0.0) {
            return Err(Error::InvalidRange(format!(
                "kernel variance must be positive, got {variance}"
            )));
        }
        if lengthscales.is_empty() {
            return Err(Error::InvalidRange(
                "kernel needs at least one lengthscale".to_string(),
            ));
        }
        if let Some(bad) = lengthscales.iter().find(|l| !(l.is_finite() && **l > 0.0)) {
            return Err(Error::InvalidRange(format!(
                "kernel lengthscales must be positive, got {bad}"
            )));
        }
        Ok(Self {
            variance,
            lengthscales,
        })
    }

    /// Unit-variance kernel with the same lengthscale on every dimension.
    pub fn isotropic(lengthscale: f64, dims: usize) -> Result<Self> {
        Self::new(1.0, vec![lengthscale; dims])
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    pub fn lengthscales(&self) -> &[f64] {
        &self.lengthscales
    }

    pub fn dims(&self) -> usize {
        self.lengthscales.len()
    }

    /// Scaled squared distance `Σ ((x_d - y_d) / l_d)²`.
    pub fn scaled_sq_dist(&self, x: &[f64], y: &[f64]) -> f64 {
        x.iter()
            .zip(y)
            .zip(&self.lengthscales)
            .map(|((a, b), l)| {
                let d = (a - b) / l;
                d * d
            })
            .sum()
    }

    pub fn eval(&self, x: &[f64], y: &[f64]) -> f64 {
        self.variance * (-0.5 * self.scaled_sq_dist(x, y)).exp()
    }

    /// Kernel between two scalars; uses the first lengthscale.
    pub fn eval_scalar(&self, x: f64, y: f64) -> f64 {
        let d = (x - y) / self.lengthscales[0];
        self.variance * (-0.5 * d * d).exp()
    }

    /// Gram matrix over a 1-D support.
    pub fn gram_1d(&self, support: &[f64]) -> Gram {
        Gram::from_fn(support.len(), |i, j| self.eval_scalar(support[i], support[j]))
    }
}

/// Dense symmetric matrix stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Gram {
    n: usize,
    data: Vec<f64>,
}

impl Gram {
    pub fn from_fn(n: usize, f: impl Fn(usize, usize) -> f64) -> Self {
        let mut data = vec![0.0; n * n];
        for i in 0..n {
            for j in i..n {
                let v = f(i, j);
                data[i * n + j] = v;
                data[j * n + i] = v;
            }
        }
        Self { n, data }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Largest absolute entry, the scale used by numerical tolerances.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    /// Upper bound on the largest eigenvalue (Gershgorin row sums).
    pub fn spectral_bound(&self) -> f64 {
        (0..self.n)
            .map(|i| self.data[i * self.n..(i + 1) * self.n].iter().map(|v| v.abs()).sum::<f64>())
            .fold(0.0, f64::max)
    }

    /// `out = K v`.
    pub fn mul_vec_into(&self, v: &[f64], out: &mut [f64]) {
        for (i, o) in out.iter_mut().enumerate().take(self.n) {
            let row = &self.data[i * self.n..(i + 1) * self.n];
            *o = row.iter().zip(v).map(|(k, x)| k * x).sum();
        }
    }

    /// Quadratic form `vᵀ K v`.
    pub fn quad_form(&self, v: &[f64]) -> f64 {
        let mut total = 0.0;
        for i in 0..self.n {
            let row = &self.data[i * self.n..(i + 1) * self.n];
            let kv: f64 = row.iter().zip(v).map(|(k, x)| k * x).sum();
            total += v[i] * kv;
        }
        total
    }
}
