//! Worst-case expectation over an MMD ball on the probability simplex.
//!
//! For a payoff vector `u` over the context grid, a reference distribution
//! `p` and a radius `ε`, computes
//!
//! ```text
//! W(u) = min { wᵀu : w ∈ Δ, ‖w − p‖_K ≤ ε }
//! ```
//!
//! # Method
//!
//! The constraint is dualized with a multiplier `λ > 0`:
//!
//! ```text
//! g(λ) = min_{w ∈ Δ} wᵀu + λ‖w − p‖²_K − λε²
//! ```
//!
//! For fixed `λ` the inner problem is smooth and convex with gradient
//! Lipschitz constant `2λ·λ_max(K)`, solved by accelerated projected gradient
//! (FISTA) with warm starts. `‖w*(λ) − p‖_K` decreases in `λ`, so `λ` is
//! bracketed geometrically and bisected in log space until the constraint is
//! tight to a relative tolerance.
//!
//! # Error bound
//!
//! Every inner solution `w̃` with Frank–Wolfe gap `G` certifies
//! `wᵀu + λ‖w̃ − p‖²_K − G − λε² ≤ g(λ) ≤ W(u)` by weak duality. The returned
//! `value` is always attained by a feasible `w`, so
//! `lower_bound ≤ W(u) ≤ value` and `value − lower_bound` bounds the error.
//!
//! Exact shortcuts: `ε = 0` returns `pᵀu`; when the cheapest vertex lies in
//! the ball the answer is `min u`.

use drbo_common::{Error, Result};
use serde::{Deserialize, Serialize};

use super::distribution::DiscreteDistribution;
use super::kernel::Gram;
use super::mmd::kernel_distance;
use super::simplex::project_onto_simplex;

/// Tuning knobs for [`worst_case_expectation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverOptions {
    /// FISTA iterations per multiplier.
    pub max_inner_iters: usize,
    /// Stop FISTA when no coordinate moves more than this.
    pub inner_tolerance: f64,
    /// Multiplier probes spent bracketing, each way.
    pub max_bracket_steps: usize,
    /// Bisection steps on `log λ`.
    pub max_bisection_iters: usize,
    /// Stop once `(ε − ‖w − p‖_K) / ε` is at most this for a feasible `w`.
    pub relative_tolerance: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_inner_iters: 400,
            inner_tolerance: 1e-10,
            max_bracket_steps: 30,
            max_bisection_iters: 60,
            relative_tolerance: 1e-3,
        }
    }
}

/// Outcome of one worst-case solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorstCase {
    /// Worst-case expectation, attained by `witness`.
    pub value: f64,
    /// Expectation under the reference distribution.
    pub nominal: f64,
    /// Certified lower bound on the exact worst case.
    pub lower_bound: f64,
    /// Ball radius.
    pub epsilon: f64,
    /// Adversarial distribution (diagnostic).
    pub witness: Vec<f64>,
    /// `‖witness − p‖_K`.
    pub distance: f64,
}

impl WorstCase {
    /// Width of the certified interval `[lower_bound, value]`.
    pub fn gap(&self) -> f64 {
        self.value - self.lower_bound
    }

    fn exact(value: f64, nominal: f64, epsilon: f64, witness: Vec<f64>, distance: f64) -> Self {
        Self {
            value,
            nominal,
            lower_bound: value,
            epsilon,
            witness,
            distance,
        }
    }
}

/// Minimize `wᵀu` over the simplex intersected with the MMD ball
/// `‖w − p‖_K ≤ epsilon`, where `K` is `gram`.
pub fn worst_case_expectation(
    payoff: &[f64],
    reference: &DiscreteDistribution,
    gram: &Gram,
    epsilon: f64,
    options: &SolverOptions,
) -> Result<WorstCase> {
    let n = gram.dim();
    if payoff.len() != n {
        return Err(Error::shape("worst-case payoff", n, payoff.len()));
    }
    if reference.len() != n {
        return Err(Error::shape("worst-case reference", n, reference.len()));
    }
    if !(epsilon.is_finite() && epsilon >= 0.0) {
        return Err(Error::InvalidRange(format!(
            "margin must be finite and non-negative, got {epsilon}"
        )));
    }
    if let Some(bad) = payoff.iter().find(|v| !v.is_finite()) {
        return Err(Error::NumericalInstability(format!(
            "payoff contains non-finite value {bad}"
        )));
    }

    let p = reference.weights();
    let nominal = dot(payoff, p);
    if epsilon == 0.0 {
        return Ok(WorstCase::exact(nominal, nominal, epsilon, p.to_vec(), 0.0));
    }

    let (argmin, min_u) = payoff
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |(bi, bv), (i, &v)| {
            if v < bv {
                (i, v)
            } else {
                (bi, bv)
            }
        });
    let max_u = payoff.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max_u - min_u <= 0.0 {
        return Ok(WorstCase::exact(nominal, nominal, epsilon, p.to_vec(), 0.0));
    }

    let mut vertex = vec![0.0; n];
    vertex[argmin] = 1.0;
    let vertex_distance = kernel_distance(&vertex, p, gram)?;
    if vertex_distance <= epsilon {
        return Ok(WorstCase::exact(min_u, nominal, epsilon, vertex, vertex_distance));
    }

    let lipschitz = gram.spectral_bound();
    if !(lipschitz.is_finite() && lipschitz > 0.0) {
        return Err(Error::NumericalInstability(format!(
            "kernel matrix spectral bound is {lipschitz}"
        )));
    }

    let mut search = MultiplierSearch {
        payoff,
        p,
        gram,
        epsilon,
        lipschitz,
        options,
        warm: p.to_vec(),
        best_w: p.to_vec(),
        best_value: nominal,
        best_distance: 0.0,
        lower_bound: min_u,
    };

    // Balance point of ‖u‖ against the penalty gradient at distance ε.
    let mut lambda = (max_u - min_u) / (2.0 * epsilon * lipschitz.sqrt());
    let mut lo = 0.0;
    let mut hi = f64::INFINITY;
    let mut hi_distance = 0.0;

    let distance = search.probe(lambda)?;
    if distance > epsilon {
        lo = lambda;
        for _ in 0..options.max_bracket_steps {
            lambda *= 10.0;
            let d = search.probe(lambda)?;
            if d <= epsilon {
                hi = lambda;
                hi_distance = d;
                break;
            }
            lo = lambda;
        }
    } else {
        hi = lambda;
        hi_distance = distance;
        for _ in 0..options.max_bracket_steps {
            lambda /= 10.0;
            let d = search.probe(lambda)?;
            if d > epsilon {
                lo = lambda;
                break;
            }
            hi = lambda;
            hi_distance = d;
        }
    }

    if lo > 0.0 && hi.is_finite() {
        for _ in 0..options.max_bisection_iters {
            if (epsilon - hi_distance) / epsilon <= options.relative_tolerance {
                break;
            }
            if hi / lo <= 1.0 + 1e-12 {
                break;
            }
            let mid = (lo * hi).sqrt();
            let d = search.probe(mid)?;
            if d > epsilon {
                lo = mid;
            } else {
                hi = mid;
                hi_distance = d;
            }
        }
    }

    let value = search.best_value;
    Ok(WorstCase {
        value,
        nominal,
        lower_bound: search.lower_bound.min(value),
        epsilon,
        witness: search.best_w,
        distance: search.best_distance,
    })
}

struct MultiplierSearch<'a> {
    payoff: &'a [f64],
    p: &'a [f64],
    gram: &'a Gram,
    epsilon: f64,
    lipschitz: f64,
    options: &'a SolverOptions,
    warm: Vec<f64>,
    best_w: Vec<f64>,
    best_value: f64,
    best_distance: f64,
    lower_bound: f64,
}

impl MultiplierSearch<'_> {
    /// Solve the penalized problem at `lambda`, record the dual bound and
    /// any improved feasible point. Returns `‖w̃ − p‖_K`.
    fn probe(&mut self, lambda: f64) -> Result<f64> {
        let n = self.p.len();
        let step = 1.0 / (2.0 * lambda * self.lipschitz);
        let mut x = self.warm.clone();
        let mut y = x.clone();
        let mut t = 1.0_f64;
        let mut grad = vec![0.0; n];
        let mut shifted = vec![0.0; n];

        for _ in 0..self.options.max_inner_iters {
            self.gradient(lambda, &y, &mut grad);
            for i in 0..n {
                shifted[i] = y[i] - step * grad[i];
            }
            let x_next = project_onto_simplex(&shifted);
            let t_next = 0.5 * (1.0 + (1.0 + 4.0 * t * t).sqrt());
            let momentum = (t - 1.0) / t_next;
            let mut change = 0.0_f64;
            for i in 0..n {
                let delta = x_next[i] - x[i];
                change = change.max(delta.abs());
                y[i] = x_next[i] + momentum * delta;
            }
            x = x_next;
            t = t_next;
            if change <= self.options.inner_tolerance {
                break;
            }
        }

        self.gradient(lambda, &x, &mut grad);
        let distance = kernel_distance(&x, self.p, self.gram)?;
        let value = dot(self.payoff, &x);
        let penalized = value + lambda * distance * distance;
        let min_grad = grad.iter().cloned().fold(f64::INFINITY, f64::min);
        let fw_gap = (dot(&grad, &x) - min_grad).max(0.0);
        let bound = penalized - fw_gap - lambda * self.epsilon * self.epsilon;
        if !(bound.is_finite() && value.is_finite()) {
            return Err(Error::NumericalInstability(format!(
                "worst-case solver diverged at multiplier {lambda:.3e}"
            )));
        }

        self.lower_bound = self.lower_bound.max(bound);
        if distance <= self.epsilon && value < self.best_value {
            self.best_value = value;
            self.best_distance = distance;
            self.best_w = x.clone();
        }
        self.warm = x;
        Ok(distance)
    }

    /// `∇ = u + 2λ K (w − p)`
    fn gradient(&self, lambda: f64, w: &[f64], out: &mut [f64]) {
        let diff: Vec<f64> = w.iter().zip(self.p).map(|(a, b)| a - b).collect();
        self.gram.mul_vec_into(&diff, out);
        for (o, u) in out.iter_mut().zip(self.payoff) {
            *o = u + 2.0 * lambda * *o;
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::distribution::discrete_normal;
    use crate::math::grid::make_grid;
    use crate::math::kernel::SquaredExponential;
    use crate::math::mmd::mmd_with_gram;

    fn identity(n: usize) -> Gram {
        Gram::from_fn(n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    #[test]
    fn test_zero_margin_is_nominal() {
        let p = DiscreteDistribution::new(vec![0.25, 0.75]).unwrap();
        let wc = worst_case_expectation(&[1.0, 3.0], &p, &identity(2), 0.0, &SolverOptions::default())
            .unwrap();
        assert_eq!(wc.value, 2.5);
        assert_eq!(wc.nominal, 2.5);
        assert_eq!(wc.gap(), 0.0);
    }

    #[test]
    fn test_large_margin_reaches_vertex() {
        let p = DiscreteDistribution::uniform(3).unwrap();
        let wc = worst_case_expectation(
            &[2.0, -1.0, 0.5],
            &p,
            &identity(3),
            10.0,
            &SolverOptions::default(),
        )
        .unwrap();
        assert_eq!(wc.value, -1.0);
        assert_eq!(wc.witness, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_identity_kernel_closed_form() {
        // Moving s mass from index 1 to index 0 costs distance sqrt(2) s.
        let p = DiscreteDistribution::uniform(2).unwrap();
        let eps = 0.2;
        let expected = 0.5 - eps / 2.0_f64.sqrt();
        let wc = worst_case_expectation(&[0.0, 1.0], &p, &identity(2), eps, &SolverOptions::default())
            .unwrap();
        assert!(wc.distance <= eps);
        assert!((wc.value - expected).abs() < 1e-3, "value {}", wc.value);
        assert!(wc.lower_bound <= expected + 1e-9);
        assert!(wc.value >= expected - 1e-9);
        assert!(wc.gap() < 1e-2);
    }

    #[test]
    fn test_constant_payoff_is_exact() {
        let p = DiscreteDistribution::uniform(4).unwrap();
        let wc = worst_case_expectation(&[0.7; 4], &p, &identity(4), 0.3, &SolverOptions::default())
            .unwrap();
        assert!((wc.value - 0.7).abs() < 1e-15);
    }

    #[test]
    fn test_se_kernel_bounds_hold() {
        let grid = make_grid(0.0, 1.0, 20).unwrap();
        let kernel = SquaredExponential::isotropic(0.1, 1).unwrap();
        let gram = kernel.gram_1d(grid.points());
        let p = discrete_normal(grid.points(), 0.5, 0.05).unwrap();
        let q = discrete_normal(grid.points(), 0.49, 0.06).unwrap();
        let eps = mmd_with_gram(&p, &q, &gram).unwrap();
        let u: Vec<f64> = grid.points().iter().map(|x| (6.0 * x).sin()).collect();

        let wc = worst_case_expectation(&u, &p, &gram, eps, &SolverOptions::default()).unwrap();
        let q_value: f64 = q.weights().iter().zip(&u).map(|(a, b)| a * b).sum();
        assert!(wc.value <= wc.nominal + 1e-12);
        assert!(wc.value <= q_value + 1e-9, "truth lies inside the ball");
        assert!(wc.lower_bound <= wc.value);
        assert!(wc.distance <= eps);
        let mass: f64 = wc.witness.iter().sum();
        assert!((mass - 1.0).abs() < 1e-9);
        assert!(wc.witness.iter().all(|w| *w >= 0.0));
    }

    #[test]
    fn test_shape_and_range_errors() {
        let p = DiscreteDistribution::uniform(2).unwrap();
        let opts = SolverOptions::default();
        assert!(matches!(
            worst_case_expectation(&[1.0], &p, &identity(2), 0.1, &opts),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            worst_case_expectation(&[1.0, 2.0], &p, &identity(2), -0.1, &opts),
            Err(Error::InvalidRange(_))
        ));
        assert!(matches!(
            worst_case_expectation(&[f64::NAN, 2.0], &p, &identity(2), 0.1, &opts),
            Err(Error::NumericalInstability(_))
        ));
    }
}
