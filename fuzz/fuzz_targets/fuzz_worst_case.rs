//! Fuzz target for the MMD-ball worst-case solver.
//!
//! Any finite payoff and non-negative margin must give a feasible value
//! between `min u` and the nominal expectation, never a panic.

#![no_main]

use arbitrary::Arbitrary;
use drbo_math::{discrete_normal, make_grid, worst_case_expectation, SolverOptions, SquaredExponential};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    density: u8,
    lengthscale: f64,
    mean: f64,
    variance: f64,
    margin: f64,
    payoff: Vec<f64>,
}

fuzz_target!(|input: Input| {
    let n = (input.density as usize % 40).max(2);
    let Ok(grid) = make_grid(0.0, 1.0, n) else {
        return;
    };
    let Ok(kernel) = SquaredExponential::isotropic(input.lengthscale, 1) else {
        return;
    };
    let Ok(p) = discrete_normal(grid.points(), input.mean, input.variance) else {
        return;
    };
    let gram = kernel.gram_1d(grid.points());
    let payoff: Vec<f64> = (0..n)
        .map(|i| input.payoff.get(i).copied().unwrap_or(0.0))
        .map(|v| if v.is_finite() { v.clamp(-1e6, 1e6) } else { 0.0 })
        .collect();

    let Ok(wc) = worst_case_expectation(&payoff, &p, &gram, input.margin, &SolverOptions::default())
    else {
        return;
    };
    let low = payoff.iter().cloned().fold(f64::INFINITY, f64::min);
    let scale = payoff.iter().fold(1.0_f64, |m, v| m.max(v.abs()));
    assert!(wc.value <= wc.nominal + 1e-9 * scale);
    assert!(wc.value >= low - 1e-9 * scale);
    assert!(wc.lower_bound <= wc.value + 1e-9 * scale);
});
