//! Numerically stable log-domain primitives.

/// 0.5 * ln(2*pi)
pub const LOG_SQRT_2PI: f64 = 0.918_938_533_204_672_8;

/// Stable log(sum(exp(values))).
///
/// Returns NEG_INFINITY for empty input or all -inf inputs.
pub fn log_sum_exp(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    if values.iter().any(|v| v.is_nan()) {
        return f64::NAN;
    }
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    if max == f64::INFINITY {
        return f64::INFINITY;
    }
    let mut sum = 0.0;
    for v in values {
        sum += (*v - max).exp();
    }
    max + sum.ln()
}

/// Turn unnormalized log weights into probabilities that sum to 1.
///
/// Returns `None` when the weights carry no mass (empty, all -inf) or
/// contain NaN/+inf.
pub fn normalize_log_weights(log_weights: &[f64]) -> Option<Vec<f64>> {
    let total = log_sum_exp(log_weights);
    if !total.is_finite() {
        return None;
    }
    Some(log_weights.iter().map(|lw| (lw - total).exp()).collect())
}

/// Log density of `N(mean, variance)` at `x`.
///
/// Non-positive variance yields NaN.
pub fn normal_log_pdf(x: f64, mean: f64, variance: f64) -> f64 {
    if !(variance > 0.0) {
        return f64::NAN;
    }
    let z = x - mean;
    -LOG_SQRT_2PI - 0.5 * variance.ln() - 0.5 * z * z / variance
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        (a - b).abs() <= tol
    }

    #[test]
    fn log_sum_exp_basic() {
        let v = [0.0, 0.0];
        let out = log_sum_exp(&v);
        assert!(approx_eq(out, 2.0f64.ln(), 1e-12));
    }

    #[test]
    fn log_sum_exp_dominance() {
        let v = [-1000.0, 0.0];
        let out = log_sum_exp(&v);
        assert!(approx_eq(out, 0.0, 1e-12));
    }

    #[test]
    fn log_sum_exp_all_neg_inf() {
        let v = [f64::NEG_INFINITY, f64::NEG_INFINITY];
        let out = log_sum_exp(&v);
        assert!(out.is_infinite() && out.is_sign_negative());
    }

    #[test]
    fn log_sum_exp_nan_propagates() {
        let out = log_sum_exp(&[0.0, f64::NAN]);
        assert!(out.is_nan());
    }

    #[test]
    fn normalize_log_weights_sums_to_one() {
        let w = normalize_log_weights(&[-800.0, -801.0, -802.5]).unwrap();
        let total: f64 = w.iter().sum();
        assert!(approx_eq(total, 1.0, 1e-12));
        assert!(w[0] > w[1] && w[1] > w[2]);
    }

    #[test]
    fn normalize_log_weights_no_mass() {
        assert!(normalize_log_weights(&[]).is_none());
        assert!(normalize_log_weights(&[f64::NEG_INFINITY]).is_none());
    }

    #[test]
    fn normal_log_pdf_standard() {
        assert!(approx_eq(normal_log_pdf(0.0, 0.0, 1.0), -LOG_SQRT_2PI, 1e-15));
        let expected = -LOG_SQRT_2PI - 0.5 * 4.0_f64.ln() - 0.5 * 1.0 / 4.0;
        assert!(approx_eq(normal_log_pdf(2.0, 1.0, 4.0), expected, 1e-12));
        assert!(normal_log_pdf(0.0, 0.0, 0.0).is_nan());
    }
}
