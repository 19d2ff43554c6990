//! Euclidean projection onto the probability simplex.

/// Project `v` onto `{w : w_i >= 0, Σ w_i = 1}` (sort-based, O(n log n)).
///
/// Empty input returns an empty vector. NaN entries are treated as -inf.
pub fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    let n = v.len();
    if n == 0 {
        return Vec::new();
    }
    let clean: Vec<f64> = v
        .iter()
        .map(|x| if x.is_nan() { f64::NEG_INFINITY } else { *x })
        .collect();

    let mut sorted: Vec<f64> = clean.iter().copied().filter(|x| x.is_finite()).collect();
    if sorted.is_empty() {
        return vec![1.0 / n as f64; n];
    }
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mut cumsum = 0.0;
    let mut theta = 0.0;
    for (i, &u) in sorted.iter().enumerate() {
        cumsum += u;
        let t = (cumsum - 1.0) / (i + 1) as f64;
        if u - t > 0.0 {
            theta = t;
        }
    }

    let mut w: Vec<f64> = clean.iter().map(|x| (x - theta).max(0.0)).collect();
    let total: f64 = w.iter().sum();
    if total > 0.0 {
        for x in &mut w {
            *x /= total;
        }
    }
    w
}
