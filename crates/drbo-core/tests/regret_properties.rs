//! Property-based tests for robust regret and the MMD ball.

use drbo_common::Result;
use drbo_core::metrics::robust_regret;
use drbo_core::objective::Objective;
use drbo_core::schedule::{ConstantContext, ConstantMargin};
use drbo_math::{
    discrete_normal, make_grid, mmd, worst_case_expectation, Grid, SolverOptions,
    SquaredExponential,
};
use proptest::prelude::*;

/// `f(a, c) = sin(k a) cos(c) + a c`
struct Wave {
    k: f64,
}

impl Objective for Wave {
    fn dims(&self) -> usize {
        2
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        Ok(points
            .iter()
            .map(|p| (self.k * p[0]).sin() * p[1].cos() + p[0] * p[1])
            .collect())
    }

    fn name(&self) -> &str {
        "wave"
    }
}

fn grid(n: usize) -> Grid {
    make_grid(0.0, 1.0, n).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn regret_curves_keep_their_shape(
        k in 0.5f64..8.0,
        margin in 0.0f64..0.3,
        actions in prop::collection::vec(0.0f64..1.0, 1..12),
    ) {
        let (a, c) = (grid(9), grid(9));
        let reference = ConstantContext::new(discrete_normal(c.points(), 0.5, 0.05).unwrap());
        let eps = ConstantMargin::new(margin).unwrap();
        let kernel = SquaredExponential::isotropic(0.2, 1).unwrap();
        let queries: Vec<Vec<f64>> = actions.iter().map(|x| vec![*x, 0.5]).collect();

        let curve = robust_regret(&Wave { k }, &queries, 0, &a, &c, &kernel, &reference, &eps).unwrap();

        prop_assert_eq!(curve.len(), queries.len());
        prop_assert!(curve.instantaneous.iter().all(|r| *r >= 0.0));
        for w in curve.simple.windows(2) {
            prop_assert!(w[1] <= w[0]);
        }
        for w in curve.cumulative.windows(2) {
            prop_assert!(w[1] >= w[0]);
        }
        for (i, a_t) in curve.action_indices.iter().enumerate() {
            prop_assert_eq!(*a_t, a.nearest_index(queries[i][0]));
        }
    }

    #[test]
    fn robust_optimum_shrinks_with_margin(
        k in 0.5f64..8.0,
        small in 0.0f64..0.1,
        extra in 0.0f64..0.2,
    ) {
        let (a, c) = (grid(7), grid(7));
        let reference = ConstantContext::new(discrete_normal(c.points(), 0.4, 0.08).unwrap());
        let kernel = SquaredExponential::isotropic(0.2, 1).unwrap();
        let queries = vec![vec![0.5, 0.5]];

        let narrow = robust_regret(
            &Wave { k }, &queries, 0, &a, &c, &kernel, &reference,
            &ConstantMargin::new(small).unwrap(),
        ).unwrap();
        let wide = robust_regret(
            &Wave { k }, &queries, 0, &a, &c, &kernel, &reference,
            &ConstantMargin::new(small + extra).unwrap(),
        ).unwrap();

        prop_assert!(wide.robust_optimum[0] <= narrow.robust_optimum[0] + 1e-3);
    }

    #[test]
    fn mmd_is_a_symmetric_distance(
        m1 in 0.0f64..1.0,
        m2 in 0.0f64..1.0,
        v1 in 0.01f64..0.2,
        v2 in 0.01f64..0.2,
    ) {
        let c = grid(15);
        let kernel = SquaredExponential::isotropic(0.1, 1).unwrap();
        let p = discrete_normal(c.points(), m1, v1).unwrap();
        let q = discrete_normal(c.points(), m2, v2).unwrap();

        let pq = mmd(&p, &q, &kernel, c.points()).unwrap();
        let qp = mmd(&q, &p, &kernel, c.points()).unwrap();
        let pp = mmd(&p, &p, &kernel, c.points()).unwrap();

        prop_assert!(pq >= 0.0);
        prop_assert!((pq - qp).abs() < 1e-9);
        prop_assert!(pp.abs() < 1e-6);
    }

    #[test]
    fn worst_case_stays_below_nominal(
        payoff in prop::collection::vec(-3.0f64..3.0, 11),
        margin in 0.0f64..0.5,
    ) {
        let c = grid(11);
        let kernel = SquaredExponential::isotropic(0.15, 1).unwrap();
        let gram = kernel.gram_1d(c.points());
        let p = discrete_normal(c.points(), 0.5, 0.05).unwrap();

        let wc = worst_case_expectation(&payoff, &p, &gram, margin, &SolverOptions::default()).unwrap();
        let low = payoff.iter().cloned().fold(f64::INFINITY, f64::min);

        prop_assert!(wc.value <= wc.nominal + 1e-9);
        prop_assert!(wc.value >= low - 1e-9);
        prop_assert!(wc.lower_bound <= wc.value + 1e-9);
        prop_assert!((wc.witness.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        prop_assert!(wc.witness.iter().all(|w| *w >= -1e-12));
    }
}
