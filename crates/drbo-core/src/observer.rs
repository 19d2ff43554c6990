//! Noisy evaluation of an objective.

use drbo_common::{Error, Result};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::dataset::Dataset;
use crate::objective::Objective;

/// Evaluates an objective and adds i.i.d. Gaussian noise.
///
/// The observer owns its random stream, so the noise sequence depends only
/// on the seed and the number of points observed so far.
pub struct NoisyObserver<'a, O: ?Sized> {
    objective: &'a O,
    noise_std: f64,
    obs_variance: f64,
    rng: StdRng,
}

impl<'a, O: Objective + ?Sized> NoisyObserver<'a, O> {
    pub fn new(objective: &'a O, obs_variance: f64, rng: StdRng) -> Result<Self> {
        if !(obs_variance.is_finite() && obs_variance >= 0.0) {
            return Err(Error::InvalidRange(format!(
                "observation variance must be finite and >= 0, got {obs_variance}"
            )));
        }
        Ok(Self {
            objective,
            noise_std: obs_variance.sqrt(),
            obs_variance,
            rng,
        })
    }

    pub fn objective(&self) -> &'a O {
        self.objective
    }

    pub fn obs_variance(&self) -> f64 {
        self.obs_variance
    }

    /// `y_i = f(x_i) + ε_i` with `ε_i ~ N(0, obs_variance)`.
    pub fn observe(&mut self, points: &[Vec<f64>]) -> Result<Dataset> {
        let dims = self.objective.dims();
        if let Some(bad) = points.iter().find(|p| p.len() != dims) {
            return Err(Error::shape("observer query point", dims, bad.len()));
        }
        let clean = self.objective.evaluate(points)?;
        let noisy = clean
            .into_iter()
            .map(|y| {
                let z: f64 = self.rng.sample(StandardNormal);
                y + self.noise_std * z
            })
            .collect();
        Dataset::new(points.to_vec(), noisy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    struct Constant(f64);

    impl Objective for Constant {
        fn dims(&self) -> usize {
            2
        }

        fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
            Ok(vec![self.0; points.len()])
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    #[test]
    fn test_zero_noise_is_exact() {
        let f = Constant(1.5);
        let mut obs = NoisyObserver::new(&f, 0.0, StdRng::seed_from_u64(0)).unwrap();
        let d = obs.observe(&[vec![0.0, 0.0], vec![1.0, 1.0]]).unwrap();
        assert_eq!(d.observations(), &[1.5, 1.5]);
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_noise_has_requested_scale() {
        let f = Constant(0.0);
        let mut obs = NoisyObserver::new(&f, 0.25, StdRng::seed_from_u64(11)).unwrap();
        let points = vec![vec![0.5, 0.5]; 4000];
        let d = obs.observe(&points).unwrap();
        let n = d.len() as f64;
        let mean = d.observations().iter().sum::<f64>() / n;
        let var = d.observations().iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n;
        assert!(mean.abs() < 0.05);
        assert!((var - 0.25).abs() < 0.03);
    }

    #[test]
    fn test_same_seed_same_noise() {
        let f = Constant(0.0);
        let points = vec![vec![0.1, 0.2]; 5];
        let mut a = NoisyObserver::new(&f, 1e-3, StdRng::seed_from_u64(3)).unwrap();
        let mut b = NoisyObserver::new(&f, 1e-3, StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a.observe(&points).unwrap(), b.observe(&points).unwrap());
    }

    #[test]
    fn test_rejects_wrong_arity() {
        let f = Constant(0.0);
        let mut obs = NoisyObserver::new(&f, 1e-3, StdRng::seed_from_u64(0)).unwrap();
        let err = obs.observe(&[vec![0.1, 0.2, 0.3]]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_rejects_negative_variance() {
        let f = Constant(0.0);
        assert!(NoisyObserver::new(&f, -1.0, StdRng::seed_from_u64(0)).is_err());
        assert!(NoisyObserver::new(&f, f64::NAN, StdRng::seed_from_u64(0)).is_err());
    }
}
