//! Negated Branin–Hoo function.
//!
//! Inputs in the configured box are mapped affinely onto the classic domain
//! `x₁ ∈ [-5, 10]`, `x₂ ∈ [0, 15]`. The function is negated so that the three
//! global minimizers (value `0.397887`) become maximizers.

use std::f64::consts::PI;

use drbo_common::{Error, Result};

use super::{check_points, Objective};

const X1_RANGE: (f64, f64) = (-5.0, 10.0);
const X2_RANGE: (f64, f64) = (0.0, 15.0);

/// Global minimum of the unnegated Branin function.
pub const BRANIN_MINIMUM: f64 = 0.397_887_357_729_738;

#[derive(Debug, Clone)]
pub struct Branin {
    lowers: [f64; 2],
    uppers: [f64; 2],
}

impl Branin {
    pub fn new(lowers: &[f64], uppers: &[f64]) -> Result<Self> {
        if lowers.len() != 2 {
            return Err(Error::shape("branin lowers", 2, lowers.len()));
        }
        if uppers.len() != 2 {
            return Err(Error::shape("branin uppers", 2, uppers.len()));
        }
        for d in 0..2 {
            if !(lowers[d].is_finite() && uppers[d].is_finite() && uppers[d] > lowers[d]) {
                return Err(Error::InvalidRange(format!(
                    "branin bounds for dimension {d} must satisfy lower < upper"
                )));
            }
        }
        Ok(Self {
            lowers: [lowers[0], lowers[1]],
            uppers: [uppers[0], uppers[1]],
        })
    }

    /// Map a point of the configured box onto the classic domain.
    pub fn to_domain(&self, p: &[f64]) -> (f64, f64) {
        let u1 = (p[0] - self.lowers[0]) / (self.uppers[0] - self.lowers[0]);
        let u2 = (p[1] - self.lowers[1]) / (self.uppers[1] - self.lowers[1]);
        (
            X1_RANGE.0 + u1 * (X1_RANGE.1 - X1_RANGE.0),
            X2_RANGE.0 + u2 * (X2_RANGE.1 - X2_RANGE.0),
        )
    }
}

/// The classic (minimization) Branin function.
pub fn branin(x1: f64, x2: f64) -> f64 {
    let b = 5.1 / (4.0 * PI * PI);
    let c = 5.0 / PI;
    let t = 1.0 / (8.0 * PI);
    let term = x2 - b * x1 * x1 + c * x1 - 6.0;
    term * term + 10.0 * (1.0 - t) * x1.cos() + 10.0
}

impl Objective for Branin {
    fn dims(&self) -> usize {
        2
    }

    fn evaluate(&self, points: &[Vec<f64>]) -> Result<Vec<f64>> {
        check_points("branin", 2, points)?;
        Ok(points
            .iter()
            .map(|p| {
                let (x1, x2) = self.to_domain(p);
                -branin(x1, x2)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "branin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_minimizers() {
        for (x1, x2) in [(-PI, 12.275), (PI, 2.275), (9.424_78, 2.475)] {
            assert!((branin(x1, x2) - BRANIN_MINIMUM).abs() < 1e-4);
        }
    }

    #[test]
    fn test_unit_box_maps_to_domain() {
        let f = Branin::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        assert_eq!(f.to_domain(&[0.0, 0.0]), (-5.0, 0.0));
        assert_eq!(f.to_domain(&[1.0, 1.0]), (10.0, 15.0));
    }

    #[test]
    fn test_negated_maximum() {
        let f = Branin::new(&[0.0, 0.0], &[1.0, 1.0]).unwrap();
        let p = vec![(PI + 5.0) / 15.0, 2.275 / 15.0];
        let v = f.evaluate(&[p]).unwrap()[0];
        assert!((v + BRANIN_MINIMUM).abs() < 1e-4);

        let elsewhere = f.evaluate(&[vec![0.0, 0.0]]).unwrap()[0];
        assert!(elsewhere < v);
    }

    #[test]
    fn test_rejects_bad_bounds() {
        assert!(Branin::new(&[0.0], &[1.0]).is_err());
        assert!(Branin::new(&[0.0, 1.0], &[1.0, 0.5]).is_err());
    }
}
