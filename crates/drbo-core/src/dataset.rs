//! Paired query points and noisy observations.

use drbo_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Query points with their observations, kept in lock step.
///
/// The only way to grow a dataset is [`Dataset::extend`]; nothing is ever
/// removed or overwritten.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataset")]
pub struct Dataset {
    query_points: Vec<Vec<f64>>,
    observations: Vec<f64>,
}

#[derive(Deserialize)]
struct RawDataset {
    query_points: Vec<Vec<f64>>,
    observations: Vec<f64>,
}

impl TryFrom<RawDataset> for Dataset {
    type Error = Error;

    fn try_from(raw: RawDataset) -> Result<Self> {
        Dataset::new(raw.query_points, raw.observations)
    }
}

impl Dataset {
    /// Pair query points with observations.
    ///
    /// Every point must have the same number of coordinates and every
    /// observation must be finite.
    pub fn new(query_points: Vec<Vec<f64>>, observations: Vec<f64>) -> Result<Self> {
        if query_points.len() != observations.len() {
            return Err(Error::shape(
                "dataset observations",
                query_points.len(),
                observations.len(),
            ));
        }
        if let Some(first) = query_points.first() {
            let dims = first.len();
            if let Some(bad) = query_points.iter().find(|p| p.len() != dims) {
                return Err(Error::shape("dataset query point", dims, bad.len()));
            }
        }
        if let Some((i, y)) = observations
            .iter()
            .enumerate()
            .find(|(_, y)| !y.is_finite())
        {
            return Err(Error::NumericalInstability(format!(
                "observation {i} is {y}"
            )));
        }
        Ok(Self {
            query_points,
            observations,
        })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Coordinates per point, or `None` while empty.
    pub fn dims(&self) -> Option<usize> {
        self.query_points.first().map(Vec::len)
    }

    pub fn query_points(&self) -> &[Vec<f64>] {
        &self.query_points
    }

    pub fn observations(&self) -> &[f64] {
        &self.observations
    }

    /// Append every pair of `other`, keeping insertion order.
    pub fn extend(&mut self, other: Dataset) -> Result<()> {
        if let (Some(mine), Some(theirs)) = (self.dims(), other.dims()) {
            if mine != theirs {
                return Err(Error::shape("dataset extend", mine, theirs));
            }
        }
        self.query_points.extend(other.query_points);
        self.observations.extend(other.observations);
        Ok(())
    }

    /// Index of the largest observation (first on ties).
    pub fn best_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, &y) in self.observations.iter().enumerate() {
            match best {
                Some((_, b)) if y <= b => {}
                _ => best = Some((i, y)),
            }
        }
        best.map(|(i, _)| i)
    }
}
