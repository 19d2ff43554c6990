//! Discrete 1-D grids and the action × context search space.
//!
//! The search space is stored **action-major**: the point for action `a`
//! and context `c` lives at `a * n_context + c`. Every consumer indexes with
//! [`SearchSpace::index`] so the ordering stays consistent.

use std::ops::Range;

use drbo_common::{Error, Result};
use serde::{Deserialize, Serialize};

/// Strictly increasing, evenly spaced points on `[lower, upper]`.
///
/// Deserialized grids are checked to hold at least two finite, strictly
/// increasing points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct Grid {
    points: Vec<f64>,
}

impl Grid {
    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn lower(&self) -> f64 {
        self.points[0]
    }

    pub fn upper(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    /// Index of the grid point closest to `x` (first one on ties).
    pub fn nearest_index(&self, x: f64) -> usize {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for (i, &p) in self.points.iter().enumerate() {
            let d = (p - x).abs();
            if d < best_dist {
                best = i;
                best_dist = d;
            }
        }
        best
    }
}

impl TryFrom<Vec<f64>> for Grid {
    type Error = Error;

    fn try_from(points: Vec<f64>) -> Result<Self> {
        if points.len() < 2 {
            return Err(Error::InvalidRange(format!(
                "grid needs at least 2 points, got {}",
                points.len()
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(Error::InvalidRange(format!("grid point {bad} is not finite")));
        }
        if let Some(w) = points.windows(2).find(|w| w[1] <= w[0]) {
            return Err(Error::InvalidRange(format!(
                "grid points must be strictly increasing, got {} then {}",
                w[0], w[1]
            )));
        }
        Ok(Self { points })
    }
}

impl From<Grid> for Vec<f64> {
    fn from(grid: Grid) -> Self {
        grid.points
    }
}

/// Build `density` evenly spaced points on `[lower, upper]`.
///
/// Both endpoints are included exactly.
pub fn make_grid(lower: f64, upper: f64, density: usize) -> Result<Grid> {
    if !lower.is_finite() || !upper.is_finite() {
        return Err(Error::InvalidRange(format!(
            "grid bounds must be finite, got [{lower}, {upper}]"
        )));
    }
    if upper <= lower {
        return Err(Error::InvalidRange(format!(
            "grid upper bound {upper} must exceed lower bound {lower}"
        )));
    }
    if density < 2 {
        return Err(Error::InvalidRange(format!(
            "grid density must be at least 2, got {density}"
        )));
    }

    let step = (upper - lower) / (density - 1) as f64;
    let mut points: Vec<f64> = (0..density).map(|i| lower + step * i as f64).collect();
    points[density - 1] = upper;
    Ok(Grid { points })
}

/// Cartesian product of an action grid and a context grid.
///
/// Only the two grids are read back on deserialization; the points are
/// rebuilt from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "SearchSpaceGrids")]
pub struct SearchSpace {
    action: Grid,
    context: Grid,
    points: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct SearchSpaceGrids {
    action: Grid,
    context: Grid,
}

impl From<SearchSpaceGrids> for SearchSpace {
    fn from(grids: SearchSpaceGrids) -> Self {
        cartesian(&grids.action, &grids.context)
    }
}

/// All `(action, context)` pairs, action varying slowest.
pub fn cartesian(action: &Grid, context: &Grid) -> SearchSpace {
    let mut points = Vec::with_capacity(action.len() * context.len());
    for &a in action.points() {
        for &c in context.points() {
            points.push([a, c]);
        }
    }
    SearchSpace {
        action: action.clone(),
        context: context.clone(),
        points,
    }
}

impl SearchSpace {
    pub fn action_grid(&self) -> &Grid {
        &self.action
    }

    pub fn context_grid(&self) -> &Grid {
        &self.context
    }

    pub fn points(&self) -> &[[f64; 2]] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Flat index of `(action_index, context_index)`.
    pub fn index(&self, action_index: usize, context_index: usize) -> usize {
        action_index * self.context.len() + context_index
    }

    /// Indices of every context point paired with `action_index`.
    pub fn context_slice(&self, action_index: usize) -> Range<usize> {
        let start = self.index(action_index, 0);
        start..start + self.context.len()
    }

    /// Points as owned rows, the shape models and observers consume.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.points.iter().map(|p| p.to_vec()).collect()
    }

    /// Rows for a single action across the whole context grid.
    pub fn action_rows(&self, action_index: usize) -> Vec<Vec<f64>> {
        self.points[self.context_slice(action_index)]
            .iter()
            .map(|p| p.to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_make_grid_two_points() {
        let grid = make_grid(0.0, 1.0, 2).unwrap();
        assert_eq!(grid.points(), &[0.0, 1.0]);
    }

    #[test]
    fn test_make_grid_endpoints_exact() {
        let grid = make_grid(0.1, 0.7, 7).unwrap();
        assert_eq!(grid.len(), 7);
        assert_eq!(grid.lower(), 0.1);
        assert_eq!(grid.upper(), 0.7);
        for w in grid.points().windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn test_make_grid_rejects_bad_range() {
        assert!(matches!(make_grid(1.0, 1.0, 5), Err(Error::InvalidRange(_))));
        assert!(matches!(make_grid(2.0, 1.0, 5), Err(Error::InvalidRange(_))));
        assert!(matches!(make_grid(0.0, 1.0, 1), Err(Error::InvalidRange(_))));
        assert!(matches!(
            make_grid(0.0, f64::INFINITY, 5),
            Err(Error::InvalidRange(_))
        ));
    }

    #[test]
    fn test_cartesian_is_action_major() {
        let a = make_grid(0.0, 1.0, 3).unwrap();
        let c = make_grid(0.0, 1.0, 2).unwrap();
        let space = cartesian(&a, &c);
        assert_eq!(space.len(), 6);
        assert_eq!(space.points()[0], [0.0, 0.0]);
        assert_eq!(space.points()[1], [0.0, 1.0]);
        assert_eq!(space.points()[2], [0.5, 0.0]);
        assert_eq!(space.index(2, 1), 5);
        assert_eq!(space.context_slice(1), 2..4);
    }

    #[test]
    fn test_action_rows() {
        let a = make_grid(0.0, 1.0, 3).unwrap();
        let c = make_grid(0.0, 1.0, 4).unwrap();
        let space = cartesian(&a, &c);
        let rows = space.action_rows(2);
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r[0] == 1.0));
    }

    #[test]
    fn test_serde_validates() {
        let grid: Grid = serde_json::from_str("[0.0, 0.5, 1.0]").unwrap();
        assert_eq!(grid.upper(), 1.0);
        assert_eq!(serde_json::to_string(&grid).unwrap(), "[0.0,0.5,1.0]");
        assert!(serde_json::from_str::<Grid>("[]").is_err());
        assert!(serde_json::from_str::<Grid>("[0.5]").is_err());
        assert!(serde_json::from_str::<Grid>("[0.0, 1.0, 0.5]").is_err());
        assert!(serde_json::from_str::<Grid>("[0.0, 0.0]").is_err());
    }

    #[test]
    fn test_search_space_serde_rebuilds_points() {
        let a = make_grid(0.0, 1.0, 3).unwrap();
        let c = make_grid(0.0, 1.0, 2).unwrap();
        let space = cartesian(&a, &c);
        let json = serde_json::to_string(&space).unwrap();
        let back: SearchSpace = serde_json::from_str(&json).unwrap();
        assert_eq!(back.points(), space.points());

        let tampered = r#"{"action":[0.0,1.0],"context":[],"points":[]}"#;
        assert!(serde_json::from_str::<SearchSpace>(tampered).is_err());
    }

    #[test]
    fn test_nearest_index() {
        let grid = make_grid(0.0, 1.0, 11).unwrap();
        assert_eq!(grid.nearest_index(0.31), 3);
        assert_eq!(grid.nearest_index(-4.0), 0);
        assert_eq!(grid.nearest_index(9.0), 10);
    }
}
