//! Pairwise ground-plane distances and threshold classification.

use serde::Serialize;

use crate::{MeasureError, WorldPoint};

/// Default minimum separation in meters.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 1.5;

/// Distance between points `i` and `j` (`i < j`) of one frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PairDistance {
    pub i: usize,
    pub j: usize,
    pub distance: f64,
    pub violating: bool,
}

/// Classifies every unordered pair of mapped points against a threshold.
#[derive(Clone, Copy, Debug)]
pub struct DistanceEngine {
    threshold: f64,
}

impl Default for DistanceEngine {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }
}

impl DistanceEngine {
    /// Threshold must be finite and positive.
    pub fn new(threshold: f64) -> Result<Self, MeasureError> {
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MeasureError::invalid(format!(
                "distance threshold must be a positive number of meters, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Strictly closer than the threshold. A distance equal to the threshold is fine.
    pub fn is_violation(&self, distance: f64) -> bool {
        distance < self.threshold
    }

    /// All `N*(N-1)/2` pairs in `(0,1), (0,2), .., (1,2), ..` order.
    pub fn measure(&self, points: &[WorldPoint]) -> Vec<PairDistance> {
        let n = points.len();
        let mut pairs = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                let distance = points[i].distance_to(&points[j]);
                pairs.push(PairDistance {
                    i,
                    j,
                    distance,
                    violating: self.is_violation(distance),
                });
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<WorldPoint> {
        (0..n)
            .map(|k| WorldPoint::new(k as f64 * 0.7, (k % 3) as f64))
            .collect()
    }

    #[test]
    fn pair_count_is_n_choose_two() {
        let engine = DistanceEngine::default();
        for n in 0..8 {
            assert_eq!(engine.measure(&points(n)).len(), n * n.saturating_sub(1) / 2);
        }
    }

    #[test]
    fn each_unordered_pair_appears_once_in_order() {
        let pairs = DistanceEngine::default().measure(&points(4));
        let indices: Vec<_> = pairs.iter().map(|p| (p.i, p.j)).collect();
        assert_eq!(
            indices,
            vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]
        );
    }

    #[test]
    fn threshold_boundary_is_strict() {
        let engine = DistanceEngine::default();
        let at = engine.measure(&[WorldPoint::new(0.0, 0.0), WorldPoint::new(1.5, 0.0)]);
        assert_eq!(at[0].distance, 1.5);
        assert!(!at[0].violating);

        let below = engine.measure(&[
            WorldPoint::new(0.0, 0.0),
            WorldPoint::new(1.5 - 1e-9, 0.0),
        ]);
        assert!(below[0].violating);
    }

    #[test]
    fn one_meter_apart_depends_on_threshold() {
        let pts = [WorldPoint::new(0.0, 0.0), WorldPoint::new(1.0, 0.0)];
        let default = DistanceEngine::default().measure(&pts);
        assert!(default[0].violating);
        assert_eq!(format!("{:.2}", default[0].distance), "1.00");

        let tight = DistanceEngine::new(0.5).unwrap().measure(&pts);
        assert!(!tight[0].violating);
    }

    #[test]
    fn invalid_thresholds_are_rejected() {
        assert!(DistanceEngine::new(0.0).is_err());
        assert!(DistanceEngine::new(-1.0).is_err());
        assert!(DistanceEngine::new(f64::NAN).is_err());
    }
}
