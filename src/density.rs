//! Proximity density: how crowded is it around each runner right now.
//!
//! For every active runner we count the runners (itself included) within
//! `radius` meters, optionally divided by the radius so that values stay
//! comparable when the radius setting changes. This is the only quadratic
//! loop of a frame; it runs on plain coordinate slices and knows nothing
//! about rendering or segments.

use geo::Coord;

/// Pairwise neighbour counter with reusable output buffers.
///
/// Buffers grow to the largest crowd seen and are never shrunk, so steady
/// state frames do not allocate.
#[derive(Debug, Default)]
pub struct ProximityDensityEngine {
    counts: Vec<u32>,
    densities: Vec<f64>,
}

impl ProximityDensityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the density of every position and return it, indexed like `positions`.
    ///
    /// Each position counts itself once; every unordered pair within
    /// `radius` increments both members. `radius` must be positive; smaller
    /// values are floored at `f64::EPSILON`.
    ///
    /// ```
    /// use course_congestion::ProximityDensityEngine;
    /// use geo::Coord;
    ///
    /// let mut engine = ProximityDensityEngine::new();
    /// let positions = [Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 0.0 }];
    /// let densities = engine.compute(&positions, 5.0, true);
    /// assert!((densities[0] - 0.4).abs() < 1e-12);
    /// assert!((densities[1] - 0.4).abs() < 1e-12);
    /// ```
    pub fn compute(&mut self, positions: &[Coord<f64>], radius: f64, normalize: bool) -> &[f64] {
        let n = positions.len();
        let radius = radius.max(f64::EPSILON);
        let radius_sq = radius * radius;

        self.counts.clear();
        self.counts.resize(n, 1);

        for i in 0..n {
            let a = positions[i];
            for j in (i + 1)..n {
                let dx = positions[j].x - a.x;
                let dy = positions[j].y - a.y;
                if dx * dx + dy * dy <= radius_sq {
                    self.counts[i] += 1;
                    self.counts[j] += 1;
                }
            }
        }

        self.finish(radius, normalize)
    }

    /// Same result as [`compute`](Self::compute), with rows counted on the rayon pool.
    ///
    /// Every row scans the whole field instead of half of it, so this only
    /// pays off for large crowds.
    #[cfg(feature = "parallel")]
    pub fn compute_parallel(&mut self, positions: &[Coord<f64>], radius: f64, normalize: bool) -> &[f64] {
        use rayon::prelude::*;

        let n = positions.len();
        let radius = radius.max(f64::EPSILON);
        let radius_sq = radius * radius;

        self.counts.clear();
        self.counts.resize(n, 0);

        self.counts.par_iter_mut().enumerate().for_each(|(i, count)| {
            let a = positions[i];
            *count = positions
                .iter()
                .filter(|b| {
                    let dx = b.x - a.x;
                    let dy = b.y - a.y;
                    dx * dx + dy * dy <= radius_sq
                })
                .count() as u32;
        });

        self.finish(radius, normalize)
    }

    fn finish(&mut self, radius: f64, normalize: bool) -> &[f64] {
        let scale = if normalize { 1.0 / radius } else { 1.0 };
        self.densities.clear();
        self.densities.extend(self.counts.iter().map(|&c| c as f64 * scale));
        &self.densities
    }

    /// Raw neighbour counts from the last computation (self included).
    pub fn counts(&self) -> &[u32] {
        &self.counts
    }

    /// Densities from the last computation.
    pub fn densities(&self) -> &[f64] {
        &self.densities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_two_runners_within_radius() {
        let mut engine = ProximityDensityEngine::new();
        let densities = engine.compute(&[c(0.0, 0.0), c(0.0, 4.0)], 5.0, true).to_vec();
        assert_eq!(engine.counts(), &[2, 2]);
        assert!((densities[0] - 0.4).abs() < 1e-12);
        assert!((densities[1] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_boundary_distance_counts() {
        let mut engine = ProximityDensityEngine::new();
        engine.compute(&[c(0.0, 0.0), c(3.0, 4.0)], 5.0, false);
        assert_eq!(engine.counts(), &[2, 2]);
    }

    #[test]
    fn test_isolated_runner_counts_itself() {
        let mut engine = ProximityDensityEngine::new();
        let densities = engine.compute(&[c(0.0, 0.0), c(100.0, 0.0)], 5.0, false);
        assert_eq!(densities, &[1.0, 1.0]);
    }

    #[test]
    fn test_empty_field() {
        let mut engine = ProximityDensityEngine::new();
        assert!(engine.compute(&[], 5.0, true).is_empty());
    }

    #[test]
    fn test_non_positive_radius_is_guarded() {
        let mut engine = ProximityDensityEngine::new();
        let densities = engine.compute(&[c(0.0, 0.0), c(0.0, 0.0)], 0.0, true);
        assert!(densities.iter().all(|d| d.is_finite()));
        assert_eq!(engine.counts(), &[2, 2]);
    }

    #[test]
    fn test_counting_is_symmetric() {
        // Irregular cluster: neighbour relation must be mutual for every pair
        let positions: Vec<Coord<f64>> = (0..40)
            .map(|i| {
                let f = i as f64;
                c((f * 7.3) % 23.0, (f * 3.1) % 17.0)
            })
            .collect();
        let radius = 4.0;

        let mut engine = ProximityDensityEngine::new();
        engine.compute(&positions, radius, false);

        for (i, a) in positions.iter().enumerate() {
            let expected = positions
                .iter()
                .filter(|b| (b.x - a.x).powi(2) + (b.y - a.y).powi(2) <= radius * radius)
                .count() as u32;
            assert_eq!(engine.counts()[i], expected, "runner {i}");
        }
    }

    #[test]
    fn test_buffers_shrink_logically_between_frames() {
        let mut engine = ProximityDensityEngine::new();
        engine.compute(&[c(0.0, 0.0), c(1.0, 0.0), c(2.0, 0.0)], 5.0, false);
        let densities = engine.compute(&[c(0.0, 0.0)], 5.0, false);
        assert_eq!(densities, &[1.0]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let positions: Vec<Coord<f64>> = (0..200)
            .map(|i| {
                let f = i as f64;
                c((f * 1.7) % 50.0, (f * 0.9) % 30.0)
            })
            .collect();

        let mut seq = ProximityDensityEngine::new();
        let expected = seq.compute(&positions, 3.0, true).to_vec();

        let mut par = ProximityDensityEngine::new();
        let actual = par.compute_parallel(&positions, 3.0, true).to_vec();

        assert_eq!(expected, actual);
    }
}
