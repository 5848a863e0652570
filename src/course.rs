//! The course a field of runners follows.
//!
//! A [`CoursePath`] bundles the three arrays the rest of the crate needs:
//! the ordered GPS points, the cumulative distance at each point, and the
//! total length. Points are projected once at construction so that frame
//! processing only ever interpolates planar coordinates.

use geo::Coord;
use crate::{GpsPoint, geo_utils, sampler};
use crate::projection::PlanarProjector;

/// Relative slack allowed between a supplied total length and the cumulative array.
const TOTAL_LENGTH_TOLERANCE: f64 = 1e-6;

/// An immutable, distance-indexed course polyline.
#[derive(Debug, Clone)]
pub struct CoursePath {
    points: Vec<GpsPoint>,
    cumulative: Vec<f64>,
    total_length: f64,
    planar: Vec<Coord<f64>>,
    projector: PlanarProjector,
}

impl CoursePath {
    /// Build a course from raw GPS points, computing cumulative haversine distances.
    ///
    /// Invalid points are dropped. Returns `None` if fewer than 2 valid points remain.
    ///
    /// # Example
    /// ```
    /// use course_congestion::{CoursePath, GpsPoint};
    ///
    /// let points: Vec<GpsPoint> = (0..10)
    ///     .map(|i| GpsPoint::new(51.5074 + i as f64 * 0.001, -0.1278))
    ///     .collect();
    ///
    /// let course = CoursePath::from_points(&points).unwrap();
    /// assert!(course.total_length() > 900.0);
    /// ```
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        let valid: Vec<GpsPoint> = points.iter().copied().filter(|p| p.is_valid()).collect();
        if valid.len() < 2 {
            return None;
        }

        let cumulative = geo_utils::cumulative_distances(&valid);
        let total_length = cumulative.last().copied().unwrap_or(0.0);
        Some(Self::assemble(valid, cumulative, total_length))
    }

    /// Build a course from arrays produced by an external ingestion step.
    ///
    /// `cumulative` must be parallel to `points` and `total_length` must match
    /// its last entry (0.0 when empty). Degenerate courses (0 or 1 points) are
    /// accepted; they have zero length and every position on them resolves
    /// to the origin. Returns `None` when the arrays disagree.
    pub fn from_parts(points: Vec<GpsPoint>, cumulative: Vec<f64>, total_length: f64) -> Option<Self> {
        if points.len() != cumulative.len() {
            return None;
        }
        let expected = if points.len() < 2 {
            0.0
        } else {
            cumulative.last().copied().unwrap_or(0.0)
        };
        if !((total_length - expected).abs() <= TOTAL_LENGTH_TOLERANCE * expected.abs().max(1.0)) {
            return None;
        }
        Some(Self::assemble(points, cumulative, expected))
    }

    fn assemble(points: Vec<GpsPoint>, cumulative: Vec<f64>, total_length: f64) -> Self {
        let projector = PlanarProjector::for_points(&points);
        let planar = points.iter().map(|p| projector.project(p)).collect();
        Self {
            points,
            cumulative,
            total_length,
            planar,
            projector,
        }
    }

    /// Total course length in meters.
    pub fn total_length(&self) -> f64 {
        self.total_length
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// True when the course cannot place anything (fewer than 2 points).
    pub fn is_degenerate(&self) -> bool {
        self.points.len() < 2
    }

    pub fn points(&self) -> &[GpsPoint] {
        &self.points
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }

    /// Projected course points, parallel to [`points`](Self::points).
    pub fn planar_points(&self) -> &[Coord<f64>] {
        &self.planar
    }

    pub fn projector(&self) -> &PlanarProjector {
        &self.projector
    }

    /// Planar position at `distance` meters along the course.
    #[inline]
    pub fn planar_at(&self, distance: f64) -> Coord<f64> {
        sampler::planar_position(&self.planar, &self.cumulative, distance)
    }

    /// GPS position at `distance` meters along the course.
    pub fn gps_at(&self, distance: f64) -> GpsPoint {
        self.projector.unproject(self.planar_at(distance))
    }
}

/// Course from planar coordinates (meters), with exact planar cumulative distances.
#[cfg(test)]
pub(crate) fn planar_course(coords: &[(f64, f64)]) -> CoursePath {
    let projector = PlanarProjector::new(GpsPoint::new(46.0, 7.0));
    let points = coords
        .iter()
        .map(|&(x, y)| projector.unproject(Coord { x, y }))
        .collect();

    let mut cumulative = Vec::with_capacity(coords.len());
    let mut total = 0.0;
    for (i, &(x, y)) in coords.iter().enumerate() {
        if i > 0 {
            let (px, py) = coords[i - 1];
            total += (x - px).hypot(y - py);
        }
        cumulative.push(total);
    }

    CoursePath::from_parts(points, cumulative, total).expect("parallel arrays")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn straight_points(n: usize) -> Vec<GpsPoint> {
        (0..n).map(|i| GpsPoint::new(51.5 + i as f64 * 0.001, -0.12)).collect()
    }

    #[test]
    fn test_from_points_requires_two_valid() {
        assert!(CoursePath::from_points(&[]).is_none());
        assert!(CoursePath::from_points(&[GpsPoint::new(51.5, -0.1)]).is_none());
        assert!(CoursePath::from_points(&[GpsPoint::new(51.5, -0.1), GpsPoint::new(95.0, 0.0)]).is_none());
    }

    #[test]
    fn test_from_points_total_matches_polyline() {
        let points = straight_points(5);
        let course = CoursePath::from_points(&points).unwrap();
        assert!((course.total_length() - geo_utils::polyline_length(&points)).abs() < 1e-9);
        assert_eq!(course.cumulative()[0], 0.0);
        assert_eq!(course.planar_points().len(), 5);
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        let points = straight_points(3);
        assert!(CoursePath::from_parts(points.clone(), vec![0.0, 1.0], 1.0).is_none());
        assert!(CoursePath::from_parts(points, vec![0.0, 1.0, 2.0], 2.0).is_some());
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_total() {
        let points = straight_points(3);
        assert!(CoursePath::from_parts(points.clone(), vec![0.0, 100.0, 200.0], 500.0).is_none());
        assert!(CoursePath::from_parts(points, vec![0.0, 100.0, 200.0], f64::NAN).is_none());

        // A single point cannot have length
        let single = vec![GpsPoint::new(10.0, 10.0)];
        assert!(CoursePath::from_parts(single.clone(), vec![0.0], 500.0).is_none());
        assert_eq!(CoursePath::from_parts(single, vec![0.0], 0.0).unwrap().total_length(), 0.0);
    }

    #[test]
    fn test_degenerate_course_resolves_to_origin() {
        let course = CoursePath::from_parts(vec![GpsPoint::new(10.0, 10.0)], vec![0.0], 0.0).unwrap();
        assert!(course.is_degenerate());
        let c = course.planar_at(50.0);
        assert_eq!((c.x, c.y), (0.0, 0.0));
    }

    #[test]
    fn test_gps_at_endpoints() {
        let points = straight_points(4);
        let course = CoursePath::from_points(&points).unwrap();

        let start = course.gps_at(0.0);
        let end = course.gps_at(course.total_length());
        assert!(geo_utils::haversine_distance(&start, &points[0]) < 0.01);
        assert!(geo_utils::haversine_distance(&end, &points[3]) < 0.01);
    }
}
