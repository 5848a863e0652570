//! # Geographic Utilities
//!
//! Geographic helpers used when a course is loaded: great-circle distances,
//! cumulative distance along a track and bounds.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`cumulative_distances`] | Running distance from the first point, per point |
//! | [`compute_bounds`] | Bounding box of a GPS track |
//!
//! ## Example
//!
//! ```rust
//! use course_congestion::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(51.5074, -0.1278),
//!     GpsPoint::new(51.5080, -0.1290),
//!     GpsPoint::new(51.5090, -0.1300),
//! ];
//!
//! let cumulative = geo_utils::cumulative_distances(&track);
//! assert_eq!(cumulative.len(), track.len());
//! assert_eq!(cumulative[0], 0.0);
//! assert!((cumulative[2] - geo_utils::polyline_length(&track)).abs() < 1e-9);
//! ```
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees).

use geo::{Point, Haversine, Distance};
use crate::{GpsPoint, Bounds};

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters on a spherical Earth (mean radius 6,371,008.8 m).
///
/// ```rust
/// use course_congestion::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0);
/// ```
#[inline]
pub fn haversine_distance(a: &GpsPoint, b: &GpsPoint) -> f64 {
    Haversine::distance(to_point(a), to_point(b))
}

/// `geo` points are (x = longitude, y = latitude).
#[inline]
fn to_point(p: &GpsPoint) -> Point<f64> {
    Point::new(p.longitude, p.latitude)
}

/// Length of a course polyline in meters; 0.0 for fewer than 2 points.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .iter()
        .zip(points.iter().skip(1))
        .fold(0.0, |length, (a, b)| length + haversine_distance(a, b))
}

/// Cumulative distance from the first point to every point of the track.
///
/// The result has the same length as `points`, starts at 0.0 and is
/// monotonically non-decreasing; its last entry equals [`polyline_length`].
pub fn cumulative_distances(points: &[GpsPoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;

    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(&points[i - 1], point);
        }
        cumulative.push(total);
    }

    cumulative
}

// =============================================================================
// Bounding Box
// =============================================================================

/// Bounding box of a course.
///
/// Empty input yields an inverted box (`min > max`) that contains nothing.
pub fn compute_bounds(points: &[GpsPoint]) -> Bounds {
    let empty = Bounds {
        min_lat: f64::MAX,
        max_lat: f64::MIN,
        min_lng: f64::MAX,
        max_lng: f64::MIN,
    };
    points.iter().fold(empty, |b, p| Bounds {
        min_lat: b.min_lat.min(p.latitude),
        max_lat: b.max_lat.max(p.latitude),
        min_lng: b.min_lng.min(p.longitude),
        max_lng: b.max_lng.max(p.longitude),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GpsPoint::new(51.5074, -0.1278);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        let a = GpsPoint::new(30.0, -88.0);
        let b = GpsPoint::new(31.0, -88.0);
        assert!(approx_eq(haversine_distance(&a, &b), 111_195.0, 50.0));
    }

    #[test]
    fn test_polyline_length_degenerate() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[GpsPoint::new(51.5, -0.1)]), 0.0);
    }

    #[test]
    fn test_cumulative_distances_monotonic() {
        let track: Vec<GpsPoint> = (0..6)
            .map(|i| GpsPoint::new(46.0 + i as f64 * 0.001, 7.0))
            .collect();
        let cumulative = cumulative_distances(&track);

        assert_eq!(cumulative.len(), 6);
        assert_eq!(cumulative[0], 0.0);
        assert!(cumulative.windows(2).all(|w| w[1] >= w[0]));
        assert!(approx_eq(cumulative[5], polyline_length(&track), 1e-9));
    }

    #[test]
    fn test_cumulative_distances_empty() {
        assert!(cumulative_distances(&[]).is_empty());
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![
            GpsPoint::new(51.50, -0.10),
            GpsPoint::new(51.52, -0.12),
        ];
        let bounds = compute_bounds(&track);
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lng, -0.10);

        let center = bounds.center();
        assert!(approx_eq(center.latitude, 51.51, 1e-9));
        assert!(approx_eq(center.longitude, -0.11, 1e-9));
    }
}
