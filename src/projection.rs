//! Local tangent-plane projection.
//!
//! Course-sized areas (a few tens of kilometres) are small enough that an
//! equirectangular projection about a fixed origin keeps Euclidean distances
//! within a fraction of a percent of the haversine distance. Every per-frame
//! distance computation in this crate works on projected [`Coord`]s in metres.

use geo::Coord;
use crate::{GpsPoint, geo_utils};

/// Mean Earth radius in metres, matching the haversine metric used by `geo`.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Projects GPS points onto a plane tangent at `origin` (x = east, y = north, metres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanarProjector {
    origin: GpsPoint,
    meters_per_deg_lat: f64,
    meters_per_deg_lng: f64,
}

impl PlanarProjector {
    /// Create a projector centred on `origin`.
    pub fn new(origin: GpsPoint) -> Self {
        let meters_per_deg_lat = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        // Clamp so that the pole does not collapse longitude to zero.
        let meters_per_deg_lng = meters_per_deg_lat * origin.latitude.to_radians().cos().max(1e-6);
        Self {
            origin,
            meters_per_deg_lat,
            meters_per_deg_lng,
        }
    }

    /// Create a projector centred on the middle of the points' bounding box.
    ///
    /// Falls back to (0, 0) when `points` is empty.
    pub fn for_points(points: &[GpsPoint]) -> Self {
        if points.is_empty() {
            return Self::new(GpsPoint::new(0.0, 0.0));
        }
        Self::new(geo_utils::compute_bounds(points).center())
    }

    pub fn origin(&self) -> GpsPoint {
        self.origin
    }

    /// Project a GPS point to planar metres relative to the origin.
    #[inline]
    pub fn project(&self, point: &GpsPoint) -> Coord<f64> {
        Coord {
            x: (point.longitude - self.origin.longitude) * self.meters_per_deg_lng,
            y: (point.latitude - self.origin.latitude) * self.meters_per_deg_lat,
        }
    }

    /// Inverse of [`project`](Self::project).
    #[inline]
    pub fn unproject(&self, coord: Coord<f64>) -> GpsPoint {
        GpsPoint::new(
            self.origin.latitude + coord.y / self.meters_per_deg_lat,
            self.origin.longitude + coord.x / self.meters_per_deg_lng,
        )
    }
}
