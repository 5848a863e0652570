//! # Course Congestion
//!
//! Crowd analytics for simulated runners on a fixed course.
//!
//! This library provides:
//! - Per-runner proximity density, recomputed every animation frame
//! - Fixed-length course segmentation with overlap grouping, so the two
//!   lanes of an out-and-back are scored as one place
//! - Streaming per-group statistics (active average, rolling window,
//!   percentile, top-fraction mean, max) that reset when time rewinds
//!
//! ## Features
//!
//! - **`serde`** - Serialize/deserialize configuration and core types
//! - **`parallel`** - Count neighbours on the rayon pool for large fields
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use course_congestion::{CongestionConfig, CongestionEngine, CoursePath, GpsPoint, Runner};
//!
//! // A 2 km course heading east
//! let points: Vec<GpsPoint> = (0..=20)
//!     .map(|i| GpsPoint::new(51.5074, -0.1278 + i as f64 * 0.00144))
//!     .collect();
//! let course = Arc::new(CoursePath::from_points(&points).unwrap());
//!
//! // Two waves of runners, 5:00/km and 6:00/km
//! let runners: Vec<Runner> = (0..50)
//!     .map(|i| Runner::new(i, i % 2, (i / 2) as f64, if i % 2 == 0 { 300.0 } else { 360.0 }))
//!     .collect();
//!
//! let mut engine = CongestionEngine::new(course, runners, CongestionConfig::default());
//! for t in 0..120 {
//!     engine.advance(t as f64, true);
//! }
//!
//! let frame = engine.advance(120.0, true);
//! for (i, segment) in frame.segments.iter().enumerate() {
//!     if let Some(value) = segment.value {
//!         println!("segment {}: {:.3} runners/m", i, value);
//!     }
//! }
//! ```

pub mod geo_utils;
pub mod projection;
pub mod course;
pub mod sampler;
pub mod density;
pub mod segments;
pub mod stats;
pub mod config;
pub mod engine;

pub use projection::PlanarProjector;
pub use course::CoursePath;
pub use sampler::RunnerPhase;
pub use density::ProximityDensityEngine;
pub use segments::{
    GroupingConfig, SegmentLayout, SegmentGroups, UnionFind,
    build_groups, segment_separation,
};
pub use stats::{
    ActiveAverage, RollingWindow, DensityHistogram,
    GroupStats, StatSettings, TemporalAggregator,
};
pub use config::{AverageMode, CongestionConfig, ConfigError, HistogramConfig, StatMode};
pub use engine::{CongestionEngine, Frame, FrameSummary, RunnerSample, SegmentSample};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use course_congestion::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds.
    pub fn center(&self) -> GpsPoint {
        GpsPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// A simulated participant.
///
/// Runners move at constant pace from their start time and never change
/// after creation; a new wave setup replaces the whole field.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Runner {
    pub id: u32,
    /// Start wave the runner belongs to.
    pub wave: u32,
    /// Simulated time the runner crosses the start line (seconds).
    pub start_time: f64,
    /// Seconds per kilometre.
    pub pace: f64,
}

impl Runner {
    pub fn new(id: u32, wave: u32, start_time: f64, pace: f64) -> Self {
        Self { id, wave, start_time, pace }
    }
}
