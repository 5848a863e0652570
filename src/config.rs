//! Engine configuration.
//!
//! Every tunable of the congestion engine lives in [`CongestionConfig`].
//! Hosts are expected to keep values in range (a UI slider usually does);
//! [`CongestionConfig::validate`] reports the first bad value and
//! [`CongestionConfig::clamped`] forces everything into range. The engine
//! always runs on a clamped copy.

use thiserror::Error;
use crate::segments::{GroupingConfig, MIN_SEGMENT_LENGTH};

/// Smallest density radius the engine accepts (meters).
pub const MIN_DENSITY_RADIUS: f64 = 0.1;

/// Smallest rolling-window sampling interval (seconds).
pub const MIN_SAMPLE_INTERVAL: f64 = 0.01;

/// Smallest histogram bin width (density units).
pub const MIN_BIN_WIDTH: f64 = 1e-4;

/// Which statistic a segment group reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StatMode {
    /// One of the [`AverageMode`] statistics.
    #[default]
    Average,
    /// Highest density observed so far.
    Max,
}

/// Which average [`StatMode::Average`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AverageMode {
    /// Mean over every frame with non-zero density.
    #[default]
    Active,
    /// Density at the configured percentile rank.
    Percentile,
    /// Mean of the highest fraction of non-zero samples.
    TopFraction,
    /// Mean of non-zero samples inside the trailing time window.
    Window,
}

/// Fixed-width histogram used by the percentile and top-fraction statistics.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HistogramConfig {
    /// Bin width in runners per meter.
    /// Default: 0.01
    pub bin_width: f64,

    /// Largest representable density; higher samples land in the top bin.
    /// Default: 10.0
    pub max_value: f64,
}

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            bin_width: 0.01,
            max_value: 10.0,
        }
    }
}

impl HistogramConfig {
    pub fn bin_count(&self) -> usize {
        ((self.max_value / self.bin_width.max(MIN_BIN_WIDTH)).ceil() as usize).max(1)
    }
}

/// Configuration for [`CongestionEngine`](crate::CongestionEngine).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CongestionConfig {
    /// Neighbour radius for per-runner proximity density, in meters.
    /// Default: 5.0
    pub density_radius: f64,

    /// Divide proximity counts by the radius.
    /// Default: true
    pub normalize_density: bool,

    /// Segment length in meters.
    /// Default: 100.0
    pub segment_length: f64,

    /// Reported group statistic.
    /// Default: Average
    pub stat_mode: StatMode,

    /// Average used when `stat_mode` is `Average`.
    /// Default: Active
    pub average_mode: AverageMode,

    /// Trailing window for the rolling average, in simulated seconds.
    /// Default: 180.0
    pub window_seconds: f64,

    /// Rolling-window sampling interval, in simulated seconds.
    /// Default: 1.0
    pub sample_interval: f64,

    /// Percentile rank in (0, 1].
    /// Default: 0.9
    pub percentile: f64,

    /// Fraction of the highest samples averaged by `TopFraction`, in (0, 1].
    /// Default: 0.3
    pub top_fraction: f64,

    pub histogram: HistogramConfig,

    pub grouping: GroupingConfig,
}

impl Default for CongestionConfig {
    fn default() -> Self {
        Self {
            density_radius: 5.0,
            normalize_density: true,
            segment_length: 100.0,
            stat_mode: StatMode::Average,
            average_mode: AverageMode::Active,
            window_seconds: 180.0,
            sample_interval: 1.0,
            percentile: 0.9,
            top_fraction: 0.3,
            histogram: HistogramConfig::default(),
            grouping: GroupingConfig::default(),
        }
    }
}

/// A configuration value outside its valid range.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("density radius must be positive, got {0}")]
    DensityRadius(f64),

    #[error("segment length must be at least 1m, got {0}")]
    SegmentLength(f64),

    #[error("rolling window must be positive, got {0}s")]
    Window(f64),

    #[error("sample interval must be positive, got {0}s")]
    SampleInterval(f64),

    #[error("{name} must be in (0, 1], got {value}")]
    Rank { name: &'static str, value: f64 },

    #[error("histogram needs a positive bin width below max value, got width {bin_width} and max {max_value}")]
    Histogram { bin_width: f64, max_value: f64 },

    #[error("grouping tolerance must be positive, got ratio {ratio} and minimum {min}")]
    Grouping { ratio: f64, min: f64 },
}

fn in_unit_interval(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}

impl CongestionConfig {
    /// Check every field, returning the first one out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.density_radius > 0.0) {
            return Err(ConfigError::DensityRadius(self.density_radius));
        }
        if !(self.segment_length >= MIN_SEGMENT_LENGTH) {
            return Err(ConfigError::SegmentLength(self.segment_length));
        }
        if !(self.window_seconds > 0.0) {
            return Err(ConfigError::Window(self.window_seconds));
        }
        if !(self.sample_interval > 0.0) {
            return Err(ConfigError::SampleInterval(self.sample_interval));
        }
        if !in_unit_interval(self.percentile) {
            return Err(ConfigError::Rank { name: "percentile", value: self.percentile });
        }
        if !in_unit_interval(self.top_fraction) {
            return Err(ConfigError::Rank { name: "top fraction", value: self.top_fraction });
        }
        let h = &self.histogram;
        if !(h.bin_width > 0.0 && h.max_value >= h.bin_width) {
            return Err(ConfigError::Histogram { bin_width: h.bin_width, max_value: h.max_value });
        }
        let g = &self.grouping;
        if !(g.tolerance_ratio > 0.0 || g.min_tolerance > 0.0) {
            return Err(ConfigError::Grouping { ratio: g.tolerance_ratio, min: g.min_tolerance });
        }
        Ok(())
    }

    /// Copy with every field forced into its valid range.
    ///
    /// NaN values fall back to the minimum of their range.
    pub fn clamped(&self) -> Self {
        let mut config = self.clone();
        config.density_radius = config.density_radius.max(MIN_DENSITY_RADIUS);
        config.segment_length = config.segment_length.max(MIN_SEGMENT_LENGTH);
        config.sample_interval = config.sample_interval.max(MIN_SAMPLE_INTERVAL);
        config.window_seconds = config.window_seconds.max(config.sample_interval);
        config.percentile = config.percentile.max(0.01).min(1.0);
        config.top_fraction = config.top_fraction.max(0.01).min(1.0);
        config.histogram.bin_width = config.histogram.bin_width.max(MIN_BIN_WIDTH);
        config.histogram.max_value = config.histogram.max_value.max(config.histogram.bin_width);
        config.grouping.tolerance_ratio = config.grouping.tolerance_ratio.max(0.0);
        config.grouping.min_tolerance = config.grouping.min_tolerance.max(0.5);
        config.grouping.min_separation_segments = config.grouping.min_separation_segments.max(0.0);
        config
    }
}
