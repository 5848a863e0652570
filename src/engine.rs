//! # Congestion Engine
//!
//! Drives one simulation run frame by frame. The host's clock calls
//! [`CongestionEngine::advance`] with the current simulated time; the engine
//! places every runner, computes proximity densities, counts segment
//! occupancy, feeds the [`TemporalAggregator`] while playing, and returns a
//! [`Frame`] borrowing its reusable output buffers.
//!
//! Structural changes (course, runners, segment length, grouping, histogram
//! geometry) rebuild what they invalidate and then go through
//! [`CongestionEngine::reset`].

use std::sync::Arc;
use geo::Coord;
use log::{debug, info, warn};
use crate::Runner;
use crate::config::{AverageMode, CongestionConfig, HistogramConfig, StatMode};
use crate::course::CoursePath;
use crate::density::ProximityDensityEngine;
use crate::sampler::{self, RunnerPhase};
use crate::segments::{build_groups, GroupingConfig, SegmentGroups, SegmentLayout};
use crate::stats::{StatSettings, TemporalAggregator};

/// Crowd size from which the rayon density path is used.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 512;

/// One runner in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunnerSample {
    pub id: u32,
    pub wave: u32,
    pub phase: RunnerPhase,
    /// Meters along the course.
    pub distance: f64,
    /// Planar position in the course projector's frame.
    pub position: Coord<f64>,
    /// Proximity density; 0.0 unless `phase` is `Running`.
    pub density: f64,
}

/// One course segment in a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSample {
    pub start: Coord<f64>,
    pub end: Coord<f64>,
    pub group: usize,
    /// Selected statistic of the group, `None` while the group has never been occupied.
    pub value: Option<f64>,
    /// Occupancy of this segment in this frame, in runners per meter.
    pub instant_density: f64,
}

impl SegmentSample {
    pub fn is_seen(&self) -> bool {
        self.value.is_some()
    }
}

/// Frame-level counters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameSummary {
    pub sim_time: f64,
    pub not_started: usize,
    pub running: usize,
    pub finished: usize,
    /// Highest runner density this frame.
    pub peak_density: f64,
    /// Simulated time moved backwards and statistics were cleared.
    pub rewound: bool,
    /// Statistics were accumulated (the clock was playing).
    pub recorded: bool,
}

/// Output of [`CongestionEngine::advance`].
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub summary: FrameSummary,
    /// Parallel to the engine's runner list; empty on a degenerate course.
    pub runners: &'a [RunnerSample],
    /// Parallel to the segment layout.
    pub segments: &'a [SegmentSample],
}

/// Congestion analytics for one course and one field of runners.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use course_congestion::{CongestionConfig, CongestionEngine, CoursePath, GpsPoint, Runner};
///
/// let points: Vec<GpsPoint> = (0..=10)
///     .map(|i| GpsPoint::new(47.0 + i as f64 * 0.0009, 8.0))
///     .collect();
/// let course = Arc::new(CoursePath::from_points(&points).unwrap());
///
/// // Three runners leaving together at 5:00/km
/// let runners: Vec<Runner> = (0..3).map(|id| Runner::new(id, 0, 0.0, 300.0)).collect();
///
/// let mut engine = CongestionEngine::new(course, runners, CongestionConfig::default());
/// let frame = engine.advance(15.0, true);
///
/// assert_eq!(frame.summary.running, 3);
/// assert!(frame.segments[0].is_seen());
/// assert!(!frame.segments[1].is_seen());
/// ```
#[derive(Debug)]
pub struct CongestionEngine {
    course: Arc<CoursePath>,
    runners: Vec<Runner>,
    config: CongestionConfig,
    layout: SegmentLayout,
    groups: SegmentGroups,
    density: ProximityDensityEngine,
    aggregator: TemporalAggregator,

    // Per-frame scratch, grown on demand and never shrunk
    active_positions: Vec<Coord<f64>>,
    active_runners: Vec<usize>,
    occupancy: Vec<u32>,
    runner_samples: Vec<RunnerSample>,
    segment_samples: Vec<SegmentSample>,
}

/// Validate `config`, warn about the first bad field and return a clamped copy.
fn accept_config(config: CongestionConfig) -> CongestionConfig {
    if let Err(err) = config.validate() {
        warn!("[CongestionEngine] {}; clamping configuration", err);
    }
    config.clamped()
}

impl CongestionEngine {
    pub fn new(course: Arc<CoursePath>, runners: Vec<Runner>, config: CongestionConfig) -> Self {
        let config = accept_config(config);
        let layout = SegmentLayout::build(&course, config.segment_length);
        let groups = build_groups(&layout, &config.grouping);
        let aggregator = TemporalAggregator::new(&groups, layout.segment_length(), &config);

        info!(
            "[CongestionEngine] course {:.0}m, {} runners, {} segments",
            course.total_length(),
            runners.len(),
            layout.segment_count()
        );

        let mut engine = Self {
            course,
            runners: Vec::new(),
            config,
            layout,
            groups,
            density: ProximityDensityEngine::new(),
            aggregator,
            active_positions: Vec::new(),
            active_runners: Vec::new(),
            occupancy: Vec::new(),
            runner_samples: Vec::new(),
            segment_samples: Vec::new(),
        };
        engine.reset_segment_buffers();
        engine.install_runners(runners);
        engine
    }

    // =========================================================================
    // Frame processing
    // =========================================================================

    /// Process the frame at `sim_time`.
    ///
    /// Statistics accumulate only while `playing`; positions, densities and
    /// instantaneous occupancy are computed either way so a paused scrub
    /// still shows the crowd. A time earlier than the previous frame's
    /// clears all statistics first, whether playing or not.
    ///
    /// A degenerate course (fewer than 2 points) places nobody: the frame
    /// has no runner samples, zero counts and records nothing.
    pub fn advance(&mut self, sim_time: f64, playing: bool) -> Frame<'_> {
        let rewound = self.aggregator.sync_clock(sim_time);
        let degenerate = self.course.is_degenerate();

        let mut summary = FrameSummary {
            sim_time,
            rewound,
            recorded: playing && !degenerate,
            ..FrameSummary::default()
        };

        self.active_positions.clear();
        self.active_runners.clear();
        self.runner_samples.clear();
        self.occupancy.iter_mut().for_each(|c| *c = 0);

        if !degenerate {
            self.place_runners(sim_time, &mut summary);
            if playing {
                self.aggregator.observe(sim_time, &self.occupancy);
            }
        }

        let denominator = self.layout.segment_length().max(f64::EPSILON);
        let stat_mode = self.config.stat_mode;
        let average_mode = self.config.average_mode;
        for (segment, sample) in self.segment_samples.iter_mut().enumerate() {
            sample.value = self.aggregator.group_value(sample.group, stat_mode, average_mode);
            sample.instant_density = self.occupancy[segment] as f64 / denominator;
        }

        Frame {
            summary,
            runners: &self.runner_samples,
            segments: &self.segment_samples,
        }
    }

    /// Sample every runner, count occupancy and compute densities into the scratch buffers.
    fn place_runners(&mut self, sim_time: f64, summary: &mut FrameSummary) {
        let total_length = self.course.total_length();

        for (index, runner) in self.runners.iter().enumerate() {
            let phase = sampler::runner_phase(runner, sim_time, total_length);
            let distance = sampler::distance_along(runner, sim_time, total_length);
            let position = self.course.planar_at(distance);

            match phase {
                RunnerPhase::NotStarted => summary.not_started += 1,
                RunnerPhase::Finished => summary.finished += 1,
                RunnerPhase::Running => {
                    summary.running += 1;
                    self.active_positions.push(position);
                    self.active_runners.push(index);
                    if let Some(segment) = self.layout.segment_of(distance) {
                        self.occupancy[segment] += 1;
                    }
                }
            }

            self.runner_samples.push(RunnerSample {
                id: runner.id,
                wave: runner.wave,
                phase,
                distance,
                position,
                density: 0.0,
            });
        }

        let radius = self.config.density_radius;
        let normalize = self.config.normalize_density;

        #[cfg(feature = "parallel")]
        let densities = if self.active_positions.len() >= PARALLEL_THRESHOLD {
            self.density.compute_parallel(&self.active_positions, radius, normalize)
        } else {
            self.density.compute(&self.active_positions, radius, normalize)
        };
        #[cfg(not(feature = "parallel"))]
        let densities = self.density.compute(&self.active_positions, radius, normalize);

        for (&index, &density) in self.active_runners.iter().zip(densities) {
            self.runner_samples[index].density = density;
            summary.peak_density = summary.peak_density.max(density);
        }
    }

    /// Clear every statistic and the rewind clock.
    pub fn reset(&mut self) {
        self.aggregator.reset();
        debug!(
            "[CongestionEngine] statistics reset ({} groups)",
            self.aggregator.group_count()
        );
    }

    // =========================================================================
    // Structural changes
    // =========================================================================

    /// Replace the course. Rebuilds segmentation and resets.
    pub fn set_path(&mut self, course: Arc<CoursePath>) {
        self.course = course;
        self.rebuild_layout();
        self.reset();
    }

    /// Replace the whole field of runners. Resets.
    pub fn set_runners(&mut self, runners: Vec<Runner>) {
        self.install_runners(runners);
        info!("[CongestionEngine] {} runners loaded", self.runners.len());
        self.reset();
    }

    /// Change the segment length. Rebuilds segmentation and resets.
    pub fn set_segment_length(&mut self, segment_length: f64) {
        let config = CongestionConfig { segment_length, ..self.config.clone() };
        self.config = accept_config(config);
        self.rebuild_layout();
        self.reset();
    }

    /// Change overlap grouping. Rebuilds groups and resets.
    pub fn set_grouping(&mut self, grouping: GroupingConfig) {
        let config = CongestionConfig { grouping, ..self.config.clone() };
        self.config = accept_config(config);
        self.rebuild_groups();
        self.reset();
    }

    /// Change histogram geometry. Resets, since recorded bins no longer apply.
    pub fn set_histogram(&mut self, histogram: HistogramConfig) {
        let config = CongestionConfig { histogram, ..self.config.clone() };
        self.config = accept_config(config);
        self.rebuild_aggregator();
        self.reset();
    }

    fn install_runners(&mut self, runners: Vec<Runner>) {
        self.runners = runners;
        let n = self.runners.len();
        self.active_positions.clear();
        self.active_positions.reserve(n);
        self.active_runners.clear();
        self.active_runners.reserve(n);
        self.runner_samples.clear();
        self.runner_samples.reserve(n);
    }

    fn rebuild_layout(&mut self) {
        self.layout = SegmentLayout::build(&self.course, self.config.segment_length);
        self.rebuild_groups();
    }

    fn rebuild_groups(&mut self) {
        self.groups = build_groups(&self.layout, &self.config.grouping);
        self.rebuild_aggregator();
        self.reset_segment_buffers();
    }

    fn reset_segment_buffers(&mut self) {
        let n = self.layout.segment_count();
        self.occupancy.clear();
        self.occupancy.resize(n, 0);
        self.segment_samples.clear();
        for segment in 0..n {
            let (start, end) = self.layout.endpoints(segment);
            self.segment_samples.push(SegmentSample {
                start,
                end,
                group: self.groups.group_of(segment),
                value: None,
                instant_density: 0.0,
            });
        }
    }

    fn rebuild_aggregator(&mut self) {
        self.aggregator = TemporalAggregator::new(&self.groups, self.layout.segment_length(), &self.config);
    }

    // =========================================================================
    // Live settings
    // =========================================================================

    pub fn set_density_radius(&mut self, density_radius: f64) {
        let config = CongestionConfig { density_radius, ..self.config.clone() };
        self.config = accept_config(config);
    }

    pub fn set_stat_mode(&mut self, stat_mode: StatMode) {
        self.config.stat_mode = stat_mode;
    }

    pub fn set_average_mode(&mut self, average_mode: AverageMode) {
        self.config.average_mode = average_mode;
    }

    /// Change the rolling window. Recorded samples are kept; older ones drop out.
    pub fn set_window(&mut self, window_seconds: f64, sample_interval: f64) {
        let config = CongestionConfig {
            window_seconds,
            sample_interval,
            ..self.config.clone()
        };
        self.apply_stat_settings(config);
    }

    pub fn set_percentile(&mut self, percentile: f64) {
        let config = CongestionConfig { percentile, ..self.config.clone() };
        self.apply_stat_settings(config);
    }

    pub fn set_top_fraction(&mut self, top_fraction: f64) {
        let config = CongestionConfig { top_fraction, ..self.config.clone() };
        self.apply_stat_settings(config);
    }

    fn apply_stat_settings(&mut self, config: CongestionConfig) {
        self.config = accept_config(config);
        self.aggregator.set_settings(StatSettings::from(&self.config));
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn course(&self) -> &Arc<CoursePath> {
        &self.course
    }

    pub fn runners(&self) -> &[Runner] {
        &self.runners
    }

    /// The clamped configuration in effect.
    pub fn config(&self) -> &CongestionConfig {
        &self.config
    }

    pub fn layout(&self) -> &SegmentLayout {
        &self.layout
    }

    pub fn groups(&self) -> &SegmentGroups {
        &self.groups
    }

    pub fn aggregator(&self) -> &TemporalAggregator {
        &self.aggregator
    }
}
