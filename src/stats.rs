//! # Congestion Statistics
//!
//! Per-group streaming statistics over simulated time.
//!
//! Every processed frame turns segment occupancy counts into densities
//! (runners per meter), takes the maximum over each group's member
//! segments, and feeds the non-zero values into four independent
//! accumulators:
//!
//! | Accumulator | Statistic |
//! |-------------|-----------|
//! | [`ActiveAverage`] | mean over frames with non-zero density |
//! | [`RollingWindow`] | mean of samples taken every `sample_interval` seconds within the trailing window |
//! | [`DensityHistogram`] | percentile rank and top-fraction mean |
//! | max | highest density observed |
//!
//! All four are kept up to date regardless of the selected mode, so
//! switching modes never loses history. Simulated time going backwards
//! clears everything: history recorded in a future that was rewound no
//! longer describes the race.

use std::collections::{BTreeMap, VecDeque};
use log::debug;
use crate::config::{AverageMode, CongestionConfig, HistogramConfig, StatMode, MIN_BIN_WIDTH};
use crate::segments::SegmentGroups;

/// Slack for `ceil(rank * total)` so that e.g. 0.3 * 10 ranks as 3, not 4.
const RANK_EPSILON: f64 = 1e-9;

// =============================================================================
// Accumulators
// =============================================================================

/// Running mean of non-zero samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveAverage {
    sum: f64,
    count: u64,
}

impl ActiveAverage {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Time-ordered queue of samples with an incrementally maintained sum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RollingWindow {
    samples: VecDeque<(f64, f64)>,
    sum: f64,
}

impl RollingWindow {
    /// Append a sample. `time` must not be older than the newest sample.
    pub fn push(&mut self, time: f64, value: f64) {
        self.samples.push_back((time, value));
        self.sum += value;
    }

    /// Drop samples older than `window` seconds before `now`.
    pub fn expire(&mut self, now: f64, window: f64) {
        let cutoff = now - window;
        while let Some(&(time, value)) = self.samples.front() {
            if time >= cutoff {
                break;
            }
            self.samples.pop_front();
            self.sum -= value;
        }
        if self.samples.is_empty() {
            self.sum = 0.0;
        }
    }

    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.sum / self.samples.len() as f64
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Time of the oldest sample still in the window.
    pub fn oldest(&self) -> Option<f64> {
        self.samples.front().map(|&(time, _)| time)
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.sum = 0.0;
    }
}

/// Fixed-width histogram of non-zero densities.
///
/// Only occupied bins are stored, so memory grows with the spread of
/// observed values rather than with `max_value / bin_width`. Values above
/// `max_value` are counted in the top bin. Reported values are bin
/// midpoints, capped at `max_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct DensityHistogram {
    bins: BTreeMap<usize, u32>,
    bin_count: usize,
    bin_width: f64,
    max_value: f64,
    total: u64,
}

impl DensityHistogram {
    pub fn new(config: &HistogramConfig) -> Self {
        let bin_width = config.bin_width.max(MIN_BIN_WIDTH);
        Self {
            bins: BTreeMap::new(),
            bin_count: config.bin_count(),
            bin_width,
            max_value: config.max_value.max(bin_width),
            total: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        let index = ((value.max(0.0) / self.bin_width) as usize).min(self.bin_count - 1);
        *self.bins.entry(index).or_insert(0) += 1;
        self.total += 1;
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of distinct bins holding at least one sample.
    pub fn occupied_bins(&self) -> usize {
        self.bins.len()
    }

    #[inline]
    fn midpoint(&self, bin: usize) -> f64 {
        ((bin as f64 + 0.5) * self.bin_width).min(self.max_value)
    }

    /// Value at rank `ceil(rank * total)`, scanning bins from low to high.
    ///
    /// Returns 0.0 for an empty histogram.
    pub fn percentile(&self, rank: f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let target = ((rank.clamp(0.0, 1.0) * self.total as f64 - RANK_EPSILON).ceil() as u64).max(1);

        let mut seen = 0u64;
        let mut last = 0;
        for (&bin, &count) in &self.bins {
            seen += count as u64;
            last = bin;
            if seen >= target {
                break;
            }
        }
        self.midpoint(last)
    }

    /// Mean of the highest `ceil(fraction * total)` samples.
    ///
    /// Bins are consumed from the top down, the last one partially.
    pub fn top_fraction_mean(&self, fraction: f64) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let quota = ((fraction.clamp(0.0, 1.0) * self.total as f64 - RANK_EPSILON).ceil() as u64)
            .clamp(1, self.total);

        let mut remaining = quota;
        let mut sum = 0.0;
        for (&bin, &count) in self.bins.iter().rev() {
            if remaining == 0 {
                break;
            }
            let take = (count as u64).min(remaining);
            sum += take as f64 * self.midpoint(bin);
            remaining -= take;
        }
        sum / quota as f64
    }

    pub fn clear(&mut self) {
        self.bins.clear();
        self.total = 0;
    }
}

// =============================================================================
// Per-group State
// =============================================================================

/// Everything tracked for one segment group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStats {
    seen: bool,
    max: f64,
    current: f64,
    active: ActiveAverage,
    window: RollingWindow,
    histogram: DensityHistogram,
}

impl GroupStats {
    fn new(histogram: &HistogramConfig) -> Self {
        Self {
            seen: false,
            max: 0.0,
            current: 0.0,
            active: ActiveAverage::default(),
            window: RollingWindow::default(),
            histogram: DensityHistogram::new(histogram),
        }
    }

    fn clear(&mut self) {
        self.seen = false;
        self.max = 0.0;
        self.current = 0.0;
        self.active.clear();
        self.window.clear();
        self.histogram.clear();
    }

    /// Whether any member segment has ever been occupied.
    pub fn is_seen(&self) -> bool {
        self.seen
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Density of the last processed frame.
    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn active(&self) -> &ActiveAverage {
        &self.active
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn histogram(&self) -> &DensityHistogram {
        &self.histogram
    }
}

/// Query parameters that can change without invalidating history.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatSettings {
    pub window_seconds: f64,
    pub sample_interval: f64,
    pub percentile: f64,
    pub top_fraction: f64,
}

impl From<&CongestionConfig> for StatSettings {
    fn from(config: &CongestionConfig) -> Self {
        Self {
            window_seconds: config.window_seconds,
            sample_interval: config.sample_interval,
            percentile: config.percentile,
            top_fraction: config.top_fraction,
        }
    }
}

// =============================================================================
// Temporal Aggregator
// =============================================================================

/// Accumulates group statistics frame by frame.
#[derive(Debug, Clone)]
pub struct TemporalAggregator {
    segment_to_group: Vec<usize>,
    segment_length: f64,
    groups: Vec<GroupStats>,
    frame_values: Vec<f64>,
    settings: StatSettings,
    last_time: Option<f64>,
    next_sample_at: Option<f64>,
}

impl TemporalAggregator {
    pub fn new(groups: &SegmentGroups, segment_length: f64, config: &CongestionConfig) -> Self {
        let group_count = groups.group_count();
        Self {
            segment_to_group: groups.segment_to_group().to_vec(),
            segment_length,
            groups: (0..group_count).map(|_| GroupStats::new(&config.histogram)).collect(),
            frame_values: vec![0.0; group_count],
            settings: StatSettings::from(config),
            last_time: None,
            next_sample_at: None,
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn settings(&self) -> StatSettings {
        self.settings
    }

    /// Last simulated time seen by [`sync_clock`](Self::sync_clock) or [`observe`](Self::observe).
    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    /// Change query settings. History is kept; a shorter window applies immediately.
    pub fn set_settings(&mut self, settings: StatSettings) {
        self.settings = settings;
        if let Some(now) = self.last_time {
            for stats in &mut self.groups {
                stats.window.expire(now, settings.window_seconds);
            }
        }
    }

    /// Clear all statistics and the clock.
    pub fn reset(&mut self) {
        for stats in &mut self.groups {
            stats.clear();
        }
        self.frame_values.iter_mut().for_each(|v| *v = 0.0);
        self.last_time = None;
        self.next_sample_at = None;
    }

    /// Record that simulated time is now `sim_time`, resetting if it moved backwards.
    ///
    /// Rolling-window samples older than the window are dropped here, so a
    /// paused jump forward empties stale windows without recording anything.
    /// Returns `true` when a rewind was detected.
    pub fn sync_clock(&mut self, sim_time: f64) -> bool {
        let rewound = matches!(self.last_time, Some(last) if sim_time < last);
        if rewound {
            debug!(
                "[TemporalAggregator] time moved back to {:.1}s, clearing {} groups",
                sim_time,
                self.groups.len()
            );
            self.reset();
        }
        self.last_time = Some(sim_time);

        let window_seconds = self.settings.window_seconds;
        for stats in &mut self.groups {
            stats.window.expire(sim_time, window_seconds);
        }
        rewound
    }

    /// Process one frame: `occupancy[i]` is the number of runners in segment `i`.
    pub fn observe(&mut self, sim_time: f64, occupancy: &[u32]) {
        self.sync_clock(sim_time);

        let denominator = self.segment_length.max(f64::EPSILON);
        self.frame_values.iter_mut().for_each(|v| *v = 0.0);
        for (segment, &count) in occupancy.iter().enumerate().take(self.segment_to_group.len()) {
            let group = self.segment_to_group[segment];
            let density = count as f64 / denominator;
            if density > self.frame_values[group] {
                self.frame_values[group] = density;
            }
        }

        let sample_due = self.next_sample_at.map_or(true, |at| sim_time >= at);
        if sample_due {
            let interval = self.settings.sample_interval.max(f64::EPSILON);
            let mut next = self.next_sample_at.unwrap_or(sim_time);
            while next <= sim_time {
                next += interval;
            }
            self.next_sample_at = Some(next);
        }

        for (stats, &value) in self.groups.iter_mut().zip(&self.frame_values) {
            stats.current = value;
            if value > 0.0 {
                stats.seen = true;
            }
            if stats.seen {
                stats.max = stats.max.max(value);
                if value > 0.0 {
                    stats.active.push(value);
                    stats.histogram.push(value);
                    if sample_due {
                        stats.window.push(sim_time, value);
                    }
                }
            }
        }
    }

    pub fn group_stats(&self, group: usize) -> &GroupStats {
        &self.groups[group]
    }

    pub fn is_seen(&self, group: usize) -> bool {
        self.groups[group].seen
    }

    /// Reported value of `group`, or `None` while the group has never been occupied.
    pub fn group_value(&self, group: usize, stat_mode: StatMode, average_mode: AverageMode) -> Option<f64> {
        let stats = &self.groups[group];
        if !stats.seen {
            return None;
        }

        let value = match stat_mode {
            StatMode::Max => stats.max,
            StatMode::Average => match average_mode {
                AverageMode::Active => stats.active.mean(),
                AverageMode::Percentile => stats.histogram.percentile(self.settings.percentile),
                AverageMode::TopFraction => stats.histogram.top_fraction_mean(self.settings.top_fraction),
                AverageMode::Window => stats.window.mean(),
            },
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    /// One group per segment, 1m segments so density == count.
    fn unit_aggregator(segments: usize) -> TemporalAggregator {
        let config = CongestionConfig {
            segment_length: 1.0,
            histogram: HistogramConfig { bin_width: 0.25, max_value: 25.0 },
            ..CongestionConfig::default()
        };
        TemporalAggregator::new(&SegmentGroups::singletons(segments), 1.0, &config)
    }

    #[test]
    fn test_active_average_and_max() {
        let mut agg = unit_aggregator(1);
        agg.observe(0.0, &[1]);
        agg.observe(1.0, &[3]);
        agg.observe(2.0, &[2]);

        assert_eq!(agg.group_value(0, StatMode::Average, AverageMode::Active), Some(2.0));
        assert_eq!(agg.group_value(0, StatMode::Max, AverageMode::Active), Some(3.0));
    }

    #[test]
    fn test_zero_frames_do_not_dilute_active_average() {
        let mut agg = unit_aggregator(1);
        agg.observe(0.0, &[4]);
        agg.observe(1.0, &[0]);
        agg.observe(2.0, &[0]);

        assert_eq!(agg.group_value(0, StatMode::Average, AverageMode::Active), Some(4.0));
        assert_eq!(agg.group_stats(0).current(), 0.0);
    }

    #[test]
    fn test_unseen_group_reports_nothing() {
        let mut agg = unit_aggregator(3);
        agg.observe(0.0, &[0, 2, 0]);

        assert!(!agg.is_seen(0));
        assert!(agg.is_seen(1));
        assert_eq!(agg.group_value(0, StatMode::Max, AverageMode::Active), None);
        assert_eq!(agg.group_value(2, StatMode::Average, AverageMode::Window), None);
    }

    #[test]
    fn test_group_takes_max_over_members() {
        let shared = SegmentGroups::from_labels(&[7, 4, 7]);
        let config = CongestionConfig::default();
        let mut agg = TemporalAggregator::new(&shared, 100.0, &config);
        agg.observe(0.0, &[3, 0, 5]);

        assert_eq!(agg.group_count(), 2);
        assert_eq!(agg.group_value(0, StatMode::Max, AverageMode::Active), Some(0.05));
        assert!(!agg.is_seen(1));
    }

    #[test]
    fn test_density_is_count_over_segment_length() {
        let config = CongestionConfig::default();
        let mut agg = TemporalAggregator::new(&SegmentGroups::singletons(10), 100.0, &config);
        let mut occupancy = [0u32; 10];
        occupancy[0] = 3;
        agg.observe(0.0, &occupancy);

        assert!(approx_eq(agg.group_stats(0).current(), 0.03));
        assert!((1..10).all(|g| !agg.is_seen(g)));
    }

    #[test]
    fn test_rewind_clears_history() {
        let mut agg = unit_aggregator(2);
        for t in 0..10 {
            agg.observe(t as f64, &[t + 1, 0]);
        }
        assert!(agg.sync_clock(3.0));

        let mut fresh = unit_aggregator(2);
        agg.observe(5.0, &[2, 1]);
        fresh.observe(5.0, &[2, 1]);

        assert_eq!(agg.group_stats(0), fresh.group_stats(0));
        assert_eq!(agg.group_stats(1), fresh.group_stats(1));
    }

    #[test]
    fn test_same_time_is_not_a_rewind() {
        let mut agg = unit_aggregator(1);
        agg.observe(5.0, &[1]);
        assert!(!agg.sync_clock(5.0));
        assert!(agg.is_seen(0));
    }

    #[test]
    fn test_window_samples_on_interval() {
        let mut agg = unit_aggregator(1);
        // Frames every 0.25s, sampling every 1s
        for i in 0..=8 {
            agg.observe(i as f64 * 0.25, &[1]);
        }
        assert_eq!(agg.group_stats(0).window().len(), 3);
    }

    #[test]
    fn test_window_drops_old_samples() {
        let mut agg = unit_aggregator(1);
        for t in 0..=300 {
            let count = if t < 100 { 1 } else { 2 };
            agg.observe(t as f64, &[count]);
        }

        let window = agg.group_stats(0).window();
        assert!(window.oldest().unwrap() >= 300.0 - 180.0);
        assert_eq!(agg.group_value(0, StatMode::Average, AverageMode::Window), Some(2.0));
    }

    #[test]
    fn test_shrinking_window_applies_immediately() {
        let mut agg = unit_aggregator(1);
        for t in 0..=100 {
            agg.observe(t as f64, &[1]);
        }
        let settings = StatSettings { window_seconds: 10.0, ..agg.settings() };
        agg.set_settings(settings);
        assert_eq!(agg.group_stats(0).window().len(), 11);
    }

    #[test]
    fn test_window_sum_stays_consistent() {
        let mut window = RollingWindow::default();
        for i in 0..10_000 {
            let t = i as f64 * 0.5;
            window.push(t, 0.1 + (i % 7) as f64 * 0.013);
            window.expire(t, 30.0);

            let exact: f64 = window.samples.iter().map(|&(_, v)| v).sum();
            assert!((window.sum() - exact).abs() < 1e-6);
        }
        window.expire(1e9, 30.0);
        assert!(window.is_empty());
        assert_eq!(window.sum(), 0.0);
    }

    #[test]
    fn test_percentile_and_top_fraction() {
        let config = HistogramConfig { bin_width: 1.0, max_value: 100.0 };
        let mut histogram = DensityHistogram::new(&config);
        for v in 0..10 {
            histogram.push(v as f64 + 0.2);
        }

        // 90th percentile: rank 9 -> bin 8
        assert!(approx_eq(histogram.percentile(0.9), 8.5));
        assert!(approx_eq(histogram.percentile(0.05), 0.5));
        // Top 30%: bins 9, 8, 7
        assert!(approx_eq(histogram.top_fraction_mean(0.3), 8.5));
        assert!(approx_eq(histogram.top_fraction_mean(1.0), 5.0));
    }

    #[test]
    fn test_top_fraction_consumes_partial_bin() {
        let config = HistogramConfig { bin_width: 1.0, max_value: 10.0 };
        let mut histogram = DensityHistogram::new(&config);
        for _ in 0..4 {
            histogram.push(2.1);
        }
        histogram.push(6.3);

        // quota = ceil(0.4 * 5) = 2: one sample at 6.5 and one of the four at 2.5
        assert!(approx_eq(histogram.top_fraction_mean(0.4), 4.5));
    }

    #[test]
    fn test_percentile_is_monotonic_in_rank() {
        let config = HistogramConfig { bin_width: 0.25, max_value: 25.0 };
        let mut histogram = DensityHistogram::new(&config);
        for i in 0..137 {
            histogram.push(((i * 37) % 101) as f64 * 0.11);
        }

        let mut previous = 0.0;
        for step in 1..=100 {
            let value = histogram.percentile(step as f64 / 100.0);
            assert!(value >= previous, "rank {step}: {value} < {previous}");
            previous = value;
        }
    }

    #[test]
    fn test_histogram_caps_at_max_value() {
        let config = HistogramConfig { bin_width: 0.25, max_value: 1.0 };
        let mut histogram = DensityHistogram::new(&config);
        histogram.push(50.0);

        assert!(histogram.percentile(1.0) <= 1.0);
        assert!(histogram.top_fraction_mean(1.0) <= 1.0);
        assert!(histogram.percentile(1.0) >= 0.0);
    }

    #[test]
    fn test_histogram_stores_only_occupied_bins() {
        let mut histogram = DensityHistogram::new(&HistogramConfig::default());
        for _ in 0..500 {
            histogram.push(0.03);
        }
        histogram.push(0.07);
        histogram.push(99.0);

        assert_eq!(histogram.total(), 502);
        assert_eq!(histogram.occupied_bins(), 3);
        assert!(approx_eq(histogram.percentile(1.0), 9.995));

        histogram.clear();
        assert_eq!(histogram.occupied_bins(), 0);
    }

    #[test]
    fn test_paused_clock_expires_window() {
        let mut agg = unit_aggregator(1);
        for t in 0..=100 {
            agg.observe(t as f64, &[1]);
        }
        assert_eq!(agg.group_stats(0).window().len(), 101);

        // Clock moves on without recording
        assert!(!agg.sync_clock(5000.0));
        assert!(agg.group_stats(0).window().is_empty());
        assert_eq!(agg.group_value(0, StatMode::Average, AverageMode::Window), Some(0.0));
        assert_eq!(agg.group_value(0, StatMode::Max, AverageMode::Window), Some(1.0));
    }

    #[test]
    fn test_empty_histogram() {
        let histogram = DensityHistogram::new(&HistogramConfig::default());
        assert_eq!(histogram.percentile(0.9), 0.0);
        assert_eq!(histogram.top_fraction_mean(0.3), 0.0);
    }

    #[test]
    fn test_occupancy_longer_than_layout_is_ignored() {
        let mut agg = unit_aggregator(2);
        agg.observe(0.0, &[1, 1, 9]);
        assert_eq!(agg.group_value(1, StatMode::Max, AverageMode::Active), Some(1.0));
    }
}
