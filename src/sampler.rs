//! Runner position sampling.
//!
//! Runners move at constant pace from their start time, so a position is a
//! pure function of (runner, simulated time, course). Nothing here keeps state
//! between calls; the engine calls these once per runner per frame.

use geo::Coord;
use crate::Runner;

/// Where a runner is in its race at a given simulated time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunnerPhase {
    /// Simulated time is before the runner's start time.
    NotStarted,
    /// On the course, including exactly on the start line.
    Running,
    /// Reached the end of the course.
    Finished,
}

/// Distance along the course in meters, clamped to `[0, path_length]`.
///
/// Time before the runner's start yields 0; a runner who would be past the
/// finish is held at `path_length`.
///
/// ```
/// use course_congestion::{Runner, sampler};
///
/// // 5:00 per km, started at t = 60 s
/// let runner = Runner::new(1, 0, 60.0, 300.0);
/// assert_eq!(sampler::distance_along(&runner, 30.0, 10_000.0), 0.0);
/// assert!((sampler::distance_along(&runner, 360.0, 10_000.0) - 1000.0).abs() < 1e-9);
/// assert_eq!(sampler::distance_along(&runner, 1e6, 10_000.0), 10_000.0);
/// ```
#[inline]
pub fn distance_along(runner: &Runner, sim_time: f64, path_length: f64) -> f64 {
    let path_length = path_length.max(0.0);
    let elapsed = sim_time - runner.start_time;
    if elapsed <= 0.0 {
        return 0.0;
    }
    let distance = elapsed * 1000.0 / runner.pace.max(f64::EPSILON);
    distance.clamp(0.0, path_length)
}

/// Phase of `runner` at `sim_time` on a course of `path_length` meters.
pub fn runner_phase(runner: &Runner, sim_time: f64, path_length: f64) -> RunnerPhase {
    if sim_time < runner.start_time {
        RunnerPhase::NotStarted
    } else if distance_along(runner, sim_time, path_length) >= path_length {
        RunnerPhase::Finished
    } else {
        RunnerPhase::Running
    }
}

/// Planar position at `distance` along a projected polyline.
///
/// Binary-searches `cumulative` for the bracketing points and linearly
/// interpolates between them. Distances outside the course clamp to its
/// ends. Polylines with fewer than 2 points return the origin.
pub fn planar_position(planar: &[Coord<f64>], cumulative: &[f64], distance: f64) -> Coord<f64> {
    let n = planar.len().min(cumulative.len());
    if n < 2 {
        return Coord { x: 0.0, y: 0.0 };
    }

    let cumulative = &cumulative[..n];
    let hi = cumulative.partition_point(|&d| d <= distance).clamp(1, n - 1);
    let lo = hi - 1;

    let span = cumulative[hi] - cumulative[lo];
    let t = if span > f64::EPSILON {
        ((distance - cumulative[lo]) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let a = planar[lo];
    let b = planar[hi];
    Coord {
        x: a.x + (b.x - a.x) * t,
        y: a.y + (b.y - a.y) * t,
    }
}
