//! # Segment Layout and Overlap Grouping
//!
//! The course is cut into fixed-length segments. Segments that physically
//! coincide (the outbound and return lanes of an out-and-back, a lap that
//! repeats, a shared start/finish straight) are put into one **group** so
//! that congestion is scored once per place rather than once per visit.
//!
//! ## Algorithm
//!
//! Segments are visited in course order. Each new segment looks up group
//! representatives registered in the 3x3 block of grid cells around its
//! midpoint and measures a direction-agnostic separation to each of them:
//!
//! - endpoint pairing: mean endpoint distance, matched forward or reversed,
//!   whichever is cheaper
//! - span: mean of the four endpoint-to-other-segment distances
//!
//! The separation is the mean of the two. The closest representative within
//! tolerance wins and the segment is unioned into its group. Candidates whose
//! nearest member lies fewer than `min_separation_segments` segment lengths
//! back along the course are skipped, so consecutive segments never chain
//! into one long group. A segment with no acceptable candidate starts a new
//! group and registers itself in the grid.
//!
//! The pass is greedy and order dependent: the same course and segment
//! length always produce the same groups, but they are not a globally
//! optimal clustering.

use std::collections::HashMap;
use geo::Coord;
use log::{debug, info};
use crate::course::CoursePath;

/// Smallest segment length the layout accepts (meters).
pub const MIN_SEGMENT_LENGTH: f64 = 1.0;

/// Tuning for overlap grouping.
///
/// These are empirical values for road and trail courses; unusually dense
/// course geometry (switchbacks, tight laps) may need retuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GroupingConfig {
    /// Matching tolerance as a fraction of the segment length.
    /// Default: 0.2
    pub tolerance_ratio: f64,

    /// Lower bound on the matching tolerance in meters.
    /// Default: 5.0 meters (two lanes of a road plus GPS noise)
    pub min_tolerance: f64,

    /// Spatial grid cell size in meters. `None` uses the matching tolerance.
    /// Default: None
    pub cell_size: Option<f64>,

    /// Minimum course-distance separation between members of a group,
    /// in segment lengths.
    /// Default: 3.0
    pub min_separation_segments: f64,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            tolerance_ratio: 0.2,
            min_tolerance: 5.0,
            cell_size: None,
            min_separation_segments: 3.0,
        }
    }
}

impl GroupingConfig {
    /// Matching tolerance for a given segment length.
    pub fn tolerance(&self, segment_length: f64) -> f64 {
        (segment_length * self.tolerance_ratio).max(self.min_tolerance).max(f64::EPSILON)
    }

    /// Grid cell size for a given segment length.
    pub fn grid_cell_size(&self, segment_length: f64) -> f64 {
        self.cell_size
            .unwrap_or_else(|| self.tolerance(segment_length))
            .max(f64::EPSILON)
    }

    /// Minimum course-distance separation in meters.
    pub fn min_separation(&self, segment_length: f64) -> f64 {
        self.min_separation_segments.max(0.0) * segment_length
    }
}

// =============================================================================
// Segment Layout
// =============================================================================

/// Fixed-length partition of a course with each segment's planar endpoints.
#[derive(Debug, Clone)]
pub struct SegmentLayout {
    segment_length: f64,
    total_length: f64,
    starts: Vec<Coord<f64>>,
    ends: Vec<Coord<f64>>,
}

impl SegmentLayout {
    /// Cut `course` into segments of `segment_length` meters.
    ///
    /// There is always at least one segment; the last one is shorter when
    /// the course length is not a multiple of the segment length.
    pub fn build(course: &CoursePath, segment_length: f64) -> Self {
        let segment_length = segment_length.max(MIN_SEGMENT_LENGTH);
        let total_length = course.total_length();
        let count = ((total_length / segment_length).ceil() as usize).max(1);

        let mut starts = Vec::with_capacity(count);
        let mut ends = Vec::with_capacity(count);
        for i in 0..count {
            let start = i as f64 * segment_length;
            let end = ((i + 1) as f64 * segment_length).min(total_length);
            starts.push(course.planar_at(start));
            ends.push(course.planar_at(end));
        }

        Self {
            segment_length,
            total_length,
            starts,
            ends,
        }
    }

    pub fn segment_length(&self) -> f64 {
        self.segment_length
    }

    pub fn segment_count(&self) -> usize {
        self.starts.len()
    }

    /// Segment containing `distance`, or `None` outside `[0, total_length)`.
    #[inline]
    pub fn segment_of(&self, distance: f64) -> Option<usize> {
        if !(distance >= 0.0 && distance < self.total_length) {
            return None;
        }
        let index = (distance / self.segment_length) as usize;
        Some(index.min(self.segment_count() - 1))
    }

    /// Course-distance range `[start, end)` covered by segment `i`.
    pub fn range(&self, i: usize) -> (f64, f64) {
        let start = i as f64 * self.segment_length;
        let end = ((i + 1) as f64 * self.segment_length).min(self.total_length);
        (start, end)
    }

    /// Planar start and end of segment `i`.
    #[inline]
    pub fn endpoints(&self, i: usize) -> (Coord<f64>, Coord<f64>) {
        (self.starts[i], self.ends[i])
    }

    /// Midpoint of the chord of segment `i`.
    pub fn midpoint(&self, i: usize) -> Coord<f64> {
        let (a, b) = self.endpoints(i);
        Coord {
            x: (a.x + b.x) * 0.5,
            y: (a.y + b.y) * 0.5,
        }
    }
}

// =============================================================================
// Union-Find
// =============================================================================

/// Array-backed disjoint sets with union by rank and path halving.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    /// Merge the sets of `a` and `b`, returning the new root.
    pub fn union(&mut self, a: usize, b: usize) -> usize {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return root_a;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => {
                self.parent[root_a] = root_b;
                root_b
            }
            std::cmp::Ordering::Greater => {
                self.parent[root_b] = root_a;
                root_a
            }
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
                root_a
            }
        }
    }
}

// =============================================================================
// Segment Groups
// =============================================================================

/// Dense segment -> group assignment.
///
/// Group ids are numbered in order of each group's first segment along the
/// course, so group 0 always contains segment 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentGroups {
    segment_to_group: Vec<usize>,
    members: Vec<Vec<usize>>,
}

impl SegmentGroups {
    /// Every segment in its own group.
    pub fn singletons(segment_count: usize) -> Self {
        Self {
            segment_to_group: (0..segment_count).collect(),
            members: (0..segment_count).map(|i| vec![i]).collect(),
        }
    }

    /// Groups from an arbitrary label per segment.
    ///
    /// Labels are renumbered densely in order of first appearance.
    pub fn from_labels(labels: &[usize]) -> Self {
        let mut renumbered: HashMap<usize, usize> = HashMap::new();
        let mut segment_to_group = Vec::with_capacity(labels.len());
        let mut members: Vec<Vec<usize>> = Vec::new();
        for (segment, &label) in labels.iter().enumerate() {
            let group = *renumbered.entry(label).or_insert_with(|| {
                members.push(Vec::new());
                members.len() - 1
            });
            members[group].push(segment);
            segment_to_group.push(group);
        }
        Self { segment_to_group, members }
    }

    #[inline]
    pub fn group_of(&self, segment: usize) -> usize {
        self.segment_to_group[segment]
    }

    pub fn group_count(&self) -> usize {
        self.members.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segment_to_group.len()
    }

    /// Segments of `group`, in course order.
    pub fn members(&self, group: usize) -> &[usize] {
        &self.members[group]
    }

    pub fn segment_to_group(&self) -> &[usize] {
        &self.segment_to_group
    }

    /// Groups with more than one member, i.e. places the course visits more than once.
    pub fn shared_groups(&self) -> impl Iterator<Item = usize> + '_ {
        self.members
            .iter()
            .enumerate()
            .filter(|(_, m)| m.len() > 1)
            .map(|(g, _)| g)
    }
}

type CellKey = (i64, i64);

fn cell_key(c: Coord<f64>, cell_size: f64) -> CellKey {
    ((c.x / cell_size).floor() as i64, (c.y / cell_size).floor() as i64)
}

/// Group physically coinciding segments of `layout`.
///
/// # Example
/// ```
/// use course_congestion::{CoursePath, GpsPoint, GroupingConfig, SegmentLayout, build_groups};
///
/// // 1 km straight north: nothing overlaps, every segment is its own group
/// let points: Vec<GpsPoint> = (0..10)
///     .map(|i| GpsPoint::new(51.5074 + i as f64 * 0.001, -0.1278))
///     .collect();
/// let course = CoursePath::from_points(&points).unwrap();
/// let layout = SegmentLayout::build(&course, 100.0);
///
/// let groups = build_groups(&layout, &GroupingConfig::default());
/// assert_eq!(groups.group_count(), layout.segment_count());
/// ```
pub fn build_groups(layout: &SegmentLayout, config: &GroupingConfig) -> SegmentGroups {
    let n = layout.segment_count();
    if n == 0 {
        return SegmentGroups::singletons(0);
    }

    let segment_length = layout.segment_length();
    let tolerance = config.tolerance(segment_length);
    let cell_size = config.grid_cell_size(segment_length);
    let min_separation = config.min_separation(segment_length);

    let mut uf = UnionFind::new(n);
    let mut grid: HashMap<CellKey, Vec<usize>> = HashMap::new();
    // Latest (highest-index) segment joined to each representative's group
    let mut newest_member: Vec<usize> = (0..n).collect();
    let mut joined = 0usize;

    for i in 0..n {
        let (a0, a1) = layout.endpoints(i);
        let (cx, cy) = cell_key(layout.midpoint(i), cell_size);

        let mut best: Option<(usize, f64)> = None;
        for dx in -1..=1 {
            for dy in -1..=1 {
                let Some(representatives) = grid.get(&(cx + dx, cy + dy)) else {
                    continue;
                };
                for &rep in representatives {
                    let gap = (i - newest_member[rep]) as f64 * segment_length;
                    if gap < min_separation {
                        continue;
                    }

                    let (b0, b1) = layout.endpoints(rep);
                    let separation = segment_separation(a0, a1, b0, b1);
                    if separation <= tolerance && best.map_or(true, |(_, d)| separation < d) {
                        best = Some((rep, separation));
                    }
                }
            }
        }

        match best {
            Some((rep, _)) => {
                uf.union(rep, i);
                newest_member[rep] = i;
                joined += 1;
            }
            None => {
                grid.entry((cx, cy)).or_default().push(i);
            }
        }
    }

    let mut root_to_group: Vec<Option<usize>> = vec![None; n];
    let mut segment_to_group = Vec::with_capacity(n);
    let mut members: Vec<Vec<usize>> = Vec::new();
    for i in 0..n {
        let root = uf.find(i);
        let group = *root_to_group[root].get_or_insert_with(|| {
            members.push(Vec::new());
            members.len() - 1
        });
        members[group].push(i);
        segment_to_group.push(group);
    }

    let groups = SegmentGroups { segment_to_group, members };
    debug!(
        "[SegmentIndexer] tolerance {:.1}m, cell {:.1}m, min separation {:.0}m, {} joins",
        tolerance, cell_size, min_separation, joined
    );
    info!(
        "[SegmentIndexer] {} segments of {:.0}m -> {} groups ({} shared)",
        n,
        segment_length,
        groups.group_count(),
        groups.shared_groups().count()
    );
    groups
}

/// Direction-agnostic separation between segments `a0-a1` and `b0-b1` (meters).
pub fn segment_separation(a0: Coord<f64>, a1: Coord<f64>, b0: Coord<f64>, b1: Coord<f64>) -> f64 {
    let forward = (distance(a0, b0) + distance(a1, b1)) * 0.5;
    let reverse = (distance(a0, b1) + distance(a1, b0)) * 0.5;
    let span = (point_segment_distance(a0, b0, b1)
        + point_segment_distance(a1, b0, b1)
        + point_segment_distance(b0, a0, a1)
        + point_segment_distance(b1, a0, a1))
        * 0.25;

    (forward.min(reverse) + span) * 0.5
}

#[inline]
fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

fn point_segment_distance(p: Coord<f64>, s0: Coord<f64>, s1: Coord<f64>) -> f64 {
    let dx = s1.x - s0.x;
    let dy = s1.y - s0.y;
    let len_sq = dx * dx + dy * dy;
    if len_sq <= f64::EPSILON {
        return distance(p, s0);
    }
    let t = (((p.x - s0.x) * dx + (p.y - s0.y) * dy) / len_sq).clamp(0.0, 1.0);
    distance(p, Coord { x: s0.x + t * dx, y: s0.y + t * dy })
}
