//! Congestion on an out-and-back course with three start waves.
//!
//! Run with: cargo run --example out_and_back

use std::sync::Arc;
use course_congestion::{
    AverageMode, CongestionConfig, CongestionEngine, CoursePath, GpsPoint, Runner, StatMode,
};

fn main() {
    // 2.5 km east, turn around, and come back on a lane ~4m to the north
    let mut points: Vec<GpsPoint> = (0..=25)
        .map(|i| GpsPoint::new(51.5000, -0.1278 + i as f64 * 0.00144))
        .collect();
    points.extend((0..=25).rev().map(|i| GpsPoint::new(51.50004, -0.1278 + i as f64 * 0.00144)));

    let course = Arc::new(CoursePath::from_points(&points).unwrap());

    // 3 waves of 200, two minutes apart, paces from 4:30 to 7:00 per km
    let runners: Vec<Runner> = (0..600u32)
        .map(|i| {
            let wave = i / 200;
            let slot = i % 200;
            let start_time = wave as f64 * 120.0 + (slot / 20) as f64;
            let pace = 270.0 + (slot % 20) as f64 * 7.5;
            Runner::new(i, wave, start_time, pace)
        })
        .collect();

    let config = CongestionConfig::default();
    println!("Course Congestion Example\n");
    println!(
        "Course: {:.0}m, {} runners, radius {}m, segments {}m\n",
        course.total_length(),
        runners.len(),
        config.density_radius,
        config.segment_length
    );

    let mut engine = CongestionEngine::new(course, runners, config);

    println!("1. Segment groups:");
    let groups = engine.groups();
    println!(
        "   {} segments -> {} groups",
        engine.layout().segment_count(),
        groups.group_count()
    );
    for group in groups.shared_groups().take(5) {
        println!("   group {} shares segments {:?}", group, groups.members(group));
    }

    println!("\n2. Race progress:");
    for t in 0..=1800 {
        let frame = engine.advance(t as f64, true);
        if t % 300 == 0 {
            let s = frame.summary;
            println!(
                "   t={:>4}s  waiting {:>3}  running {:>3}  finished {:>3}  peak density {:.2}",
                t, s.not_started, s.running, s.finished, s.peak_density
            );
        }
    }

    println!("\n3. Most congested places:");
    for (label, stat_mode, average_mode) in [
        ("max", StatMode::Max, AverageMode::Active),
        ("active average", StatMode::Average, AverageMode::Active),
        ("90th percentile", StatMode::Average, AverageMode::Percentile),
        ("top 30%", StatMode::Average, AverageMode::TopFraction),
    ] {
        engine.set_stat_mode(stat_mode);
        engine.set_average_mode(average_mode);
        let frame = engine.advance(1800.0, false);

        let busiest = frame
            .segments
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value.map(|v| (i, v)))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match busiest {
            Some((segment, value)) => {
                let (start, end) = engine.layout().range(segment);
                println!("   {:<16} {:.3} runners/m at {:.0}-{:.0}m", label, value, start, end);
            }
            None => println!("   {:<16} nothing recorded", label),
        }
    }

    println!("\n4. Scrub back to t=600s:");
    let frame = engine.advance(600.0, false);
    let seen = frame.segments.iter().filter(|s| s.is_seen()).count();
    println!("   rewound: {}, groups with history: {}", frame.summary.rewound, seen);
}
