//! Basic example of stitching a trip back together from session fragments.
//!
//! Run with: cargo run --example basic_aggregation

use chrono::{Duration, TimeZone, Utc};
use route_stitcher::{
    AuditReport, CollectionStatus, Fragment, FragmentAggregator, TripSummary, Waypoint,
};
use uuid::Uuid;

fn point(lat: f64, lng: f64, order: Option<&str>) -> Waypoint {
    let waypoint = Waypoint::new(lat, lng).unwrap();
    match order {
        Some(o) => waypoint.with_order_ref(o),
        None => waypoint,
    }
}

fn main() {
    let trip = Uuid::parse_str("5f0c7d0e-8a61-4f53-9a3e-0c2f6d1b7a44").unwrap();
    let start = Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap();

    // Pickup leg, app crashes at the last point
    let session1 = Fragment::new(
        "session-1",
        trip,
        start,
        vec![
            point(37.7749, -122.4194, None),
            point(37.7755, -122.4188, Some("order-81")),
            point(37.7761, -122.4181, Some("order-81")),
        ],
        "https://logs.example.com?event=session-1",
    )
    .unwrap();

    // Restarted a minute later from the same spot
    let session2 = Fragment::new(
        "session-2",
        trip,
        start + Duration::seconds(60),
        vec![
            point(37.7761, -122.4181, Some("order-81")),
            point(37.7770, -122.4172, Some("order-81")),
            point(37.7778, -122.4165, None),
        ],
        "https://logs.example.com?event=session-2",
    )
    .unwrap();

    // Phone off for 15 minutes
    let session3 = Fragment::new(
        "session-3",
        trip,
        start + Duration::minutes(16),
        vec![
            point(37.7850, -122.4090, Some("order-82")),
            point(37.7862, -122.4077, Some("order-82")),
        ],
        "https://logs.example.com?event=session-3",
    )
    .unwrap();

    // Fragments arrive in whatever order the log backend returns them
    let fragments = vec![session3, session1, session2];
    let status = CollectionStatus::complete();

    let aggregator = FragmentAggregator::default();
    let route = aggregator.aggregate_with_status(&fragments, &status).unwrap();

    println!("Route Aggregation Example\n");
    println!(
        "Config: gap_threshold={}s, coordinate_tolerance={}deg\n",
        aggregator.config().gap_threshold_secs,
        aggregator.config().coordinate_tolerance_deg
    );

    if let Some(summary) = TripSummary::from_fragments(&fragments, &status) {
        println!("{}\n", summary);
    }

    println!("Segments:");
    for (i, segment) in route.segments.iter().enumerate() {
        println!(
            "  {}. {:<10} {} point(s), {:.0}m{}",
            i + 1,
            segment.kind.as_str(),
            segment.waypoint_count(),
            segment.distance_meters(),
            segment
                .source_fragment_ref
                .as_deref()
                .map(|id| format!(" from {}", id))
                .unwrap_or_default()
        );
    }

    println!(
        "\nCanonical route: {} waypoints, {:.0}m, orders {:?}, complete: {}\n",
        route.total_waypoint_count(),
        route.distance_meters(),
        route.order_refs(),
        route.is_complete
    );

    println!("{}", AuditReport::build(&route, &fragments));
}
