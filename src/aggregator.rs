//! Fragment aggregation.
//!
//! Turns the fragments of one trip, in any order, into a [`UnifiedRoute`]:
//!
//! 1. Fragments are stably sorted by `recorded_at`. Waypoint order inside a
//!    fragment is never touched.
//! 2. Each fragment becomes one continuous segment, copied verbatim.
//! 3. When consecutive fragments start more than `gap_threshold_secs` apart, a
//!    two-point gap segment bridges the last waypoint of the earlier fragment
//!    to the first waypoint of the later one.
//! 4. The canonical waypoint sequence concatenates all fragments, dropping the
//!    first waypoint of a fragment when it repeats the previous fragment's last
//!    waypoint and no gap separates them.
//!
//! Aggregation is a pure function of its input: no I/O, no shared state, no
//! dependence on the time of the call.

use log::debug;

use crate::geo_utils::coordinates_match;
use crate::route::{RouteSegment, UnifiedRoute};
use crate::source::FragmentBatch;
use crate::{AggregationConfig, CollectionStatus, Fragment, InsufficientDataError};

/// Stateless aggregation service. Cheap to copy; construct one per call site.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FragmentAggregator {
    config: AggregationConfig,
}

impl FragmentAggregator {
    pub fn new(config: AggregationConfig) -> Self {
        Self { config }
    }

    /// Aggregator with the given gap threshold and the default coordinate tolerance.
    pub fn with_gap_threshold(gap_threshold_secs: f64) -> Self {
        Self::new(AggregationConfig {
            gap_threshold_secs,
            ..AggregationConfig::default()
        })
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Aggregate a fully collected fragment list.
    pub fn aggregate(&self, fragments: &[Fragment]) -> Result<UnifiedRoute, InsufficientDataError> {
        self.aggregate_with_status(fragments, &CollectionStatus::complete())
    }

    /// Aggregate a fragment list, carrying the collector's truncation and
    /// failure flags into [`UnifiedRoute::is_complete`].
    ///
    /// # Panics
    ///
    /// Panics if the fragments do not all belong to the same trip. Grouping by
    /// trip is the collector's job.
    pub fn aggregate_with_status(
        &self,
        fragments: &[Fragment],
        status: &CollectionStatus,
    ) -> Result<UnifiedRoute, InsufficientDataError> {
        if fragments.is_empty() {
            return Err(InsufficientDataError);
        }

        let trip_ref = fragments[0].trip_ref();
        assert!(
            fragments.iter().all(|f| f.trip_ref() == trip_ref),
            "fragments from more than one trip passed to aggregate"
        );

        // slice::sort_by_key is stable: equal timestamps keep input order
        let mut sorted: Vec<&Fragment> = fragments.iter().collect();
        sorted.sort_by_key(|f| f.recorded_at());

        let total_points: usize = sorted.iter().map(|f| f.waypoint_count()).sum();
        let mut segments: Vec<RouteSegment> = Vec::with_capacity(sorted.len() * 2);
        let mut waypoints = Vec::with_capacity(total_points);
        let mut seams_merged = 0usize;

        for (i, fragment) in sorted.iter().enumerate() {
            let mut skip_first = false;

            if i > 0 {
                let prev = sorted[i - 1];
                if self.is_gap(prev, fragment) {
                    segments.push(RouteSegment::gap(
                        prev.last_waypoint().clone(),
                        fragment.first_waypoint().clone(),
                    ));
                } else if coordinates_match(
                    prev.last_waypoint(),
                    fragment.first_waypoint(),
                    self.config.coordinate_tolerance_deg,
                ) {
                    skip_first = true;
                    seams_merged += 1;
                }
            }

            segments.push(RouteSegment::continuous(
                fragment.id(),
                fragment.waypoints().to_vec(),
            ));

            let start = usize::from(skip_first);
            waypoints.extend(
                fragment.waypoints()[start..]
                    .iter()
                    .map(|w| w.clone().with_source_fragment_ref(fragment.id())),
            );
        }

        let route = UnifiedRoute {
            trip_ref,
            waypoints,
            segments,
            fragment_count: sorted.len(),
            is_complete: status.is_complete(),
        };

        debug!(
            "[FragmentAggregator] trip {}: {} fragments, {} gaps, {} seams merged, {} canonical waypoints",
            trip_ref,
            route.fragment_count,
            route.gap_count(),
            seams_merged,
            route.total_waypoint_count()
        );

        Ok(route)
    }

    /// Whether the time between two fragment starts exceeds the gap threshold.
    /// `next` must not start before `prev`.
    fn is_gap(&self, prev: &Fragment, next: &Fragment) -> bool {
        let delta = next.recorded_at() - prev.recorded_at();
        let delta_secs = delta.num_seconds() as f64 + f64::from(delta.subsec_nanos()) * 1e-9;
        delta_secs > self.config.gap_threshold_secs
    }
}

/// Aggregate a fully collected fragment list with the default coordinate
/// tolerance.
///
/// # Panics
///
/// Panics if the fragments do not all belong to the same trip, as
/// [`FragmentAggregator::aggregate_with_status`] does.
///
/// # Example
/// ```
/// use route_stitcher::{aggregate, InsufficientDataError};
///
/// assert_eq!(aggregate(&[], 300.0), Err(InsufficientDataError));
/// ```
pub fn aggregate(
    fragments: &[Fragment],
    gap_threshold_secs: f64,
) -> Result<UnifiedRoute, InsufficientDataError> {
    FragmentAggregator::with_gap_threshold(gap_threshold_secs).aggregate(fragments)
}

/// Aggregate several independent trips. Results are in input order.
pub fn aggregate_trips(
    batches: &[FragmentBatch],
    config: &AggregationConfig,
) -> Vec<Result<UnifiedRoute, InsufficientDataError>> {
    let aggregator = FragmentAggregator::new(*config);
    batches
        .iter()
        .map(|b| aggregator.aggregate_with_status(&b.fragments, &b.status))
        .collect()
}

/// Aggregate several independent trips using parallel processing.
///
/// Same as [`aggregate_trips`] but spreads trips across the rayon pool.
/// Recommended for large exports (hundreds of trips).
#[cfg(feature = "parallel")]
pub fn aggregate_trips_parallel(
    batches: &[FragmentBatch],
    config: &AggregationConfig,
) -> Vec<Result<UnifiedRoute, InsufficientDataError>> {
    use rayon::prelude::*;

    let aggregator = FragmentAggregator::new(*config);
    batches
        .par_iter()
        .map(|b| aggregator.aggregate_with_status(&b.fragments, &b.status))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SegmentKind, Waypoint};
    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    fn wp(lat: f64, lng: f64) -> Waypoint {
        Waypoint::new(lat, lng).unwrap()
    }

    fn fragment_at(id: &str, offset_secs: i64, waypoints: Vec<Waypoint>) -> Fragment {
        let base = Utc.with_ymd_and_hms(2026, 2, 10, 19, 0, 0).unwrap();
        Fragment::new(
            id,
            Uuid::from_u128(7),
            base + Duration::seconds(offset_secs),
            waypoints,
            format!("https://logs.example.com/event/{id}"),
        )
        .unwrap()
    }

    /// Straight line of `n` points starting at `lat`, 0.0001 degrees apart.
    fn line(lat: f64, n: usize) -> Vec<Waypoint> {
        (0..n).map(|i| wp(lat + i as f64 * 0.0001, -122.4194)).collect()
    }

    #[test]
    fn test_empty_input_fails() {
        assert_eq!(aggregate(&[], 300.0), Err(InsufficientDataError));
    }

    #[test]
    fn test_single_fragment_identity() {
        let fragment = fragment_at("only", 0, line(37.77, 2));
        let route = aggregate(std::slice::from_ref(&fragment), 300.0).unwrap();

        assert_eq!(route.segments.len(), 1);
        assert_eq!(route.segments[0].kind, SegmentKind::Continuous);
        assert_eq!(route.segments[0].waypoints, fragment.waypoints());
        assert_eq!(route.waypoints, fragment.waypoints());
        assert!(route.is_complete);
        assert!(!route.has_gaps());
    }

    #[test]
    fn test_gap_boundary_is_strict() {
        let a = fragment_at("a", 0, line(37.77, 3));
        let b = fragment_at("b", 300, line(37.78, 3));
        let route = aggregate(&[a.clone(), b], 300.0).unwrap();
        assert_eq!(route.gap_count(), 0);

        let c = fragment_at("c", 301, line(37.78, 3));
        let route = aggregate(&[a, c], 300.0).unwrap();
        assert_eq!(route.gap_count(), 1);
    }

    #[test]
    fn test_sub_second_delta_counts() {
        let base = Utc.with_ymd_and_hms(2026, 2, 10, 19, 0, 0).unwrap();
        let a = Fragment::new("a", Uuid::from_u128(7), base, line(37.77, 2), "l").unwrap();
        let b = Fragment::new(
            "b",
            Uuid::from_u128(7),
            base + Duration::milliseconds(300_500),
            line(37.78, 2),
            "l",
        )
        .unwrap();
        assert_eq!(aggregate(&[a, b], 300.0).unwrap().gap_count(), 1);
    }

    #[test]
    fn test_gap_segment_bridges_fragment_ends() {
        let a = fragment_at("a", 0, line(37.77, 3));
        let b = fragment_at("b", 900, line(37.78, 3));
        let route = aggregate(&[b.clone(), a.clone()], 300.0).unwrap();

        let kinds: Vec<SegmentKind> = route.segments.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, vec![SegmentKind::Continuous, SegmentKind::Gap, SegmentKind::Continuous]);

        let gap = &route.segments[1];
        assert_eq!(gap.waypoints, vec![a.last_waypoint().clone(), b.first_waypoint().clone()]);
        assert!(gap.source_fragment_ref.is_none());
        assert_eq!(route.segments[0].source_fragment_ref.as_deref(), Some("a"));
        assert_eq!(route.segments[2].source_fragment_ref.as_deref(), Some("b"));
    }

    #[test]
    fn test_seam_duplicate_not_merged_across_gap() {
        let a = fragment_at("a", 0, line(37.77, 3));
        let b = fragment_at("b", 900, line(a.last_waypoint().latitude, 3));
        assert!(coordinates_match(a.last_waypoint(), b.first_waypoint(), 0.0));

        let route = aggregate(&[a, b], 300.0).unwrap();
        assert_eq!(route.total_waypoint_count(), 6);
    }

    #[test]
    fn test_tolerance_is_configurable() {
        let a = fragment_at("a", 0, vec![wp(37.7749, -122.4194), wp(37.7751, -122.4192)]);
        let b = fragment_at("b", 60, vec![wp(37.775105, -122.4192), wp(37.7753, -122.4190)]);

        let tolerant = FragmentAggregator::default().aggregate(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(tolerant.total_waypoint_count(), 3);

        let exact = FragmentAggregator::new(AggregationConfig {
            coordinate_tolerance_deg: 0.0,
            ..AggregationConfig::default()
        })
        .aggregate(&[a, b])
        .unwrap();
        assert_eq!(exact.total_waypoint_count(), 4);
    }

    #[test]
    fn test_canonical_waypoints_carry_fragment_ref() {
        let a = fragment_at("a", 0, line(37.77, 2));
        let b = fragment_at("b", 60, line(37.78, 2));
        let route = aggregate(&[a, b], 300.0).unwrap();

        let refs: Vec<Option<&str>> = route
            .waypoints
            .iter()
            .map(|w| w.source_fragment_ref.as_deref())
            .collect();
        assert_eq!(refs, vec![Some("a"), Some("a"), Some("b"), Some("b")]);
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let a = fragment_at("a", 0, line(37.77, 2));
        let b = fragment_at("b", 0, line(37.78, 2));

        let route = aggregate(&[b.clone(), a.clone()], 300.0).unwrap();
        assert_eq!(route.segments[0].source_fragment_ref.as_deref(), Some("b"));

        let route = aggregate(&[a, b], 300.0).unwrap();
        assert_eq!(route.segments[0].source_fragment_ref.as_deref(), Some("a"));
    }

    #[test]
    fn test_status_controls_completeness() {
        let fragment = fragment_at("a", 0, line(37.77, 2));
        let aggregator = FragmentAggregator::default();

        let truncated = CollectionStatus { truncated: true, ..Default::default() };
        let route = aggregator.aggregate_with_status(std::slice::from_ref(&fragment), &truncated).unwrap();
        assert!(!route.is_complete);

        let failed = CollectionStatus { failed_fragments: 2, ..Default::default() };
        let route = aggregator.aggregate_with_status(std::slice::from_ref(&fragment), &failed).unwrap();
        assert!(!route.is_complete);
    }

    #[test]
    #[should_panic(expected = "more than one trip")]
    fn test_mixed_trips_panic() {
        let a = fragment_at("a", 0, line(37.77, 2));
        let other = Fragment::new(
            "x",
            Uuid::from_u128(8),
            a.recorded_at(),
            line(37.78, 2),
            "l",
        )
        .unwrap();
        let _ = aggregate(&[a, other], 300.0);
    }

    #[test]
    fn test_aggregate_trips_keeps_order() {
        let one = FragmentBatch {
            fragments: vec![fragment_at("a", 0, line(37.77, 2))],
            status: CollectionStatus::complete(),
        };
        let empty = FragmentBatch { fragments: vec![], status: CollectionStatus::complete() };

        let results = aggregate_trips(&[one, empty], &AggregationConfig::default());
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(InsufficientDataError));
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let batches: Vec<FragmentBatch> = (0..8)
            .map(|t| FragmentBatch {
                fragments: vec![
                    fragment_at("a", 0, line(37.0 + t as f64, 4)),
                    fragment_at("b", 600, line(37.5 + t as f64, 4)),
                ],
                status: CollectionStatus::complete(),
            })
            .collect();

        let config = AggregationConfig::default();
        assert_eq!(
            aggregate_trips(&batches, &config),
            aggregate_trips_parallel(&batches, &config)
        );
    }
}
