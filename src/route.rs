//! Aggregation output: route segments and the unified route.

use uuid::Uuid;

use crate::geo_utils;
use crate::{Bounds, Waypoint};

/// Whether a segment is recorded data or a synthetic bridge over missing data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum SegmentKind {
    /// Verbatim copy of one fragment's waypoints.
    Continuous,
    /// Two-point bridge from the end of one fragment to the start of the next.
    Gap,
}

impl SegmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentKind::Continuous => "continuous",
            SegmentKind::Gap => "gap",
        }
    }
}

/// A contiguous renderable unit of a route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RouteSegment {
    pub waypoints: Vec<Waypoint>,
    pub kind: SegmentKind,
    /// Originating fragment id; `None` for gap segments.
    pub source_fragment_ref: Option<String>,
}

impl RouteSegment {
    pub(crate) fn continuous(fragment_id: &str, waypoints: Vec<Waypoint>) -> Self {
        Self {
            waypoints,
            kind: SegmentKind::Continuous,
            source_fragment_ref: Some(fragment_id.to_string()),
        }
    }

    pub(crate) fn gap(from: Waypoint, to: Waypoint) -> Self {
        Self {
            waypoints: vec![from, to],
            kind: SegmentKind::Gap,
            source_fragment_ref: None,
        }
    }

    pub fn is_gap(&self) -> bool {
        self.kind == SegmentKind::Gap
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    /// Haversine length of the segment in meters.
    pub fn distance_meters(&self) -> f64 {
        geo_utils::polyline_length(&self.waypoints)
    }
}

/// The aggregated view of one trip.
///
/// `waypoints` is the canonical sequence: chronological and free of seam
/// duplicates, for overall metrics and polyline drawing. `segments` keep each
/// fragment's waypoints untouched, interleaved with gap bridges.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UnifiedRoute {
    pub trip_ref: Uuid,
    pub waypoints: Vec<Waypoint>,
    pub segments: Vec<RouteSegment>,
    pub fragment_count: usize,
    pub is_complete: bool,
}

impl UnifiedRoute {
    /// Length of the canonical waypoint sequence.
    pub fn total_waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn has_gaps(&self) -> bool {
        self.segments.iter().any(RouteSegment::is_gap)
    }

    pub fn gap_count(&self) -> usize {
        self.segments.iter().filter(|s| s.is_gap()).count()
    }

    pub fn continuous_segments(&self) -> impl Iterator<Item = &RouteSegment> + '_ {
        self.segments.iter().filter(|s| s.kind == SegmentKind::Continuous)
    }

    pub fn gap_segments(&self) -> impl Iterator<Item = &RouteSegment> + '_ {
        self.segments.iter().filter(|s| s.is_gap())
    }

    /// The continuous segment built from the given fragment, if any.
    pub fn segment_for_fragment(&self, fragment_id: &str) -> Option<&RouteSegment> {
        self.continuous_segments()
            .find(|s| s.source_fragment_ref.as_deref() == Some(fragment_id))
    }

    /// Bounding box of the canonical waypoints, for map framing.
    pub fn bounds(&self) -> Option<Bounds> {
        geo_utils::compute_bounds(&self.waypoints)
    }

    /// Haversine length of the canonical sequence in meters.
    ///
    /// The sequence is continuous across fragments, so gap bridges are counted
    /// as straight lines.
    pub fn distance_meters(&self) -> f64 {
        geo_utils::polyline_length(&self.waypoints)
    }

    /// Distinct order references along the route, in first-seen order.
    pub fn order_refs(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for order in self.waypoints.iter().filter_map(|w| w.order_ref.as_deref()) {
            if !refs.contains(&order) {
                refs.push(order);
            }
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(lat: f64, lng: f64) -> Waypoint {
        Waypoint::new(lat, lng).unwrap()
    }

    fn sample_route() -> UnifiedRoute {
        let a = vec![wp(0.0, 0.0), wp(0.0, 0.001).with_order_ref("o1")];
        let b = vec![wp(0.0, 0.01).with_order_ref("o2"), wp(0.0, 0.011)];
        UnifiedRoute {
            trip_ref: Uuid::from_u128(1),
            waypoints: a.iter().chain(b.iter()).cloned().collect(),
            segments: vec![
                RouteSegment::continuous("a", a.clone()),
                RouteSegment::gap(a[1].clone(), b[0].clone()),
                RouteSegment::continuous("b", b.clone()),
            ],
            fragment_count: 2,
            is_complete: true,
        }
    }

    #[test]
    fn test_gap_queries() {
        let route = sample_route();
        assert!(route.has_gaps());
        assert_eq!(route.gap_count(), 1);
        assert_eq!(route.continuous_segments().count(), 2);
        assert_eq!(route.gap_segments().count(), 1);
        assert!(route.gap_segments().all(|s| s.source_fragment_ref.is_none()));
        assert_eq!(route.total_waypoint_count(), 4);
    }

    #[test]
    fn test_segment_for_fragment() {
        let route = sample_route();
        let seg = route.segment_for_fragment("b").unwrap();
        assert_eq!(seg.waypoints[0].order_ref.as_deref(), Some("o2"));
        assert!(route.segment_for_fragment("missing").is_none());
    }

    #[test]
    fn test_distance_and_bounds() {
        let route = sample_route();
        let gap = route.gap_segments().next().unwrap();
        // 0.009 degrees of longitude at the equator is about 1km
        assert!((gap.distance_meters() - 1000.0).abs() < 10.0);
        assert!(route.distance_meters() > gap.distance_meters());

        let bounds = route.bounds().unwrap();
        assert_eq!(bounds.min_lng, 0.0);
        assert_eq!(bounds.max_lng, 0.011);
    }

    #[test]
    fn test_order_refs() {
        assert_eq!(sample_route().order_refs(), vec!["o1", "o2"]);
    }
}
