//! Downstream consumers of an aggregated route.
//!
//! Consumers receive both the [`UnifiedRoute`] and the original fragment list.
//! The route drives drawing; audits read the raw fragments so they report
//! per-fragment waypoint counts exactly as recorded, seams included.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{Fragment, UnifiedRoute};

/// Something that turns an aggregated route into an output.
pub trait RouteConsumer {
    type Output;

    fn consume(&mut self, route: &UnifiedRoute, fragments: &[Fragment]) -> Self::Output;
}

/// One line of an audit: a fragment exactly as recorded.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AuditRow {
    pub fragment_id: String,
    pub recorded_at: DateTime<Utc>,
    pub waypoint_count: usize,
    pub source_link: String,
}

/// Per-fragment audit of one trip.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AuditReport {
    pub trip_ref: Uuid,
    /// Chronological, one row per fragment.
    pub rows: Vec<AuditRow>,
    /// Sum of raw per-fragment counts.
    pub raw_waypoint_count: usize,
    /// Length of the deduplicated canonical sequence.
    pub canonical_waypoint_count: usize,
    pub gap_count: usize,
    pub is_complete: bool,
}

impl AuditReport {
    pub fn build(route: &UnifiedRoute, fragments: &[Fragment]) -> Self {
        let mut rows: Vec<AuditRow> = fragments
            .iter()
            .map(|f| AuditRow {
                fragment_id: f.id().to_string(),
                recorded_at: f.recorded_at(),
                waypoint_count: f.waypoint_count(),
                source_link: f.source_link().to_string(),
            })
            .collect();
        rows.sort_by_key(|r| r.recorded_at);

        Self {
            trip_ref: route.trip_ref,
            raw_waypoint_count: rows.iter().map(|r| r.waypoint_count).sum(),
            rows,
            canonical_waypoint_count: route.total_waypoint_count(),
            gap_count: route.gap_count(),
            is_complete: route.is_complete,
        }
    }

    /// Waypoints removed from the canonical sequence at fragment seams.
    pub fn merged_seams(&self) -> usize {
        self.raw_waypoint_count.saturating_sub(self.canonical_waypoint_count)
    }
}

/// Consumer producing an [`AuditReport`].
#[derive(Debug, Default)]
pub struct AuditConsumer;

impl RouteConsumer for AuditConsumer {
    type Output = AuditReport;

    fn consume(&mut self, route: &UnifiedRoute, fragments: &[Fragment]) -> AuditReport {
        AuditReport::build(route, fragments)
    }
}

impl fmt::Display for AuditReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Audit for trip {}", self.trip_ref)?;
        writeln!(f, "{:<24} {:<20} {:>9}  {}", "FRAGMENT", "RECORDED (UTC)", "WAYPOINTS", "SOURCE")?;
        for row in &self.rows {
            writeln!(
                f,
                "{:<24} {:<20} {:>9}  {}",
                row.fragment_id,
                row.recorded_at.format("%Y-%m-%d %H:%M:%S"),
                row.waypoint_count,
                row.source_link
            )?;
        }
        write!(
            f,
            "raw waypoints: {}, canonical: {} ({} seam(s) merged), gaps: {}, complete: {}",
            self.raw_waypoint_count,
            self.canonical_waypoint_count,
            self.merged_seams(),
            self.gap_count,
            if self.is_complete { "yes" } else { "no" }
        )
    }
}

#[cfg(feature = "serde")]
pub use geojson::{to_geojson, GeoJsonConsumer};

#[cfg(feature = "serde")]
mod geojson {
    use serde_json::{json, Value};

    use super::RouteConsumer;
    use crate::{Fragment, UnifiedRoute};

    /// Render a route as a GeoJSON FeatureCollection, one LineString per segment.
    ///
    /// Coordinates are `[longitude, latitude]` as RFC 7946 requires.
    pub fn to_geojson(route: &UnifiedRoute) -> Value {
        let features: Vec<Value> = route
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| {
                let coordinates: Vec<[f64; 2]> = segment
                    .waypoints
                    .iter()
                    .map(|w| [w.longitude, w.latitude])
                    .collect();
                json!({
                    "type": "Feature",
                    "geometry": { "type": "LineString", "coordinates": coordinates },
                    "properties": {
                        "index": index,
                        "kind": segment.kind.as_str(),
                        "fragment": segment.source_fragment_ref,
                    },
                })
            })
            .collect();

        json!({
            "type": "FeatureCollection",
            "features": features,
            "properties": {
                "trip": route.trip_ref.to_string(),
                "fragments": route.fragment_count,
                "gaps": route.gap_count(),
                "complete": route.is_complete,
            },
        })
    }

    /// Consumer producing GeoJSON.
    #[derive(Debug, Default)]
    pub struct GeoJsonConsumer;

    impl RouteConsumer for GeoJsonConsumer {
        type Output = Value;

        fn consume(&mut self, route: &UnifiedRoute, _fragments: &[Fragment]) -> Value {
            to_geojson(route)
        }
    }
}
