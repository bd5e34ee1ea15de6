//! # Route Stitcher
//!
//! Reconstructs a delivery driver's GPS route from independently-recorded
//! session fragments.
//!
//! Each app session produces one route recording; a crash or restart mid-trip
//! starts a new one. This library takes those recordings in any order and
//! produces a single chronological, seam-deduplicated route with explicit gap
//! segments where data is missing.
//!
//! This library provides:
//! - Validated value types ([`Waypoint`], [`Fragment`])
//! - Fragment aggregation into a [`UnifiedRoute`]
//! - Trip summaries and per-fragment audit reports
//! - Collectors that turn raw log records into fragments
//!
//! ## Features
//!
//! - **`serde`** - Raw log-record parsing, file sources and JSON/GeoJSON export
//! - **`parallel`** - Aggregate many trips in parallel with rayon
//! - **`http`** - Fetch fragments from the log-search backend
//! - **`cli`** - The `route-stitcher` command-line tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use route_stitcher::{aggregate, Fragment, Waypoint};
//! use uuid::Uuid;
//!
//! let trip = Uuid::from_u128(0x7f3a);
//! let start = Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap();
//!
//! let first = Fragment::new(
//!     "session-1",
//!     trip,
//!     start,
//!     vec![
//!         Waypoint::new(37.7749, -122.4194).unwrap(),
//!         Waypoint::new(37.7751, -122.4192).unwrap(),
//!     ],
//!     "https://logs.example.com/event/1",
//! )
//! .unwrap();
//! let second = Fragment::new(
//!     "session-2",
//!     trip,
//!     start + chrono::Duration::seconds(60),
//!     vec![
//!         Waypoint::new(37.7751, -122.4192).unwrap(),
//!         Waypoint::new(37.7753, -122.4190).unwrap(),
//!     ],
//!     "https://logs.example.com/event/2",
//! )
//! .unwrap();
//!
//! let route = aggregate(&[second, first], 300.0).unwrap();
//! assert_eq!(route.segments.len(), 2);
//! assert_eq!(route.total_waypoint_count(), 3);
//! assert!(!route.has_gaps());
//! ```

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod error;
pub use error::{InsufficientDataError, InvalidFragmentError, InvalidWaypointError, SourceError};

pub mod geo_utils;

pub mod route;
pub use route::{RouteSegment, SegmentKind, UnifiedRoute};

pub mod aggregator;
pub use aggregator::{aggregate, aggregate_trips, FragmentAggregator};
#[cfg(feature = "parallel")]
pub use aggregator::aggregate_trips_parallel;

pub mod summary;
pub use summary::{CollectionStatus, TripSummary};

pub mod source;
pub use source::{collect_fragments, FragmentBatch, LogSource, MAX_FRAGMENTS};
#[cfg(feature = "serde")]
pub use source::FileLogSource;

#[cfg(feature = "serde")]
pub mod records;

pub mod export;
pub use export::{AuditConsumer, AuditReport, AuditRow, RouteConsumer};
#[cfg(feature = "serde")]
pub use export::{to_geojson, GeoJsonConsumer};

// HTTP module for fragment fetching
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{LogSearchClient, LogSearchConfig};

// ============================================================================
// Core Types
// ============================================================================

/// A single GPS sample, optionally tagged with the order being delivered.
///
/// `order_ref` absent means the driver was repositioning (e.g. returning to
/// the restaurant) rather than on an active delivery leg. `source_fragment_ref`
/// is tracing metadata only and does not take part in equality.
///
/// # Example
/// ```
/// use route_stitcher::Waypoint;
/// let point = Waypoint::new(37.7749, -122.4194).unwrap().with_order_ref("order-81");
/// assert!(!point.is_repositioning());
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Waypoint {
    pub latitude: f64,
    pub longitude: f64,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub order_ref: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub source_fragment_ref: Option<String>,
}

impl Waypoint {
    /// Create a waypoint, validating the coordinate range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, InvalidWaypointError> {
        if !latitude.is_finite() || !longitude.is_finite() {
            return Err(InvalidWaypointError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(InvalidWaypointError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(InvalidWaypointError::LongitudeOutOfRange(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
            order_ref: None,
            source_fragment_ref: None,
        })
    }

    pub fn with_order_ref(mut self, order_ref: impl Into<String>) -> Self {
        self.order_ref = Some(order_ref.into());
        self
    }

    pub fn with_source_fragment_ref(mut self, fragment_id: impl Into<String>) -> Self {
        self.source_fragment_ref = Some(fragment_id.into());
        self
    }

    /// True when the sample is not attached to any delivery order.
    pub fn is_repositioning(&self) -> bool {
        self.order_ref.is_none()
    }
}

impl PartialEq for Waypoint {
    fn eq(&self, other: &Self) -> bool {
        self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.order_ref == other.order_ref
    }
}

/// One recording session of a trip.
///
/// Fragments are immutable once built. The aggregator only reads them, and
/// the same list is kept by callers for audit after aggregation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Fragment {
    id: String,
    trip_ref: Uuid,
    recorded_at: DateTime<Utc>,
    waypoints: Vec<Waypoint>,
    source_link: String,
}

impl Fragment {
    /// Build a fragment.
    ///
    /// Fails when the id is blank, the trip reference is the nil UUID, or
    /// fewer than 2 waypoints are given.
    pub fn new(
        id: impl Into<String>,
        trip_ref: Uuid,
        recorded_at: DateTime<Utc>,
        waypoints: Vec<Waypoint>,
        source_link: impl Into<String>,
    ) -> Result<Self, InvalidFragmentError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(InvalidFragmentError::EmptyId);
        }
        if trip_ref.is_nil() {
            return Err(InvalidFragmentError::NilTripRef(id));
        }
        if waypoints.len() < 2 {
            return Err(InvalidFragmentError::TooFewWaypoints {
                id,
                count: waypoints.len(),
            });
        }
        Ok(Self {
            id,
            trip_ref,
            recorded_at,
            waypoints,
            source_link: source_link.into(),
        })
    }

    /// Build a fragment from a Unix timestamp in milliseconds.
    pub fn from_epoch_millis(
        id: impl Into<String>,
        trip_ref: Uuid,
        recorded_at_ms: i64,
        waypoints: Vec<Waypoint>,
        source_link: impl Into<String>,
    ) -> Result<Self, InvalidFragmentError> {
        let recorded_at = DateTime::<Utc>::from_timestamp_millis(recorded_at_ms)
            .ok_or_else(|| InvalidFragmentError::InvalidTimestamp(format!("{recorded_at_ms}ms")))?;
        Self::new(id, trip_ref, recorded_at, waypoints, source_link)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn trip_ref(&self) -> Uuid {
        self.trip_ref
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn waypoints(&self) -> &[Waypoint] {
        &self.waypoints
    }

    /// URI of the originating log record.
    pub fn source_link(&self) -> &str {
        &self.source_link
    }

    pub fn waypoint_count(&self) -> usize {
        self.waypoints.len()
    }

    pub fn first_waypoint(&self) -> &Waypoint {
        &self.waypoints[0]
    }

    pub fn last_waypoint(&self) -> &Waypoint {
        &self.waypoints[self.waypoints.len() - 1]
    }

    /// Distinct order references, in the order they first appear.
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

/// Configuration for fragment aggregation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationConfig {
    /// Time between two consecutive fragments' `recorded_at` above which a
    /// gap segment is inserted. Strictly greater-than.
    /// Default: 300.0 seconds
    pub gap_threshold_secs: f64,

    /// Per-axis tolerance under which two seam waypoints count as the same
    /// point. Exact equality always matches.
    /// Default: 1e-5 degrees (~1 meter)
    pub coordinate_tolerance_deg: f64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            gap_threshold_secs: 300.0,
            coordinate_tolerance_deg: 1e-5,
        }
    }
}

/// Bounding box for a route.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Get the center point of the bounds as `(latitude, longitude)`.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn trip() -> Uuid {
        Uuid::from_u128(0x51ab_7e11)
    }

    fn sample_waypoints() -> Vec<Waypoint> {
        vec![
            Waypoint::new(37.7749, -122.4194).unwrap(),
            Waypoint::new(37.7750, -122.4193).unwrap().with_order_ref("order-1"),
            Waypoint::new(37.7751, -122.4192).unwrap().with_order_ref("order-2"),
            Waypoint::new(37.7752, -122.4191).unwrap().with_order_ref("order-1"),
        ]
    }

    #[test]
    fn test_waypoint_validation() {
        assert!(Waypoint::new(37.7749, -122.4194).is_ok());
        assert!(Waypoint::new(90.0, 180.0).is_ok());
        assert_eq!(
            Waypoint::new(91.0, 0.0),
            Err(InvalidWaypointError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            Waypoint::new(0.0, -181.0),
            Err(InvalidWaypointError::LongitudeOutOfRange(-181.0))
        );
        assert_eq!(Waypoint::new(f64::NAN, 0.0), Err(InvalidWaypointError::NonFinite));
    }

    #[test]
    fn test_waypoint_equality_ignores_source_ref() {
        let a = Waypoint::new(1.0, 2.0).unwrap().with_source_fragment_ref("a");
        let b = Waypoint::new(1.0, 2.0).unwrap().with_source_fragment_ref("b");
        assert_eq!(a, b);
        assert_ne!(a, b.with_order_ref("order-9"));
    }

    #[test]
    fn test_fragment_validation() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        assert_eq!(
            Fragment::new("  ", trip(), at, sample_waypoints(), "link"),
            Err(InvalidFragmentError::EmptyId)
        );
        assert_eq!(
            Fragment::new("f1", Uuid::nil(), at, sample_waypoints(), "link"),
            Err(InvalidFragmentError::NilTripRef("f1".to_string()))
        );
        assert_eq!(
            Fragment::new("f1", trip(), at, sample_waypoints()[..1].to_vec(), "link"),
            Err(InvalidFragmentError::TooFewWaypoints { id: "f1".to_string(), count: 1 })
        );
        assert!(Fragment::new("f1", trip(), at, sample_waypoints(), "link").is_ok());
    }

    #[test]
    fn test_fragment_from_epoch_millis() {
        let fragment =
            Fragment::from_epoch_millis("f1", trip(), 1_767_268_800_000, sample_waypoints(), "link")
                .unwrap();
        assert_eq!(
            fragment.recorded_at(),
            Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
        );

        assert_eq!(
            Fragment::from_epoch_millis("f1", trip(), i64::MAX, sample_waypoints(), "link"),
            Err(InvalidFragmentError::InvalidTimestamp(format!("{}ms", i64::MAX)))
        );
    }

    #[test]
    fn test_fragment_accessors() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let fragment = Fragment::new("f1", trip(), at, sample_waypoints(), "link").unwrap();

        assert_eq!(fragment.waypoint_count(), 4);
        assert_eq!(fragment.first_waypoint().latitude, 37.7749);
        assert_eq!(fragment.last_waypoint().latitude, 37.7752);
        assert_eq!(fragment.order_refs(), vec!["order-1", "order-2"]);
        assert!(fragment.first_waypoint().is_repositioning());
    }

    #[test]
    fn test_bounds_center() {
        let bounds = Bounds { min_lat: 10.0, max_lat: 20.0, min_lng: -5.0, max_lng: 5.0 };
        assert_eq!(bounds.center(), (15.0, 0.0));
    }
}
