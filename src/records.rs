//! Raw log-record model.
//!
//! The driver app logs one event per route session. The log backend returns
//! them as a search response:
//!
//! ```json
//! {
//!   "data": [{
//!     "id": "AQAAAZ1",
//!     "attributes": {
//!       "timestamp": "2026-03-14T18:00:00.000Z",
//!       "attributes": {
//!         "tripID": "5f0c7d0e-8a61-4f53-9a3e-0c2f6d1b7a44",
//!         "route": [
//!           { "latitude": 37.7749, "longitude": -122.4194, "orderID": "81" }
//!         ]
//!       }
//!     }
//!   }],
//!   "meta": { "page": { "after": "cursor" } }
//! }
//! ```
//!
//! Each event becomes a [`RouteRecord`], which validates into a [`Fragment`].

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{Fragment, InvalidFragmentError, SourceError, Waypoint};

/// One page of a log search.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub records: Vec<RouteRecord>,
    /// Cursor for the next page; present when more events matched than were returned.
    pub next_cursor: Option<String>,
}

/// A route log event before validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteRecord {
    pub id: String,
    attributes: EventAttributes,
}

#[derive(Debug, Clone, Deserialize)]
struct EventAttributes {
    #[serde(default)]
    timestamp: Value,
    #[serde(default)]
    attributes: RoutePayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RoutePayload {
    #[serde(rename = "tripID", default)]
    trip_id: Option<String>,
    #[serde(default)]
    route: Vec<RawWaypoint>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWaypoint {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(rename = "orderID", default)]
    order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<RouteRecord>,
    #[serde(default)]
    meta: Option<SearchMeta>,
}

#[derive(Debug, Deserialize)]
struct SearchMeta {
    page: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    after: Option<String>,
}

impl RouteRecord {
    /// The trip this record belongs to, if it carries a parseable trip id.
    pub fn trip_ref(&self) -> Option<Uuid> {
        self.attributes
            .attributes
            .trip_id
            .as_deref()
            .and_then(|id| Uuid::parse_str(id.trim()).ok())
    }

    pub fn waypoint_count(&self) -> usize {
        self.attributes.attributes.route.len()
    }

    /// Link to this event in the log viewer.
    pub fn source_link(&self, link_base: &str) -> String {
        format!("{}?event={}", link_base.trim_end_matches('/'), self.id)
    }

    /// Validate the record into a fragment.
    pub fn to_fragment(&self, link_base: &str) -> Result<Fragment, InvalidFragmentError> {
        let trip_ref = self.trip_ref().unwrap_or(Uuid::nil());
        let recorded_at = parse_timestamp(&self.attributes.timestamp)?;

        let waypoints = self
            .attributes
            .attributes
            .route
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                raw.to_waypoint(&self.id)
                    .map_err(|source| InvalidFragmentError::InvalidWaypoint { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Fragment::new(
            self.id.clone(),
            trip_ref,
            recorded_at,
            waypoints,
            self.source_link(link_base),
        )
    }
}

impl RawWaypoint {
    fn to_waypoint(&self, fragment_id: &str) -> Result<Waypoint, crate::InvalidWaypointError> {
        let lat = self
            .latitude
            .ok_or(crate::InvalidWaypointError::MissingCoordinate("latitude"))?;
        let lng = self
            .longitude
            .ok_or(crate::InvalidWaypointError::MissingCoordinate("longitude"))?;
        let mut waypoint = Waypoint::new(lat, lng)?.with_source_fragment_ref(fragment_id);
        if let Some(order) = self.order_id.as_deref().filter(|o| !o.is_empty()) {
            waypoint = waypoint.with_order_ref(order);
        }
        Ok(waypoint)
    }
}

/// Accepts RFC 3339 strings and Unix epoch milliseconds.
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, InvalidFragmentError> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| InvalidFragmentError::InvalidTimestamp(s.clone())),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| InvalidFragmentError::InvalidTimestamp(n.to_string())),
        other => Err(InvalidFragmentError::InvalidTimestamp(other.to_string())),
    }
}

/// Parse a log search response body.
pub fn parse_search_response(body: &str) -> Result<SearchPage, SourceError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;

    Ok(SearchPage {
        records: response.data,
        next_cursor: response.meta.and_then(|m| m.page).and_then(|p| p.after),
    })
}

/// Distinct trips referenced by `records`, in first-seen order.
pub fn trips_in(records: &[RouteRecord]) -> Vec<Uuid> {
    let mut trips = Vec::new();
    for trip in records.iter().filter_map(RouteRecord::trip_ref) {
        if !trips.contains(&trip) {
            trips.push(trip);
        }
    }
    trips
}

/// Validate the records belonging to `trip_ref`, skipping other trips.
pub fn fragments_for_trip<'a>(
    records: &'a [RouteRecord],
    trip_ref: Uuid,
    link_base: &'a str,
) -> impl Iterator<Item = Result<Fragment, String>> + 'a {
    records
        .iter()
        .filter(move |r| r.trip_ref() == Some(trip_ref))
        .map(move |r| r.to_fragment(link_base).map_err(|e| format!("record {}: {}", r.id, e)))
}
