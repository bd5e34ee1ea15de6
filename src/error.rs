//! Error types.
//!
//! Construction errors ([`InvalidWaypointError`], [`InvalidFragmentError`]) belong
//! to the parsing layer and never reach the aggregator. The aggregator has a
//! single failure mode, [`InsufficientDataError`].

use thiserror::Error;

/// A waypoint coordinate failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidWaypointError {
    #[error("coordinate is not a finite number")]
    NonFinite,
    #[error("{0} is missing")]
    MissingCoordinate(&'static str),
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}

/// A fragment failed validation at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidFragmentError {
    #[error("fragment id is empty")]
    EmptyId,
    #[error("fragment {0} has a nil trip reference")]
    NilTripRef(String),
    #[error("fragment {id} has {count} waypoint(s), at least 2 required")]
    TooFewWaypoints { id: String, count: usize },
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("waypoint {index} is invalid: {source}")]
    InvalidWaypoint {
        index: usize,
        #[source]
        source: InvalidWaypointError,
    },
}

/// `aggregate` was called with no fragments.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot aggregate a route from zero fragments")]
pub struct InsufficientDataError;

/// Failure while collecting fragments from a [`LogSource`](crate::LogSource).
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse log records: {0}")]
    Parse(String),
    #[error("request failed: {0}")]
    Http(String),
    #[error("log backend returned HTTP {0}")]
    Status(u16),
    #[error("runtime error: {0}")]
    Runtime(String),
}
