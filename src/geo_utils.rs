//! # Geographic Utilities
//!
//! Geographic computations over waypoint sequences, used by the output model
//! (route length, map bounds) and by the aggregator (seam duplicate detection).
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two waypoints |
//! | [`polyline_length`] | Total length of a waypoint sequence in meters |
//! | [`compute_bounds`] | Bounding box of a waypoint sequence |
//! | [`compute_center`] | Centroid of a waypoint sequence |
//! | [`coordinates_match`] | Whether two waypoints are the same point within a tolerance |
//!
//! ## Example
//!
//! ```rust
//! use route_stitcher::{Waypoint, geo_utils};
//!
//! let track = vec![
//!     Waypoint::new(37.7749, -122.4194).unwrap(),
//!     Waypoint::new(37.7750, -122.4193).unwrap(),
//!     Waypoint::new(37.7751, -122.4192).unwrap(),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! println!("Track length: {:.0}m", length);
//!
//! let bounds = geo_utils::compute_bounds(&track).unwrap();
//! println!("Bounds: {:.4}N to {:.4}N", bounds.min_lat, bounds.max_lat);
//! ```
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees), which is the
//! standard used by GPS receivers and mapping services.

use geo::{Distance, Haversine, Point};

use crate::{Bounds, Waypoint};

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two waypoints using the Haversine formula.
///
/// Returns the distance in meters along the Earth's surface (assuming a spherical Earth
/// with radius 6,371 km).
///
/// # Example
///
/// ```rust
/// use route_stitcher::{Waypoint, geo_utils};
///
/// let london = Waypoint::new(51.5074, -0.1278).unwrap();
/// let paris = Waypoint::new(48.8566, 2.3522).unwrap();
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 1000.0); // ~344 km
/// ```
#[inline]
pub fn haversine_distance(p1: &Waypoint, p2: &Waypoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Calculate the total length of a waypoint sequence in meters.
///
/// Sums the haversine distance between consecutive waypoints. Empty or single-point
/// sequences return 0.0.
pub fn polyline_length(points: &[Waypoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Matching
// =============================================================================

/// Whether two waypoints are "the same point" for seam deduplication.
///
/// Exact equality always matches. Otherwise both the latitude and longitude
/// deltas must be strictly below `tolerance_deg`.
///
/// ```rust
/// use route_stitcher::{Waypoint, geo_utils};
///
/// let a = Waypoint::new(37.7751, -122.4192).unwrap();
/// let b = Waypoint::new(37.775104, -122.419203).unwrap();
/// assert!(geo_utils::coordinates_match(&a, &b, 1e-5));
/// assert!(!geo_utils::coordinates_match(&a, &b, 0.0));
/// ```
#[inline]
pub fn coordinates_match(a: &Waypoint, b: &Waypoint, tolerance_deg: f64) -> bool {
    if a.latitude == b.latitude && a.longitude == b.longitude {
        return true;
    }
    (a.latitude - b.latitude).abs() < tolerance_deg
        && (a.longitude - b.longitude).abs() < tolerance_deg
}

// =============================================================================
// Bounding Box Functions
// =============================================================================

/// Compute the bounding box of a waypoint sequence.
///
/// Returns `None` for empty input.
///
/// ```rust
/// use route_stitcher::{Waypoint, geo_utils};
///
/// let track = vec![
///     Waypoint::new(51.5000, -0.1300).unwrap(),
///     Waypoint::new(51.5100, -0.1200).unwrap(),
///     Waypoint::new(51.5050, -0.1250).unwrap(),
/// ];
///
/// let bounds = geo_utils::compute_bounds(&track).unwrap();
/// assert_eq!(bounds.min_lat, 51.5000);
/// assert_eq!(bounds.max_lng, -0.1200);
/// ```
pub fn compute_bounds(points: &[Waypoint]) -> Option<Bounds> {
    if points.is_empty() {
        return None;
    }

    let mut min_lat = f64::MAX;
    let mut max_lat = f64::MIN;
    let mut min_lng = f64::MAX;
    let mut max_lng = f64::MIN;

    for p in points {
        min_lat = min_lat.min(p.latitude);
        max_lat = max_lat.max(p.latitude);
        min_lng = min_lng.min(p.longitude);
        max_lng = max_lng.max(p.longitude);
    }

    Some(Bounds { min_lat, max_lat, min_lng, max_lng })
}

/// Compute the arithmetic centroid of a waypoint sequence.
///
/// Returns `None` for empty input. Suitable for the small areas a single
/// delivery trip covers; no antimeridian handling.
pub fn compute_center(points: &[Waypoint]) -> Option<(f64, f64)> {
    if points.is_empty() {
        return None;
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Some((sum_lat / n, sum_lng / n))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn wp(lat: f64, lng: f64) -> Waypoint {
        Waypoint::new(lat, lng).unwrap()
    }

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = wp(37.7749, -122.4194);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_haversine_distance_known_value() {
        let london = wp(51.5074, -0.1278);
        let paris = wp(48.8566, 2.3522);
        let dist = haversine_distance(&london, &paris);
        assert!(approx_eq(dist, 343_560.0, 5000.0));
    }

    #[test]
    fn test_polyline_length_degenerate() {
        assert_eq!(polyline_length(&[]), 0.0);
        assert_eq!(polyline_length(&[wp(37.7749, -122.4194)]), 0.0);
    }

    #[test]
    fn test_polyline_length_two_points() {
        let track = vec![wp(51.5074, -0.1278), wp(51.5080, -0.1280)];
        let length = polyline_length(&track);
        assert!(length > 0.0);
        assert!(length < 100.0); // about 68m
    }

    #[test]
    fn test_coordinates_match_exact_and_tolerant() {
        let a = wp(37.7751, -122.4192);
        assert!(coordinates_match(&a, &a.clone(), 0.0));
        assert!(coordinates_match(&a, &wp(37.775105, -122.4192), 1e-5));
        assert!(!coordinates_match(&a, &wp(37.7752, -122.4192), 1e-5));
        // Both axes must be within tolerance
        assert!(!coordinates_match(&a, &wp(37.7751, -122.4193), 1e-5));
    }

    #[test]
    fn test_compute_bounds() {
        let track = vec![wp(51.50, -0.13), wp(51.51, -0.12), wp(51.505, -0.125)];
        let bounds = compute_bounds(&track).unwrap();
        assert_eq!(bounds.min_lat, 51.50);
        assert_eq!(bounds.max_lat, 51.51);
        assert_eq!(bounds.min_lng, -0.13);
        assert_eq!(bounds.max_lng, -0.12);
        assert!(compute_bounds(&[]).is_none());
    }

    #[test]
    fn test_compute_center() {
        let track = vec![wp(51.50, -0.10), wp(51.52, -0.12)];
        let (lat, lng) = compute_center(&track).unwrap();
        assert!(approx_eq(lat, 51.51, 0.001));
        assert!(approx_eq(lng, -0.11, 0.001));
        assert!(compute_center(&[]).is_none());
    }
}
