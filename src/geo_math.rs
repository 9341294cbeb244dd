//! # Geographic Math
//!
//! Distance and bounding-box primitives for the discovery pipeline.
//!
//! Everything here works in **miles**, the one unit system used across the
//! engine (the external sync radius is the lone exception; see
//! [`crate::sync`], where the provider's `around:` filter is
//! meter-denominated).
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`distance_miles`] | Great-circle distance between two coordinates |
//! | [`bounding_box`] | Lat/lon rectangle enclosing a radius around a center |
//!
//! ## Example
//!
//! ```rust
//! use hotspot_engine::{Coordinate, geo_math};
//!
//! let times_square = Coordinate::new(40.7580, -73.9855);
//! let empire_state = Coordinate::new(40.7484, -73.9857);
//!
//! let dist = geo_math::distance_miles(&times_square, &empire_state);
//! assert!((dist - 0.66).abs() < 0.05); // about two-thirds of a mile
//!
//! let bbox = geo_math::bounding_box(&times_square, 1.0);
//! assert!(bbox.contains(&empire_state));
//! ```
//!
//! ## Accuracy Notes
//!
//! `distance_miles` uses the haversine formula on a mean spherical Earth,
//! accurate to well under 0.5% at city scale. `bounding_box` is a deliberate
//! approximation (1° latitude ≈ 69 mi, cosine-widened longitude) whose only
//! contract is the superset property: every point within the radius falls
//! inside the box. Callers re-filter with `distance_miles` afterward.

use geo::{Distance, Haversine, Point};

use crate::{BoundingBox, Coordinate};

/// Meters in one statute mile.
pub const METERS_PER_MILE: f64 = 1_609.344;

/// Approximate miles spanned by one degree of latitude.
pub const MILES_PER_DEGREE_LAT: f64 = 69.0;

// Floor for cos(latitude) when widening longitude deltas, so boxes near the
// poles stay bounded instead of spanning the globe.
const MIN_LON_COS: f64 = 0.2;

/// Great-circle distance between two coordinates, in miles.
///
/// Haversine on a mean spherical Earth (6,371 km ≈ 3,959 mi radius).
/// NaN coordinates propagate as NaN.
///
/// # Example
///
/// ```rust
/// use hotspot_engine::{Coordinate, geo_math};
///
/// let p = Coordinate::new(51.5074, -0.1278);
/// assert_eq!(geo_math::distance_miles(&p, &p), 0.0);
/// ```
#[inline]
pub fn distance_miles(a: &Coordinate, b: &Coordinate) -> f64 {
    let pa = Point::new(a.longitude, a.latitude);
    let pb = Point::new(b.longitude, b.latitude);
    Haversine::distance(pa, pb) / METERS_PER_MILE
}

/// Axis-aligned lat/lon rectangle guaranteed to enclose every point within
/// `radius_miles` of `center`.
///
/// Latitude delta is `radius / 69`; the longitude delta is widened by
/// `1 / max(cos(latitude), 0.2)` so the box never degenerates toward the
/// poles. The result is a query pre-filter, not a geodesic shape; callers
/// apply the precise cut with [`distance_miles`].
pub fn bounding_box(center: &Coordinate, radius_miles: f64) -> BoundingBox {
    let lat_delta = radius_miles / MILES_PER_DEGREE_LAT;
    let lon_scale = 1.0 / center.latitude.to_radians().cos().max(MIN_LON_COS);
    let lon_delta = lat_delta * lon_scale;

    BoundingBox {
        min_lat: center.latitude - lat_delta,
        max_lat: center.latitude + lat_delta,
        min_lon: center.longitude - lon_delta,
        max_lon: center.longitude + lon_delta,
    }
}
