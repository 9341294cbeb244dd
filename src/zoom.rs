//! # Zoom Profiles
//!
//! Maps a map zoom level to the discovery parameters used downstream: how far
//! out to query around the viewport center, and how much breathing room each
//! rendered marker gets.
//!
//! Zoom follows the usual web-map convention (higher = closer). The mapping is
//! a descending band table rather than a formula, so individual bands can be
//! tuned from field feedback without disturbing their neighbors:
//!
//! | Zoom ≥ | Query radius (mi) | Marker separation (mi) |
//! |--------|-------------------|------------------------|
//! | 18.0   | 0.25              | 0.008                  |
//! | 17.5   | 0.3               | 0.01                   |
//! | 17.0   | 0.4               | 0.012                  |
//! | 16.5   | 0.55              | 0.018                  |
//! | 16.0   | 0.7               | 0.025                  |
//! | 15.75  | 0.85              | 0.03                   |
//! | 15.5   | 1.0               | 0.04                   |
//! | 15.25  | 1.2               | 0.05                   |
//! | 15.0   | 1.5               | 0.06                   |
//! | 14.75  | 1.8               | 0.08                   |
//! | 14.5   | 2.2               | 0.1                    |
//! | 14.25  | 2.7               | 0.12                   |
//! | 14.0   | 3.2               | 0.15                   |
//! | below  | 4.0               | 0.2                    |
//!
//! Both columns shrink monotonically as zoom grows: zooming in narrows the
//! query and packs markers tighter, zooming out widens the query and thins
//! the markers.

/// Zoom level below which hotspot discovery is suspended entirely.
///
/// Under this threshold the viewport spans whole city regions; querying and
/// rendering hotspots there is noise, so the controller clears the surface
/// and waits for the user to zoom back in.
pub const MIN_DISCOVERY_ZOOM: f64 = 14.0;

/// Discovery parameters derived from a zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomProfile {
    /// Radius around the viewport center to load hotspots from, in miles.
    pub radius_miles: f64,
    /// Minimum great-circle distance between two rendered markers, in miles.
    pub separation_miles: f64,
}

// Band table, scanned top-down; first row whose threshold the zoom meets
// wins. Kept sorted by descending threshold.
const BANDS: &[(f64, f64, f64)] = &[
    (18.0, 0.25, 0.008),
    (17.5, 0.3, 0.01),
    (17.0, 0.4, 0.012),
    (16.5, 0.55, 0.018),
    (16.0, 0.7, 0.025),
    (15.75, 0.85, 0.03),
    (15.5, 1.0, 0.04),
    (15.25, 1.2, 0.05),
    (15.0, 1.5, 0.06),
    (14.75, 1.8, 0.08),
    (14.5, 2.2, 0.1),
    (14.25, 2.7, 0.12),
    (14.0, 3.2, 0.15),
];

// Fallback for any zoom below the table (and for NaN, which fails every
// threshold comparison): the widest, thinnest view.
const WIDEST: ZoomProfile = ZoomProfile {
    radius_miles: 4.0,
    separation_miles: 0.2,
};

/// Resolves the [`ZoomProfile`] for a zoom level.
///
/// Total over all `f64` inputs: out-of-range and NaN zooms resolve to the
/// widest band rather than panicking, since zoom arrives from the map surface
/// and is not validated upstream.
///
/// # Example
///
/// ```rust
/// use hotspot_engine::zoom::zoom_profile;
///
/// let street = zoom_profile(16.0);
/// assert_eq!(street.radius_miles, 0.7);
/// assert_eq!(street.separation_miles, 0.025);
///
/// let city = zoom_profile(13.0);
/// assert!(city.radius_miles > street.radius_miles);
/// ```
pub fn zoom_profile(zoom: f64) -> ZoomProfile {
    for &(threshold, radius_miles, separation_miles) in BANDS {
        if zoom >= threshold {
            return ZoomProfile {
                radius_miles,
                separation_miles,
            };
        }
    }
    WIDEST
}
