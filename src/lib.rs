//! # Hotspot Engine
//!
//! Discovery and map-synchronization core for a location-based social app:
//! turns raw viewport movement into a decluttered, render-ready set of
//! hotspot markers, and keeps the local hotspot store topped up from an
//! external geodata provider without tripping its rate limits.
//!
//! ## Features
//!
//! - **Zoom profiles**: hand-tuned band table mapping zoom level to query
//!   radius and minimum marker separation ([`zoom`])
//! - **Decluttering**: greedy non-overlap selection so markers never crowd
//!   each other at the current zoom ([`declutter`](crate::declutter))
//! - **External sync**: Overpass-style POI fetching with retry, exponential
//!   backoff, `Retry-After` cooldowns, and a single-flight gate ([`sync`])
//! - **Viewport orchestration**: debounced query/declutter/publish pipeline
//!   driven by map-surface events ([`viewport`])
//! - **Typed render bridge**: tagged JSON message protocol between the map
//!   surface and the controller ([`bridge`])
//!
//! ## Quick Start
//!
//! ```rust
//! use hotspot_engine::{declutter, zoom_profile, Coordinate, EnrichedHotspot, Hotspot};
//!
//! // Resolve discovery parameters for a street-level zoom.
//! let profile = zoom_profile(16.0);
//! assert_eq!(profile.radius_miles, 0.7);
//!
//! // Two cafes a few doors apart: only the first (higher-priority) survives.
//! let cluster = vec![
//!     EnrichedHotspot::new(
//!         Hotspot::new("Cafe A", "cafe", Coordinate::new(40.75800, -73.9855)),
//!         0.10,
//!         0.10,
//!     ),
//!     EnrichedHotspot::new(
//!         Hotspot::new("Cafe B", "cafe", Coordinate::new(40.75808, -73.9855)),
//!         0.11,
//!         0.11,
//!     ),
//! ];
//! let rendered = declutter(cluster, profile.separation_miles);
//! assert_eq!(rendered.len(), 1);
//! assert_eq!(rendered[0].hotspot.name, "Cafe A");
//! ```
//!
//! The full pipeline (store query, external sync, debounce, publish) is
//! driven by [`viewport::ViewportController`]; see that module for the async
//! wiring.

use serde::{Deserialize, Serialize};

pub mod bridge;
pub mod declutter;
pub mod geo_math;
pub mod store;
pub mod sync;
pub mod viewport;
pub mod zoom;

pub use bridge::{encode_command, parse_message, LatLng, MarkerDto, SurfaceCommand, SurfaceMessage};
pub use declutter::declutter;
pub use store::{HotspotStore, MemoryStore, StoreError};
pub use sync::{
    FetchError, GeoSyncAgent, OverpassProvider, PoiElement, PoiProvider, SkipReason, SyncConfig,
    SyncOutcome, DEFAULT_OVERPASS_URL,
};
pub use viewport::{ClickListener, ViewportConfig, ViewportController};
pub use zoom::{zoom_profile, ZoomProfile, MIN_DISCOVERY_ZOOM};

// ============================================================================
// Core Types
// ============================================================================

/// Category assigned to external points that carry no recognizable
/// amenity or leisure tag.
pub const DEFAULT_CATEGORY: &str = "location";

/// A geographic coordinate in decimal degrees.
///
/// # Example
/// ```
/// use hotspot_engine::Coordinate;
/// let point = Coordinate::new(51.5074, -0.1278); // London
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check that both components are finite and within WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Axis-aligned lat/lon rectangle, used as a cheap pre-filter before the
/// precise great-circle cut. Built by [`geo_math::bounding_box`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    /// Inclusive containment check on both axes.
    pub fn contains(&self, point: &Coordinate) -> bool {
        point.latitude >= self.min_lat
            && point.latitude <= self.max_lat
            && point.longitude >= self.min_lon
            && point.longitude <= self.max_lon
    }
}

/// A point of interest trackable on the map.
///
/// `external_id` (format `"<kind>/<numeric id>"`, e.g. `"node/42"`) is the
/// stable identity assigned by the external geodata provider and the
/// idempotency key for the sync upsert path. `id` is the local store's own
/// primary key and is absent until the hotspot has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hotspot {
    /// Local store primary key, absent for not-yet-persisted points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Provider-assigned stable identity, globally unique.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub name: String,
    /// Enum-like category string ("cafe", "bar", "pub", "fitness_centre",
    /// "coworking_space", "college", "university", "library"), falling back
    /// to [`DEFAULT_CATEGORY`].
    pub category: String,
    pub location: Coordinate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Hotspot {
    /// Create a hotspot with no local id, external id, or address.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        location: Coordinate,
    ) -> Self {
        Self {
            id: None,
            external_id: None,
            name: name.into(),
            category: category.into(),
            location,
            address: None,
        }
    }

    /// Attach the provider-assigned identity.
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Attach a human-readable street address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// A [`Hotspot`] annotated with per-viewport context.
///
/// Derived on every viewport or count refresh, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedHotspot {
    pub hotspot: Hotspot,
    /// Great-circle miles from the last known user location when one exists,
    /// otherwise mirrors `distance_from_center_miles`.
    pub distance_from_user_miles: f64,
    /// Great-circle miles from the current viewport center.
    pub distance_from_center_miles: f64,
    /// Users active at this hotspot inside the recency window; zero when the
    /// count query failed or returned nothing.
    pub live_user_count: u32,
}

impl EnrichedHotspot {
    /// Annotate a hotspot with distances; the live user count starts at zero
    /// and is merged in separately.
    pub fn new(
        hotspot: Hotspot,
        distance_from_user_miles: f64,
        distance_from_center_miles: f64,
    ) -> Self {
        Self {
            hotspot,
            distance_from_user_miles,
            distance_from_center_miles,
            live_user_count: 0,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
