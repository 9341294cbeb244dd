//! # Render Bridge Protocol
//!
//! Typed message contract between the embedded map surface and the
//! controller. The surface itself is stringly-typed and asynchronous (an
//! embedded web view with postMessage semantics in the shipping app), so
//! everything crossing that boundary is modeled here as a tagged union and
//! serialized at the edge; controller logic never touches raw JSON.
//!
//! Surface to controller traffic is a [`SurfaceMessage`], discriminated by a
//! `type` field. Controller to surface traffic is a [`SurfaceCommand`],
//! discriminated by a `call` field, delivered fire-and-forget.

use serde::{Deserialize, Serialize};

use crate::{Coordinate, EnrichedHotspot, Hotspot};

/// Coordinate in the surface's wire shape (`lat`/`lng` rather than the
/// domain's `latitude`/`longitude`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl From<Coordinate> for LatLng {
    fn from(c: Coordinate) -> Self {
        Self {
            lat: c.latitude,
            lng: c.longitude,
        }
    }
}

impl From<LatLng> for Coordinate {
    fn from(ll: LatLng) -> Self {
        Self {
            latitude: ll.lat,
            longitude: ll.lng,
        }
    }
}

/// Message emitted by the render surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SurfaceMessage {
    /// Surface finished booting and can receive marker updates.
    MapInitialized,
    /// Viewport moved or zoomed; the surface debounces gesture streams
    /// before emitting this.
    MapMove { center: LatLng, zoom: f64 },
    /// User tapped a rendered marker.
    MarkerClick { hotspot: Hotspot },
}

/// Command injected into the render surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "call", rename_all = "camelCase")]
pub enum SurfaceCommand {
    /// Replace the rendered marker set with exactly this set.
    UpdateHotspots { hotspots: Vec<MarkerDto> },
}

/// Marker payload as the surface renders it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerDto {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    /// Category string driving the marker icon.
    #[serde(rename = "type")]
    pub kind: String,
    /// Live user count shown on the marker badge.
    pub users: u32,
    /// Miles from the user, shown in the marker callout.
    pub distance: f64,
}

impl From<&EnrichedHotspot> for MarkerDto {
    fn from(enriched: &EnrichedHotspot) -> Self {
        let hotspot = &enriched.hotspot;
        // Prefer the store id; external points not yet persisted fall back
        // to their provider identity, and purely local drafts to their name.
        let id = hotspot
            .id
            .clone()
            .or_else(|| hotspot.external_id.clone())
            .unwrap_or_else(|| hotspot.name.clone());
        Self {
            id,
            lat: hotspot.location.latitude,
            lng: hotspot.location.longitude,
            kind: hotspot.category.clone(),
            users: enriched.live_user_count,
            distance: enriched.distance_from_user_miles,
        }
    }
}

/// Decodes one raw surface payload.
pub fn parse_message(raw: &str) -> Result<SurfaceMessage, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Encodes a command for injection into the surface.
pub fn encode_command(command: &SurfaceCommand) -> Result<String, serde_json::Error> {
    serde_json::to_string(command)
}
