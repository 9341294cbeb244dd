//! # Hotspot Store
//!
//! Storage boundary between the discovery pipeline and whatever backend
//! actually holds hotspots. The controller and the sync agent only ever talk
//! to the [`HotspotStore`] trait; [`MemoryStore`] is the in-process
//! implementation used by tests, demos, and offline operation.
//!
//! Store failures are survivable by contract: callers log them and carry the
//! last good result forward, so implementations should prefer returning
//! [`StoreError`] over panicking.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

use async_trait::async_trait;
use rstar::{RTree, RTreeObject, AABB};
use tokio::sync::RwLock;

use crate::{BoundingBox, Hotspot};

/// Error raised by a [`HotspotStore`] backend.
#[derive(Debug)]
pub enum StoreError {
    /// Backend could not be reached or timed out.
    Unavailable(String),
    /// Backend accepted the request but failed to execute it.
    Backend(String),
    /// Upsert was attempted on a hotspot that carries no external id.
    MissingExternalId,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(reason) => write!(f, "store unavailable: {reason}"),
            StoreError::Backend(reason) => write!(f, "store operation failed: {reason}"),
            StoreError::MissingExternalId => {
                write!(f, "upsert requires an external id on the hotspot")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Bounded-box query, idempotent upsert, and live-count lookup against the
/// hotspot backend.
#[async_trait]
pub trait HotspotStore: Send + Sync {
    /// Hotspots whose location falls inside `bbox`, optionally narrowed to a
    /// single category, capped at `limit` results.
    ///
    /// The box is a superset pre-filter; callers apply the precise
    /// great-circle cut themselves.
    async fn query_bounding_box(
        &self,
        bbox: &BoundingBox,
        category_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Hotspot>, StoreError>;

    /// Inserts `hotspot` keyed on its external id; a no-op when that id has
    /// been seen before. Returns `true` only when a new row was created.
    async fn upsert_by_external_id(&self, hotspot: Hotspot) -> Result<bool, StoreError>;

    /// Number of users active at each of the given hotspots since the
    /// cutoff. Hotspots with no activity may be absent from the result map.
    async fn active_user_counts(
        &self,
        hotspot_ids: &[String],
        since: SystemTime,
    ) -> Result<HashMap<String, u32>, StoreError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// R-tree entry pointing back at the full record by local id.
#[derive(Debug, Clone)]
struct IndexedHotspot {
    id: String,
    latitude: f64,
    longitude: f64,
}

impl RTreeObject for IndexedHotspot {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.longitude, self.latitude])
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    tree: RTree<IndexedHotspot>,
    /// external id -> local id
    external_index: HashMap<String, String>,
    /// local id -> full record
    records: HashMap<String, Hotspot>,
    /// local id -> activity timestamps, most recent last
    checkins: HashMap<String, Vec<SystemTime>>,
    next_id: u64,
}

/// In-process [`HotspotStore`] backed by an R-tree spatial index.
///
/// Local ids are assigned as `"hs-<n>"` in insertion order.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a hotspot directly, bypassing the external-id idempotency
    /// path. Used to seed stores with locally-created hotspots that have no
    /// provider identity. Returns the assigned local id.
    pub async fn seed(&self, hotspot: Hotspot) -> String {
        let mut inner = self.inner.write().await;
        insert_record(&mut inner, hotspot)
    }

    /// Records one user as active at `hotspot_id` at time `at`. Unknown ids
    /// are accepted silently; the count query simply never surfaces them.
    pub async fn record_checkin(&self, hotspot_id: &str, at: SystemTime) {
        let mut inner = self.inner.write().await;
        inner
            .checkins
            .entry(hotspot_id.to_string())
            .or_default()
            .push(at);
    }

    /// Total number of stored hotspots.
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }
}

fn insert_record(inner: &mut StoreInner, mut hotspot: Hotspot) -> String {
    inner.next_id += 1;
    let id = format!("hs-{}", inner.next_id);
    hotspot.id = Some(id.clone());

    inner.tree.insert(IndexedHotspot {
        id: id.clone(),
        latitude: hotspot.location.latitude,
        longitude: hotspot.location.longitude,
    });
    if let Some(external_id) = &hotspot.external_id {
        inner.external_index.insert(external_id.clone(), id.clone());
    }
    inner.records.insert(id.clone(), hotspot);
    id
}

#[async_trait]
impl HotspotStore for MemoryStore {
    async fn query_bounding_box(
        &self,
        bbox: &BoundingBox,
        category_filter: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Hotspot>, StoreError> {
        let inner = self.inner.read().await;
        let envelope = AABB::from_corners(
            [bbox.min_lon, bbox.min_lat],
            [bbox.max_lon, bbox.max_lat],
        );

        let mut matches: Vec<Hotspot> = inner
            .tree
            .locate_in_envelope(&envelope)
            .filter_map(|entry| inner.records.get(&entry.id))
            .filter(|hotspot| {
                category_filter
                    .map(|wanted| hotspot.category == wanted)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();

        // Insertion order, so the cap drops the newest rows first and
        // repeated queries see a stable prefix.
        matches.sort_by_key(|h| {
            h.id.as_deref()
                .and_then(|id| id.strip_prefix("hs-"))
                .and_then(|n| n.parse::<u64>().ok())
                .unwrap_or(u64::MAX)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn upsert_by_external_id(&self, hotspot: Hotspot) -> Result<bool, StoreError> {
        let external_id = hotspot
            .external_id
            .clone()
            .ok_or(StoreError::MissingExternalId)?;

        let mut inner = self.inner.write().await;
        if inner.external_index.contains_key(&external_id) {
            return Ok(false);
        }
        insert_record(&mut inner, hotspot);
        Ok(true)
    }

    async fn active_user_counts(
        &self,
        hotspot_ids: &[String],
        since: SystemTime,
    ) -> Result<HashMap<String, u32>, StoreError> {
        let inner = self.inner.read().await;
        let mut counts = HashMap::new();
        for id in hotspot_ids {
            if let Some(stamps) = inner.checkins.get(id) {
                let active = stamps.iter().filter(|at| **at >= since).count() as u32;
                if active > 0 {
                    counts.insert(id.clone(), active);
                }
            }
        }
        Ok(counts)
    }
}
