//! External POI synchronization against a rate-limited geodata provider.
//!
//! This module keeps the local hotspot store populated with:
//! - Overpass-style fetching of named venues around the viewport center
//! - A timing gate (debounce, cooldown, single-flight) so viewport spam
//!   never turns into provider spam
//! - Automatic retry with exponential backoff on transient failures
//! - `Retry-After` honoring on HTTP 429, with jitter to avoid thundering herds
//! - Idempotent upserts keyed on the provider's stable element identity
//!
//! The agent is deliberately forgiving: every failure path resolves to a
//! logged no-op or a cooldown, never an error surfaced past the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::HotspotStore;
use crate::zoom::MIN_DISCOVERY_ZOOM;
use crate::{Coordinate, Hotspot, DEFAULT_CATEGORY};

/// Public Overpass interpreter endpoint.
pub const DEFAULT_OVERPASS_URL: &str = "https://overpass-api.de/api/interpreter";

// Provider limits: one outstanding request, modest result sets, hard timeout.
const HTTP_TIMEOUT_SECS: u64 = 15;
const FETCH_LIMIT: u32 = 60;

// Concurrent store upserts per completed fetch.
const UPSERT_CONCURRENCY: usize = 8;

/// Timing policy for the sync gate and its failure handling.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Minimum gap between sync attempts triggered by viewport movement.
    /// Default: 1s
    pub debounce: Duration,

    /// Delay before the first retry of a transient failure; doubles on each
    /// subsequent retry. Default: 2s
    pub retry_base: Duration,

    /// Retries allowed after the initial attempt. Default: 2
    pub max_retries: u32,

    /// Lower bound of the randomized cooldown imposed when retries are
    /// exhausted. Default: 10s
    pub failure_cooldown_min: Duration,

    /// Upper bound of that cooldown. Default: 15s
    pub failure_cooldown_max: Duration,

    /// Maximum random jitter added to each retry delay. Default: 1s
    pub retry_jitter_max: Duration,

    /// Maximum random jitter added on top of a `Retry-After` cooldown.
    /// Default: 2s
    pub rate_limit_jitter_max: Duration,

    /// Cooldown applied when a 429 carries no usable `Retry-After` header.
    /// Default: 60s
    pub default_retry_after: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1_000),
            retry_base: Duration::from_millis(2_000),
            max_retries: 2,
            failure_cooldown_min: Duration::from_millis(10_000),
            failure_cooldown_max: Duration::from_millis(15_000),
            retry_jitter_max: Duration::from_millis(1_000),
            rate_limit_jitter_max: Duration::from_millis(2_000),
            default_retry_after: Duration::from_secs(60),
        }
    }
}

/// Error raised by a [`PoiProvider`].
#[derive(Debug)]
pub enum FetchError {
    /// Connection failure, timeout, or interrupted transfer.
    Transport(String),
    /// Provider rate limit, with the parsed `Retry-After` when one was sent.
    RateLimited { retry_after: Option<Duration> },
    /// Provider-side failure (HTTP 5xx).
    Server(u16),
    /// Request rejected by the provider (client error other than 429).
    Request(u16),
    /// Response body was not in the expected shape.
    Decode(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Transport(reason) => write!(f, "transport error: {reason}"),
            FetchError::RateLimited { retry_after } => match retry_after {
                Some(wait) => write!(f, "rate limited, retry after {wait:?}"),
                None => write!(f, "rate limited"),
            },
            FetchError::Server(status) => write!(f, "provider error: HTTP {status}"),
            FetchError::Request(status) => write!(f, "request rejected: HTTP {status}"),
            FetchError::Decode(reason) => write!(f, "malformed response: {reason}"),
        }
    }
}

impl std::error::Error for FetchError {}

/// Radius in meters to request from the provider at a given zoom. Tighter
/// zooms request a smaller area.
pub fn sync_radius_meters(zoom: f64) -> u32 {
    if zoom >= 16.0 {
        300
    } else if zoom >= 15.0 {
        500
    } else {
        800
    }
}

// ============================================================================
// Provider boundary
// ============================================================================

/// Raw element as the provider returns it. Ways and relations carry a
/// computed `center` instead of direct coordinates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PoiElement {
    #[serde(rename = "type")]
    pub element_type: String,
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub center: Option<PoiCenter>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Computed centroid attached to non-node elements.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PoiCenter {
    pub lat: f64,
    pub lon: f64,
}

impl PoiElement {
    /// Position of the element: direct coordinates when present, otherwise
    /// the computed center.
    pub fn coordinates(&self) -> Option<Coordinate> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(Coordinate::new(lat, lon)),
            _ => self.center.map(|c| Coordinate::new(c.lat, c.lon)),
        }
    }

    /// Stable provider identity in `"<kind>/<numeric id>"` form.
    pub fn external_id(&self) -> String {
        format!("{}/{}", self.element_type, self.id)
    }

    /// Builds a [`Hotspot`] from the element, or `None` when it has no name
    /// tag or no resolvable coordinates. Skipping such elements is routine,
    /// not an error.
    pub fn into_hotspot(self) -> Option<Hotspot> {
        let location = self.coordinates().filter(Coordinate::is_valid)?;
        let name = self.tags.get("name")?.clone();
        let external_id = self.external_id();
        let category = category_for_tags(&self.tags);

        let mut hotspot = Hotspot::new(name, category, location).with_external_id(external_id);
        if let Some(address) = address_from_tags(&self.tags) {
            hotspot = hotspot.with_address(address);
        }
        Some(hotspot)
    }
}

fn category_for_tags(tags: &BTreeMap<String, String>) -> String {
    if let Some(amenity) = tags.get("amenity") {
        return amenity.clone();
    }
    if let Some(leisure) = tags.get("leisure") {
        return leisure.clone();
    }
    DEFAULT_CATEGORY.to_string()
}

fn address_from_tags(tags: &BTreeMap<String, String>) -> Option<String> {
    let street = tags.get("addr:street")?;
    match tags.get("addr:housenumber") {
        Some(number) => Some(format!("{number} {street}")),
        None => Some(street.clone()),
    }
}

/// Source of raw POI elements around a point.
#[async_trait]
pub trait PoiProvider: Send + Sync {
    /// Points of interest within `radius_meters` of `center`.
    async fn fetch_pois(
        &self,
        center: Coordinate,
        radius_meters: u32,
    ) -> Result<Vec<PoiElement>, FetchError>;
}

#[derive(Debug, Deserialize)]
struct PoiResponse {
    #[serde(default)]
    elements: Vec<PoiElement>,
}

/// [`PoiProvider`] backed by an Overpass QL interpreter endpoint.
pub struct OverpassProvider {
    client: Client,
    endpoint: String,
}

impl OverpassProvider {
    /// Builds a provider against `endpoint` with the standard 15s timeout.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .pool_idle_timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Overpass QL query selecting named social venues around a point.
    fn build_query(center: Coordinate, radius_meters: u32) -> String {
        format!(
            "[out:json][timeout:{timeout}];\
             (\
               nwr[\"amenity\"~\"^(cafe|bar|pub|college|university|library|coworking_space)$\"](around:{radius},{lat},{lon});\
               nwr[\"leisure\"=\"fitness_centre\"](around:{radius},{lat},{lon});\
             );\
             out center {limit};",
            timeout = HTTP_TIMEOUT_SECS,
            radius = radius_meters,
            lat = center.latitude,
            lon = center.longitude,
            limit = FETCH_LIMIT,
        )
    }
}

#[async_trait]
impl PoiProvider for OverpassProvider {
    async fn fetch_pois(
        &self,
        center: Coordinate,
        radius_meters: u32,
    ) -> Result<Vec<PoiElement>, FetchError> {
        let query = Self::build_query(center, radius_meters);
        debug!("[Overpass] POST {} ({} bytes)", self.endpoint, query.len());

        let response = self
            .client
            .post(&self.endpoint)
            .body(query)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(FetchError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(FetchError::Server(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FetchError::Request(status.as_u16()));
        }

        let body: PoiResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                FetchError::Decode(e.to_string())
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;

        Ok(body.elements)
    }
}

// ============================================================================
// Sync gate and agent
// ============================================================================

/// Why a sync attempt was refused before doing any network work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Zoom too far out for discovery to be meaningful.
    ZoomTooLow,
    /// Still inside a cooldown imposed by rate limiting or repeated failure.
    CoolingDown,
    /// Another sync is already in flight.
    AlreadyRunning,
    /// Triggered again within the debounce window of the last attempt.
    Debounced,
}

/// Terminal result of one sync trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Fetch and upsert ran to completion.
    Completed { fetched: usize, inserted: usize },
    /// The gate refused the attempt.
    Skipped(SkipReason),
    /// Fetch failed terminally this cycle.
    Failed,
}

/// Timing state guarding the provider. The check-and-arm step runs as one
/// locked section with no await inside, so two triggers can never both pass.
#[derive(Debug)]
struct SyncGate {
    last_attempt: Option<Instant>,
    next_allowed: Option<Instant>,
    in_progress: bool,
}

impl SyncGate {
    fn new() -> Self {
        Self {
            last_attempt: None,
            next_allowed: None,
            in_progress: false,
        }
    }

    /// Arms the gate for a new attempt, or reports why it refused. Skipped
    /// attempts do not count as attempts for debounce purposes.
    fn try_arm(&mut self, now: Instant, debounce: Duration) -> Result<(), SkipReason> {
        if let Some(next_allowed) = self.next_allowed {
            if now < next_allowed {
                return Err(SkipReason::CoolingDown);
            }
        }
        if self.in_progress {
            return Err(SkipReason::AlreadyRunning);
        }
        if let Some(last) = self.last_attempt {
            if now.duration_since(last) < debounce {
                return Err(SkipReason::Debounced);
            }
        }
        self.in_progress = true;
        self.last_attempt = Some(now);
        Ok(())
    }

    fn disarm(&mut self) {
        self.in_progress = false;
    }

    fn impose_cooldown(&mut self, until: Instant) {
        self.next_allowed = Some(until);
    }
}

/// Keeps the local store populated from the external provider, one gated
/// sync at a time.
///
/// Construct one agent per discovery screen; the gate travels with the
/// agent, so separate screens (and tests) are isolated from each other.
pub struct GeoSyncAgent {
    store: Arc<dyn HotspotStore>,
    provider: Arc<dyn PoiProvider>,
    config: SyncConfig,
    gate: Mutex<SyncGate>,
}

impl GeoSyncAgent {
    pub fn new(
        store: Arc<dyn HotspotStore>,
        provider: Arc<dyn PoiProvider>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            gate: Mutex::new(SyncGate::new()),
        }
    }

    /// Opportunistically syncs POIs around the viewport center. Returns
    /// without network work when the gate refuses; never returns an error.
    pub async fn sync_viewport(&self, center: Coordinate, zoom: f64) -> SyncOutcome {
        if zoom < MIN_DISCOVERY_ZOOM {
            return SyncOutcome::Skipped(SkipReason::ZoomTooLow);
        }

        {
            let mut gate = self.gate.lock().await;
            if let Err(reason) = gate.try_arm(Instant::now(), self.config.debounce) {
                debug!("[GeoSync] skipped: {reason:?}");
                return SyncOutcome::Skipped(reason);
            }
        }

        let outcome = self.run_sync(center, zoom).await;
        self.gate.lock().await.disarm();
        outcome
    }

    async fn run_sync(&self, center: Coordinate, zoom: f64) -> SyncOutcome {
        let radius_meters = sync_radius_meters(zoom);
        info!(
            "[GeoSync] fetching POIs around ({:.5}, {:.5}), radius {}m (zoom {:.2})",
            center.latitude, center.longitude, radius_meters, zoom
        );

        let mut attempt: u32 = 0;
        let elements = loop {
            match self.provider.fetch_pois(center, radius_meters).await {
                Ok(elements) => break elements,
                Err(FetchError::RateLimited { retry_after }) => {
                    let base = retry_after.unwrap_or(self.config.default_retry_after);
                    let wait = base + jitter(self.config.rate_limit_jitter_max);
                    warn!("[GeoSync] provider rate limited, cooling down for {wait:?}");
                    self.impose_cooldown(wait).await;
                    return SyncOutcome::Failed;
                }
                Err(FetchError::Request(status)) => {
                    warn!("[GeoSync] provider rejected request (HTTP {status}), giving up");
                    return SyncOutcome::Failed;
                }
                Err(FetchError::Decode(reason)) => {
                    warn!("[GeoSync] could not decode provider response: {reason}");
                    return SyncOutcome::Failed;
                }
                Err(err) => {
                    // Transport failures and 5xx share the retry budget.
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        let cooldown = sample_between(
                            self.config.failure_cooldown_min,
                            self.config.failure_cooldown_max,
                        );
                        warn!("[GeoSync] retries exhausted ({err}), cooling down for {cooldown:?}");
                        self.impose_cooldown(cooldown).await;
                        return SyncOutcome::Failed;
                    }
                    let backoff = self.config.retry_base * (1u32 << (attempt - 1).min(5))
                        + jitter(self.config.retry_jitter_max);
                    warn!(
                        "[GeoSync] fetch failed ({err}), retry {attempt}/{} in {backoff:?}",
                        self.config.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        };

        let fetched = elements.len();
        let hotspots: Vec<Hotspot> = elements
            .into_iter()
            .filter_map(PoiElement::into_hotspot)
            .collect();
        let usable = hotspots.len();

        let results: Vec<bool> = stream::iter(hotspots)
            .map(|hotspot| {
                let store = Arc::clone(&self.store);
                async move {
                    match store.upsert_by_external_id(hotspot).await {
                        Ok(inserted) => inserted,
                        Err(err) => {
                            warn!("[GeoSync] upsert failed: {err}");
                            false
                        }
                    }
                }
            })
            .buffer_unordered(UPSERT_CONCURRENCY)
            .collect()
            .await;
        let inserted = results.into_iter().filter(|new| *new).count();

        info!(
            "[GeoSync] sync complete: {fetched} elements fetched, {usable} usable, {inserted} new"
        );
        SyncOutcome::Completed { fetched, inserted }
    }

    async fn impose_cooldown(&self, wait: Duration) {
        let mut gate = self.gate.lock().await;
        gate.impose_cooldown(Instant::now() + wait);
    }
}

/// Uniform random delay in `[0, max)`; zero when `max` is zero.
fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}

/// Uniform random duration in `[min, max]`; collapses to `min` when the
/// range is empty.
fn sample_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let min_ms = min.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    Duration::from_millis(rand::thread_rng().gen_range(min_ms..=max_ms))
}
