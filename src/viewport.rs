//! Viewport orchestration: the state machine tying map movement to store
//! queries, external sync, decluttering, and marker publication.
//!
//! Event flow for one `mapMove`:
//! 1. Viewport state updates synchronously.
//! 2. Below the discovery zoom floor the marker set is cleared outright.
//! 3. Otherwise candidates are loaded from the store for the zoom profile's
//!    bounding box, cut precisely to the radius, annotated with distances
//!    and live user counts, and sorted nearest-first.
//! 4. The sync agent is triggered fire-and-forget; its own gate decides
//!    whether any network work happens. A sync that inserts new hotspots
//!    re-queries the current viewport so they appear without user action.
//! 5. Declutter-and-publish runs behind a short debounce held as a
//!    cancellable timer handle: every new event replaces (aborts) the
//!    pending pass, so bursts collapse and only the latest viewport renders.
//!
//! Store failures never propagate past the controller; a failed cycle logs
//! and leaves the previous marker set on screen.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use log::{debug, info, warn};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::bridge::{MarkerDto, SurfaceCommand, SurfaceMessage};
use crate::declutter::declutter;
use crate::geo_math;
use crate::store::HotspotStore;
use crate::sync::{GeoSyncAgent, SyncOutcome};
use crate::zoom::{zoom_profile, MIN_DISCOVERY_ZOOM};
use crate::{Coordinate, EnrichedHotspot, Hotspot};

/// Callback invoked when the user taps a marker. The controller itself does
/// not navigate; whoever owns the screen decides what a tap means.
pub type ClickListener = Box<dyn Fn(&Hotspot) + Send + Sync>;

/// Tuning knobs for the viewport pipeline.
#[derive(Debug, Clone)]
pub struct ViewportConfig {
    /// Candidate cap per bounding-box query. The pipeline is sized for 150
    /// to 500; the declutter pass is quadratic in this bound. Default: 300
    pub query_limit: usize,

    /// Delay collapsing bursts of viewport events into one declutter pass.
    /// Default: 10ms
    pub declutter_debounce: Duration,

    /// Recency window for the live user count on each marker. Default: 1h
    pub active_user_window: Duration,

    /// Narrow every store query to one category, when set. Default: None
    pub category_filter: Option<String>,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            query_limit: 300,
            declutter_debounce: Duration::from_millis(10),
            active_user_window: Duration::from_secs(3_600),
            category_filter: None,
        }
    }
}

struct ControllerState {
    center: Coordinate,
    zoom: f64,
    user_location: Option<Coordinate>,
    surface_ready: bool,
    /// Newest command held back until the surface reports ready.
    parked_command: Option<SurfaceCommand>,
    /// Pending debounced declutter pass; replaced (and aborted) by each
    /// newer viewport event.
    pending_publish: Option<JoinHandle<()>>,
    click_listener: Option<ClickListener>,
}

struct ControllerInner {
    store: Arc<dyn HotspotStore>,
    sync_agent: Arc<GeoSyncAgent>,
    commands: mpsc::UnboundedSender<SurfaceCommand>,
    config: ViewportConfig,
    state: Mutex<ControllerState>,
    /// Monotonic stamp for declutter passes; a pass publishes only while it
    /// is still the newest, which makes superseded passes harmless even if
    /// their abort races.
    render_generation: AtomicU64,
}

/// Owns the viewport and drives the discovery pipeline.
///
/// A cheap handle over shared state: clones refer to the same controller,
/// so one instance can serve the task that pumps surface messages into
/// [`handle_surface_message`] alongside the background work the controller
/// spawns for itself. One controller per discovery screen. Published marker
/// sets leave through the command channel handed to [`new`]; the render
/// adapter on the other end serializes them for the surface.
///
/// [`handle_surface_message`]: ViewportController::handle_surface_message
/// [`new`]: ViewportController::new
#[derive(Clone)]
pub struct ViewportController {
    inner: Arc<ControllerInner>,
}

impl ViewportController {
    pub fn new(
        store: Arc<dyn HotspotStore>,
        sync_agent: Arc<GeoSyncAgent>,
        commands: mpsc::UnboundedSender<SurfaceCommand>,
        config: ViewportConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                store,
                sync_agent,
                commands,
                config,
                state: Mutex::new(ControllerState {
                    center: Coordinate::new(0.0, 0.0),
                    zoom: 0.0,
                    user_location: None,
                    surface_ready: false,
                    parked_command: None,
                    pending_publish: None,
                    click_listener: None,
                }),
                render_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Dispatches one decoded surface message.
    pub async fn handle_surface_message(&self, message: SurfaceMessage) {
        match message {
            SurfaceMessage::MapInitialized => self.on_map_initialized().await,
            SurfaceMessage::MapMove { center, zoom } => {
                self.on_viewport_change(center.into(), zoom).await;
            }
            SurfaceMessage::MarkerClick { hotspot } => self.on_marker_click(&hotspot).await,
        }
    }

    /// Marks the surface ready and flushes the newest parked marker set.
    pub async fn on_map_initialized(&self) {
        let parked = {
            let mut state = self.inner.state.lock().await;
            state.surface_ready = true;
            state.parked_command.take()
        };
        info!("[Viewport] render surface ready");
        if let Some(command) = parked {
            if self.inner.commands.send(command).is_err() {
                warn!("[Viewport] surface channel closed; dropping parked update");
            }
        }
    }

    /// Handles a viewport move or zoom.
    pub async fn on_viewport_change(&self, center: Coordinate, zoom: f64) {
        {
            let mut state = self.inner.state.lock().await;
            state.center = center;
            state.zoom = zoom;
        }

        if zoom < MIN_DISCOVERY_ZOOM {
            debug!("[Viewport] zoom {zoom:.2} below discovery floor, clearing markers");
            self.suppress_markers().await;
            return;
        }

        let candidates = match self.gather_candidates(center, zoom).await {
            Ok(candidates) => Some(candidates),
            Err(err) => {
                // Fail soft: the previous marker set stays on screen and the
                // next viewport event retries naturally.
                warn!("[Viewport] store query failed: {err}; keeping previous markers");
                None
            }
        };

        // The agent's gate decides whether this does any network work; a
        // sync that lands new hotspots refreshes the viewport afterwards.
        let controller = self.clone();
        tokio::spawn(async move {
            let outcome = controller.inner.sync_agent.sync_viewport(center, zoom).await;
            if let SyncOutcome::Completed { inserted, .. } = outcome {
                if inserted > 0 {
                    controller.refresh_current_viewport().await;
                }
            }
        });

        if let Some(candidates) = candidates {
            self.schedule_publish(candidates, zoom).await;
        }
    }

    /// Pass-through notification; the controller changes no state on taps.
    pub async fn on_marker_click(&self, hotspot: &Hotspot) {
        info!("[Viewport] marker tapped: {}", hotspot.name);
        let state = self.inner.state.lock().await;
        if let Some(listener) = &state.click_listener {
            listener(hotspot);
        }
    }

    /// Updates the last known user location used for distance annotation on
    /// subsequent cycles.
    pub async fn set_user_location(&self, location: Coordinate) {
        self.inner.state.lock().await.user_location = Some(location);
    }

    pub async fn set_click_listener(&self, listener: ClickListener) {
        self.inner.state.lock().await.click_listener = Some(listener);
    }

    /// Loads, cuts, annotates, and priority-sorts the candidate set for one
    /// viewport.
    async fn gather_candidates(
        &self,
        center: Coordinate,
        zoom: f64,
    ) -> Result<Vec<EnrichedHotspot>, crate::store::StoreError> {
        let profile = zoom_profile(zoom);
        let bbox = geo_math::bounding_box(&center, profile.radius_miles);
        let hotspots = self
            .inner
            .store
            .query_bounding_box(
                &bbox,
                self.inner.config.category_filter.as_deref(),
                self.inner.config.query_limit,
            )
            .await?;

        let user_location = self.inner.state.lock().await.user_location;

        let mut candidates: Vec<EnrichedHotspot> = hotspots
            .into_iter()
            .filter_map(|hotspot| {
                let from_center = geo_math::distance_miles(&center, &hotspot.location);
                // The box query over-fetches corners; this is the precise cut.
                if from_center > profile.radius_miles {
                    return None;
                }
                let from_user = user_location
                    .map(|user| geo_math::distance_miles(&user, &hotspot.location))
                    .unwrap_or(from_center);
                Some(EnrichedHotspot::new(hotspot, from_user, from_center))
            })
            .collect();

        self.merge_live_counts(&mut candidates).await;

        // Nearest to the user wins contested ground in the declutter pass.
        candidates.sort_by(|a, b| {
            a.distance_from_user_miles
                .total_cmp(&b.distance_from_user_miles)
        });

        Ok(candidates)
    }

    /// Folds live user counts into the candidates. Counts are decoration:
    /// when the query fails the cycle proceeds with zeros.
    async fn merge_live_counts(&self, candidates: &mut [EnrichedHotspot]) {
        let ids: Vec<String> = candidates
            .iter()
            .filter_map(|candidate| candidate.hotspot.id.clone())
            .collect();
        if ids.is_empty() {
            return;
        }

        let since = SystemTime::now() - self.inner.config.active_user_window;
        match self.inner.store.active_user_counts(&ids, since).await {
            Ok(counts) => {
                for candidate in candidates.iter_mut() {
                    if let Some(id) = &candidate.hotspot.id {
                        if let Some(count) = counts.get(id) {
                            candidate.live_user_count = *count;
                        }
                    }
                }
            }
            Err(err) => warn!("[Viewport] live count query failed: {err}"),
        }
    }

    /// Schedules the debounced declutter-and-publish pass, superseding any
    /// pass still waiting on its timer.
    async fn schedule_publish(&self, candidates: Vec<EnrichedHotspot>, zoom: f64) {
        let generation = self.inner.render_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.inner.config.declutter_debounce;
        let controller = self.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if controller.inner.render_generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let profile = zoom_profile(zoom);
            let markers = declutter(candidates, profile.separation_miles);
            controller.publish(markers).await;
        });

        let mut state = self.inner.state.lock().await;
        if let Some(previous) = state.pending_publish.replace(handle) {
            previous.abort();
        }
    }

    /// Immediately clears the rendered set and invalidates any pending pass.
    async fn suppress_markers(&self) {
        self.inner.render_generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut state = self.inner.state.lock().await;
            if let Some(previous) = state.pending_publish.take() {
                previous.abort();
            }
        }
        self.publish(Vec::new()).await;
    }

    /// Re-runs query and publish for the viewport as it stands now. Called
    /// after a sync lands new hotspots.
    async fn refresh_current_viewport(&self) {
        let (center, zoom) = {
            let state = self.inner.state.lock().await;
            (state.center, state.zoom)
        };
        if zoom < MIN_DISCOVERY_ZOOM {
            return;
        }
        match self.gather_candidates(center, zoom).await {
            Ok(candidates) => self.schedule_publish(candidates, zoom).await,
            Err(err) => warn!("[Viewport] refresh query failed: {err}"),
        }
    }

    /// Ships a marker set to the surface, or parks it while the surface is
    /// still booting. Only the newest parked set survives.
    async fn publish(&self, markers: Vec<EnrichedHotspot>) {
        let count = markers.len();
        let command = SurfaceCommand::UpdateHotspots {
            hotspots: markers.iter().map(MarkerDto::from).collect(),
        };

        {
            let mut state = self.inner.state.lock().await;
            if !state.surface_ready {
                debug!("[Viewport] surface not ready, parking {count} markers");
                state.parked_command = Some(command);
                return;
            }
        }

        debug!("[Viewport] publishing {count} markers");
        if self.inner.commands.send(command).is_err() {
            warn!("[Viewport] surface channel closed; dropping marker update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use crate::sync::{FetchError, PoiElement, PoiProvider, SyncConfig};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::atomic::AtomicBool;

    const CENTER: Coordinate = Coordinate {
        latitude: 40.758,
        longitude: -73.9855,
    };

    /// Provider that never returns anything; keeps controller tests off the
    /// network path entirely.
    struct EmptyProvider;

    #[async_trait]
    impl PoiProvider for EmptyProvider {
        async fn fetch_pois(
            &self,
            _center: Coordinate,
            _radius_meters: u32,
        ) -> Result<Vec<PoiElement>, FetchError> {
            Ok(vec![])
        }
    }

    /// Provider that hands back the same named element on every fetch.
    struct OneShotProvider {
        element: PoiElement,
    }

    #[async_trait]
    impl PoiProvider for OneShotProvider {
        async fn fetch_pois(
            &self,
            _center: Coordinate,
            _radius_meters: u32,
        ) -> Result<Vec<PoiElement>, FetchError> {
            Ok(vec![self.element.clone()])
        }
    }

    /// Store wrapper that can be flipped into a failing mode.
    struct FlakyStore {
        inner: MemoryStore,
        failing: AtomicBool,
    }

    impl FlakyStore {
        fn new(inner: MemoryStore) -> Self {
            Self {
                inner,
                failing: AtomicBool::new(false),
            }
        }

        fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        fn check(&self) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StoreError::Unavailable("injected outage".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl HotspotStore for FlakyStore {
        async fn query_bounding_box(
            &self,
            bbox: &crate::BoundingBox,
            category_filter: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Hotspot>, StoreError> {
            self.check()?;
            self.inner.query_bounding_box(bbox, category_filter, limit).await
        }

        async fn upsert_by_external_id(&self, hotspot: Hotspot) -> Result<bool, StoreError> {
            self.check()?;
            self.inner.upsert_by_external_id(hotspot).await
        }

        async fn active_user_counts(
            &self,
            hotspot_ids: &[String],
            since: SystemTime,
        ) -> Result<HashMap<String, u32>, StoreError> {
            self.check()?;
            self.inner.active_user_counts(hotspot_ids, since).await
        }
    }

    fn build_controller(
        store: Arc<dyn HotspotStore>,
        provider: Arc<dyn PoiProvider>,
    ) -> (
        ViewportController,
        mpsc::UnboundedReceiver<SurfaceCommand>,
    ) {
        let agent = Arc::new(GeoSyncAgent::new(
            Arc::clone(&store),
            provider,
            SyncConfig::default(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = ViewportController::new(store, agent, tx, ViewportConfig::default());
        (controller, rx)
    }

    fn cafe(name: &str, lat: f64, lon: f64) -> Hotspot {
        Hotspot::new(name, "cafe", Coordinate::new(lat, lon))
    }

    /// Destination `miles` north / east of a point, at Manhattan latitudes.
    fn offset(base: Coordinate, north_miles: f64, east_miles: f64) -> Coordinate {
        Coordinate::new(
            base.latitude + north_miles / 69.0,
            base.longitude + east_miles / 69.0 / base.latitude.to_radians().cos(),
        )
    }

    fn marker_names(command: &SurfaceCommand) -> Vec<String> {
        let SurfaceCommand::UpdateHotspots { hotspots } = command;
        hotspots.iter().map(|m| m.id.clone()).collect()
    }

    fn marker_count(command: &SurfaceCommand) -> usize {
        let SurfaceCommand::UpdateHotspots { hotspots } = command;
        hotspots.len()
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_zoom_publishes_empty_set() {
        let store = Arc::new(MemoryStore::new());
        store.seed(cafe("Nearby", CENTER.latitude, CENTER.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        controller.on_map_initialized().await;
        controller.on_viewport_change(CENTER, 13.9).await;

        let command = rx.recv().await.unwrap();
        assert_eq!(marker_count(&command), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_viewport_change_publishes_decluttered_markers() {
        let store = Arc::new(MemoryStore::new());
        let near = offset(CENTER, 0.1, 0.0);
        let far = offset(CENTER, 0.4, 0.0);
        store.seed(cafe("Near", near.latitude, near.longitude)).await;
        store.seed(cafe("Far", far.latitude, far.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        controller.on_map_initialized().await;
        controller.on_viewport_change(CENTER, 16.0).await;

        let command = rx.recv().await.unwrap();
        assert_eq!(marker_count(&command), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_events_renders_only_the_latest() {
        let store = Arc::new(MemoryStore::new());
        // One neighborhood around CENTER, another far away.
        store.seed(cafe("Downtown", CENTER.latitude, CENTER.longitude)).await;
        let uptown = Coordinate::new(40.86, -73.93);
        store.seed(cafe("Uptown", uptown.latitude, uptown.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        controller.on_map_initialized().await;
        // Two events inside one debounce window: only the second renders.
        controller.on_viewport_change(CENTER, 16.0).await;
        controller.on_viewport_change(uptown, 16.0).await;

        let command = rx.recv().await.unwrap();
        let ids = marker_names(&command);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids[0], "hs-2"); // Uptown

        // The superseded pass never publishes.
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_keeps_previous_markers() {
        let flaky = Arc::new(FlakyStore::new(MemoryStore::new()));
        flaky.inner.seed(cafe("Stable", CENTER.latitude, CENTER.longitude)).await;
        let (controller, mut rx) =
            build_controller(Arc::clone(&flaky) as Arc<dyn HotspotStore>, Arc::new(EmptyProvider));

        controller.on_map_initialized().await;
        controller.on_viewport_change(CENTER, 16.0).await;
        assert_eq!(marker_count(&rx.recv().await.unwrap()), 1);

        // Outage: the cycle publishes nothing, previous set stays on screen.
        flaky.set_failing(true);
        controller.on_viewport_change(offset(CENTER, 0.05, 0.0), 16.0).await;
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_commands_before_surface_ready() {
        let store = Arc::new(MemoryStore::new());
        store.seed(cafe("Early Bird", CENTER.latitude, CENTER.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        controller.on_viewport_change(CENTER, 16.0).await;
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err(), "published before mapInitialized");

        // Initialization flushes the newest parked set.
        controller.on_map_initialized().await;
        let command = rx.try_recv().unwrap();
        assert_eq!(marker_count(&command), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parked_set_is_replaced_by_newer_one() {
        let store = Arc::new(MemoryStore::new());
        store.seed(cafe("Visible", CENTER.latitude, CENTER.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        // Markers park first, then a zoom-out parks an empty set over them.
        controller.on_viewport_change(CENTER, 16.0).await;
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
        controller.on_viewport_change(CENTER, 13.0).await;

        controller.on_map_initialized().await;
        let command = rx.try_recv().unwrap();
        assert_eq!(marker_count(&command), 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_inserts_trigger_requery() {
        let store = Arc::new(MemoryStore::new());
        let provider = OneShotProvider {
            element: PoiElement {
                element_type: "node".to_string(),
                id: 501,
                lat: Some(CENTER.latitude + 0.001),
                lon: Some(CENTER.longitude),
                center: None,
                tags: BTreeMap::from([
                    ("name".to_string(), "Fresh Spot".to_string()),
                    ("amenity".to_string(), "cafe".to_string()),
                ]),
            },
        };
        let (controller, mut rx) = build_controller(store, Arc::new(provider));

        controller.on_map_initialized().await;
        // Store is empty at event time; the sync fills it and the follow-up
        // re-query publishes the new point.
        controller.on_viewport_change(CENTER, 16.0).await;

        let command = rx.recv().await.unwrap();
        assert_eq!(marker_count(&command), 1);

        let SurfaceCommand::UpdateHotspots { hotspots } = &command;
        assert_eq!(hotspots[0].kind, "cafe");
    }

    #[tokio::test(start_paused = true)]
    async fn test_markers_sorted_by_user_distance_with_counts() {
        let store = Arc::new(MemoryStore::new());
        let near_user = offset(CENTER, 0.30, 0.0);
        let far_user = offset(CENTER, 0.05, 0.0);
        let near_id = store.seed(cafe("NearUser", near_user.latitude, near_user.longitude)).await;
        let far_id = store.seed(cafe("FarUser", far_user.latitude, far_user.longitude)).await;

        // Three active users at the far one; activity must not beat
        // geography in the sort.
        let now = SystemTime::now();
        for _ in 0..3 {
            store.record_checkin(&far_id, now).await;
        }

        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));
        controller.on_map_initialized().await;
        // User stands right next to "NearUser".
        controller.set_user_location(offset(CENTER, 0.29, 0.0)).await;
        controller.on_viewport_change(CENTER, 16.0).await;

        let SurfaceCommand::UpdateHotspots { hotspots } = rx.recv().await.unwrap();
        assert_eq!(hotspots.len(), 2);
        assert_eq!(hotspots[0].id, near_id);
        assert_eq!(hotspots[0].users, 0);
        assert_eq!(hotspots[1].id, far_id);
        assert_eq!(hotspots[1].users, 3);
        assert!(hotspots[0].distance < hotspots[1].distance);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distance_falls_back_to_center_without_user_location() {
        let store = Arc::new(MemoryStore::new());
        let location = offset(CENTER, 0.2, 0.0);
        store.seed(cafe("Lone", location.latitude, location.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        controller.on_map_initialized().await;
        controller.on_viewport_change(CENTER, 16.0).await;

        let SurfaceCommand::UpdateHotspots { hotspots } = rx.recv().await.unwrap();
        assert!((hotspots[0].distance - 0.2).abs() < 0.01);
    }

    #[tokio::test(start_paused = true)]
    async fn test_precise_cut_drops_box_corners() {
        let store = Arc::new(MemoryStore::new());
        // 0.5 mi north: inside the 0.7 mi radius.
        let inside = offset(CENTER, 0.5, 0.0);
        // 0.6 mi north and 0.6 mi east: inside the bounding box but 0.85 mi
        // out, past the radius.
        let corner = offset(CENTER, 0.6, 0.6);
        store.seed(cafe("Inside", inside.latitude, inside.longitude)).await;
        store.seed(cafe("Corner", corner.latitude, corner.longitude)).await;
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        controller.on_map_initialized().await;
        controller.on_viewport_change(CENTER, 16.0).await;

        let SurfaceCommand::UpdateHotspots { hotspots } = rx.recv().await.unwrap();
        assert_eq!(hotspots.len(), 1);
        assert_eq!(hotspots[0].id, "hs-1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_click_reaches_listener_only() {
        let store = Arc::new(MemoryStore::new());
        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));

        let clicked = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        {
            let clicked = Arc::clone(&clicked);
            controller
                .set_click_listener(Box::new(move |hotspot| {
                    if let Ok(mut seen) = clicked.lock() {
                        seen.push(hotspot.name.clone());
                    }
                }))
                .await;
        }

        controller.on_map_initialized().await;
        controller
            .handle_surface_message(SurfaceMessage::MarkerClick {
                hotspot: cafe("Tapped Cafe", CENTER.latitude, CENTER.longitude),
            })
            .await;

        assert_eq!(clicked.lock().unwrap().as_slice(), ["Tapped Cafe"]);
        // Taps publish nothing.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_street_level_scenario_one_marker_per_cluster() {
        // Midtown at zoom 16: 40 candidates in 5 tight clusters resolve to
        // exactly 5 rendered markers.
        let store = Arc::new(MemoryStore::new());
        for c in 0..5 {
            let cluster = offset(CENTER, -0.3 + c as f64 * 0.15, 0.0);
            for m in 0..8 {
                let theta = m as f64 * std::f64::consts::TAU / 8.0;
                let spot = offset(cluster, 0.005 * theta.cos(), 0.005 * theta.sin());
                store
                    .seed(cafe(&format!("c{c}-m{m}"), spot.latitude, spot.longitude))
                    .await;
            }
        }
        assert_eq!(store.len().await, 40);

        let (controller, mut rx) = build_controller(store, Arc::new(EmptyProvider));
        controller.on_map_initialized().await;
        controller.on_viewport_change(CENTER, 16.0).await;

        let command = rx.recv().await.unwrap();
        assert_eq!(marker_count(&command), 5);
    }
}
