//! Viewport Controller: keeps one overlay's markers in step with the camera.
//!
//! Camera-settled notifications are debounced, turned into an [`AreaKey`],
//! checked against the area cache and, when stale, fetched from the overlay's
//! provider. Every display refresh reads the latest result set under the
//! lock, never a snapshot captured when a fetch began.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use runtime::Debouncer;
use serde::Serialize;
use tokio::time::Instant;

use crate::area_cache::{AreaCache, AreaKey};
use crate::display::plan_display;
use crate::profile::OverlayProfile;
use crate::provider::{AreaQuery, GeoProvider};
use crate::record::RecordSet;
use crate::render::{ListenerId, Renderer};
use crate::zoom::{DisplayMode, MIN_ZOOM, ZoomLevel, zoom_level_for_height};

/// Renderer group ids owned by one overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayGroups {
    pub markers: String,
    pub clusters: String,
}

impl OverlayGroups {
    pub fn for_addon(addon_id: &str) -> Self {
        Self {
            markers: format!("{addon_id}-markers"),
            clusters: format!("{addon_id}-clusters"),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayStats {
    pub total_records: usize,
    pub loaded_area_count: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Fresh in the cache; only the display was refreshed.
    Cached,
    /// Fetched from the provider; `kept` records had usable coordinates.
    Fetched { kept: usize },
    /// The same area is already being fetched.
    InFlight,
    /// The fetch failed or its result was discarded.
    Failed,
}

#[derive(Debug)]
struct OverlayData {
    records: RecordSet,
    cache: AreaCache,
    zoom: ZoomLevel,
    attached: bool,
    running: bool,
    in_flight: BTreeSet<AreaKey>,
    /// Bumped on detach so late fetch results are dropped.
    generation: u64,
}

struct Shared {
    addon_id: String,
    profile: OverlayProfile,
    groups: OverlayGroups,
    renderer: Arc<dyn Renderer>,
    provider: Arc<dyn GeoProvider>,
    data: Mutex<OverlayData>,
}

struct Subscription {
    listener: ListenerId,
    debouncer: Debouncer<()>,
}

pub struct ViewportController {
    shared: Arc<Shared>,
    subscription: Mutex<Option<Subscription>>,
}

impl std::fmt::Debug for ViewportController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ViewportController")
            .field("addon_id", &self.shared.addon_id)
            .field("provider", &self.shared.provider.name())
            .field("stats", &self.stats())
            .finish()
    }
}

impl ViewportController {
    pub fn new(
        addon_id: impl Into<String>,
        profile: OverlayProfile,
        renderer: Arc<dyn Renderer>,
        provider: Arc<dyn GeoProvider>,
    ) -> Self {
        let addon_id = addon_id.into();
        let cache = AreaCache::new(profile.cache_ttl).with_max_entries(profile.cache_max_entries);
        Self {
            shared: Arc::new(Shared {
                groups: OverlayGroups::for_addon(&addon_id),
                addon_id,
                profile,
                renderer,
                provider,
                data: Mutex::new(OverlayData {
                    records: RecordSet::new(),
                    cache,
                    zoom: MIN_ZOOM,
                    attached: false,
                    running: false,
                    in_flight: BTreeSet::new(),
                    generation: 0,
                }),
            }),
            subscription: Mutex::new(None),
        }
    }

    pub fn groups(&self) -> &OverlayGroups {
        &self.shared.groups
    }

    pub fn profile(&self) -> &OverlayProfile {
        &self.shared.profile
    }

    pub fn is_running(&self) -> bool {
        self.shared.data.lock().running
    }

    /// Creates the overlay's renderer groups, hidden until started.
    ///
    /// Returns `false` when the renderer is not ready yet.
    pub fn attach(&self) -> bool {
        let shared = &self.shared;
        if !shared.renderer.is_ready() {
            tracing::warn!(addon = %shared.addon_id, "renderer not ready; cannot attach overlay");
            return false;
        }
        for group in [&shared.groups.markers, &shared.groups.clusters] {
            if !shared.renderer.create_group(group) {
                tracing::warn!(addon = %shared.addon_id, group = %group, "renderer refused group");
                return false;
            }
            shared.renderer.set_group_visible(group, false);
        }
        shared.data.lock().attached = true;
        true
    }

    /// Subscribes to camera movement and performs one load for the current
    /// view straight away.
    pub async fn start(&self) -> bool {
        {
            let mut data = self.shared.data.lock();
            if !data.attached {
                return false;
            }
            data.running = true;
        }

        {
            let mut subscription = self.subscription.lock();
            if subscription.is_none() {
                let shared = self.shared.clone();
                let debouncer = Debouncer::spawn(shared.profile.settle, move |()| {
                    let shared = shared.clone();
                    async move {
                        shared.handle_movement().await;
                    }
                });
                let listener = self.shared.renderer.on_viewport_settled(debouncer.sender());
                *subscription = Some(Subscription { listener, debouncer });
            }
        }

        self.shared.handle_movement().await;
        true
    }

    /// Unsubscribes and hides the overlay's groups. Data and cache are kept.
    pub fn stop(&self) {
        if let Some(sub) = self.subscription.lock().take() {
            self.shared.renderer.off_viewport_settled(sub.listener);
            sub.debouncer.cancel();
        }
        self.shared.data.lock().running = false;
        let groups = &self.shared.groups;
        self.shared.renderer.set_group_visible(&groups.markers, false);
        self.shared.renderer.set_group_visible(&groups.clusters, false);
    }

    /// Stops, removes the renderer groups, and forgets all records and cached
    /// areas.
    pub fn detach(&self) {
        self.stop();
        let groups = &self.shared.groups;
        self.shared.renderer.remove_group(&groups.markers);
        self.shared.renderer.remove_group(&groups.clusters);

        let mut data = self.shared.data.lock();
        data.records.clear();
        data.cache.clear();
        data.in_flight.clear();
        data.attached = false;
        data.generation += 1;
    }

    /// Samples the viewport and loads the area it maps to. `None` when the
    /// viewer has no usable view.
    pub async fn handle_movement(&self) -> Option<LoadOutcome> {
        self.shared.handle_movement().await
    }

    pub async fn load_area(&self, key: AreaKey, query: AreaQuery) -> LoadOutcome {
        self.shared.load_area(key, query).await
    }

    pub fn update_display(&self) {
        self.shared.update_display();
    }

    pub fn stats(&self) -> OverlayStats {
        let data = self.shared.data.lock();
        OverlayStats {
            total_records: data.records.len(),
            loaded_area_count: data.cache.len(),
        }
    }

    pub fn set_cache_ttl(&self, ttl: Duration) {
        self.shared.data.lock().cache.set_ttl(ttl);
    }
}

impl Drop for ViewportController {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.get_mut().take() {
            self.shared.renderer.off_viewport_settled(sub.listener);
        }
    }
}

impl Shared {
    async fn handle_movement(&self) -> Option<LoadOutcome> {
        let Some(sample) = self.renderer.viewport_center_and_height() else {
            tracing::debug!(addon = %self.addon_id, "no viewport to sample");
            return None;
        };

        let zoom = zoom_level_for_height(sample.height);
        let radius = self.profile.radius_for_zoom(zoom);
        let precision = self.profile.precision_for_zoom(zoom);
        let key = AreaKey::new(sample.latitude, sample.longitude, radius, precision);
        self.data.lock().zoom = zoom;

        let query = AreaQuery {
            latitude: sample.latitude,
            longitude: sample.longitude,
            radius,
        };
        Some(self.load_area(key, query).await)
    }

    async fn load_area(&self, key: AreaKey, query: AreaQuery) -> LoadOutcome {
        let generation = {
            let mut data = self.data.lock();
            if data.cache.is_fresh(&key, Instant::now()) {
                drop(data);
                tracing::debug!(addon = %self.addon_id, area = %key, "area fresh; skipping fetch");
                self.update_display();
                return LoadOutcome::Cached;
            }
            if !data.in_flight.insert(key.clone()) {
                drop(data);
                tracing::debug!(addon = %self.addon_id, area = %key, "area already in flight");
                self.update_display();
                return LoadOutcome::InFlight;
            }
            data.generation
        };
        let mut claim = InFlightClaim {
            shared: self,
            key: Some(key.clone()),
            generation,
        };

        tracing::debug!(
            addon = %self.addon_id,
            provider = self.provider.name(),
            area = %key,
            "fetching area"
        );
        let result = self.provider.fetch(query).await;

        let outcome = {
            let mut data = self.data.lock();
            claim.key = None;
            if data.generation != generation {
                tracing::debug!(addon = %self.addon_id, area = %key, "overlay detached; dropping result");
                return LoadOutcome::Failed;
            }
            data.in_flight.remove(&key);
            match result {
                Ok(batch) => {
                    let received = batch.len();
                    let kept = data.records.apply(self.profile.result_policy, batch);
                    let evicted = data.cache.mark_loaded(key.clone(), Instant::now());
                    tracing::info!(
                        addon = %self.addon_id,
                        area = %key,
                        received,
                        kept,
                        evicted = evicted.len(),
                        "area loaded"
                    );
                    LoadOutcome::Fetched { kept }
                }
                Err(err) => {
                    tracing::warn!(addon = %self.addon_id, area = %key, error = %err, "area fetch failed");
                    return LoadOutcome::Failed;
                }
            }
        };

        self.update_display();
        outcome
    }

    fn update_display(&self) {
        let data = self.data.lock();
        if !data.running {
            return;
        }
        let today = chrono::Local::now().date_naive();
        let plan = plan_display(data.records.iter(), data.zoom, &self.profile, today);

        // Rendering happens under the data lock so concurrent refreshes
        // cannot interleave their clears and adds.
        let renderer = &self.renderer;
        let groups = &self.groups;
        renderer.clear_group(&groups.markers);
        renderer.clear_group(&groups.clusters);
        let (target, other) = match plan.mode {
            DisplayMode::Individual => (&groups.markers, &groups.clusters),
            DisplayMode::Clustered => (&groups.clusters, &groups.markers),
        };
        let count = plan.markers.len();
        for marker in plan.markers {
            renderer.add_marker(target, marker);
        }
        renderer.set_group_visible(target, true);
        renderer.set_group_visible(other, false);
        tracing::trace!(addon = %self.addon_id, mode = ?plan.mode, markers = count, "display refreshed");
    }
}

/// Releases an area's in-flight mark if its load is dropped before it
/// finishes, e.g. when `stop` cancels the movement task mid-fetch.
struct InFlightClaim<'a> {
    shared: &'a Shared,
    key: Option<AreaKey>,
    generation: u64,
}

impl Drop for InFlightClaim<'_> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        let mut data = self.shared.data.lock();
        if data.generation == self.generation {
            data.in_flight.remove(&key);
            tracing::debug!(addon = %self.shared.addon_id, area = %key, "abandoned load released");
        }
    }
}
