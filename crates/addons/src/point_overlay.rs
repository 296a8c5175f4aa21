//! Viewport-driven point overlay addon (events, places).

use std::sync::Arc;
use std::time::Duration;

use overlay::{
    BoxFuture, GeoProvider, OverlayProfile, OverlayStats, Renderer, ViewportController,
};
use parking_lot::Mutex;

use crate::control::AddonControl;
use crate::lifecycle::Lifecycle;
use crate::providers::{BusinessSearchClient, EventSearchClient};
use crate::record::{AddonOptions, EVENTS_ADDON_ID, PLACES_ADDON_ID};
use crate::state::AddonState;

/// Builds the provider for an endpoint URL.
pub type ProviderFactory = Arc<dyn Fn(&str) -> Arc<dyn GeoProvider> + Send + Sync>;

#[derive(Debug, Clone)]
struct Settings {
    endpoint: String,
    cache_ttl: Duration,
}

/// Addon that shows a provider's points around the current view, backed by
/// a [`ViewportController`] created on `initialize` and torn down on
/// `destroy`.
pub struct PointOverlayAddon {
    lifecycle: Lifecycle,
    profile: OverlayProfile,
    renderer: Arc<dyn Renderer>,
    make_provider: ProviderFactory,
    settings: Mutex<Settings>,
    overlay: Mutex<Option<Arc<ViewportController>>>,
}

impl PointOverlayAddon {
    pub fn new(
        id: impl Into<String>,
        profile: OverlayProfile,
        renderer: Arc<dyn Renderer>,
        endpoint: impl Into<String>,
        make_provider: ProviderFactory,
    ) -> Self {
        let settings = Settings {
            endpoint: endpoint.into(),
            cache_ttl: profile.cache_ttl,
        };
        Self {
            lifecycle: Lifecycle::new(id),
            profile,
            renderer,
            make_provider,
            settings: Mutex::new(settings),
            overlay: Mutex::new(None),
        }
    }

    /// Ticketed events around the view, clustered when zoomed out.
    pub fn events(
        renderer: Arc<dyn Renderer>,
        client: reqwest::Client,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::new(
            EVENTS_ADDON_ID,
            OverlayProfile::events(),
            renderer,
            endpoint,
            Arc::new(move |url: &str| {
                Arc::new(EventSearchClient::new(client.clone(), url)) as Arc<dyn GeoProvider>
            }),
        )
    }

    /// Businesses around the view.
    pub fn places(
        renderer: Arc<dyn Renderer>,
        client: reqwest::Client,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::new(
            PLACES_ADDON_ID,
            OverlayProfile::places(),
            renderer,
            endpoint,
            Arc::new(move |url: &str| {
                Arc::new(BusinessSearchClient::new(client.clone(), url)) as Arc<dyn GeoProvider>
            }),
        )
    }

    /// Overrides the profile's settle window and cache lifetime before the
    /// overlay is built.
    pub fn with_timing(mut self, settle: Duration, cache_ttl: Duration) -> Self {
        self.profile.settle = settle;
        self.profile.cache_ttl = cache_ttl;
        self.settings.get_mut().cache_ttl = cache_ttl;
        self
    }

    pub fn endpoint(&self) -> String {
        self.settings.lock().endpoint.clone()
    }

    pub fn overlay(&self) -> Option<Arc<ViewportController>> {
        self.overlay.lock().clone()
    }

    fn halt(&self) {
        if let Some(overlay) = self.overlay() {
            overlay.stop();
        }
    }

    fn teardown(&self) {
        if let Some(overlay) = self.overlay.lock().take() {
            overlay.detach();
        }
    }

    fn build_overlay(&self) -> bool {
        let settings = self.settings.lock().clone();
        let mut profile = self.profile.clone();
        profile.cache_ttl = settings.cache_ttl;

        let provider = (self.make_provider)(&settings.endpoint);
        let overlay = Arc::new(ViewportController::new(
            self.id(),
            profile,
            self.renderer.clone(),
            provider,
        ));
        if !overlay.attach() {
            return false;
        }
        tracing::debug!(addon = %self.id(), endpoint = %settings.endpoint, "overlay attached");
        *self.overlay.lock() = Some(overlay);
        true
    }
}

impl AddonControl for PointOverlayAddon {
    fn id(&self) -> &str {
        self.lifecycle.addon_id()
    }

    fn state(&self) -> AddonState {
        self.lifecycle.state()
    }

    fn install(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.lifecycle.install() })
    }

    fn initialize(&self) -> BoxFuture<'_, bool> {
        Box::pin(
            self.lifecycle
                .initialize(move || async move { self.build_overlay() }),
        )
    }

    fn start(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.lifecycle.start(move || async move {
            match self.overlay() {
                Some(overlay) => overlay.start().await,
                None => false,
            }
        }))
    }

    fn stop(&self) -> bool {
        self.lifecycle.stop(|| self.halt())
    }

    fn destroy(&self) -> bool {
        self.lifecycle.destroy(|| self.halt(), || self.teardown())
    }

    fn uninstall(&self) -> bool {
        self.lifecycle.uninstall(|| self.halt(), || self.teardown())
    }

    fn set_installed_previously(&self) {
        self.lifecycle.set_installed_previously();
    }

    /// Endpoint changes apply from the next `initialize`; the cache lifetime
    /// applies immediately.
    fn set_options(&self, options: &AddonOptions) {
        let mut settings = self.settings.lock();
        if let Some(endpoint) = options.http_endpoint() {
            if settings.endpoint != endpoint {
                tracing::debug!(addon = %self.id(), endpoint, "endpoint updated");
                settings.endpoint = endpoint.to_string();
            }
        }
        if let Some(ms) = options.cache_expiry_ms {
            settings.cache_ttl = Duration::from_millis(ms);
            if let Some(overlay) = self.overlay.lock().as_ref() {
                overlay.set_cache_ttl(settings.cache_ttl);
            }
        }
    }

    fn stats(&self) -> Option<OverlayStats> {
        Some(self.overlay().map(|o| o.stats()).unwrap_or_default())
    }
}
