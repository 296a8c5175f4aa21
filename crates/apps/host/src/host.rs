use std::sync::Arc;
use std::time::Duration;

use addons::{
    default_catalogue, AddonEntry, AddonRegistry, AddonState, AdvisoryAddon, DesiredStateStore,
    HttpAdvisorySource, HttpDesiredStateStore, MemoryStore, PointOverlayAddon, Reconciler,
    ReconcilerEvent, ServerAddonRecord, StoreError,
};
use foundation::CameraPose;
use overlay::{MemoryRenderer, OverlayGroups, OverlayStats};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::HostConfig;

/// What one installed addon currently shows.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayReport {
    pub id: String,
    pub state: AddonState,
    pub markers: usize,
    pub clusters: usize,
    pub regions: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<OverlayStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_data_update: Option<String>,
}

/// Registry with every addon this host knows how to run.
pub fn default_registry(
    config: &HostConfig,
    renderer: Arc<MemoryRenderer>,
    client: reqwest::Client,
) -> AddonRegistry {
    let events = PointOverlayAddon::events(renderer.clone(), client.clone(), &config.events_api_url)
        .with_timing(config.debounce, config.cache_ttl);
    let places = PointOverlayAddon::places(renderer.clone(), client.clone(), &config.places_api_url)
        .with_timing(config.debounce, config.cache_ttl);
    let advisory = AdvisoryAddon::new(
        renderer,
        Arc::new(HttpAdvisorySource::new(client)),
        &config.advisory_api_url,
    );
    AddonRegistry::new()
        .with(Arc::new(advisory))
        .with(Arc::new(events))
        .with(Arc::new(places))
}

/// Headless stand-in for the map client: one reconciler over an in-memory
/// globe.
pub struct Host {
    reconciler: Reconciler,
    renderer: Arc<MemoryRenderer>,
}

impl Host {
    pub fn new(
        store: Arc<dyn DesiredStateStore>,
        registry: AddonRegistry,
        renderer: Arc<MemoryRenderer>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(store, registry),
            renderer,
        }
    }

    /// Wires the real addons to the HTTP store, or to a local catalogue when
    /// `offline`.
    pub fn connect(config: &HostConfig, client: reqwest::Client, offline: bool) -> Self {
        let renderer = Arc::new(MemoryRenderer::ready());
        let store: Arc<dyn DesiredStateStore> = if offline {
            Arc::new(MemoryStore::new(default_catalogue(config.api_base())))
        } else {
            Arc::new(HttpDesiredStateStore::new(
                client.clone(),
                &config.addon_store_url,
            ))
        };
        let registry = default_registry(config, renderer.clone(), client);
        Self::new(store, registry, renderer)
    }

    async fn load(&self) -> Result<(), StoreError> {
        if self.reconciler.load_desired_state().await {
            Ok(())
        } else {
            Err(StoreError::new("desired state could not be loaded"))
        }
    }

    /// Installed entries, then available ones.
    pub async fn list(&self) -> Result<(Vec<AddonEntry>, Vec<AddonEntry>), StoreError> {
        self.load().await?;
        Ok((self.reconciler.installed(), self.reconciler.available()))
    }

    /// Submits new flags for `id` and returns the store's answer.
    pub async fn set(
        &self,
        id: &str,
        installed: bool,
        active: bool,
    ) -> Result<Vec<ServerAddonRecord>, StoreError> {
        self.load().await?;
        let Some(record) = self
            .reconciler
            .desired_state()
            .into_iter()
            .find(|r| r.id == id)
        else {
            return Err(StoreError::new(format!("unknown addon {id}")));
        };

        let mut events = self.reconciler.subscribe();
        let returned = self
            .reconciler
            .submit_update(record.with_flags(installed, active))
            .await?;
        while let Ok(event) = events.try_recv() {
            if let ReconcilerEvent::Transition { id, op, ok } = event {
                info!("{id}: {op:?} -> {}", if ok { "ok" } else { "failed" });
            }
        }
        Ok(returned)
    }

    /// Points the camera at `pose`, brings up the desired addons and reports
    /// what they show once `settle` has passed.
    pub async fn run(
        &self,
        pose: CameraPose,
        settle: Duration,
    ) -> Result<Vec<OverlayReport>, StoreError> {
        self.renderer.set_camera(Some(pose));
        self.load().await?;
        // Lets any trailing movement handler and its fetch finish.
        self.renderer.move_camera(pose);
        tokio::time::sleep(settle).await;
        Ok(self.report())
    }

    pub fn report(&self) -> Vec<OverlayReport> {
        self.reconciler
            .installed()
            .into_iter()
            .map(|entry| self.report_for(entry))
            .collect()
    }

    fn report_for(&self, entry: AddonEntry) -> OverlayReport {
        let id = entry.record.id;
        let groups = OverlayGroups::for_addon(&id);
        let markers = self.renderer.markers(&groups.markers);
        let clusters = self.renderer.markers(&groups.clusters);
        let labels = markers
            .iter()
            .chain(clusters.iter())
            .filter_map(|m| m.label.clone())
            .take(5)
            .collect();
        let addon = self.reconciler.controller(&id);
        if entry.state == AddonState::Running && addon.is_none() {
            warn!("{id}: running but not registered");
        }
        OverlayReport {
            state: entry.state,
            markers: markers.len(),
            clusters: clusters.len(),
            regions: self.renderer.regions(&id).len(),
            labels,
            stats: self.reconciler.stats(&id),
            last_data_update: addon.and_then(|a| a.last_data_update()),
            id,
        }
    }
}
