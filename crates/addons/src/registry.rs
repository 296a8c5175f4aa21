use std::sync::Arc;

use dashmap::DashMap;

use crate::control::AddonControl;

/// Addon instances known to one reconciler, keyed by addon id.
///
/// Lookups are safe from concurrently running transitions.
#[derive(Default)]
pub struct AddonRegistry {
    addons: DashMap<String, Arc<dyn AddonControl>>,
}

impl AddonRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `addon` under its own id, replacing any previous instance.
    pub fn register(&self, addon: Arc<dyn AddonControl>) -> Option<Arc<dyn AddonControl>> {
        let id = addon.id().to_string();
        tracing::debug!(addon = %id, "registered");
        self.addons.insert(id, addon)
    }

    pub fn with(self, addon: Arc<dyn AddonControl>) -> Self {
        self.register(addon);
        self
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn AddonControl>> {
        self.addons.get(id).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.addons.contains_key(id)
    }

    /// Sorted for stable output.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.addons.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.addons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addons.is_empty()
    }
}

impl std::fmt::Debug for AddonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddonRegistry")
            .field("ids", &self.ids())
            .finish()
    }
}
