//! Plugin lifecycle reconciliation.
//!
//! The [`Reconciler`] owns an [`AddonRegistry`] and the last desired-state
//! list it accepted from the store. Whenever that list changes it plans the
//! lifecycle calls each affected addon needs and runs them. Calls for one
//! addon are serialized; different addons proceed concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use futures_util::future::join_all;
use overlay::OverlayStats;
use parking_lot::Mutex;
use runtime::EventBus;
use tokio::sync::broadcast;

use crate::control::{AddonControl, apply_op};
use crate::plan::{plan_bring_up, plan_transitions};
use crate::record::ServerAddonRecord;
use crate::registry::AddonRegistry;
use crate::state::{AddonState, LifecycleOp};
use crate::store::{DesiredStateStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcilerEvent {
    /// A new desired-state list was accepted.
    DesiredStateUpdated { count: usize },
    /// One lifecycle call finished.
    Transition {
        id: String,
        op: LifecycleOp,
        ok: bool,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub op: LifecycleOp,
    pub ok: bool,
}

/// A desired-state record joined with its live addon's state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonEntry {
    pub record: ServerAddonRecord,
    pub state: AddonState,
}

pub struct Reconciler {
    store: Arc<dyn DesiredStateStore>,
    registry: AddonRegistry,
    desired: Mutex<Vec<ServerAddonRecord>>,
    record_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    events: EventBus<ReconcilerEvent>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("desired", &self.desired.lock().len())
            .finish()
    }
}

impl Reconciler {
    pub fn new(store: Arc<dyn DesiredStateStore>, registry: AddonRegistry) -> Self {
        Self {
            store,
            registry,
            desired: Mutex::new(Vec::new()),
            record_locks: DashMap::new(),
            events: EventBus::new(),
        }
    }

    pub fn registry(&self) -> &AddonRegistry {
        &self.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconcilerEvent> {
        self.events.subscribe()
    }

    pub fn desired_state(&self) -> Vec<ServerAddonRecord> {
        self.desired.lock().clone()
    }

    /// Fetches the full desired-state list and brings every installed and
    /// active addon up to running.
    ///
    /// On a transport error the previous list is kept and `false` is
    /// returned; there is no automatic retry.
    pub async fn load_desired_state(&self) -> bool {
        let records = match self.store.fetch_all().await {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "desired state refresh failed; keeping previous list");
                return false;
            }
        };

        let previous = std::mem::replace(&mut *self.desired.lock(), records.clone());
        tracing::info!(count = records.len(), "desired state loaded");
        self.events.publish(ReconcilerEvent::DesiredStateUpdated {
            count: records.len(),
        });

        join_all(records.iter().map(|record| {
            let old = previous.iter().find(|p| p.id == record.id);
            self.converge(old, record)
        }))
        .await;
        true
    }

    /// Drives the addon behind `new` from the state implied by `old` to the
    /// one `new` describes.
    pub async fn reconcile(
        &self,
        old: &ServerAddonRecord,
        new: &ServerAddonRecord,
    ) -> Vec<TransitionOutcome> {
        let Some(addon) = self.registry.get(&new.id) else {
            tracing::warn!(addon = %new.id, "no registered addon; skipping");
            return Vec::new();
        };
        let lock = self.record_lock(&new.id);
        let _serial = lock.lock().await;

        addon.set_options(&new.options());
        let ops = plan_transitions(old, new, addon.state());
        self.execute(addon.as_ref(), &ops).await.0
    }

    /// Sends `record` to the store, then reconciles every record whose flags
    /// differ between the list held so far and the list the store returned.
    /// The returned list becomes the new desired state.
    ///
    /// Nothing changes when the store cannot be reached.
    pub async fn submit_update(
        &self,
        record: ServerAddonRecord,
    ) -> Result<Vec<ServerAddonRecord>, StoreError> {
        tracing::info!(
            addon = %record.id,
            installed = record.installed,
            active = record.active,
            "submitting addon update"
        );
        let returned = self.store.submit(record).await.inspect_err(|err| {
            tracing::warn!(error = %err, "addon update rejected or store unreachable");
        })?;

        let previous = self.desired_state();
        let changed: Vec<(ServerAddonRecord, &ServerAddonRecord)> = returned
            .iter()
            .filter_map(|new| match previous.iter().find(|p| p.id == new.id) {
                Some(old) if old.same_flags(new) => None,
                Some(old) => Some((old.clone(), new)),
                None => Some((new.blank(), new)),
            })
            .collect();

        join_all(changed.iter().map(|(old, new)| self.reconcile(old, new))).await;

        *self.desired.lock() = returned.clone();
        self.events.publish(ReconcilerEvent::DesiredStateUpdated {
            count: returned.len(),
        });
        Ok(returned)
    }

    /// Installed records that have a registered addon.
    pub fn installed(&self) -> Vec<AddonEntry> {
        self.entries(true)
    }

    /// Records not yet installed that have a registered addon.
    pub fn available(&self) -> Vec<AddonEntry> {
        self.entries(false)
    }

    pub fn controller(&self, id: &str) -> Option<Arc<dyn AddonControl>> {
        self.registry.get(id)
    }

    pub fn stats(&self, id: &str) -> Option<OverlayStats> {
        self.registry.get(id).and_then(|addon| addon.stats())
    }

    /// Pushes `record`'s options into its addon. `false` if unregistered.
    pub fn set_options(&self, record: &ServerAddonRecord) -> bool {
        match self.registry.get(&record.id) {
            Some(addon) => {
                addon.set_options(&record.options());
                true
            }
            None => false,
        }
    }

    fn entries(&self, installed: bool) -> Vec<AddonEntry> {
        self.desired
            .lock()
            .iter()
            .filter(|record| record.installed == installed)
            .filter_map(|record| {
                self.registry.get(&record.id).map(|addon| AddonEntry {
                    record: record.clone(),
                    state: addon.state(),
                })
            })
            .collect()
    }

    fn record_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.record_locks
            .entry(id.to_string())
            .or_default()
            .value()
            .clone()
    }

    async fn converge(&self, old: Option<&ServerAddonRecord>, new: &ServerAddonRecord) {
        let Some(addon) = self.registry.get(&new.id) else {
            tracing::debug!(addon = %new.id, "desired state names an unregistered addon");
            return;
        };
        let lock = self.record_lock(&new.id);
        let _serial = lock.lock().await;

        addon.set_options(&new.options());
        match old {
            None => {
                if new.installed {
                    addon.set_installed_previously();
                }
            }
            Some(old) if !old.same_flags(new) => {
                let ops = plan_transitions(old, new, addon.state());
                let (_, completed) = self.execute(addon.as_ref(), &ops).await;
                if !completed {
                    return;
                }
            }
            Some(_) => {}
        }

        let ops = plan_bring_up(new, addon.state());
        self.execute(addon.as_ref(), &ops).await;
    }

    /// Runs `ops` in order. Stops early when `install` or `initialize`
    /// fails; the second value is `false` in that case.
    async fn execute(
        &self,
        addon: &dyn AddonControl,
        ops: &[LifecycleOp],
    ) -> (Vec<TransitionOutcome>, bool) {
        let mut outcomes = Vec::with_capacity(ops.len());
        for &op in ops {
            let ok = apply_op(addon, op).await;
            if ok {
                tracing::info!(addon = %addon.id(), op = %op, state = %addon.state(), "transition applied");
            } else {
                tracing::warn!(addon = %addon.id(), op = %op, state = %addon.state(), "transition failed");
            }
            self.events.publish(ReconcilerEvent::Transition {
                id: addon.id().to_string(),
                op,
                ok,
            });
            outcomes.push(TransitionOutcome { op, ok });
            if !ok && op.is_gating() {
                tracing::warn!(addon = %addon.id(), op = %op, "aborting remaining transitions");
                return (outcomes, false);
            }
        }
        (outcomes, true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use overlay::BoxFuture;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::{Reconciler, ReconcilerEvent, TransitionOutcome};
    use crate::control::AddonControl;
    use crate::lifecycle::Lifecycle;
    use crate::record::{AddonOptions, ServerAddonRecord};
    use crate::registry::AddonRegistry;
    use crate::state::{AddonState, LifecycleOp};
    use crate::store::{DesiredStateStore, MemoryStore};

    struct RecordingAddon {
        lifecycle: Lifecycle,
        calls: Mutex<Vec<&'static str>>,
        init_ok: AtomicBool,
        options: Mutex<Option<AddonOptions>>,
    }

    impl RecordingAddon {
        fn new(id: &str) -> Arc<Self> {
            Arc::new(Self {
                lifecycle: Lifecycle::new(id),
                calls: Mutex::new(Vec::new()),
                init_ok: AtomicBool::new(true),
                options: Mutex::new(None),
            })
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().clone()
        }
    }

    impl AddonControl for RecordingAddon {
        fn id(&self) -> &str {
            self.lifecycle.addon_id()
        }

        fn state(&self) -> AddonState {
            self.lifecycle.state()
        }

        fn install(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move {
                self.calls.lock().push("install");
                self.lifecycle.install()
            })
        }

        fn initialize(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move {
                self.calls.lock().push("initialize");
                let ok = self.init_ok.load(Ordering::SeqCst);
                self.lifecycle.initialize(|| async move { ok }).await
            })
        }

        fn start(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move {
                self.calls.lock().push("start");
                self.lifecycle.start(|| async { true }).await
            })
        }

        fn stop(&self) -> bool {
            self.calls.lock().push("stop");
            self.lifecycle.stop(|| {})
        }

        fn destroy(&self) -> bool {
            self.calls.lock().push("destroy");
            self.lifecycle.destroy(|| {}, || {})
        }

        fn uninstall(&self) -> bool {
            self.calls.lock().push("uninstall");
            self.lifecycle.uninstall(|| {}, || {})
        }

        fn set_installed_previously(&self) {
            self.lifecycle.set_installed_previously();
        }

        fn set_options(&self, options: &AddonOptions) {
            *self.options.lock() = Some(options.clone());
        }
    }

    fn record(id: &str, installed: bool, active: bool) -> ServerAddonRecord {
        ServerAddonRecord {
            id: id.into(),
            name: id.into(),
            desc: String::new(),
            active,
            installed,
            api_location: format!("http://store/api/{id}"),
        }
    }

    fn setup(
        records: Vec<ServerAddonRecord>,
        addons: &[Arc<RecordingAddon>],
    ) -> (Arc<MemoryStore>, Reconciler) {
        let store = Arc::new(MemoryStore::new(records));
        let registry = AddonRegistry::new();
        for addon in addons {
            registry.register(addon.clone());
        }
        (store.clone(), Reconciler::new(store, registry))
    }

    #[tokio::test]
    async fn install_and_activate_runs_install_initialize_start() {
        let a = RecordingAddon::new("A");
        let (_store, reconciler) = setup(vec![record("A", false, false)], &[a.clone()]);
        assert!(reconciler.load_desired_state().await);
        assert!(a.calls().is_empty());
        assert_eq!(a.state(), AddonState::Uninstalled);

        let mut events = reconciler.subscribe();
        let list = reconciler
            .submit_update(record("A", true, true))
            .await
            .unwrap();

        assert_eq!(list, vec![record("A", true, true)]);
        assert_eq!(a.calls(), vec!["install", "initialize", "start"]);
        assert_eq!(a.state(), AddonState::Running);
        assert_eq!(reconciler.installed().len(), 1);
        assert!(reconciler.available().is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        let transition = |op| ReconcilerEvent::Transition {
            id: "A".into(),
            op,
            ok: true,
        };
        assert_eq!(
            seen,
            vec![
                transition(LifecycleOp::Install),
                transition(LifecycleOp::Initialize),
                transition(LifecycleOp::Start),
                ReconcilerEvent::DesiredStateUpdated { count: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn install_without_activation_runs_the_full_chain() {
        let a = RecordingAddon::new("A");
        let (_store, reconciler) = setup(vec![record("A", false, false)], &[a.clone()]);
        assert!(reconciler.load_desired_state().await);

        reconciler
            .submit_update(record("A", true, false))
            .await
            .unwrap();

        assert_eq!(a.calls(), vec!["install", "initialize", "start"]);
        let installed: Vec<_> = reconciler
            .installed()
            .into_iter()
            .map(|e| (e.record.id, e.record.active, e.state))
            .collect();
        assert_eq!(
            installed,
            vec![("A".to_string(), false, AddonState::Running)]
        );
        assert!(reconciler.available().is_empty());
    }

    #[tokio::test]
    async fn replaying_a_change_is_a_no_op() {
        let a = RecordingAddon::new("A");
        let (_store, reconciler) = setup(vec![], &[a.clone()]);
        let old = record("A", false, false);
        let new = record("A", true, true);

        let first = reconciler.reconcile(&old, &new).await;
        assert_eq!(first.len(), 3);
        let second = reconciler.reconcile(&old, &new).await;

        assert_eq!(second, vec![]);
        assert_eq!(a.calls(), vec!["install", "initialize", "start"]);
        assert_eq!(a.state(), AddonState::Running);
    }

    #[tokio::test]
    async fn failed_initialize_aborts_the_chain() {
        let a = RecordingAddon::new("A");
        a.init_ok.store(false, Ordering::SeqCst);
        let (_store, reconciler) = setup(vec![], &[a.clone()]);

        let outcomes = reconciler
            .reconcile(&record("A", false, false), &record("A", true, true))
            .await;

        assert_eq!(
            outcomes,
            vec![
                TransitionOutcome {
                    op: LifecycleOp::Install,
                    ok: true
                },
                TransitionOutcome {
                    op: LifecycleOp::Initialize,
                    ok: false
                },
            ]
        );
        assert_eq!(a.calls(), vec!["install", "initialize"]);
        assert_eq!(a.state(), AddonState::Preinit);
    }

    #[tokio::test]
    async fn cold_start_brings_up_installed_and_active_only() {
        let running = RecordingAddon::new("run");
        let idle = RecordingAddon::new("idle");
        let fresh = RecordingAddon::new("fresh");
        let (_store, reconciler) = setup(
            vec![
                record("run", true, true),
                record("idle", true, false),
                record("fresh", false, false),
                record("ghost", true, true),
            ],
            &[running.clone(), idle.clone(), fresh.clone()],
        );

        assert!(reconciler.load_desired_state().await);

        assert_eq!(running.calls(), vec!["initialize", "start"]);
        assert_eq!(running.state(), AddonState::Running);
        assert!(idle.calls().is_empty());
        assert_eq!(idle.state(), AddonState::Preinit);
        assert_eq!(fresh.state(), AddonState::Uninstalled);
        assert_eq!(
            running.options.lock().clone().and_then(|o| o.api_location),
            Some("http://store/api/run".to_string())
        );

        let installed: Vec<_> = reconciler
            .installed()
            .into_iter()
            .map(|e| (e.record.id, e.state))
            .collect();
        assert_eq!(
            installed,
            vec![
                ("run".to_string(), AddonState::Running),
                ("idle".to_string(), AddonState::Preinit),
            ]
        );
        assert_eq!(reconciler.available().len(), 1);

        // A second refresh with nothing changed does nothing.
        assert!(reconciler.load_desired_state().await);
        assert_eq!(running.calls(), vec!["initialize", "start"]);
    }

    #[tokio::test]
    async fn refresh_applies_external_changes() {
        let a = RecordingAddon::new("A");
        let (store, reconciler) = setup(vec![record("A", true, true)], &[a.clone()]);
        reconciler.load_desired_state().await;
        assert_eq!(a.state(), AddonState::Running);

        store.submit(record("A", true, false)).await.unwrap();
        reconciler.load_desired_state().await;

        assert_eq!(a.calls(), vec!["initialize", "start", "stop"]);
        assert_eq!(a.state(), AddonState::Stopped);
    }

    #[tokio::test]
    async fn deactivate_then_reactivate_then_uninstall() {
        let a = RecordingAddon::new("A");
        let (_store, reconciler) = setup(vec![record("A", true, true)], &[a.clone()]);
        reconciler.load_desired_state().await;

        reconciler.submit_update(record("A", true, false)).await.unwrap();
        assert_eq!(a.state(), AddonState::Stopped);

        reconciler.submit_update(record("A", true, true)).await.unwrap();
        assert_eq!(a.state(), AddonState::Running);

        reconciler.submit_update(record("A", false, false)).await.unwrap();
        assert_eq!(a.state(), AddonState::Uninstalled);
        assert_eq!(
            a.calls(),
            vec!["initialize", "start", "stop", "start", "stop", "destroy", "uninstall"]
        );
        assert_eq!(reconciler.available().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_store_changes_nothing() {
        let a = RecordingAddon::new("A");
        let (store, reconciler) = setup(vec![record("A", true, true)], &[a.clone()]);
        reconciler.load_desired_state().await;
        let before = reconciler.desired_state();

        store.set_offline(true);
        assert!(!reconciler.load_desired_state().await);
        assert!(reconciler.submit_update(record("A", false, false)).await.is_err());

        assert_eq!(reconciler.desired_state(), before);
        assert_eq!(a.state(), AddonState::Running);
        assert_eq!(a.calls(), vec!["initialize", "start"]);
    }

    #[tokio::test]
    async fn lookups_and_options() {
        let a = RecordingAddon::new("A");
        let (_store, reconciler) = setup(vec![], &[a.clone()]);
        assert!(reconciler.controller("A").is_some());
        assert!(reconciler.controller("B").is_none());
        assert!(reconciler.stats("A").is_none());

        assert!(reconciler.set_options(&record("A", true, true)));
        assert!(!reconciler.set_options(&record("B", true, true)));
        assert!(a.options.lock().is_some());
    }
}
