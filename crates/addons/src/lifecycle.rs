//! Guarded state machine shared by the concrete addons.
//!
//! Each addon owns a [`Lifecycle`] and routes every operation through it; the
//! lifecycle checks the precondition, runs the addon's hook, and records the
//! new state only when the hook succeeds.

use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::state::{AddonState, LifecycleOp};

#[derive(Debug)]
pub struct Lifecycle {
    addon_id: String,
    state: Mutex<AddonState>,
    init: InitGate,
}

impl Lifecycle {
    pub fn new(addon_id: impl Into<String>) -> Self {
        Self {
            addon_id: addon_id.into(),
            state: Mutex::new(AddonState::Uninstalled),
            init: InitGate::default(),
        }
    }

    pub fn addon_id(&self) -> &str {
        &self.addon_id
    }

    pub fn state(&self) -> AddonState {
        *self.state.lock()
    }

    fn set(&self, state: AddonState) {
        let prev = std::mem::replace(&mut *self.state.lock(), state);
        if prev != state {
            tracing::info!(addon = %self.addon_id, from = %prev, to = %state, "state changed");
        }
    }

    fn permits(&self, op: LifecycleOp) -> bool {
        let state = self.state();
        if op.permitted_from(state) {
            return true;
        }
        tracing::warn!(addon = %self.addon_id, op = %op, state = %state, "operation refused");
        false
    }

    pub fn install(&self) -> bool {
        if !self.permits(LifecycleOp::Install) {
            return false;
        }
        self.set(AddonState::Preinit);
        true
    }

    /// Only meaningful on a fresh instance; later states are left alone.
    pub fn set_installed_previously(&self) {
        let mut state = self.state.lock();
        if *state == AddonState::Uninstalled {
            tracing::debug!(addon = %self.addon_id, "installed in an earlier session");
            *state = AddonState::Preinit;
        }
    }

    /// Runs `load` at most once at a time. A caller arriving while a load is
    /// in flight waits for and returns that load's result.
    pub async fn initialize<F, Fut>(&self, load: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let state = self.state();
        if state.is_initialized() {
            return true;
        }
        if state != AddonState::Preinit {
            tracing::warn!(addon = %self.addon_id, state = %state, "cannot initialize");
            return false;
        }

        self.init
            .run(
                || match self.state() {
                    s if s.is_initialized() => Some(true),
                    AddonState::Preinit => None,
                    _ => Some(false),
                },
                load,
                |ok| {
                    if !ok {
                        tracing::warn!(addon = %self.addon_id, "initialize failed");
                        return;
                    }
                    let mut current = self.state.lock();
                    if *current == AddonState::Preinit {
                        *current = AddonState::Initialized;
                        tracing::info!(addon = %self.addon_id, "initialized");
                    }
                },
            )
            .await
    }

    pub async fn start<F, Fut>(&self, run: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        if !self.permits(LifecycleOp::Start) {
            return false;
        }
        if !run().await {
            tracing::warn!(addon = %self.addon_id, "start hook failed");
            return false;
        }
        self.set(AddonState::Running);
        true
    }

    pub fn stop(&self, halt: impl FnOnce()) -> bool {
        if !self.permits(LifecycleOp::Stop) {
            return false;
        }
        halt();
        self.set(AddonState::Stopped);
        true
    }

    pub fn destroy(&self, halt: impl FnOnce(), teardown: impl FnOnce()) -> bool {
        if !self.permits(LifecycleOp::Destroy) {
            return false;
        }
        if self.state() == AddonState::Running {
            halt();
        }
        teardown();
        self.set(AddonState::Preinit);
        true
    }

    pub fn uninstall(&self, halt: impl FnOnce(), teardown: impl FnOnce()) -> bool {
        if !self.permits(LifecycleOp::Uninstall) {
            return false;
        }
        let state = self.state();
        if state == AddonState::Running {
            halt();
        }
        if LifecycleOp::Destroy.permitted_from(state) {
            teardown();
        }
        self.set(AddonState::Uninstalled);
        true
    }
}

enum Role {
    Leader(watch::Sender<Option<bool>>),
    Follower(watch::Receiver<Option<bool>>),
}

/// Single-flight gate for initialization.
#[derive(Debug, Default)]
pub struct InitGate {
    in_flight: Mutex<Option<watch::Receiver<Option<bool>>>>,
}

impl InitGate {
    pub fn is_loading(&self) -> bool {
        self.in_flight.lock().is_some()
    }

    /// `settled` is consulted under the gate before a new load begins; a
    /// `Some` answer is returned as is. `commit` sees the leader's result
    /// before the gate reopens, so a caller arriving afterwards finds it
    /// already applied.
    pub async fn run<F, Fut>(
        &self,
        settled: impl FnOnce() -> Option<bool>,
        load: F,
        commit: impl FnOnce(bool),
    ) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let role = {
            let mut slot = self.in_flight.lock();
            match slot.as_ref() {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    if let Some(done) = settled() {
                        return done;
                    }
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Follower(mut rx) => match rx.wait_for(Option::is_some).await {
                Ok(result) => result.unwrap_or(false),
                // Leader was dropped mid-load.
                Err(_) => false,
            },
            Role::Leader(tx) => {
                let _clear = ClearOnDrop(&self.in_flight);
                let ok = load().await;
                commit(ok);
                tx.send_replace(Some(ok));
                ok
            }
        }
    }
}

struct ClearOnDrop<'a>(&'a Mutex<Option<watch::Receiver<Option<bool>>>>);

impl Drop for ClearOnDrop<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Notify;

    use super::{InitGate, Lifecycle};
    use crate::state::AddonState;

    fn lifecycle_in(state: AddonState) -> Lifecycle {
        let lifecycle = Lifecycle::new("test");
        *lifecycle.state.lock() = state;
        lifecycle
    }

    #[tokio::test]
    async fn full_walk_through_the_machine() {
        let lc = Lifecycle::new("walk");
        assert!(lc.install());
        assert!(lc.initialize(|| async { true }).await);
        assert_eq!(lc.state(), AddonState::Initialized);
        assert!(lc.start(|| async { true }).await);
        assert!(lc.stop(|| {}));
        assert!(lc.start(|| async { true }).await);

        let halted = AtomicUsize::new(0);
        let torn = AtomicUsize::new(0);
        assert!(lc.uninstall(
            || {
                halted.fetch_add(1, Ordering::SeqCst);
            },
            || {
                torn.fetch_add(1, Ordering::SeqCst);
            }
        ));
        assert_eq!(lc.state(), AddonState::Uninstalled);
        assert_eq!(halted.load(Ordering::SeqCst), 1);
        assert_eq!(torn.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn running_refuses_everything_but_stop() {
        let lc = lifecycle_in(AddonState::Running);
        let loads = AtomicUsize::new(0);

        assert!(!lc.install());
        assert!(!lc.start(|| async { true }).await);
        assert!(
            lc.initialize(|| async {
                loads.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await
        );
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(lc.state(), AddonState::Running);

        assert!(lc.stop(|| {}));
        assert_eq!(lc.state(), AddonState::Stopped);
    }

    #[tokio::test]
    async fn failed_initialize_keeps_prior_state() {
        let lc = lifecycle_in(AddonState::Preinit);
        assert!(!lc.initialize(|| async { false }).await);
        assert_eq!(lc.state(), AddonState::Preinit);
        assert!(!lc.start(|| async { true }).await);
    }

    #[tokio::test]
    async fn initialize_needs_install_first() {
        let lc = Lifecycle::new("fresh");
        assert!(!lc.initialize(|| async { true }).await);
        lc.set_installed_previously();
        assert_eq!(lc.state(), AddonState::Preinit);
        assert!(lc.initialize(|| async { true }).await);

        // no effect once past preinit
        lc.set_installed_previously();
        assert_eq!(lc.state(), AddonState::Initialized);
    }

    #[tokio::test]
    async fn concurrent_initialize_shares_one_load() {
        let lc = lifecycle_in(AddonState::Preinit);
        let loads = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let first = lc.initialize(|| {
            let loads = loads.clone();
            let release = release.clone();
            async move {
                loads.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                true
            }
        });
        let second = async {
            tokio::task::yield_now().await;
            let ok = lc
                .initialize(|| async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    false
                })
                .await;
            ok
        };
        let trigger = async {
            tokio::task::yield_now().await;
            tokio::task::yield_now().await;
            release.notify_one();
        };

        let (a, b, ()) = tokio::join!(first, second, trigger);
        assert!(a && b);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(lc.state(), AddonState::Initialized);
    }

    #[tokio::test]
    async fn gate_commits_before_reopening() {
        let gate = InitGate::default();
        let loads = AtomicUsize::new(0);
        let closed_at_commit = AtomicBool::new(false);

        let ok = gate
            .run(
                || None,
                || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    true
                },
                |ok| {
                    assert!(ok);
                    closed_at_commit.store(gate.is_loading(), Ordering::SeqCst);
                },
            )
            .await;
        assert!(ok);
        assert!(closed_at_commit.load(Ordering::SeqCst));
        assert!(!gate.is_loading());

        // a caller that checked state before the commit now finds it settled
        let late = gate
            .run(
                || Some(true),
                || async {
                    loads.fetch_add(1, Ordering::SeqCst);
                    true
                },
                |_| panic!("nothing to commit"),
            )
            .await;
        assert!(late);
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn destroy_refuses_before_initialize() {
        let lc = lifecycle_in(AddonState::Preinit);
        assert!(!lc.destroy(|| {}, || {}));
        let lc = lifecycle_in(AddonState::Stopped);
        assert!(lc.destroy(|| panic!("not running"), || {}));
        assert_eq!(lc.state(), AddonState::Preinit);
    }
}
