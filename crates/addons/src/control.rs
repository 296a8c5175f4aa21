use overlay::{BoxFuture, OverlayStats};

use crate::record::AddonOptions;
use crate::state::{AddonState, LifecycleOp};

/// Uniform control surface every addon exposes to the reconciler.
///
/// Operations that may wait on remote resources return futures; the rest are
/// synchronous. Every operation reports success as a `bool`: an illegal call
/// is refused with `false` and a log line, never a panic. The state is only
/// ever changed by the addon's own operations.
pub trait AddonControl: Send + Sync {
    fn id(&self) -> &str;

    fn state(&self) -> AddonState;

    fn install(&self) -> BoxFuture<'_, bool>;

    /// Idempotent: returns `true` without side effects when already
    /// initialized, and shares the outcome of a call that is still running.
    fn initialize(&self) -> BoxFuture<'_, bool>;

    fn start(&self) -> BoxFuture<'_, bool>;

    fn stop(&self) -> bool;

    /// Releases resources and returns to `Preinit`, stopping first if needed.
    fn destroy(&self) -> bool;

    /// Stops and destroys as needed, then returns to `Uninstalled`.
    fn uninstall(&self) -> bool;

    /// Cold-start shortcut: the store says this addon was installed in an
    /// earlier session, so skip `install`.
    fn set_installed_previously(&self);

    fn set_options(&self, options: &AddonOptions);

    /// Counters for viewport-driven addons.
    fn stats(&self) -> Option<OverlayStats> {
        None
    }

    /// Human-readable freshness of the addon's data, if it tracks one.
    fn last_data_update(&self) -> Option<String> {
        None
    }
}

/// Runs one lifecycle operation against `addon`.
pub async fn apply_op(addon: &dyn AddonControl, op: LifecycleOp) -> bool {
    match op {
        LifecycleOp::Install => addon.install().await,
        LifecycleOp::Initialize => addon.initialize().await,
        LifecycleOp::Start => addon.start().await,
        LifecycleOp::Stop => addon.stop(),
        LifecycleOp::Destroy => addon.destroy(),
        LifecycleOp::Uninstall => addon.uninstall(),
    }
}
