use serde::{Deserialize, Serialize};

/// Lifecycle stage of one addon instance.
///
/// ```text
/// uninstalled --install--> preinit --initialize--> initialized --start--> running
///                                                   stopped <--stop-- running
///                                                   stopped --start--> running
/// (initialized | running | stopped) --destroy--> preinit
/// any --uninstall--> uninstalled
/// ```
///
/// `Disabled` is reserved; no transition produces it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonState {
    Uninstalled,
    Preinit,
    Initialized,
    Running,
    Stopped,
    Disabled,
}

impl AddonState {
    pub fn as_str(self) -> &'static str {
        match self {
            AddonState::Uninstalled => "uninstalled",
            AddonState::Preinit => "preinit",
            AddonState::Initialized => "initialized",
            AddonState::Running => "running",
            AddonState::Stopped => "stopped",
            AddonState::Disabled => "disabled",
        }
    }

    /// Initialization has happened and its resources are still held.
    pub fn is_initialized(self) -> bool {
        matches!(
            self,
            AddonState::Initialized | AddonState::Running | AddonState::Stopped
        )
    }
}

impl std::fmt::Display for AddonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle operation the reconciler can invoke on an addon.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleOp {
    Install,
    Initialize,
    Start,
    Stop,
    Destroy,
    Uninstall,
}

impl LifecycleOp {
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleOp::Install => "install",
            LifecycleOp::Initialize => "initialize",
            LifecycleOp::Start => "start",
            LifecycleOp::Stop => "stop",
            LifecycleOp::Destroy => "destroy",
            LifecycleOp::Uninstall => "uninstall",
        }
    }

    /// Whether the operation does real work from `state`.
    ///
    /// `Initialize` only does work from `Preinit`; from an initialized state
    /// it succeeds as a no-op, which callers treat as already done.
    pub fn permitted_from(self, state: AddonState) -> bool {
        match self {
            LifecycleOp::Install => state == AddonState::Uninstalled,
            LifecycleOp::Initialize => state == AddonState::Preinit,
            LifecycleOp::Start => matches!(state, AddonState::Initialized | AddonState::Stopped),
            LifecycleOp::Stop => state == AddonState::Running,
            LifecycleOp::Destroy => {
                !matches!(state, AddonState::Uninstalled | AddonState::Preinit)
            }
            LifecycleOp::Uninstall => state != AddonState::Uninstalled,
        }
    }

    /// State after the operation succeeds.
    pub fn target(self) -> AddonState {
        match self {
            LifecycleOp::Install => AddonState::Preinit,
            LifecycleOp::Initialize => AddonState::Initialized,
            LifecycleOp::Start => AddonState::Running,
            LifecycleOp::Stop => AddonState::Stopped,
            LifecycleOp::Destroy => AddonState::Preinit,
            LifecycleOp::Uninstall => AddonState::Uninstalled,
        }
    }

    /// A failure here leaves nothing for later operations to act on.
    pub fn is_gating(self) -> bool {
        matches!(self, LifecycleOp::Install | LifecycleOp::Initialize)
    }
}

impl std::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
