//! Turns a desired-state change into an ordered list of lifecycle calls.
//!
//! Rules are evaluated in a fixed order against the addon's current state:
//!
//! 1. newly active (and installed): initialize unless stopped, then start
//! 2. newly inactive: stop
//! 3. newly uninstalled: destroy, then uninstall
//! 4. newly installed: install, initialize, start
//!
//! When a record is installed and activated in the same change, rule 4
//! covers activation, so `start` is planned once. Each planned call is
//! checked against the state the earlier calls will leave behind, and calls
//! that would be refused or would do nothing are dropped. Replaying the same
//! change against the resulting state therefore plans nothing.

use crate::record::ServerAddonRecord;
use crate::state::{AddonState, LifecycleOp};

pub fn plan_transitions(
    old: &ServerAddonRecord,
    new: &ServerAddonRecord,
    current: AddonState,
) -> Vec<LifecycleOp> {
    let mut planner = Planner {
        state: current,
        ops: Vec::new(),
    };
    let newly_installed = !old.installed && new.installed;

    if !old.active && new.active && new.installed && !newly_installed {
        if planner.state != AddonState::Stopped {
            planner.push(LifecycleOp::Initialize);
        }
        planner.push(LifecycleOp::Start);
    }
    if old.active && !new.active {
        planner.push(LifecycleOp::Stop);
    }
    if old.installed && !new.installed {
        planner.push(LifecycleOp::Destroy);
        planner.push(LifecycleOp::Uninstall);
    }
    if newly_installed {
        planner.push(LifecycleOp::Install);
        planner.push(LifecycleOp::Initialize);
        planner.push(LifecycleOp::Start);
    }
    planner.ops
}

/// Calls that bring an addon whose record is installed and active up to
/// running, used when desired state is (re)loaded.
pub fn plan_bring_up(record: &ServerAddonRecord, current: AddonState) -> Vec<LifecycleOp> {
    let mut planner = Planner {
        state: current,
        ops: Vec::new(),
    };
    if record.installed && record.active {
        planner.push(LifecycleOp::Initialize);
        planner.push(LifecycleOp::Start);
    }
    planner.ops
}

struct Planner {
    state: AddonState,
    ops: Vec<LifecycleOp>,
}

impl Planner {
    fn push(&mut self, op: LifecycleOp) {
        if op.permitted_from(self.state) {
            self.ops.push(op);
            self.state = op.target();
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{plan_bring_up, plan_transitions};
    use crate::record::ServerAddonRecord;
    use crate::state::{AddonState, LifecycleOp};

    fn record(installed: bool, active: bool) -> ServerAddonRecord {
        ServerAddonRecord {
            id: "A".into(),
            name: "A".into(),
            desc: String::new(),
            active,
            installed,
            api_location: String::new(),
        }
    }

    fn replay(ops: &[LifecycleOp], mut state: AddonState) -> AddonState {
        for op in ops {
            assert!(op.permitted_from(state), "{op} from {state}");
            state = op.target();
        }
        state
    }

    #[test]
    fn install_and_activate_runs_full_chain_once() {
        let ops = plan_transitions(&record(false, false), &record(true, true), AddonState::Uninstalled);
        assert_eq!(
            ops,
            vec![LifecycleOp::Install, LifecycleOp::Initialize, LifecycleOp::Start]
        );
        assert_eq!(replay(&ops, AddonState::Uninstalled), AddonState::Running);
    }

    #[test]
    fn install_alone_still_starts() {
        let ops = plan_transitions(&record(false, false), &record(true, false), AddonState::Uninstalled);
        assert_eq!(
            ops,
            vec![LifecycleOp::Install, LifecycleOp::Initialize, LifecycleOp::Start]
        );

        // a later activation finds it running and has nothing to do
        let ops = plan_transitions(&record(true, false), &record(true, true), AddonState::Running);
        assert_eq!(ops, vec![]);
    }

    #[test]
    fn activation_skips_initialize_when_stopped() {
        let ops = plan_transitions(&record(true, false), &record(true, true), AddonState::Stopped);
        assert_eq!(ops, vec![LifecycleOp::Start]);

        let ops = plan_transitions(&record(true, false), &record(true, true), AddonState::Preinit);
        assert_eq!(ops, vec![LifecycleOp::Initialize, LifecycleOp::Start]);
    }

    #[test]
    fn deactivate_and_uninstall_together() {
        let ops = plan_transitions(&record(true, true), &record(false, false), AddonState::Running);
        assert_eq!(
            ops,
            vec![LifecycleOp::Stop, LifecycleOp::Destroy, LifecycleOp::Uninstall]
        );
        assert_eq!(replay(&ops, AddonState::Running), AddonState::Uninstalled);
    }

    #[test]
    fn uninstall_from_preinit_skips_destroy() {
        let ops = plan_transitions(&record(true, false), &record(false, false), AddonState::Preinit);
        assert_eq!(ops, vec![LifecycleOp::Uninstall]);
    }

    #[test]
    fn replaying_a_change_plans_nothing() {
        let pairs = [
            (record(false, false), record(true, true)),
            (record(true, true), record(true, false)),
            (record(true, false), record(true, true)),
            (record(true, true), record(false, false)),
            (record(false, false), record(true, false)),
        ];
        for (old, new) in pairs {
            for start in [AddonState::Uninstalled, AddonState::Preinit, AddonState::Stopped] {
                let first = plan_transitions(&old, &new, start);
                let after = replay(&first, start);
                let second = plan_transitions(&old, &new, after);
                assert_eq!(second, vec![], "{old:?} -> {new:?} from {start}");
            }
        }
    }

    #[test]
    fn unchanged_flags_plan_nothing() {
        for state in [AddonState::Running, AddonState::Preinit] {
            assert!(plan_transitions(&record(true, true), &record(true, true), state).is_empty());
        }
    }

    #[test]
    fn bring_up_only_for_installed_and_active() {
        assert_eq!(
            plan_bring_up(&record(true, true), AddonState::Preinit),
            vec![LifecycleOp::Initialize, LifecycleOp::Start]
        );
        assert_eq!(
            plan_bring_up(&record(true, true), AddonState::Stopped),
            vec![LifecycleOp::Start]
        );
        assert!(plan_bring_up(&record(true, true), AddonState::Running).is_empty());
        assert!(plan_bring_up(&record(true, false), AddonState::Preinit).is_empty());
        assert!(plan_bring_up(&record(true, true), AddonState::Uninstalled).is_empty());
    }
}
