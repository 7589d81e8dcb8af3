//! Versioned double buffer shared by the simulation and presentation roles
//!
//! Each side is one [`VersionedValue`] stored in a single [`AtomicCell`], so
//! version and value are always published together. The simulation role owns
//! `cpu_state`; the presentation role owns `ui_state`. Neither ever waits on
//! the other.
//!
//! Precedence:
//! - versions differ: a controller change has not been mirrored yet, the
//!   simulation side wins
//! - versions match: the presentation side wins, including user edits made
//!   since the last mirror

use crossbeam::atomic::AtomicCell;
use std::fmt;
use tracing::debug;

/// Value tagged with the controller-change counter that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionedValue<T> {
    pub version: u64,
    pub value: T,
}

impl<T> VersionedValue<T> {
    pub fn new(version: u64, value: T) -> Self {
        Self { version, value }
    }
}

/// Control value reconciled between the two roles
pub struct CrossThreadControlState<T: Copy> {
    ui_state: AtomicCell<VersionedValue<T>>,
    cpu_state: AtomicCell<VersionedValue<T>>,
}

impl<T: Copy + PartialEq> CrossThreadControlState<T> {
    pub fn new(initial: T) -> Self {
        if !AtomicCell::<VersionedValue<T>>::is_lock_free() {
            // Falls back to a short per-cell critical section, never a wait on the other role
            debug!(
                "No native atomic for {}-byte versioned value, using guarded cell",
                std::mem::size_of::<VersionedValue<T>>()
            );
        }
        Self {
            ui_state: AtomicCell::new(VersionedValue::new(0, initial)),
            cpu_state: AtomicCell::new(VersionedValue::new(0, initial)),
        }
    }

    /// Current value as seen by the simulation role
    pub fn get_value(&self) -> T {
        let ui = self.ui_state.load();
        let cpu = self.cpu_state.load();
        if ui.version != cpu.version {
            cpu.value
        } else {
            ui.value
        }
    }

    /// Record a freshly polled controller value (simulation role)
    ///
    /// Returns true when the value changed and a mirror should be scheduled
    /// on the presentation role.
    pub fn on_controller_value_changed(&self, new_value: T) -> bool {
        let cpu = self.cpu_state.load();
        if cpu.value == new_value {
            return false;
        }
        self.cpu_state
            .store(VersionedValue::new(cpu.version + 1, new_value));
        true
    }

    /// Record a user edit (presentation role)
    ///
    /// The version is left alone: the edit holds only until the next real
    /// controller change.
    pub fn on_ui_value_changed(&self, new_value: T) {
        let ui = self.ui_state.load();
        self.ui_state.store(VersionedValue::new(ui.version, new_value));
    }

    /// Mirror the latest controller change into the presentation side
    ///
    /// Returns the value the presentation role should now display. Calling
    /// it when nothing is pending returns the current display value.
    pub fn apply_controller_value_change(&self) -> T {
        let cpu = self.cpu_state.load();
        let ui = self.ui_state.load();
        if ui.version == cpu.version {
            return ui.value;
        }
        self.ui_state.store(cpu);
        cpu.value
    }

    /// True while a controller change waits to be mirrored
    pub fn has_pending_change(&self) -> bool {
        self.ui_state.load().version != self.cpu_state.load().version
    }

    pub fn ui_state(&self) -> VersionedValue<T> {
        self.ui_state.load()
    }

    pub fn cpu_state(&self) -> VersionedValue<T> {
        self.cpu_state.load()
    }
}

impl<T: Copy + PartialEq + Default> Default for CrossThreadControlState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Copy + fmt::Debug> fmt::Debug for CrossThreadControlState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrossThreadControlState")
            .field("ui_state", &self.ui_state.load())
            .field("cpu_state", &self.cpu_state.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_end_to_end_scenario() {
        let state = CrossThreadControlState::new(0.0f64);
        assert_eq!(state.cpu_state(), VersionedValue::new(0, 0.0));
        assert_eq!(state.ui_state(), VersionedValue::new(0, 0.0));

        // Controller writes 0.5: cpu wins on mismatch
        assert!(state.on_controller_value_changed(0.5));
        assert_eq!(state.cpu_state(), VersionedValue::new(1, 0.5));
        assert_eq!(state.get_value(), 0.5);

        // Presentation mirrors
        assert_eq!(state.apply_controller_value_change(), 0.5);
        assert_eq!(state.ui_state(), VersionedValue::new(1, 0.5));
        assert_eq!(state.get_value(), 0.5);

        // User edits without bumping the version
        state.on_ui_value_changed(0.9);
        assert_eq!(state.ui_state(), VersionedValue::new(1, 0.9));
        assert_eq!(state.get_value(), 0.9);

        // Same controller value again is a no-op
        assert!(!state.on_controller_value_changed(0.5));
        assert_eq!(state.cpu_state().version, 1);
        assert_eq!(state.get_value(), 0.9);

        // Real change overrides the edit
        assert!(state.on_controller_value_changed(0.2));
        assert_eq!(state.cpu_state(), VersionedValue::new(2, 0.2));
        assert_eq!(state.get_value(), 0.2);
    }

    #[test]
    fn test_redundant_apply_is_harmless() {
        let state = CrossThreadControlState::new(false);
        assert!(state.on_controller_value_changed(true));
        assert!(state.apply_controller_value_change());
        state.on_ui_value_changed(false);
        // Already mirrored: returns the display value, keeps the edit
        assert!(!state.apply_controller_value_change());
        assert!(!state.get_value());
    }

    #[test]
    fn test_two_threads_converge() {
        let state = Arc::new(CrossThreadControlState::new(0i32));
        let sim = {
            let state = state.clone();
            std::thread::spawn(move || {
                for v in 1..=10_000 {
                    state.on_controller_value_changed(v);
                    let _ = state.get_value();
                }
            })
        };
        while !sim.is_finished() {
            let shown = state.apply_controller_value_change();
            assert!((0..=10_000).contains(&shown));
        }
        sim.join().unwrap();

        state.apply_controller_value_change();
        assert!(!state.has_pending_change());
        assert_eq!(state.ui_state(), state.cpu_state());
        assert_eq!(state.get_value(), 10_000);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Controller(i32),
        Ui(i32),
        Apply,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (-3i32..3).prop_map(Op::Controller),
            (-3i32..3).prop_map(Op::Ui),
            Just(Op::Apply),
        ]
    }

    proptest! {
        #[test]
        fn prop_version_monotonic(values in proptest::collection::vec(-5i32..5, 1..50)) {
            let state = CrossThreadControlState::new(0i32);
            for v in values {
                let before = state.cpu_state();
                let changed = state.on_controller_value_changed(v);
                let after = state.cpu_state();
                if before.value == v {
                    prop_assert!(!changed);
                    prop_assert_eq!(after.version, before.version);
                } else {
                    prop_assert!(changed);
                    prop_assert_eq!(after.version, before.version + 1);
                }
            }
        }

        #[test]
        fn prop_mirror_converges(ops in proptest::collection::vec(op(), 0..60)) {
            let state = CrossThreadControlState::new(0i32);
            for op in ops {
                match op {
                    Op::Controller(v) => { state.on_controller_value_changed(v); },
                    Op::Ui(v) => state.on_ui_value_changed(v),
                    Op::Apply => { state.apply_controller_value_change(); },
                }
            }
            let mut rounds = 0;
            while state.has_pending_change() {
                state.apply_controller_value_change();
                rounds += 1;
                prop_assert!(rounds <= 1);
            }
            prop_assert_eq!(state.ui_state().version, state.cpu_state().version);
        }

        #[test]
        fn prop_ui_edit_holds_until_controller_change(
            ops in proptest::collection::vec(op(), 0..30),
            edit in -10i32..10,
        ) {
            let state = CrossThreadControlState::new(0i32);
            for op in ops {
                match op {
                    Op::Controller(v) => { state.on_controller_value_changed(v); },
                    Op::Ui(v) => state.on_ui_value_changed(v),
                    Op::Apply => { state.apply_controller_value_change(); },
                }
            }
            state.apply_controller_value_change();
            state.on_ui_value_changed(edit);
            prop_assert_eq!(state.get_value(), edit);
        }

        #[test]
        fn prop_controller_wins_over_unmirrored_edit(
            start in -10i32..10,
            edit in -10i32..10,
            fresh in -10i32..10,
        ) {
            let state = CrossThreadControlState::new(start);
            state.on_ui_value_changed(edit);
            prop_assume!(fresh != start);
            prop_assert!(state.on_controller_value_changed(fresh));
            prop_assert_eq!(state.get_value(), fresh);
        }
    }
}
