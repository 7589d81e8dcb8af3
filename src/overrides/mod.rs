//! Input override layer
//!
//! Tool code registers per-(group, control) functions in an
//! [`InputOverrider`], flattens them into one dispatch closure and installs
//! that on an [`EmulatedController`]. The controller calls it on every read
//! without knowing which tool is attached.

pub mod cross_thread;
pub mod presentation;
pub mod tas;

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::controller::{EmulatedController, InputOverrideFunction};
use crate::device::ControlState;

pub use cross_thread::{CrossThreadControlState, VersionedValue};
pub use presentation::{PresentationHandle, PresentationQueue};
pub use tas::{TasAxis, TasButton, TasInputSession};

/// Override for a single control: natural value in, replacement out
pub type OverrideFunction = Arc<dyn Fn(ControlState) -> Option<ControlState> + Send + Sync>;

/// Per-(group, control) table of override functions
#[derive(Clone, Default)]
pub struct InputOverrider {
    functions: HashMap<String, HashMap<String, OverrideFunction>>,
}

impl InputOverrider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the override for one control, replacing any previous one
    ///
    /// Contract: `function` runs on the simulation thread during a tick. It
    /// must be cheap, must not block and must not panic. Nothing guards
    /// against a function that breaks this.
    pub fn add_function<F>(&mut self, group: impl Into<String>, control: impl Into<String>, function: F)
    where
        F: Fn(ControlState) -> Option<ControlState> + Send + Sync + 'static,
    {
        let group = group.into();
        let control = control.into();
        let replaced = self
            .functions
            .entry(group.clone())
            .or_default()
            .insert(control.clone(), Arc::new(function))
            .is_some();
        if replaced {
            debug!("Replaced override for {}/{}", group, control);
        }
    }

    pub fn contains(&self, group: &str, control: &str) -> bool {
        self.functions
            .get(group)
            .is_some_and(|controls| controls.contains_key(control))
    }

    pub fn len(&self) -> usize {
        self.functions.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flatten the table into one dispatch closure
    ///
    /// The closure captures a snapshot; later `add_function` calls do not
    /// affect it. Lookups borrow the incoming names and never allocate.
    pub fn get_input_override_function(&self) -> InputOverrideFunction {
        let functions = Arc::new(self.functions.clone());
        Arc::new(move |group: &str, control: &str, natural: ControlState| {
            functions
                .get(group)
                .and_then(|controls| controls.get(control))
                .and_then(|function| function(natural))
        })
    }
}

/// Attach a tool's overrides to a controller, returning the installed dispatch
///
/// The caller must hold the controller exclusively (between ticks).
pub fn install(controller: &mut EmulatedController, overrider: &InputOverrider) -> InputOverrideFunction {
    let function = overrider.get_input_override_function();
    controller.set_input_override_function(function.clone());
    info!(
        "Installed {} input overrides on '{}'",
        overrider.len(),
        controller.name()
    );
    function
}

/// Whether `function` is the dispatch currently installed on `controller`
pub fn is_installed(controller: &EmulatedController, function: &InputOverrideFunction) -> bool {
    controller
        .input_override_function()
        .is_some_and(|current| Arc::as_ptr(current) as *const () == Arc::as_ptr(function) as *const ())
}

/// Restore pass-through reads
pub fn uninstall(controller: &mut EmulatedController) {
    if controller.has_input_override() {
        controller.clear_input_override_function();
        info!("Removed input overrides from '{}'", controller.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_hits_registered_pair_only() {
        let mut overrider = InputOverrider::new();
        overrider.add_function("Buttons", "A", |_| Some(1.0));
        let dispatch = overrider.get_input_override_function();

        assert_eq!(dispatch("Buttons", "A", 0.0), Some(1.0));
        assert_eq!(dispatch("Buttons", "B", 0.0), None);
        assert_eq!(dispatch("Stick", "A", 0.0), None);
    }

    #[test]
    fn test_last_registration_wins() {
        let mut overrider = InputOverrider::new();
        overrider.add_function("Buttons", "A", |_| Some(1.0));
        overrider.add_function("Buttons", "A", |v| Some(v * 3.0));
        assert_eq!(overrider.len(), 1);

        let dispatch = overrider.get_input_override_function();
        assert_eq!(dispatch("Buttons", "A", 0.5), Some(1.5));
    }

    #[test]
    fn test_function_may_pass_through() {
        let mut overrider = InputOverrider::new();
        overrider.add_function("Buttons", "A", |v| (v > 0.5).then_some(0.0));
        let dispatch = overrider.get_input_override_function();
        assert_eq!(dispatch("Buttons", "A", 0.2), None);
        assert_eq!(dispatch("Buttons", "A", 0.9), Some(0.0));
    }

    #[test]
    fn test_dispatch_is_a_snapshot() {
        let mut overrider = InputOverrider::new();
        let dispatch = overrider.get_input_override_function();
        overrider.add_function("Buttons", "A", |_| Some(1.0));
        assert_eq!(dispatch("Buttons", "A", 0.0), None);
        assert!(overrider.contains("Buttons", "A"));
    }

    #[test]
    fn test_install_and_uninstall() {
        use crate::group::{ControlGroup, GroupType};

        let mut controller = EmulatedController::new("Pad")
            .with_group(ControlGroup::new("Buttons", GroupType::Buttons).with_input("A"));
        let mut overrider = InputOverrider::new();
        overrider.add_function("Buttons", "A", |_| Some(1.0));

        let installed = install(&mut controller, &overrider);
        assert!(is_installed(&controller, &installed));
        assert!(!is_installed(&controller, &overrider.get_input_override_function()));
        assert_eq!(controller.get_state("Buttons", "A"), 1.0);

        uninstall(&mut controller);
        assert!(!controller.has_input_override());
        assert_eq!(controller.get_state("Buttons", "A"), 0.0);
    }
}
