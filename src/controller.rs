//! Emulated controllers
//!
//! An [`EmulatedController`] is what the simulation loop actually reads each
//! tick. It owns an ordered list of groups; attachment groups own whole
//! sub-controllers, each with its own override slot.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::config::LayoutConfig;
use crate::device::registry::RegistrySnapshot;
use crate::device::{ControlState, DeviceQualifier, DeviceRegistry};
use crate::error::{InputError, Result};
use crate::group::{Attachments, ControlGroup};

/// Dispatch closure consulted on every read: `(group, control, natural) -> override`
///
/// Runs on the simulation thread while a tick is in progress. It must be
/// cheap and must not block.
pub type InputOverrideFunction =
    Arc<dyn Fn(&str, &str, ControlState) -> Option<ControlState> + Send + Sync>;

/// One group of an emulated controller
#[derive(Debug)]
pub enum Group {
    Plain(ControlGroup),
    Attachments(Attachments),
}

impl Group {
    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn base(&self) -> &ControlGroup {
        match self {
            Self::Plain(group) => group,
            Self::Attachments(attachments) => attachments.base(),
        }
    }

    pub fn base_mut(&mut self) -> &mut ControlGroup {
        match self {
            Self::Plain(group) => group,
            Self::Attachments(attachments) => attachments.base_mut(),
        }
    }

    pub fn as_attachments(&self) -> Option<&Attachments> {
        match self {
            Self::Attachments(attachments) => Some(attachments),
            Self::Plain(_) => None,
        }
    }

    pub fn as_attachments_mut(&mut self) -> Option<&mut Attachments> {
        match self {
            Self::Attachments(attachments) => Some(attachments),
            Self::Plain(_) => None,
        }
    }
}

impl From<ControlGroup> for Group {
    fn from(group: ControlGroup) -> Self {
        Self::Plain(group)
    }
}

impl From<Attachments> for Group {
    fn from(attachments: Attachments) -> Self {
        Self::Attachments(attachments)
    }
}

/// One value read during a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControlValue {
    /// Group path; attachment groups appear as `"<Group>/<Attachment>/<Group>"`
    pub group: String,
    pub control: String,
    pub value: ControlState,
}

/// Logical controller read by the simulation loop
pub struct EmulatedController {
    name: String,
    default_device: DeviceQualifier,
    groups: Vec<Group>,
    input_override: Option<InputOverrideFunction>,
    /// Set by edits that leave references unresolved until the next tick
    references_dirty: bool,
}

impl fmt::Debug for EmulatedController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedController")
            .field("name", &self.name)
            .field("default_device", &self.default_device)
            .field("groups", &self.groups)
            .field("input_override", &self.input_override.is_some())
            .field("references_dirty", &self.references_dirty)
            .finish()
    }
}

impl EmulatedController {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default_device: DeviceQualifier::default(),
            groups: Vec::new(),
            input_override: None,
            references_dirty: false,
        }
    }

    pub fn with_group(mut self, group: impl Into<Group>) -> Self {
        self.add_group(group);
        self
    }

    /// Append a group; attachments inherit the current default device
    pub fn add_group(&mut self, group: impl Into<Group>) {
        let mut group = group.into();
        if let Group::Attachments(attachments) = &mut group {
            if !self.default_device.is_empty() {
                for attachment in attachments.attachments_mut() {
                    attachment.set_default_device(self.default_device.clone());
                }
            }
        }
        self.groups.push(group);
        self.references_dirty = true;
    }

    /// Build a controller from a configured layout
    pub fn from_layout(layout: &LayoutConfig) -> Result<Self> {
        let mut controller = Self::new(&layout.name);

        for group_cfg in &layout.groups {
            let mut group = ControlGroup::new(&group_cfg.name, group_cfg.group_type);
            for name in &group_cfg.controls {
                group = group.with_input(name);
            }
            for name in &group_cfg.outputs {
                group = group.with_output(name);
            }
            for setting in &group_cfg.settings {
                group = group.with_setting(&setting.name, setting.default);
            }
            controller.add_group(group);
        }

        if let Some(attachments_cfg) = &layout.attachments {
            let mut attachments = Attachments::new(&attachments_cfg.name);
            for option in &attachments_cfg.options {
                attachments.add_attachment(Self::from_layout(option)?);
            }
            controller.add_group(attachments);
        }

        if !layout.default_device.is_empty() {
            controller.set_default_device(layout.default_device.parse()?);
        }

        debug!(
            "Built controller '{}' with {} groups",
            controller.name,
            controller.groups.len()
        );
        Ok(controller)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_device(&self) -> &DeviceQualifier {
        &self.default_device
    }

    /// Set the device unqualified terms resolve against, attachments included
    pub fn set_default_device(&mut self, device: DeviceQualifier) {
        for group in &mut self.groups {
            if let Group::Attachments(attachments) = group {
                for attachment in attachments.attachments_mut() {
                    attachment.set_default_device(device.clone());
                }
            }
        }
        self.default_device = device;
        self.references_dirty = true;
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [Group] {
        &mut self.groups
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name() == name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.name() == name)
    }

    pub fn attachments(&self, name: &str) -> Option<&Attachments> {
        self.group(name).and_then(Group::as_attachments)
    }

    pub fn attachments_mut(&mut self, name: &str) -> Option<&mut Attachments> {
        self.group_mut(name).and_then(Group::as_attachments_mut)
    }

    /// Install the override dispatch, replacing any previous one
    pub fn set_input_override_function(&mut self, function: InputOverrideFunction) {
        if self.input_override.is_some() {
            debug!("Replacing input override on '{}'", self.name);
        }
        self.input_override = Some(function);
    }

    pub fn clear_input_override_function(&mut self) {
        self.input_override = None;
    }

    pub fn has_input_override(&self) -> bool {
        self.input_override.is_some()
    }

    /// Dispatch currently installed, if any
    pub fn input_override_function(&self) -> Option<&InputOverrideFunction> {
        self.input_override.as_ref()
    }

    /// Final value of one input control
    ///
    /// The active override (if any) sees the natural value and may replace
    /// it. Unknown names read as `0.0` and never reach the override.
    pub fn get_state(&self, group: &str, control: &str) -> ControlState {
        let Some(natural) = self
            .group(group)
            .and_then(|g| g.base().control(control))
            .filter(|r| r.is_input())
            .map(|r| r.state())
        else {
            trace!("No input {}/{} on '{}'", group, control, self.name);
            return 0.0;
        };
        self.apply_override(group, control, natural)
    }

    fn apply_override(&self, group: &str, control: &str, natural: ControlState) -> ControlState {
        match &self.input_override {
            Some(function) => function(group, control, natural).unwrap_or(natural),
            None => natural,
        }
    }

    /// Final values of every input in a group, in declaration order
    pub fn get_group_states(&self, group: &str) -> Vec<(String, ControlState)> {
        let Some(found) = self.group(group) else {
            return Vec::new();
        };
        found
            .base()
            .controls()
            .iter()
            .filter(|c| c.reference.is_input())
            .map(|c| {
                let value = self.apply_override(group, &c.name, c.reference.state());
                (c.name.clone(), value)
            })
            .collect()
    }

    /// Write an output control; returns false when it does not exist
    pub fn set_output(&self, group: &str, control: &str, value: ControlState) -> bool {
        match self
            .group(group)
            .and_then(|g| g.base().control(control))
            .filter(|r| !r.is_input())
        {
            Some(reference) => {
                reference.set_state(value);
                true
            },
            None => false,
        }
    }

    /// Edit a binding expression
    ///
    /// Takes effect on the next [`update_references`](Self::update_references).
    pub fn set_expression(&mut self, group: &str, control: &str, text: &str) -> Result<()> {
        let found = self
            .group_mut(group)
            .ok_or_else(|| InputError::UnknownGroup(group.to_string()))?;
        let reference = found
            .base_mut()
            .control_mut(control)
            .ok_or_else(|| InputError::UnknownControl {
                group: group.to_string(),
                control: control.to_string(),
            })?;
        let result = reference.set_expression(text);
        self.references_dirty = true;
        result
    }

    pub fn set_setting(&mut self, group: &str, setting: &str, value: f64) -> Result<()> {
        let found = self
            .group_mut(group)
            .ok_or_else(|| InputError::UnknownGroup(group.to_string()))?;
        let numeric = found
            .base_mut()
            .setting_mut(setting)
            .ok_or_else(|| InputError::UnknownSetting {
                group: group.to_string(),
                setting: setting.to_string(),
            })?;
        numeric.set_value(value);
        Ok(())
    }

    /// Re-resolve every reference, including unselected attachments
    pub fn update_references(&mut self, registry: &DeviceRegistry) {
        let snapshot = registry.snapshot();
        self.update_references_from(&snapshot);
    }

    /// Whether an edit since the last [`update_references`](Self::update_references)
    /// left this controller or any attachment unresolved
    pub fn needs_reference_update(&self) -> bool {
        self.references_dirty
            || self.groups.iter().any(|group| {
                group
                    .as_attachments()
                    .is_some_and(|a| a.attachments().iter().any(Self::needs_reference_update))
            })
    }

    pub(crate) fn mark_references_dirty(&mut self) {
        self.references_dirty = true;
    }

    pub(crate) fn update_references_from(&mut self, snapshot: &RegistrySnapshot) {
        self.references_dirty = false;
        for group in &mut self.groups {
            match group {
                Group::Plain(plain) => plain.update_references(snapshot, &self.default_device),
                Group::Attachments(attachments) => {
                    attachments
                        .base_mut()
                        .update_references(snapshot, &self.default_device);
                    attachments.update_references(snapshot);
                },
            }
        }
    }

    /// Read every input through the override path
    ///
    /// Only the selected attachment of each attachment group is read.
    pub fn collect_states(&self, out: &mut Vec<ControlValue>) {
        self.collect_with_prefix("", out);
    }

    fn collect_with_prefix(&self, prefix: &str, out: &mut Vec<ControlValue>) {
        for group in &self.groups {
            for (control, value) in self.get_group_states(group.name()) {
                out.push(ControlValue {
                    group: format!("{}{}", prefix, group.name()),
                    control,
                    value,
                });
            }
            if let Some(selected) = group.as_attachments().and_then(Attachments::selected) {
                let nested = format!("{}{}/{}/", prefix, group.name(), selected.name());
                selected.collect_with_prefix(&nested, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, InputControl};
    use crate::group::GroupType;

    fn setup() -> (DeviceRegistry, EmulatedController) {
        let registry = DeviceRegistry::new();
        let mut device = Device::new("Virtual", "Pad");
        device.add_input(InputControl::new("Button A")).unwrap();
        device.add_input(InputControl::new("Button B")).unwrap();
        device.add_input(InputControl::new("C")).unwrap();
        let q = registry.add_device(device);

        let device = registry.find_device(&q).unwrap();
        device.push_input("Button A", 1.0);
        device.push_input("Button B", 0.25);
        device.push_input("C", 0.75);
        device.update_input();

        let buttons = ControlGroup::new("Buttons", GroupType::Buttons)
            .with_input("A")
            .with_input("B");
        let nunchuk = EmulatedController::new("Nunchuk")
            .with_group(ControlGroup::new("Buttons", GroupType::Buttons).with_input("C"));
        let extension = Attachments::new("Extension")
            .with_attachment(EmulatedController::new("None"))
            .with_attachment(nunchuk);

        let mut controller = EmulatedController::new("Wiimote")
            .with_group(buttons)
            .with_group(extension);
        controller.set_default_device(q);
        controller.set_expression("Buttons", "A", "`Button A`").unwrap();
        controller.set_expression("Buttons", "B", "`Button B`").unwrap();
        controller
            .attachments_mut("Extension")
            .unwrap()
            .find_attachment_mut("Nunchuk")
            .unwrap()
            .set_expression("Buttons", "C", "C")
            .unwrap();
        controller.update_references(&registry);
        (registry, controller)
    }

    #[test]
    fn test_pass_through_without_override() {
        let (_registry, controller) = setup();
        assert_eq!(controller.get_state("Buttons", "A"), 1.0);
        assert_eq!(controller.get_state("Buttons", "B"), 0.25);
        assert_eq!(controller.get_state("Buttons", "Z"), 0.0);
        assert_eq!(controller.get_state("Nope", "A"), 0.0);
    }

    #[test]
    fn test_override_affects_only_its_pair() {
        let (_registry, mut controller) = setup();
        controller.set_input_override_function(Arc::new(|group: &str, control: &str, _natural: f64| {
            (group == "Buttons" && control == "A").then_some(0.0)
        }));
        assert_eq!(controller.get_state("Buttons", "A"), 0.0);
        assert_eq!(controller.get_state("Buttons", "B"), 0.25);

        controller.clear_input_override_function();
        assert_eq!(controller.get_state("Buttons", "A"), 1.0);
    }

    #[test]
    fn test_override_replaces_not_stacks() {
        let (_registry, mut controller) = setup();
        controller.set_input_override_function(Arc::new(|_: &str, _: &str, v: f64| Some(v + 1.0)));
        controller.set_input_override_function(Arc::new(|_: &str, _: &str, v: f64| Some(v * 2.0)));
        assert_eq!(controller.get_state("Buttons", "B"), 0.5);
    }

    #[test]
    fn test_attachment_defaults_and_collect() {
        let (_registry, mut controller) = setup();
        let mut out = Vec::new();
        controller.collect_states(&mut out);
        assert_eq!(out.len(), 2);

        controller
            .attachments_mut("Extension")
            .unwrap()
            .set_selected_attachment(1);
        out.clear();
        controller.collect_states(&mut out);
        let nested = out
            .iter()
            .find(|v| v.group == "Extension/Nunchuk/Buttons")
            .unwrap();
        assert_eq!(nested.control, "C");
        assert_eq!(nested.value, 0.75);
    }

    #[test]
    fn test_parent_override_does_not_reach_attachment() {
        let (_registry, mut controller) = setup();
        controller.set_input_override_function(Arc::new(|_: &str, _: &str, _: f64| Some(0.0)));
        let attachments = controller.attachments_mut("Extension").unwrap();
        attachments.set_selected_attachment(1);
        let nunchuk = attachments.selected().unwrap();
        assert_eq!(nunchuk.get_state("Buttons", "C"), 0.75);
    }

    #[test]
    fn test_edit_errors() {
        let (_registry, mut controller) = setup();
        assert!(matches!(
            controller.set_expression("Nope", "A", "x"),
            Err(InputError::UnknownGroup(_))
        ));
        assert!(matches!(
            controller.set_expression("Buttons", "Z", "x"),
            Err(InputError::UnknownControl { .. })
        ));
        assert!(matches!(
            controller.set_setting("Buttons", "Dead Zone", 1.0),
            Err(InputError::UnknownSetting { .. })
        ));
    }

    #[test]
    fn test_attachments_added_later_inherit_default_device() {
        let (registry, _) = setup();
        let q = registry.snapshot().devices().next().unwrap().0.clone();

        let mut controller = EmulatedController::new("Wiimote");
        controller.set_default_device(q.clone());
        let nunchuk = EmulatedController::new("Nunchuk")
            .with_group(ControlGroup::new("Buttons", GroupType::Buttons).with_input("C"));
        controller.add_group(Attachments::new("Extension").with_attachment(nunchuk));

        let attachments = controller.attachments_mut("Extension").unwrap();
        assert_eq!(attachments.selected().unwrap().default_device(), &q);
        attachments
            .selected_mut()
            .unwrap()
            .set_expression("Buttons", "C", "C")
            .unwrap();
        controller.update_references(&registry);

        let nunchuk = controller.attachments("Extension").unwrap().selected().unwrap();
        assert_eq!(nunchuk.get_state("Buttons", "C"), 0.75);
    }

    #[test]
    fn test_nested_edit_marks_controller_dirty() {
        let (registry, mut controller) = setup();
        assert!(!controller.needs_reference_update());

        controller
            .attachments_mut("Extension")
            .unwrap()
            .find_attachment_mut("Nunchuk")
            .unwrap()
            .set_expression("Buttons", "C", "`Button A`")
            .unwrap();
        assert!(controller.needs_reference_update());

        controller.update_references(&registry);
        assert!(!controller.needs_reference_update());
    }
}
