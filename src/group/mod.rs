//! Control groups
//!
//! A group is one functional unit of a logical controller ("Buttons",
//! "Main Stick") holding an ordered list of named references plus numeric
//! settings.

pub mod attachments;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::device::registry::RegistrySnapshot;
use crate::device::{ControlState, DeviceQualifier};
use crate::reference::ControlReference;

pub use attachments::Attachments;

/// Kind of functional unit a group represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupType {
    #[default]
    Buttons,
    Stick,
    Triggers,
    Slider,
    Force,
    Tilt,
    Cursor,
    Attachments,
    Other,
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Buttons => "Buttons",
            Self::Stick => "Stick",
            Self::Triggers => "Triggers",
            Self::Slider => "Slider",
            Self::Force => "Force",
            Self::Tilt => "Tilt",
            Self::Cursor => "Cursor",
            Self::Attachments => "Attachments",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

/// Reference with the logical name it is persisted under
#[derive(Debug, Clone)]
pub struct NamedControl {
    pub name: String,
    pub reference: ControlReference,
}

/// Named tunable value with a default
#[derive(Debug, Clone, PartialEq)]
pub struct NumericSetting {
    name: String,
    default: f64,
    value: f64,
}

impl NumericSetting {
    pub fn new(name: impl Into<String>, default: f64) -> Self {
        Self {
            name: name.into(),
            default,
            value: default,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn reset(&mut self) {
        self.value = self.default;
    }
}

/// Named set of control references
#[derive(Debug, Clone)]
pub struct ControlGroup {
    name: String,
    group_type: GroupType,
    controls: Vec<NamedControl>,
    settings: Vec<NumericSetting>,
}

impl ControlGroup {
    pub fn new(name: impl Into<String>, group_type: GroupType) -> Self {
        Self {
            name: name.into(),
            group_type,
            controls: Vec::new(),
            settings: Vec::new(),
        }
    }

    /// Builder: append an input reference
    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.add_control(name, ControlReference::input());
        self
    }

    /// Builder: append an output reference
    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.add_control(name, ControlReference::output());
        self
    }

    pub fn with_setting(mut self, name: impl Into<String>, default: f64) -> Self {
        self.settings.push(NumericSetting::new(name, default));
        self
    }

    pub fn add_control(&mut self, name: impl Into<String>, reference: ControlReference) {
        self.controls.push(NamedControl {
            name: name.into(),
            reference,
        });
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    pub fn controls(&self) -> &[NamedControl] {
        &self.controls
    }

    pub fn controls_mut(&mut self) -> &mut [NamedControl] {
        &mut self.controls
    }

    pub fn control_index(&self, name: &str) -> Option<usize> {
        self.controls.iter().position(|c| c.name == name)
    }

    pub fn control(&self, name: &str) -> Option<&ControlReference> {
        self.controls.iter().find(|c| c.name == name).map(|c| &c.reference)
    }

    pub fn control_mut(&mut self, name: &str) -> Option<&mut ControlReference> {
        self.controls
            .iter_mut()
            .find(|c| c.name == name)
            .map(|c| &mut c.reference)
    }

    pub fn settings(&self) -> &[NumericSetting] {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut [NumericSetting] {
        &mut self.settings
    }

    pub fn setting(&self, name: &str) -> Option<&NumericSetting> {
        self.settings.iter().find(|s| s.name == name)
    }

    pub fn setting_mut(&mut self, name: &str) -> Option<&mut NumericSetting> {
        self.settings.iter_mut().find(|s| s.name == name)
    }

    /// Natural value of one control, before any override
    pub fn natural_state(&self, name: &str) -> Option<ControlState> {
        self.control(name).map(ControlReference::state)
    }

    pub fn update_references(&mut self, snapshot: &RegistrySnapshot, default_device: &DeviceQualifier) {
        for control in &mut self.controls {
            control.reference.update_reference(snapshot, default_device);
        }
    }
}
