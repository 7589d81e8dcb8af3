//! Binding profile persistence
//!
//! A profile is a flat map of plain-text keys:
//!
//! ```yaml
//! Device: XInput/0/Gamepad
//! Buttons/A: "`Button A` | `Gamepad 1+`"
//! Main Stick/Dead Zone: 12.5
//! Extension: 1
//! Extension/Nunchuk/Buttons/C: "`Button C`"
//! ```
//!
//! Attachment sub-controllers are keyed under `"<Group>/<Attachment>/"`.
//! Unknown keys are ignored on load; missing keys restore defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

use crate::controller::{EmulatedController, Group};
use crate::device::DeviceQualifier;

const DEVICE_KEY: &str = "Device";

/// One persisted value
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ProfileValue {
    Number(f64),
    Text(String),
}

impl ProfileValue {
    /// Text form; a bare YAML number used as an expression is a literal
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Flat, ordered key/value profile
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Profile {
    entries: BTreeMap<String, ProfileValue>,
}

impl Profile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ProfileValue> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: ProfileValue) {
        self.entries.insert(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ProfileValue)> {
        self.entries.iter()
    }

    pub fn from_yaml_str(contents: &str) -> crate::error::Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    pub fn to_yaml_string(&self) -> crate::error::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Load a profile from a YAML file
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read profile: {}", path.display()))?;
        let profile = Self::from_yaml_str(&contents)
            .with_context(|| format!("Failed to parse profile: {}", path.display()))?;
        debug!("Profile loaded from {} ({} keys)", path.display(), profile.len());
        Ok(profile)
    }

    /// Save the profile as YAML
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let yaml = self.to_yaml_string().context("Failed to serialize profile")?;
        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write profile: {}", path.display()))?;
        Ok(())
    }
}

impl EmulatedController {
    /// Capture bindings, settings and attachment selections
    pub fn save_profile(&self) -> Profile {
        let mut profile = Profile::new();
        if !self.default_device().is_empty() {
            profile.set(DEVICE_KEY, ProfileValue::Text(self.default_device().to_string()));
        }
        self.save_with_prefix("", &mut profile);
        profile
    }

    fn save_with_prefix(&self, prefix: &str, profile: &mut Profile) {
        for group in self.groups() {
            let base = group.base();
            let group_key = format!("{}{}", prefix, base.name());

            for control in base.controls() {
                let expression = control.reference.expression();
                if !expression.is_empty() {
                    profile.set(
                        format!("{}/{}", group_key, control.name),
                        ProfileValue::Text(expression.to_string()),
                    );
                }
            }
            for setting in base.settings() {
                if setting.value() != setting.default_value() {
                    profile.set(
                        format!("{}/{}", group_key, setting.name()),
                        ProfileValue::Number(setting.value()),
                    );
                }
            }

            if let Group::Attachments(attachments) = group {
                profile.set(
                    group_key.clone(),
                    ProfileValue::Number(attachments.raw_selection() as f64),
                );
                for attachment in attachments.attachments() {
                    let nested = format!("{}/{}/", group_key, attachment.name());
                    attachment.save_with_prefix(&nested, profile);
                }
            }
        }
    }

    /// Apply a profile
    ///
    /// References read as unbound until the next `update_references`.
    pub fn load_profile(&mut self, profile: &Profile) {
        if let Some(value) = profile.get(DEVICE_KEY) {
            match value.as_text().parse::<DeviceQualifier>() {
                Ok(device) => self.set_default_device(device),
                Err(e) => warn!("Ignoring default device in profile: {}", e),
            }
        }
        self.load_with_prefix("", profile);
    }

    fn load_with_prefix(&mut self, prefix: &str, profile: &Profile) {
        self.mark_references_dirty();
        for group in self.groups_mut() {
            let group_key = format!("{}{}", prefix, group.name());
            let base = group.base_mut();

            for control in base.controls_mut() {
                let key = format!("{}/{}", group_key, control.name);
                let text = profile.get(&key).map(ProfileValue::as_text).unwrap_or_default();
                if let Err(e) = control.reference.set_expression(&text) {
                    warn!("Binding for {} did not parse: {}", key, e);
                }
            }
            for setting in base.settings_mut() {
                let key = format!("{}/{}", group_key, setting.name());
                match profile.get(&key).and_then(ProfileValue::as_number) {
                    Some(value) => setting.set_value(value),
                    None => setting.reset(),
                }
            }

            if let Group::Attachments(attachments) = group {
                let selection = profile
                    .get(&group_key)
                    .and_then(ProfileValue::as_number)
                    .map(|n| n as i64)
                    .unwrap_or(0);
                attachments.set_selected_attachment(selection);
                for attachment in attachments.attachments_mut() {
                    let nested = format!("{}/{}/", group_key, attachment.name());
                    attachment.load_with_prefix(&nested, profile);
                }
            }
        }
    }
}
