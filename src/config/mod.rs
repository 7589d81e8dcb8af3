//! Configuration management
//!
//! Handles loading, parsing and validation of the YAML configuration: the
//! simulation rate, the virtual devices to publish, the controller layouts
//! and the optional bindings profile.

pub mod watcher;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::fs;

use crate::device::{DeviceQualifier, DeviceRecord};
use crate::group::GroupType;

pub use watcher::ConfigWatcher;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Devices published at start, in enumeration order
    #[serde(default)]
    pub devices: Vec<DeviceRecord>,
    pub controllers: Vec<LayoutConfig>,
    /// Bindings profile applied to the first controller
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Simulation loop configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tick_rate")]
    pub tick_rate_hz: u32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: default_tick_rate(),
        }
    }
}

/// Layout of one emulated controller
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LayoutConfig {
    pub name: String,
    /// Qualifier string, e.g. `XInput/0/Gamepad`
    #[serde(default)]
    pub default_device: String,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<AttachmentsConfig>,
}

/// One control group of a layout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GroupConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub group_type: GroupType,
    /// Input control names, in order
    #[serde(default)]
    pub controls: Vec<String>,
    /// Output control names (rumble motors)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub settings: Vec<SettingConfig>,
}

/// Numeric setting with its default
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SettingConfig {
    pub name: String,
    #[serde(default)]
    pub default: f64,
}

/// Attachment group: alternative sub-controller layouts
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AttachmentsConfig {
    pub name: String,
    pub options: Vec<LayoutConfig>,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, path: &str) -> Result<()> {
        let yaml = serde_yaml::to_string(self).context("Failed to serialize config to YAML")?;

        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write config file: {}", path))?;

        Ok(())
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.simulation.tick_rate_hz == 0 || self.simulation.tick_rate_hz > 1000 {
            anyhow::bail!(
                "simulation.tick_rate_hz {} is invalid (must be 1-1000)",
                self.simulation.tick_rate_hz
            );
        }

        for (idx, device) in self.devices.iter().enumerate() {
            if device.source.is_empty() || device.name.is_empty() {
                anyhow::bail!("Device {} needs both a source and a name", idx);
            }
            let mut names = HashSet::new();
            for control in &device.controls {
                if !names.insert(control.name.as_str()) {
                    anyhow::bail!(
                        "Device '{}' declares control '{}' twice",
                        device.name,
                        control.name
                    );
                }
            }
        }

        if self.controllers.is_empty() {
            anyhow::bail!("At least one controller must be defined");
        }

        let mut names = HashSet::new();
        for layout in &self.controllers {
            if !names.insert(layout.name.as_str()) {
                anyhow::bail!("Controller '{}' is defined twice", layout.name);
            }
            Self::validate_layout(layout)
                .with_context(|| format!("Invalid controller '{}'", layout.name))?;
        }

        Ok(())
    }

    /// Validate one layout and its attachment options
    fn validate_layout(layout: &LayoutConfig) -> Result<()> {
        if layout.name.is_empty() {
            anyhow::bail!("Controller name cannot be empty");
        }
        if !layout.default_device.is_empty() {
            layout
                .default_device
                .parse::<DeviceQualifier>()
                .with_context(|| format!("Invalid default_device '{}'", layout.default_device))?;
        }

        let mut groups = HashSet::new();
        for group in &layout.groups {
            if group.name.is_empty() {
                anyhow::bail!("Group name cannot be empty");
            }
            if !groups.insert(group.name.as_str()) {
                anyhow::bail!("Group '{}' is defined twice", group.name);
            }
            let mut controls = HashSet::new();
            for control in group.controls.iter().chain(&group.outputs) {
                if !controls.insert(control.as_str()) {
                    anyhow::bail!("Control '{}' appears twice in group '{}'", control, group.name);
                }
            }
        }

        if let Some(attachments) = &layout.attachments {
            if !groups.insert(attachments.name.as_str()) {
                anyhow::bail!("Attachments '{}' clash with a group name", attachments.name);
            }
            if attachments.options.is_empty() {
                anyhow::bail!("Attachments '{}' need at least one option", attachments.name);
            }
            for option in &attachments.options {
                Self::validate_layout(option)
                    .with_context(|| format!("Invalid attachment '{}'", option.name))?;
            }
        }

        Ok(())
    }
}

// Default value functions
fn default_tick_rate() -> u32 { 60 }

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
simulation:
  tick_rate_hz: 120
devices:
  - source: Android
    name: Gamepad
    raw_id: 3
    controls:
      - { name: "Button A", kind: button }
      - { name: "0", kind: axis, source: gamepad }
controllers:
  - name: Wiimote
    default_device: Android/0/Gamepad
    groups:
      - name: Buttons
        type: buttons
        controls: [A, B]
      - name: Rumble
        type: other
        outputs: [Motor]
      - name: Tilt
        type: tilt
        controls: [Forward, Backward]
        settings:
          - { name: Dead Zone, default: 10 }
    attachments:
      name: Extension
      options:
        - name: None
        - name: Nunchuk
          groups:
            - name: Buttons
              controls: [C, Z]
"#;

    #[test]
    fn test_parse_sample() {
        let config: AppConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();
        assert_eq!(config.simulation.tick_rate_hz, 120);
        assert_eq!(config.devices[0].raw_id, Some(3));
        let layout = &config.controllers[0];
        assert_eq!(layout.groups[2].group_type, GroupType::Tilt);
        assert_eq!(layout.groups[2].settings[0].default, 10.0);
        assert_eq!(layout.attachments.as_ref().unwrap().options.len(), 2);
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = serde_yaml::from_str("controllers:\n  - name: Pad\n").unwrap();
        config.validate().unwrap();
        assert_eq!(config.simulation.tick_rate_hz, 60);
        assert!(config.devices.is_empty());
        assert!(config.profile.is_none());
    }

    #[test]
    fn test_rejects_bad_layouts() {
        let cases = [
            "controllers: []\n",
            "simulation: { tick_rate_hz: 0 }\ncontrollers:\n  - name: Pad\n",
            "controllers:\n  - name: Pad\n  - name: Pad\n",
            "controllers:\n  - name: Pad\n    default_device: nonsense\n",
            "controllers:\n  - name: Pad\n    groups:\n      - { name: B, controls: [A, A] }\n",
            "controllers:\n  - name: Pad\n    attachments: { name: Ext, options: [] }\n",
        ];
        for yaml in cases {
            let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
            assert!(config.validate().is_err(), "accepted: {}", yaml);
        }
    }

    #[tokio::test]
    async fn test_load_and_save() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let path = path.to_string_lossy().to_string();

        let config = AppConfig::load(&path).await.unwrap();
        config.save(&path).await.unwrap();
        let again = AppConfig::load(&path).await.unwrap();
        assert_eq!(again.controllers[0].name, "Wiimote");
        assert_eq!(again.devices[0].controls.len(), 2);
    }
}
