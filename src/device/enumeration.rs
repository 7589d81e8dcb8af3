//! Device enumeration records
//!
//! The host hands over an ordered list of device records on every refresh.
//! Each record is turned into a [`Device`], splitting bidirectional axes into
//! two named halves.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::control::{InputControl, OutputControl};
use super::naming::{axis_control_name, AxisSource};
use super::Device;
use crate::error::Result;

/// One device as reported by the host
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DeviceRecord {
    pub source: String,
    pub name: String,
    /// Host-assigned id; not stable across refreshes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_id: Option<i64>,
    /// Index the device would like to keep (controller number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_id: Option<i32>,
    #[serde(default)]
    pub sort_priority: i32,
    #[serde(default)]
    pub controls: Vec<ControlRecord>,
}

/// One control as reported by the host
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ControlRecord {
    /// Plain name, or the axis id for axes
    pub name: String,
    pub kind: ControlRecordKind,
    /// Axis source category (axes only)
    #[serde(default = "default_axis_source")]
    pub source: String,
    #[serde(default)]
    pub range: AxisRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlRecordKind {
    Button,
    Axis,
    Output,
}

/// Reported value range of an axis
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl Default for AxisRange {
    fn default() -> Self {
        Self { min: -1.0, max: 1.0 }
    }
}

fn default_axis_source() -> String {
    "joystick".to_string()
}

impl DeviceRecord {
    /// Build a live device from this record
    pub fn build(&self) -> Result<Device> {
        let mut device = Device::new(&self.source, &self.name).with_sort_priority(self.sort_priority);
        if let Some(id) = self.preferred_id {
            device = device.with_preferred_id(id);
        }

        for control in &self.controls {
            match control.kind {
                ControlRecordKind::Button => {
                    device.add_input(InputControl::new(&control.name))?;
                },
                ControlRecordKind::Output => {
                    device.add_output(OutputControl::new(&control.name))?;
                },
                ControlRecordKind::Axis => {
                    let source = AxisSource::parse(&control.source).unwrap_or_else(|| {
                        warn!(
                            "Unknown axis source '{}' on {}, using joystick",
                            control.source, self.name
                        );
                        AxisSource::Joystick
                    });
                    add_axis(&mut device, source, &control.name, control.range)?;
                },
            }
        }

        debug!(
            "Built device {}/{} with {} inputs, {} outputs",
            self.source,
            self.name,
            device.inputs().len(),
            device.outputs().len()
        );
        Ok(device)
    }
}

/// Add the halves of an axis that its range can actually reach
fn add_axis(device: &mut Device, source: AxisSource, axis_id: &str, range: AxisRange) -> Result<()> {
    let positive = range.max > 0.0;
    let negative = range.min < 0.0;

    match (positive, negative) {
        (true, true) => device.add_analog_inputs(source, axis_id),
        (true, false) => device
            .add_input(InputControl::axis_half(axis_control_name(source, axis_id, false), false))
            .map(|_| ()),
        (false, true) => device
            .add_input(InputControl::axis_half(axis_control_name(source, axis_id, true), true))
            .map(|_| ()),
        (false, false) => {
            debug!("Skipping axis {} with empty range on {}", axis_id, device.name());
            Ok(())
        },
    }
}
