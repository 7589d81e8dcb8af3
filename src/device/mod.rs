//! Uniform device and control model
//!
//! Any physical or virtual input source is presented as a [`Device`]: a named,
//! ordered set of input and output controls. The [`registry`] maps stable
//! [`DeviceQualifier`]s to live devices while hardware comes and goes.

pub mod control;
pub mod enumeration;
pub mod naming;
pub mod qualifier;
pub mod registry;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{InputError, Result};

pub use control::{ControlKind, ControlState, InputControl, OutputControl};
pub use enumeration::{AxisRange, ControlRecord, ControlRecordKind, DeviceRecord};
pub use naming::{axis_control_name, AxisSource};
pub use qualifier::DeviceQualifier;
pub use registry::DeviceRegistry;

/// Addressable collection of controls
#[derive(Debug)]
pub struct Device {
    source: String,
    name: String,
    preferred_id: Option<i32>,
    sort_priority: i32,
    inputs: Vec<Arc<InputControl>>,
    outputs: Vec<Arc<OutputControl>>,
    connected: AtomicBool,
}

impl Device {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            preferred_id: None,
            sort_priority: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            connected: AtomicBool::new(true),
        }
    }

    /// Index the registry should try first when disambiguating
    pub fn with_preferred_id(mut self, id: i32) -> Self {
        self.preferred_id = Some(id);
        self
    }

    /// Higher priority devices sort first in listings
    pub fn with_sort_priority(mut self, priority: i32) -> Self {
        self.sort_priority = priority;
        self
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn preferred_id(&self) -> Option<i32> {
        self.preferred_id
    }

    pub fn sort_priority(&self) -> i32 {
        self.sort_priority
    }

    fn ensure_unique(&self, name: &str) -> Result<()> {
        let taken = self.inputs.iter().any(|i| i.name() == name)
            || self.outputs.iter().any(|o| o.name() == name);
        if taken {
            return Err(InputError::DuplicateControl {
                device: self.name.clone(),
                control: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn add_input(&mut self, input: InputControl) -> Result<Arc<InputControl>> {
        self.ensure_unique(input.name())?;
        let input = Arc::new(input);
        self.inputs.push(input.clone());
        Ok(input)
    }

    /// Add both halves of a bidirectional axis
    pub fn add_analog_inputs(&mut self, source: AxisSource, axis_id: &str) -> Result<()> {
        self.add_input(InputControl::axis_half(
            axis_control_name(source, axis_id, false),
            false,
        ))?;
        self.add_input(InputControl::axis_half(
            axis_control_name(source, axis_id, true),
            true,
        ))?;
        Ok(())
    }

    pub fn add_output(&mut self, output: OutputControl) -> Result<Arc<OutputControl>> {
        self.ensure_unique(output.name())?;
        let output = Arc::new(output);
        self.outputs.push(output.clone());
        Ok(output)
    }

    pub fn inputs(&self) -> &[Arc<InputControl>] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Arc<OutputControl>] {
        &self.outputs
    }

    pub fn find_input(&self, name: &str) -> Option<&Arc<InputControl>> {
        self.inputs.iter().find(|i| i.name() == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&Arc<OutputControl>> {
        self.outputs.iter().find(|o| o.name() == name)
    }

    /// Deliver a raw value from the host
    ///
    /// `name` is either an exact input name or the base of a split axis, in
    /// which case the signed value goes to both halves. Returns false when
    /// nothing matched.
    pub fn push_input(&self, name: &str, raw: ControlState) -> bool {
        let mut matched = false;
        for input in &self.inputs {
            let hit = input.name() == name
                || (input.is_axis_half()
                    && naming::split_axis_sign(input.name()).is_some_and(|(base, _)| base == name));
            if hit {
                input.push(raw);
                matched = true;
            }
        }
        if !matched {
            trace!("No input '{}' on device {}", name, self.name);
        }
        matched
    }

    /// Refresh the readable value of every input
    ///
    /// Called at most once per tick. A disconnected device latches zeros.
    pub fn update_input(&self) {
        let connected = self.is_connected();
        for input in &self.inputs {
            input.latch(connected);
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}
