//! Named scalar controls owned by a device
//!
//! Inputs keep two atomic cells: `pending`, written whenever the host delivers
//! an event, and `state`, latched once per tick by `Device::update_input`.
//! Reads on the simulation thread are a single relaxed load.

use std::sync::atomic::{AtomicU64, Ordering};

/// Scalar value carried by every control
pub type ControlState = f64;

/// Direction of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Input,
    Output,
}

/// `f64` stored as raw bits in an `AtomicU64`
#[derive(Debug, Default)]
struct AtomicState(AtomicU64);

impl AtomicState {
    fn new(value: ControlState) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> ControlState {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    fn store(&self, value: ControlState) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// A readable control
#[derive(Debug)]
pub struct InputControl {
    name: String,
    /// `Some(negative)` for one half of a split axis
    axis_half: Option<bool>,
    pending: AtomicState,
    state: AtomicState,
}

impl InputControl {
    /// Create a plain input (button, key, one-sided axis)
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            axis_half: None,
            pending: AtomicState::new(0.0),
            state: AtomicState::new(0.0),
        }
    }

    /// Create one half of a split axis
    pub fn axis_half(name: impl Into<String>, negative: bool) -> Self {
        Self {
            axis_half: Some(negative),
            ..Self::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_axis_half(&self) -> bool {
        self.axis_half.is_some()
    }

    /// Latched value for this tick
    ///
    /// Never blocks and never allocates.
    pub fn get_state(&self) -> ControlState {
        self.state.load()
    }

    /// Record a raw value delivered by the host
    ///
    /// Axis halves receive the signed raw value and keep only their own side.
    pub(crate) fn push(&self, raw: ControlState) {
        let value = match self.axis_half {
            Some(true) => (-raw).max(0.0),
            Some(false) => raw.max(0.0),
            None => raw,
        };
        self.pending.store(value);
    }

    /// Copy the pending value into the readable state
    pub(crate) fn latch(&self, connected: bool) {
        let value = if connected { self.pending.load() } else { 0.0 };
        self.state.store(value);
    }
}

/// A writable control (rumble motor, LED)
#[derive(Debug)]
pub struct OutputControl {
    name: String,
    state: AtomicState,
}

impl OutputControl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: AtomicState::new(0.0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fire-and-forget write
    pub fn set_state(&self, value: ControlState) {
        self.state.store(value);
    }

    /// Last value written
    pub fn last_state(&self) -> ControlState {
        self.state.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_reads_latched_value_only() {
        let input = InputControl::new("Button A");
        input.push(1.0);
        assert_eq!(input.get_state(), 0.0);

        input.latch(true);
        assert_eq!(input.get_state(), 1.0);
    }

    #[test]
    fn test_split_axis_halves_are_unidirectional() {
        let pos = InputControl::axis_half("Axis 0+", false);
        let neg = InputControl::axis_half("Axis 0-", true);

        for half in [&pos, &neg] {
            half.push(-0.75);
            half.latch(true);
        }
        assert_eq!(pos.get_state(), 0.0);
        assert_eq!(neg.get_state(), 0.75);

        for half in [&pos, &neg] {
            half.push(0.5);
            half.latch(true);
        }
        assert_eq!(pos.get_state(), 0.5);
        assert_eq!(neg.get_state(), 0.0);
    }

    #[test]
    fn test_disconnected_latch_reads_zero() {
        let input = InputControl::new("Trigger");
        input.push(0.8);
        input.latch(false);
        assert_eq!(input.get_state(), 0.0);
    }

    #[test]
    fn test_output_stores_last_write() {
        let motor = OutputControl::new("Motor 0");
        motor.set_state(0.6);
        assert_eq!(motor.last_state(), 0.6);
    }
}
