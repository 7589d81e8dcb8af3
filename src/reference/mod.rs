//! Control references
//!
//! A [`ControlReference`] binds one logical control slot to zero or more
//! physical controls through a persisted expression string. The expression is
//! kept verbatim for persistence; the resolved form is rebuilt by
//! [`ControlReference::update_reference`] whenever the registry changes.

pub mod expression;

use tracing::debug;

use crate::device::registry::RegistrySnapshot;
use crate::device::{ControlKind, ControlState, DeviceQualifier};
use crate::error::Result;

pub use expression::{BinaryOp, BoundExpression, Expr, ExpressionParser, SimpleExpressionParser};

/// Binding from a logical control to physical controls
#[derive(Debug, Clone)]
pub struct ControlReference {
    kind: ControlKind,
    expression: String,
    parsed: Option<Expr>,
    bound: Option<BoundExpression>,
    /// Multiplier applied to reads and writes
    pub range: ControlState,
}

impl ControlReference {
    pub fn input() -> Self {
        Self::new(ControlKind::Input)
    }

    pub fn output() -> Self {
        Self::new(ControlKind::Output)
    }

    fn new(kind: ControlKind) -> Self {
        Self {
            kind,
            expression: String::new(),
            parsed: None,
            bound: None,
            range: 1.0,
        }
    }

    pub fn kind(&self) -> ControlKind {
        self.kind
    }

    pub fn is_input(&self) -> bool {
        self.kind == ControlKind::Input
    }

    /// Expression text exactly as it will be persisted
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Replace the expression using the built-in parser
    pub fn set_expression(&mut self, text: &str) -> Result<()> {
        self.set_expression_with(&SimpleExpressionParser, text)
    }

    /// Replace the expression
    ///
    /// The text is stored even when it fails to parse, so a profile written
    /// by a richer parser survives a save. The reference reads as unbound
    /// until the next [`update_reference`](Self::update_reference).
    pub fn set_expression_with(&mut self, parser: &dyn ExpressionParser, text: &str) -> Result<()> {
        self.expression = text.to_string();
        self.bound = None;
        match parser.parse(text) {
            Ok(parsed) => {
                self.parsed = parsed;
                Ok(())
            },
            Err(e) => {
                debug!("Binding '{}' left unbound: {}", text, e);
                self.parsed = None;
                Err(e)
            },
        }
    }

    /// Resolve the expression against the current devices
    ///
    /// Idempotent. Only weak handles are kept, so a device removed later
    /// reads as neutral rather than being kept alive.
    pub fn update_reference(&mut self, snapshot: &RegistrySnapshot, default_device: &DeviceQualifier) {
        self.bound = self
            .parsed
            .as_ref()
            .map(|expr| BoundExpression::bind(expr, snapshot, default_device, self.kind));
    }

    /// Scaled value of the bound controls; `0.0` when unbound
    pub fn state(&self) -> ControlState {
        match &self.bound {
            Some(bound) if self.is_input() => bound.value() * self.range,
            _ => 0.0,
        }
    }

    /// Forward a scaled value to every bound output
    pub fn set_state(&self, value: ControlState) {
        if self.kind != ControlKind::Output {
            return;
        }
        if let Some(bound) = &self.bound {
            bound.set_value(value * self.range);
        }
    }

    /// How many control terms resolved to live controls
    pub fn bound_count(&self) -> usize {
        self.bound.as_ref().map(BoundExpression::bound_count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{AxisSource, Device, DeviceRegistry, InputControl, OutputControl};

    fn registry() -> (DeviceRegistry, DeviceQualifier) {
        let registry = DeviceRegistry::new();
        let mut device = Device::new("Virtual", "Pad");
        device.add_input(InputControl::new("Button A")).unwrap();
        device.add_input(InputControl::new("Button B")).unwrap();
        device.add_analog_inputs(AxisSource::Gamepad, "1").unwrap();
        device.add_output(OutputControl::new("Motor 0")).unwrap();
        let q = registry.add_device(device);
        (registry, q)
    }

    #[test]
    fn test_unbound_reads_zero() {
        let reference = ControlReference::input();
        assert_eq!(reference.state(), 0.0);
        assert_eq!(reference.bound_count(), 0);
    }

    #[test]
    fn test_resolves_against_default_device() {
        let (registry, q) = registry();
        let device = registry.find_device(&q).unwrap();
        device.push_input("Button B", 1.0);
        device.push_input("Gamepad 1", -0.5);
        device.update_input();

        let mut reference = ControlReference::input();
        reference.set_expression("`Button A` | `Button B`").unwrap();
        reference.update_reference(&registry.snapshot(), &q);
        assert_eq!(reference.bound_count(), 2);
        assert_eq!(reference.state(), 1.0);

        reference.set_expression("`Gamepad 1-`").unwrap();
        reference.update_reference(&registry.snapshot(), &q);
        reference.range = 2.0;
        assert_eq!(reference.state(), 1.0);
    }

    #[test]
    fn test_removed_device_reads_neutral() {
        let (registry, q) = registry();
        let device = registry.find_device(&q).unwrap();
        device.push_input("Button A", 1.0);
        device.update_input();

        let mut reference = ControlReference::input();
        reference.set_expression("`Button A`").unwrap();
        reference.update_reference(&registry.snapshot(), &q);
        assert_eq!(reference.state(), 1.0);

        drop(device);
        registry.remove_device(&q);
        assert_eq!(reference.state(), 0.0);

        // Re-resolving after removal finds nothing and keeps nothing
        reference.update_reference(&registry.snapshot(), &q);
        assert_eq!(reference.bound_count(), 0);
    }

    #[test]
    fn test_parse_error_keeps_text_unbound() {
        let (registry, q) = registry();
        let mut reference = ControlReference::input();
        assert!(reference.set_expression("`Button A` |").is_err());
        assert_eq!(reference.expression(), "`Button A` |");
        reference.update_reference(&registry.snapshot(), &q);
        assert_eq!(reference.bound_count(), 0);
        assert_eq!(reference.state(), 0.0);
    }

    #[test]
    fn test_output_forwards_writes() {
        let (registry, q) = registry();
        let mut reference = ControlReference::output();
        reference.set_expression("`Motor 0`").unwrap();
        reference.update_reference(&registry.snapshot(), &q);
        reference.range = 0.5;
        reference.set_state(0.8);

        let device = registry.find_device(&q).unwrap();
        assert_eq!(device.find_output("Motor 0").unwrap().last_state(), 0.4);
        // Outputs are never readable through the reference
        assert_eq!(reference.state(), 0.0);
    }
}
