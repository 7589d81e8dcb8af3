//! Input virtualization and override subsystem
//!
//! Physical input sources are presented as [`device::Device`]s published in a
//! [`device::DeviceRegistry`]. [`controller::EmulatedController`]s bind their
//! groups to those devices through persisted expressions, and tools can
//! substitute individual control values through the [`overrides`] layer while
//! the [`simulation`] loop keeps reading on its own thread.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod group;
pub mod overrides;
pub mod paths;
pub mod profile;
pub mod reference;
pub mod simulation;

pub use controller::{EmulatedController, Group, InputOverrideFunction};
pub use device::{ControlState, DeviceQualifier, DeviceRegistry};
pub use error::{InputError, Result};
pub use overrides::{CrossThreadControlState, InputOverrider, PresentationQueue, TasInputSession};
pub use profile::Profile;
pub use simulation::{SimulationLoop, TickSnapshot};
