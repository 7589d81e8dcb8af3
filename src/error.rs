//! Error types for the input subsystem
//!
//! Only edit-time and load-time operations return these. Anything on the
//! per-tick read path collapses failures to a neutral value instead.

use thiserror::Error;

/// Errors raised while configuring devices, bindings, and profiles
#[derive(Debug, Error)]
pub enum InputError {
    /// A binding expression could not be parsed
    #[error("Invalid expression at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A device qualifier string was malformed
    #[error("Invalid device qualifier: {0}")]
    InvalidQualifier(String),

    /// Group name does not exist on the controller
    #[error("Unknown control group: {0}")]
    UnknownGroup(String),

    /// Control name does not exist in the group
    #[error("Unknown control '{control}' in group '{group}'")]
    UnknownControl { group: String, control: String },

    /// Numeric setting does not exist in the group
    #[error("Unknown setting '{setting}' in group '{group}'")]
    UnknownSetting { group: String, setting: String },

    /// Enumeration record declared the same control name twice
    #[error("Duplicate control '{control}' on device '{device}'")]
    DuplicateControl { device: String, control: String },

    /// Profile could not be serialized or deserialized
    #[error("Profile error: {0}")]
    Profile(#[from] serde_yaml::Error),
}

/// Convenience alias used across the library
pub type Result<T> = std::result::Result<T, InputError>;
