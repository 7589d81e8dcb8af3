//! Stable device identification across re-enumeration
//!
//! Host backends hand out raw numeric ids that may be reassigned whenever
//! the device list changes. A `DeviceQualifier` names a device by its source,
//! its product name and a disambiguating index instead, so bindings stay valid
//! as long as the same physical device is present.

use crate::error::InputError;
use std::fmt;
use std::str::FromStr;

/// Unified device identifier across backends
///
/// String form: `"<source>/<index>/<name>"`, e.g. `"XInput/0/Gamepad"`.
/// An index of `-1` matches any device with the same source and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct DeviceQualifier {
    pub source: String,
    pub index: i32,
    pub name: String,
}

impl DeviceQualifier {
    pub fn new(source: impl Into<String>, index: i32, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            index,
            name: name.into(),
        }
    }

    /// An empty qualifier refers to no device
    pub fn is_empty(&self) -> bool {
        self.source.is_empty() && self.name.is_empty()
    }

    /// Match another qualifier, treating a negative index as a wildcard
    pub fn matches(&self, other: &DeviceQualifier) -> bool {
        self.source == other.source
            && self.name == other.name
            && (self.index < 0 || other.index < 0 || self.index == other.index)
    }
}

impl fmt::Display for DeviceQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        if self.index < 0 {
            write!(f, "{}//{}", self.source, self.name)
        } else {
            write!(f, "{}/{}/{}", self.source, self.index, self.name)
        }
    }
}

impl FromStr for DeviceQualifier {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }

        // Device names may contain '/', so only the first two separators count
        let mut parts = s.splitn(3, '/');
        let source = parts.next().unwrap_or_default();
        let index = parts
            .next()
            .ok_or_else(|| InputError::InvalidQualifier(s.to_string()))?;
        let name = parts
            .next()
            .ok_or_else(|| InputError::InvalidQualifier(s.to_string()))?;

        if source.is_empty() {
            return Err(InputError::InvalidQualifier(s.to_string()));
        }

        let index = if index.is_empty() {
            -1
        } else {
            index
                .parse::<i32>()
                .map_err(|_| InputError::InvalidQualifier(s.to_string()))?
        };

        Ok(Self::new(source, index, name))
    }
}
