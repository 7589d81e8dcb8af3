//! Control naming convention for split axes
//!
//! Bidirectional axes are exposed as two unidirectional inputs named
//! `"<prefix><axis-id><sign>"`. These names are written into user profiles,
//! so the prefix table and format must never change.

/// Logical source category of an axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisSource {
    Keyboard,
    Dpad,
    Gamepad,
    Touch,
    Cursor,
    Stylus,
    BluetoothStylus,
    Trackball,
    Mouse,
    Touchpad,
    TouchNavigation,
    /// The typical source for every axis on a gamepad
    Joystick,
    Hdmi,
    Sensor,
    Rotary,
    /// Unrecognised host source code
    Other(u32),
}

impl AxisSource {
    /// Parse the config spelling of a source category
    ///
    /// Unknown words fall back to `Other` when they parse as hex, else `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let source = match s.trim().to_lowercase().as_str() {
            "keyboard" => Self::Keyboard,
            "dpad" => Self::Dpad,
            "gamepad" => Self::Gamepad,
            "touch" | "touchscreen" => Self::Touch,
            "cursor" => Self::Cursor,
            "stylus" => Self::Stylus,
            "btstylus" | "bluetooth_stylus" => Self::BluetoothStylus,
            "trackball" => Self::Trackball,
            "mouse" | "mouse_relative" => Self::Mouse,
            "touchpad" => Self::Touchpad,
            "touchnav" | "touch_navigation" => Self::TouchNavigation,
            "axis" | "joystick" => Self::Joystick,
            "hdmi" => Self::Hdmi,
            "sensor" => Self::Sensor,
            "rotary" | "rotary_encoder" => Self::Rotary,
            other => {
                let hex = other.strip_prefix("0x").unwrap_or(other);
                return u32::from_str_radix(hex, 16).ok().map(Self::Other);
            },
        };
        Some(source)
    }

    /// Stable prefix placed before the axis id
    pub fn prefix(&self) -> String {
        let name = match self {
            Self::Keyboard => "Keyboard",
            Self::Dpad => "Dpad",
            Self::Gamepad => "Gamepad",
            Self::Touch => "Touch",
            Self::Cursor => "Cursor",
            Self::Stylus => "Stylus",
            Self::BluetoothStylus => "BTStylus",
            Self::Trackball => "Trackball",
            Self::Mouse => "Mouse",
            Self::Touchpad => "Touchpad",
            Self::TouchNavigation => "Touchnav",
            Self::Joystick => "Axis",
            Self::Hdmi => "HDMI",
            Self::Sensor => "Sensor",
            Self::Rotary => "Rotary",
            Self::Other(code) => return format!("Axis {:08x}/", code),
        };
        format!("{} ", name)
    }
}

/// Build the name of one half of a split axis
///
/// # Examples
/// - `(Joystick, "0", false)` -> `"Axis 0+"`
/// - `(Joystick, "1", true)` -> `"Axis 1-"`
/// - `(Other(0x1234), "2", false)` -> `"Axis 00001234/2+"`
pub fn axis_control_name(source: AxisSource, axis_id: &str, negative: bool) -> String {
    let sign = if negative { '-' } else { '+' };
    format!("{}{}{}", source.prefix(), axis_id, sign)
}

/// Split a control name into its base and sign, if it names an axis half
pub fn split_axis_sign(name: &str) -> Option<(&str, bool)> {
    if let Some(base) = name.strip_suffix('+') {
        Some((base, false))
    } else {
        name.strip_suffix('-').map(|base| (base, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_names_are_bit_exact() {
        assert_eq!(axis_control_name(AxisSource::Joystick, "0", false), "Axis 0+");
        assert_eq!(axis_control_name(AxisSource::Joystick, "0", true), "Axis 0-");
        assert_eq!(axis_control_name(AxisSource::Gamepad, "17", true), "Gamepad 17-");
        assert_eq!(axis_control_name(AxisSource::BluetoothStylus, "3", false), "BTStylus 3+");
    }

    #[test]
    fn test_unknown_source_prefix() {
        assert_eq!(
            axis_control_name(AxisSource::Other(0x1000010), "4", false),
            "Axis 01000010/4+"
        );
    }

    #[test]
    fn test_parse_source() {
        assert_eq!(AxisSource::parse("joystick"), Some(AxisSource::Joystick));
        assert_eq!(AxisSource::parse("Axis"), Some(AxisSource::Joystick));
        assert_eq!(AxisSource::parse("0x10"), Some(AxisSource::Other(0x10)));
        assert_eq!(AxisSource::parse("not a source"), None);
    }

    #[test]
    fn test_split_axis_sign() {
        assert_eq!(split_axis_sign("Axis 0+"), Some(("Axis 0", false)));
        assert_eq!(split_axis_sign("Axis 0-"), Some(("Axis 0", true)));
        assert_eq!(split_axis_sign("Button A"), None);
    }
}
