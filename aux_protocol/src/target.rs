/*!
Logical endpoints on the AUX bus.

Targets are protocol addresses, not connections: a single TCP session carries
traffic for every subsystem of the mount.
*/

use std::fmt;

/// Known bus addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Target {
    Any = 0x00,
    Motherboard = 0x01,
    HandController = 0x04,
    HandControllerPlus = 0x0D,
    Azimuth = 0x10,
    Altitude = 0x11,
    Focuser = 0x12,
    Application = 0x20,
    NexRemote = 0x22,
    Gps = 0xB0,
    Wifi = 0xB5,
    Battery = 0xB6,
    Charger = 0xB7,
    Light = 0xBF,
}

impl Target {
    /// Parse a target from its bus id
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Any),
            0x01 => Some(Self::Motherboard),
            0x04 => Some(Self::HandController),
            0x0D => Some(Self::HandControllerPlus),
            0x10 => Some(Self::Azimuth),
            0x11 => Some(Self::Altitude),
            0x12 => Some(Self::Focuser),
            0x20 => Some(Self::Application),
            0x22 => Some(Self::NexRemote),
            0xB0 => Some(Self::Gps),
            0xB5 => Some(Self::Wifi),
            0xB6 => Some(Self::Battery),
            0xB7 => Some(Self::Charger),
            0xBF => Some(Self::Light),
            _ => None,
        }
    }

    /// Bus id of this target
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Short name used in logs and the command history
    pub fn name(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Motherboard => "MB",
            Self::HandController => "HC",
            Self::HandControllerPlus => "HC+",
            Self::Azimuth => "AZM",
            Self::Altitude => "ALT",
            Self::Focuser => "FOCUS",
            Self::Application => "APP",
            Self::NexRemote => "NEXR",
            Self::Gps => "GPS",
            Self::Wifi => "WiFi",
            Self::Battery => "BAT",
            Self::Charger => "CHG",
            Self::Light => "LIGHT",
        }
    }

    /// Altitude and azimuth motor controllers share one command set
    pub fn is_motor(self) -> bool {
        matches!(self, Self::Azimuth | Self::Altitude)
    }

    /// Returns true if `id` addresses one of the motor controllers
    pub fn id_is_motor(id: u8) -> bool {
        Self::from_u8(id).is_some_and(Self::is_motor)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a raw bus id, falling back to hex for addresses outside the catalog
pub fn describe(id: u8) -> String {
    match Target::from_u8(id) {
        Some(target) => target.name().to_string(),
        None => format!("{:#04x}", id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_parsing() {
        assert_eq!(Target::from_u8(0x10), Some(Target::Azimuth));
        assert_eq!(Target::from_u8(0x11), Some(Target::Altitude));
        assert_eq!(Target::from_u8(0xB6), Some(Target::Battery));
        assert_eq!(Target::from_u8(0x99), None);
        assert_eq!(Target::Gps.id(), 0xB0);
    }

    #[test]
    fn test_motor_classification() {
        assert!(Target::Altitude.is_motor());
        assert!(Target::Azimuth.is_motor());
        assert!(!Target::HandController.is_motor());
        assert!(Target::id_is_motor(0x11));
        assert!(!Target::id_is_motor(0xBF));
        assert!(!Target::id_is_motor(0x77));
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(0x20), "APP");
        assert_eq!(describe(0x77), "0x77");
    }
}
