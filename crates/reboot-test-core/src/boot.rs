//! Boot configuration (A/B slot) model.
//!
//! Devices with seamless updates keep two redundant system slots and boot
//! from one of them. Devices without that redundancy report no configuration
//! at all, which is a valid state and is modelled explicitly as
//! [`BootConfiguration::Unsupported`] rather than as an absent value.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// The active boot configuration of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootConfiguration {
    /// The device has no redundant boot slots.
    Unsupported,
    /// Primary slot. A freshly paved device always boots here.
    A,
    /// Secondary slot.
    B,
    /// Recovery image.
    Recovery,
}

impl BootConfiguration {
    /// The slot a device boots into after being paved.
    pub const PRIMARY: Self = Self::A;

    /// Returns true if the device supports redundant boot slots.
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    /// Build from the optional slot name reported by a device agent.
    ///
    /// `None` means the device does not support configurations.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownConfiguration` for unrecognised names.
    pub fn from_reported(name: Option<&str>) -> Result<Self, CoreError> {
        name.map_or(Ok(Self::Unsupported), str::parse)
    }

    /// The lowercase name used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsupported => "unsupported",
            Self::A => "a",
            Self::B => "b",
            Self::Recovery => "recovery",
        }
    }
}

impl fmt::Display for BootConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BootConfiguration {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "a" => Ok(Self::A),
            "b" => Ok(Self::B),
            "r" | "recovery" => Ok(Self::Recovery),
            "unsupported" => Ok(Self::Unsupported),
            other => Err(CoreError::UnknownConfiguration(other.to_string())),
        }
    }
}
