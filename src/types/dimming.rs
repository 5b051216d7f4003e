//! Dimming level for Wiz lights.

use serde::{Deserialize, Serialize};

/// Dimming level from 0 to 100 percent.
///
/// # Examples
///
/// ```
/// use wiz_light::Dimming;
///
/// assert_eq!(Dimming::new().value(), 100);
/// assert!(Dimming::create(101).is_none());
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "u8", into = "u8")]
pub struct Dimming {
    pub(crate) value: u8,
}

impl Dimming {
    pub const MAX: u8 = 100;

    /// Full brightness.
    pub fn new() -> Self {
        Dimming { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is above 100.
    pub fn create(value: u8) -> Option<Self> {
        if value <= Self::MAX {
            Some(Dimming { value })
        } else {
            None
        }
    }
}

impl Default for Dimming {
    fn default() -> Self {
        Self::new()
    }
}

impl TryFrom<u8> for Dimming {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Dimming::create(value).ok_or_else(|| format!("dimming {value} is above {}", Self::MAX))
    }
}

impl From<Dimming> for u8 {
    fn from(d: Dimming) -> u8 {
        d.value
    }
}
