//! White LED channel level.

use serde::{Deserialize, Serialize};

/// Intensity of one white LED channel, cold (`c`) or warm (`w`).
///
/// Unlike dimming, the white channels use the full 0-255 range, the same
/// scale as the RGB channels.
///
/// # Examples
///
/// ```
/// use wiz_light::{LightProperties, White};
///
/// let mut update = LightProperties::new();
/// update.cool_white(&White::off()).warm_white(&White::full());
/// assert_eq!(update.cool(), Some(0));
/// assert_eq!(update.warm(), Some(255));
/// ```
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct White {
    pub(crate) value: u8,
}

impl White {
    pub fn new(value: u8) -> Self {
        White { value }
    }

    pub fn off() -> Self {
        White { value: 0 }
    }

    pub fn full() -> Self {
        White { value: u8::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }
}

impl From<u8> for White {
    fn from(value: u8) -> Self {
        White { value }
    }
}
