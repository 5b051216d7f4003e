//! The light state vector carried by `setPilot`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::Error;
use crate::protocol::PilotState;
use crate::types::{Color, Dimming, White};

type Result<T> = std::result::Result<T, Error>;

/// Desired light properties: power state, color channels and dimming.
///
/// Every field is optional. A value with some fields set is a partial
/// update; [`LightProperties::merge`] lays it over a complete state, which is
/// what the bulb actually requires on the wire.
///
/// # Examples
///
/// ```
/// use wiz_light::{Color, Dimming, LightProperties};
///
/// let mut update = LightProperties::new();
/// update.color(&Color::rgb(0, 255, 0)).dimming(&Dimming::new());
///
/// let mut state = LightProperties::defaults();
/// state.merge(&update);
/// assert_eq!(state.red(), Some(0));
/// assert_eq!(state.cool(), Some(255));
/// ```
#[serde_with::skip_serializing_none]
#[derive(Default, Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct LightProperties {
    pub(crate) state: Option<bool>,
    #[serde(rename = "r")]
    pub(crate) red: Option<u8>,
    #[serde(rename = "g")]
    pub(crate) green: Option<u8>,
    #[serde(rename = "b")]
    pub(crate) blue: Option<u8>,
    #[serde(rename = "c")]
    pub(crate) cool: Option<u8>,
    #[serde(rename = "w")]
    pub(crate) warm: Option<u8>,
    pub(crate) dimming: Option<u8>,
}

impl LightProperties {
    /// An empty partial update.
    pub fn new() -> Self {
        Self::default()
    }

    /// Full white at full brightness, the state a fresh facade assumes.
    pub fn defaults() -> Self {
        LightProperties {
            state: None,
            red: Some(u8::MAX),
            green: Some(u8::MAX),
            blue: Some(u8::MAX),
            cool: Some(u8::MAX),
            warm: Some(u8::MAX),
            dimming: Some(Dimming::MAX),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn state(&mut self, on: bool) -> &mut Self {
        self.state = Some(on);
        self
    }

    /// Set all three RGB channels.
    pub fn color(&mut self, color: &Color) -> &mut Self {
        self.red = Some(color.red);
        self.green = Some(color.green);
        self.blue = Some(color.blue);
        self
    }

    pub fn red(&self) -> Option<u8> {
        self.red
    }

    pub fn green(&self) -> Option<u8> {
        self.green
    }

    pub fn blue(&self) -> Option<u8> {
        self.blue
    }

    pub fn set_red(&mut self, value: u8) -> &mut Self {
        self.red = Some(value);
        self
    }

    pub fn set_green(&mut self, value: u8) -> &mut Self {
        self.green = Some(value);
        self
    }

    pub fn set_blue(&mut self, value: u8) -> &mut Self {
        self.blue = Some(value);
        self
    }

    /// Cold white channel (`c`).
    pub fn cool(&self) -> Option<u8> {
        self.cool
    }

    /// Warm white channel (`w`).
    pub fn warm(&self) -> Option<u8> {
        self.warm
    }

    pub fn set_cool(&mut self, value: u8) -> &mut Self {
        self.cool = Some(value);
        self
    }

    pub fn set_warm(&mut self, value: u8) -> &mut Self {
        self.warm = Some(value);
        self
    }

    /// Set the cold white channel from a [`White`] level.
    pub fn cool_white(&mut self, level: &White) -> &mut Self {
        self.set_cool(level.value)
    }

    /// Set the warm white channel from a [`White`] level.
    pub fn warm_white(&mut self, level: &White) -> &mut Self {
        self.set_warm(level.value)
    }

    pub fn dimming(&mut self, dimming: &Dimming) -> &mut Self {
        self.dimming = Some(dimming.value);
        self
    }

    pub fn dimming_value(&self) -> Option<u8> {
        self.dimming
    }

    pub fn is_on(&self) -> Option<bool> {
        self.state
    }

    /// The RGB part, if all three channels are set.
    pub fn rgb(&self) -> Option<Color> {
        match (self.red, self.green, self.blue) {
            (Some(r), Some(g), Some(b)) => Some(Color::rgb(r, g, b)),
            _ => None,
        }
    }

    /// Shallow merge: every field present in `update` overwrites ours, absent
    /// fields keep their current value.
    pub fn merge(&mut self, update: &LightProperties) {
        fn take<T: Copy>(dst: &mut Option<T>, src: Option<T>) {
            if src.is_some() {
                *dst = src;
            }
        }
        take(&mut self.state, update.state);
        take(&mut self.red, update.red);
        take(&mut self.green, update.green);
        take(&mut self.blue, update.blue);
        take(&mut self.cool, update.cool);
        take(&mut self.warm, update.warm);
        take(&mut self.dimming, update.dimming);
    }

    /// Check the ranges the protocol defines.
    ///
    /// Color channels are bounded by their type; only dimming can be out of
    /// range, e.g. when the value was deserialized from user input.
    pub fn validate(&self) -> Result<()> {
        match self.dimming {
            Some(value) if value > Dimming::MAX => Err(Error::InvalidProperty {
                field: "dimming",
                value: value.into(),
                max: Dimming::MAX.into(),
            }),
            _ => Ok(()),
        }
    }

    /// The `params` object of a `setPilot` command.
    pub(crate) fn to_params(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self).map_err(Error::JsonDump)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

impl From<&Color> for LightProperties {
    fn from(color: &Color) -> Self {
        let mut p = LightProperties::new();
        p.color(color);
        p
    }
}

impl From<&Dimming> for LightProperties {
    fn from(dimming: &Dimming) -> Self {
        let mut p = LightProperties::new();
        p.dimming(dimming);
        p
    }
}

impl From<&PilotState> for LightProperties {
    fn from(status: &PilotState) -> Self {
        LightProperties {
            state: Some(status.state),
            red: status.red,
            green: status.green,
            blue: status.blue,
            cool: status.cool,
            warm: status.warm,
            dimming: status.dimming,
        }
    }
}
