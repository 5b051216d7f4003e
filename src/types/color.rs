//! RGB color representation.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::Error;

/// An RGB color with red, green, and blue components (0-255 each).
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Color {
    /// Create a color with the given RGB values.
    pub fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }
}

impl FromStr for Color {
    type Err = Error;

    /// Parse from comma-separated string (e.g., "255,128,0").
    ///
    /// ```
    /// use std::str::FromStr;
    /// use wiz_light::Color;
    ///
    /// let c = Color::from_str("255, 128,0").unwrap();
    /// assert_eq!((c.red(), c.green(), c.blue()), (255, 128, 0));
    /// assert!(Color::from_str("255,128").is_err());
    /// assert!(Color::from_str("256,0,0").is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Error> {
        let parts = s
            .split(',')
            .map(|c| c.trim().parse::<u8>())
            .collect::<Result<Vec<u8>, _>>()
            .map_err(|_| Error::InvalidColorString(s.to_string()))?;
        match parts[..] {
            [r, g, b] => Ok(Self::rgb(r, g, b)),
            _ => Err(Error::InvalidColorString(s.to_string())),
        }
    }
}
