//! Value types for light control parameters.

mod color;
mod dimming;
mod white;

pub use color::Color;
pub use dimming::Dimming;
pub use white::White;
