//! # wiz_light
//!
//! An async Rust client for Wiz smart bulbs speaking JSON over UDP.
//!
//! A bulb answers each command datagram with a datagram carrying the same
//! numeric `id`, some time later, with no connection and no delivery
//! guarantee. This crate builds request/response semantics on top of that:
//! it assigns ids, matches replies, times attempts out and resends.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::net::Ipv4Addr;
//! use wiz_light::{ClientConfig, Color, Dimming, Light, LightProperties};
//!
//! async fn control_light() -> Result<(), wiz_light::Error> {
//!     let light = Light::connect(Ipv4Addr::new(192, 168, 1, 100), ClientConfig::default()).await?;
//!
//!     // Only the changed fields; the rest comes from the cached state.
//!     let mut update = LightProperties::new();
//!     update.color(&Color::rgb(0, 255, 0)).dimming(&Dimming::new());
//!     light.set_properties(&update).await?;
//!
//!     light.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Layers
//!
//! - [`Transport`]: owns the socket, the id counter and the table of
//!   outstanding requests. One dispatcher task routes every reply by id.
//! - [`Light`]: turns on/off, merges partial [`LightProperties`] into the full
//!   state `setPilot` requires, reads status.
//!
//! ## Failures
//!
//! Every outcome is a distinct [`Error`] variant: [`Error::Timeout`],
//! [`Error::SendFailure`], [`Error::Device`], [`Error::Decode`] and
//! [`Error::Closed`] among others. A failed request leaves the transport
//! usable.
//!
//! ## Runtime Selection
//!
//! The crate is runtime-agnostic; pick one with a feature flag:
//!
//! - `runtime-tokio` (default): Use the tokio async runtime
//! - `runtime-async-std`: Use the async-std runtime
//! - `runtime-smol`: Use the smol runtime
//!
//! ```toml
//! [dependencies]
//! wiz-light = { version = "0.1", default-features = false, features = ["runtime-smol"] }
//! ```

mod config;
mod errors;
mod history;
mod light;
mod properties;
mod protocol;
pub mod runtime;
mod transport;
mod types;

// Re-export public API
pub use config::{
    ClientConfig, DEFAULT_ATTEMPTS, DEFAULT_PORT, DEFAULT_TIMEOUT, PORT_SENTINEL, resolve_port,
};
pub use errors::Error;
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use light::Light;
pub use properties::LightProperties;
pub use protocol::{Ack, Command, DeviceFault, Method, PilotState, Response, StatusResponse};
pub use transport::{MAX_REQUEST_ID, Transport};
pub use types::{Color, Dimming, White};
