//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::DurationMilliSeconds;

use crate::errors::Error;

/// UDP port Wiz bulbs listen on.
pub const DEFAULT_PORT: u16 = 38899;
/// How long one attempt waits for its reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
/// Total attempts per request, the first send included.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Sentinel accepted by [`resolve_port`] meaning "use [`DEFAULT_PORT`]".
pub const PORT_SENTINEL: i64 = -1;

/// Settings for one bulb connection.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use wiz_light::ClientConfig;
///
/// let config = ClientConfig::default()
///     .with_timeout(Duration::from_millis(250))
///     .with_attempts(3);
/// assert_eq!(config.port, 38899);
/// assert_eq!(config.attempts, 3);
/// ```
#[serde_with::serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub port: u16,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    pub attempts: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT,
            attempts: DEFAULT_ATTEMPTS,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Per-attempt reply window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Total attempts including the first send. Zero selects the default.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = if attempts == 0 {
            DEFAULT_ATTEMPTS
        } else {
            attempts
        };
        self
    }
}

/// Turn a user supplied port into a real one.
///
/// `-1` selects [`DEFAULT_PORT`]; anything outside 1-65535 is rejected.
///
/// ```
/// use wiz_light::resolve_port;
///
/// assert_eq!(resolve_port(-1).unwrap(), 38899);
/// assert_eq!(resolve_port(5000).unwrap(), 5000);
/// assert!(resolve_port(0).is_err());
/// assert!(resolve_port(70000).is_err());
/// ```
pub fn resolve_port(port: i64) -> Result<u16, Error> {
    if port == PORT_SENTINEL {
        return Ok(DEFAULT_PORT);
    }
    match u16::try_from(port) {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(Error::InvalidPort(port)),
    }
}
