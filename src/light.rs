//! Device-level control of a single bulb.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::ClientConfig;
use crate::errors::Error;
use crate::properties::LightProperties;
use crate::protocol::{Ack, Command, Response, StatusResponse};
use crate::transport::Transport;

type Result<T> = std::result::Result<T, Error>;

/// What the facade believes about the bulb's desired properties.
///
/// `attempted` is updated before a `setPilot` is sent, so after a failed
/// call it holds a value the bulb never applied. `confirmed` only moves when
/// the bulb acknowledges with `success: true`, and never back to a state
/// older than the one it holds.
#[derive(Debug, Clone, Serialize)]
struct PropertyCache {
    attempted: LightProperties,
    confirmed: Option<LightProperties>,
    /// Sequence number of the last `setPilot` merged into `attempted`.
    #[serde(skip)]
    issued: u64,
    /// Sequence number behind `confirmed`.
    #[serde(skip)]
    committed: u64,
}

impl PropertyCache {
    fn new() -> Self {
        PropertyCache {
            attempted: LightProperties::defaults(),
            confirmed: None,
            issued: 0,
            committed: 0,
        }
    }

    /// Merge an update into `attempted` and number it.
    fn stage(&mut self, update: &LightProperties) -> (u64, LightProperties) {
        self.attempted.merge(update);
        self.issued += 1;
        (self.issued, self.attempted.clone())
    }

    /// Record an acknowledged state unless a newer one is already confirmed.
    fn confirm(&mut self, seq: u64, props: LightProperties) {
        if seq > self.committed {
            self.committed = seq;
            self.confirmed = Some(props);
        }
    }

    /// Fold what the bulb reported into both views. Channels it omits keep
    /// their value in each view independently.
    fn reconcile(&mut self, reported: &LightProperties) {
        self.attempted.merge(reported);
        let mut confirmed = self
            .confirmed
            .take()
            .unwrap_or_else(LightProperties::defaults);
        confirmed.merge(reported);
        self.confirmed = Some(confirmed);
    }
}

/// A Wiz bulb at a fixed address.
///
/// The bulb's `setPilot` wants the complete state, not a delta. `Light`
/// keeps the last attempted properties, starting from full white at full
/// brightness, and merges every partial update into them before sending.
///
/// # Example
///
/// ```no_run
/// use std::net::Ipv4Addr;
/// use wiz_light::{ClientConfig, Color, Light, LightProperties};
///
/// # async fn run() -> Result<(), wiz_light::Error> {
/// let light = Light::connect(Ipv4Addr::new(192, 168, 1, 100), ClientConfig::default()).await?;
///
/// let mut update = LightProperties::new();
/// update.color(&Color::rgb(0, 0, 255));
/// light.set_properties(&update).await?;
///
/// let status = light.fetch_status().await?;
/// println!("on: {}", status.result.state);
/// light.shutdown();
/// # Ok(())
/// # }
/// ```
pub struct Light {
    ip: Ipv4Addr,
    transport: Transport,
    cache: Mutex<PropertyCache>,
}

impl Light {
    /// Open a transport to `ip` on the configured port.
    pub async fn connect(ip: Ipv4Addr, config: ClientConfig) -> Result<Self> {
        let peer = SocketAddr::from((ip, config.port));
        let transport = Transport::connect(peer, config).await?;
        Ok(Light {
            ip,
            transport,
            cache: Mutex::new(PropertyCache::new()),
        })
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ip
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Last properties sent (or about to be sent), confirmed or not.
    pub fn attempted(&self) -> LightProperties {
        self.cache().attempted.clone()
    }

    /// Last properties the bulb acknowledged, if any.
    pub fn confirmed(&self) -> Option<LightProperties> {
        self.cache().confirmed.clone()
    }

    /// Switch the bulb on or off. Returns the bulb's success flag.
    ///
    /// Cached color and dimming are left as they are.
    pub async fn set_status(&self, on: bool) -> Result<bool> {
        let mut params = Map::new();
        params.insert("state".to_string(), Value::Bool(on));
        let resp: Response<Ack> = self.transport.call(&Command::set_pilot(params)).await?;
        Ok(resp.result.success)
    }

    pub async fn turn_on(&self) -> Result<bool> {
        self.set_status(true).await
    }

    pub async fn turn_off(&self) -> Result<bool> {
        self.set_status(false).await
    }

    /// Merge `update` into the cached state and send the whole result.
    ///
    /// The cache is committed before the command goes out. Out-of-range
    /// values are rejected up front; in that case nothing is cached or sent.
    /// When overlapping calls are acknowledged out of order, the confirmed
    /// state follows the call that was issued last.
    pub async fn set_properties(&self, update: &LightProperties) -> Result<bool> {
        update.validate()?;

        let (seq, merged) = self.cache().stage(update);
        debug!("{}: applying #{seq} {:?}", self.ip, merged);

        let command = Command::set_pilot(merged.to_params()?);
        let resp: Response<Ack> = self.transport.call(&command).await?;
        if resp.result.success {
            self.cache().confirm(seq, merged);
        }
        Ok(resp.result.success)
    }

    /// Query the bulb. The reply is returned as decoded; the cache is not
    /// touched (see [`Light::refresh`]).
    pub async fn fetch_status(&self) -> Result<StatusResponse> {
        self.transport.call(&Command::get_pilot()).await
    }

    /// Query the bulb and fold the reported properties into the cache.
    ///
    /// Reported channels overwrite both the attempted and the confirmed
    /// state. Channels the bulb omits keep their value in each, so an
    /// unacknowledged attempt never leaks into the confirmed state.
    pub async fn refresh(&self) -> Result<StatusResponse> {
        let status = self.fetch_status().await?;
        self.cache().reconcile(&LightProperties::from(&status.result));
        Ok(status)
    }

    /// Close the transport. Outstanding calls settle with [`Error::Closed`].
    pub fn shutdown(&self) {
        self.transport.close();
    }

    /// Returns diagnostics including cached state and message history.
    pub fn diagnostics(&self) -> Value {
        let history = self.transport.history();
        json!({
            "ip": self.ip.to_string(),
            "peer": self.transport.peer().to_string(),
            "closed": self.transport.is_closed(),
            "pending": self.transport.pending(),
            "cache": serde_json::to_value(&*self.cache()).unwrap_or(Value::Null),
            "history": serde_json::to_value(history.summary()).unwrap_or(Value::Null),
        })
    }

    fn cache(&self) -> MutexGuard<'_, PropertyCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Light {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Light")
            .field("ip", &self.ip)
            .field("transport", &self.transport)
            .field("cache", &*self.cache())
            .finish()
    }
}
