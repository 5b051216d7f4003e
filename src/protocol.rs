//! Wire model of the pilot protocol.
//!
//! Each datagram carries exactly one JSON object. Commands look like
//! `{"id": 7, "method": "setPilot", "params": {...}}`; the bulb answers with
//! the same `id` and either a `result` or an `error` member.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::errors::Error;

type Result<T> = std::result::Result<T, Error>;

/// Methods this client speaks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
    strum_macros::AsRefStr,
)]
pub enum Method {
    #[serde(rename = "getPilot")]
    #[strum(serialize = "getPilot")]
    GetPilot,
    #[serde(rename = "setPilot")]
    #[strum(serialize = "setPilot")]
    SetPilot,
}

/// An outbound command, before the transport assigns its id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    pub method: Method,
    pub params: Map<String, Value>,
}

impl Command {
    pub fn new(method: Method, params: Map<String, Value>) -> Self {
        Command { method, params }
    }

    /// Query the full light state.
    pub fn get_pilot() -> Self {
        Command::new(Method::GetPilot, Map::new())
    }

    pub fn set_pilot(params: Map<String, Value>) -> Self {
        Command::new(Method::SetPilot, params)
    }

    /// Serialize with `id` merged in at the top level.
    ///
    /// The bytes are produced once per request and resent verbatim on retry.
    pub(crate) fn to_datagram(&self, id: u32) -> Result<Vec<u8>> {
        let msg = json!({
            "id": id,
            "method": self.method,
            "params": self.params,
        });
        serde_json::to_vec(&msg).map_err(Error::JsonDump)
    }
}

/// The rejection a bulb sends instead of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFault {
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// A successfully decoded reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<R> {
    pub id: u32,
    pub method: String,
    pub env: String,
    pub result: R,
}

#[derive(Debug, Deserialize)]
struct RawResponse<R> {
    id: u32,
    #[serde(default)]
    method: String,
    #[serde(default)]
    env: String,
    result: Option<R>,
    error: Option<DeviceFault>,
}

impl<R: DeserializeOwned> Response<R> {
    /// Decode a matched reply.
    ///
    /// An `error` member becomes [`Error::Device`]; it is never retried.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawResponse<R> = serde_json::from_value(value).map_err(Error::Decode)?;
        if let Some(fault) = raw.error {
            return Err(Error::Device {
                code: fault.code,
                message: fault.message,
            });
        }
        let result = raw.result.ok_or(Error::EmptyReply { id: raw.id })?;
        Ok(Response {
            id: raw.id,
            method: raw.method,
            env: raw.env,
            result,
        })
    }
}

/// Result of a `setPilot` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

/// Full light state reported by `getPilot`.
///
/// Channels the bulb is not currently driving are omitted by the firmware,
/// e.g. RGB while a white scene is active.
#[serde_as]
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PilotState {
    pub mac: String,
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    pub rssi: i32,
    #[serde(default)]
    pub src: String,
    #[serde(rename = "sceneId", default)]
    pub scene_id: u16,
    pub state: bool,
    #[serde(rename = "r")]
    pub red: Option<u8>,
    #[serde(rename = "g")]
    pub green: Option<u8>,
    #[serde(rename = "b")]
    pub blue: Option<u8>,
    #[serde(rename = "c")]
    pub cool: Option<u8>,
    #[serde(rename = "w")]
    pub warm: Option<u8>,
    pub dimming: Option<u8>,
}

/// Reply to `getPilot`.
pub type StatusResponse = Response<PilotState>;

/// Pull the correlation id out of a decoded datagram.
pub(crate) fn reply_id(value: &Value) -> Option<u32> {
    value
        .get("id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_method_names() {
        assert_eq!(Method::GetPilot.to_string(), "getPilot");
        assert_eq!(Method::from_str("setPilot").unwrap(), Method::SetPilot);
        assert_eq!(serde_json::to_value(Method::SetPilot).unwrap(), json!("setPilot"));
    }

    #[test]
    fn test_datagram_has_top_level_id() {
        let bytes = Command::get_pilot().to_datagram(42).unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({"id": 42, "method": "getPilot", "params": {}}));
    }

    #[test]
    fn test_ack_reply() {
        let reply = json!({"id": 3, "method": "setPilot", "env": "pro", "result": {"success": true}});
        let resp = Response::<Ack>::from_value(reply).unwrap();
        assert_eq!(resp.id, 3);
        assert_eq!(resp.env, "pro");
        assert!(resp.result.success);
    }

    #[test]
    fn test_error_reply_is_device_error() {
        let reply = json!({
            "id": 3, "method": "setPilot", "env": "pro",
            "error": {"code": -32600, "message": "Invalid Request"}
        });
        assert_eq!(
            Response::<Ack>::from_value(reply).unwrap_err(),
            Error::device(-32600, "Invalid Request")
        );
    }

    #[test]
    fn test_empty_reply() {
        let reply = json!({"id": 9, "method": "setPilot", "env": "pro"});
        assert_eq!(
            Response::<Ack>::from_value(reply).unwrap_err(),
            Error::EmptyReply { id: 9 }
        );
    }

    #[test]
    fn test_wrong_result_shape_is_decode_error() {
        let reply = json!({"id": 9, "method": "getPilot", "env": "pro", "result": {"success": true}});
        assert!(matches!(
            Response::<PilotState>::from_value(reply),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn test_pilot_state_rssi_number_or_string() {
        let base = json!({
            "mac": "a8bb50aabbcc", "rssi": -61, "src": "", "sceneId": 0,
            "state": true, "r": 255, "g": 0, "b": 0, "c": 0, "w": 0, "dimming": 75
        });
        let numeric: PilotState = serde_json::from_value(base.clone()).unwrap();
        assert_eq!(numeric.rssi, -61);

        let mut textual = base;
        textual["rssi"] = json!("-61");
        let textual: PilotState = serde_json::from_value(textual).unwrap();
        assert_eq!(textual, numeric);
    }

    #[test]
    fn test_pilot_state_without_rgb() {
        let state: PilotState = serde_json::from_value(json!({
            "mac": "a8bb50aabbcc", "rssi": -70, "state": false, "sceneId": 11,
            "c": 0, "w": 255, "dimming": 30
        }))
        .unwrap();
        assert_eq!(state.red, None);
        assert_eq!(state.scene_id, 11);
        assert_eq!(state.src, "");
    }

    #[test]
    fn test_reply_id() {
        assert_eq!(reply_id(&json!({"id": 12})), Some(12));
        assert_eq!(reply_id(&json!({"id": "12"})), None);
        assert_eq!(reply_id(&json!({"method": "syncPilot"})), None);
        assert_eq!(reply_id(&json!({"id": 5_000_000_000u64})), None);
    }
}
