/// All error types that can occur when talking to a Wiz bulb.
///
/// Every outcome of a request is distinct so callers can decide for
/// themselves whether retrying at a higher level makes sense.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No reply carrying the request id arrived within any attempt window.
    #[error("request {id} timed out after {attempts} attempt(s)")]
    Timeout { id: u32, attempts: u32 },

    /// The socket refused to send the datagram on every attempt.
    #[error("failed to send datagram: {0}")]
    SendFailure(std::io::Error),

    /// The bulb understood the command and rejected it.
    #[error("device error {code}: {message}")]
    Device { code: i64, message: String },

    /// A matched reply was not valid JSON of the expected shape.
    #[error("failed to load json: {0:?}")]
    Decode(serde_json::Error),

    /// A matched reply carried neither `result` nor `error`.
    #[error("reply {id} carries neither a result nor an error")]
    EmptyReply { id: u32 },

    /// The transport was closed while the request was outstanding, or before
    /// it was issued.
    #[error("transport closed")]
    Closed,

    /// Every correlation id is held by an outstanding request.
    #[error("all {0} request ids are in flight")]
    Busy(u32),

    /// Failed to serialize a command to JSON.
    #[error("failed to dump json: {0:?}")]
    JsonDump(serde_json::Error),

    /// Setting up the socket failed.
    #[error("socket {action} error: {err:?}")]
    Socket { action: String, err: std::io::Error },

    /// A light property is outside the range the protocol defines.
    #[error("{field} must be at most {max}, got {value}")]
    InvalidProperty {
        field: &'static str,
        value: u16,
        max: u16,
    },

    /// The port is neither a valid UDP port nor the `-1` default sentinel.
    #[error("invalid port {0}; expected 1-65535 or -1 for the default")]
    InvalidPort(i64),

    /// Failed to parse a [`crate::Color`] from a string.
    #[error("invalid color string: {0}")]
    InvalidColorString(String),
}

impl Error {
    /// Create a new socket error
    pub fn socket(action: &str, err: std::io::Error) -> Self {
        Error::Socket {
            action: action.to_string(),
            err,
        }
    }

    /// Create a new device error
    pub fn device(code: i64, message: &str) -> Self {
        Error::Device {
            code,
            message: message.to_string(),
        }
    }

    /// Whether repeating the same request later could succeed.
    ///
    /// Timeouts, send failures and id exhaustion are transient; a device
    /// rejection or a malformed command will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::SendFailure(_) | Error::Busy(_)
        )
    }
}

/// Hacky implementation of PartialEq for testing
#[cfg(test)]
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Timeout { id: 3, attempts: 5 }.is_retryable());
        assert!(Error::Busy(1000).is_retryable());
        assert!(!Error::device(1, "invalid").is_retryable());
        assert!(!Error::Closed.is_retryable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::Timeout { id: 7, attempts: 2 }.to_string(),
            "request 7 timed out after 2 attempt(s)"
        );
        assert_eq!(
            Error::device(-32600, "Invalid Request").to_string(),
            "device error -32600: Invalid Request"
        );
    }
}
