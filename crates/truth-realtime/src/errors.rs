use std::time::Duration;

/// Top-level error type for the public client API.
///
/// Only failures that happen *before* an event sequence exists are reported
/// through this type. Anything that goes wrong once a verification stream is
/// flowing is surfaced as a `StreamEvent` with kind `Error` instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration (missing base URL, bad env value, etc.).
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input.
    #[error("validation error: {0}")]
    Validation(String),
    /// Connection could not be established or the socket failed to open.
    #[error("transport error: {0}")]
    Transport(String),
    /// Server answered the stream request with a non-success status.
    #[error("http error (status {status}): {body}")]
    Http { status: u16, body: String },
    /// Response headers did not arrive within the configured window.
    #[error("timed out after {0:?} waiting for the server to respond")]
    Timeout(Duration),
    /// Outbound command could not be encoded or the server broke the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// Chat command issued while no socket is open.
    #[error("chat channel is not connected")]
    NotConnected,
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Returns the HTTP status for `Http` failures.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(value: serde_json::Error) -> Self {
        Self::Protocol(value.to_string())
    }
}
