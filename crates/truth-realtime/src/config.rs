use std::time::Duration;

use crate::errors::ClientError;

/// Path of the NDJSON verification endpoint, relative to the API base URL.
pub const STREAM_PATH: &str = "/api/truth/check/stream-v2";

/// Configuration shared by the verification client and the chat channel.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the HTTP API (for example `https://api.example.com`).
    pub base_url: String,
    /// Optional WebSocket base URL for chat.
    ///
    /// When unset the HTTP base is reused with its scheme switched to
    /// `ws`/`wss`.
    pub chat_base_url: Option<String>,
    /// TCP/TLS connect timeout for both transports.
    pub connect_timeout: Duration,
    /// Maximum wait for response headers on the verification stream.
    ///
    /// The stream body itself is never subject to a client-side timeout.
    pub response_timeout: Duration,
    /// User agent sent with HTTP requests.
    pub user_agent: String,
    /// Capacity of the chat broadcast buffer per subscriber.
    pub chat_event_capacity: usize,
}

impl ClientConfig {
    /// Creates a config with defaults and the given API base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            chat_base_url: None,
            connect_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(30),
            user_agent: format!("truth-realtime/{}", env!("CARGO_PKG_VERSION")),
            chat_event_capacity: 256,
        }
    }

    /// Builds a config from the process environment.
    ///
    /// - `TRUTH_API_BASE_URL` (required)
    /// - `TRUTH_CHAT_BASE_URL`
    /// - `TRUTH_CONNECT_TIMEOUT_SECS`
    /// - `TRUTH_RESPONSE_TIMEOUT_SECS`
    pub fn from_env() -> Result<Self, ClientError> {
        let base_url = std::env::var("TRUTH_API_BASE_URL").unwrap_or_default();
        if base_url.trim().is_empty() {
            return Err(ClientError::config("missing TRUTH_API_BASE_URL"));
        }
        let mut config = Self::new(base_url.trim());
        if let Ok(chat) = std::env::var("TRUTH_CHAT_BASE_URL")
            && !chat.trim().is_empty()
        {
            config.chat_base_url = Some(chat.trim().to_string());
        }
        if let Some(secs) = read_secs("TRUTH_CONNECT_TIMEOUT_SECS")? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = read_secs("TRUTH_RESPONSE_TIMEOUT_SECS")? {
            config.response_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    /// Overrides the chat WebSocket base URL.
    pub fn chat_base_url(mut self, url: impl Into<String>) -> Self {
        self.chat_base_url = Some(url.into());
        self
    }

    /// Overrides the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Overrides the response-header timeout.
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Overrides the user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Overrides the chat broadcast capacity.
    pub fn chat_event_capacity(mut self, capacity: usize) -> Self {
        self.chat_event_capacity = capacity;
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::config(format!(
                "base_url must be an http(s) URL, got `{}`",
                self.base_url
            )));
        }
        if self.chat_event_capacity == 0 {
            return Err(ClientError::config(
                "chat_event_capacity must be greater than 0",
            ));
        }
        Ok(())
    }

    pub(crate) fn stream_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), STREAM_PATH)
    }

    /// Default chat socket URL for an issue.
    pub fn chat_url(&self, issue_id: &str) -> String {
        let base = match &self.chat_base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => websocket_base(self.base_url.trim_end_matches('/')),
        };
        format!("{base}/ws/chat/{issue_id}")
    }
}

fn websocket_base(http_base: &str) -> String {
    if let Some(rest) = http_base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_base.to_string()
    }
}

fn read_secs(key: &str) -> Result<Option<u64>, ClientError> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ClientError::config(format!("invalid {key}: {e}"))),
        _ => Ok(None),
    }
}
