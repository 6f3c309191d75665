use std::pin::Pin;
use std::time::Duration;

use futures::TryStreamExt as _;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::errors::ClientError;

/// Ordered body chunks of an open streaming response.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, ClientError>> + Send + 'static>>;

/// Opens the streaming HTTP request behind a verification session.
///
/// Implementations must deliver body bytes in arrival order and end the
/// stream (or yield one `Err`) when the response finishes. Any failure before
/// the body starts is returned from `open` and never reaches the stream.
#[async_trait::async_trait]
pub trait StreamTransport: Send + Sync {
    /// Sends `body` as JSON to `url` and returns the response body stream.
    async fn open(&self, url: &str, body: serde_json::Value) -> Result<ByteStream, ClientError>;
}

/// Default transport backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
    response_timeout: Duration,
}

impl ReqwestTransport {
    /// Builds the HTTP client from client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            response_timeout: config.response_timeout,
        })
    }
}

#[async_trait::async_trait]
impl StreamTransport for ReqwestTransport {
    async fn open(&self, url: &str, body: serde_json::Value) -> Result<ByteStream, ClientError> {
        debug!(url, "opening verification stream");
        let request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/x-ndjson")
            .json(&body)
            .send();
        let response = tokio::time::timeout(self.response_timeout, request)
            .await
            .map_err(|_| ClientError::Timeout(self.response_timeout))?
            .map_err(|e| ClientError::transport(format!("stream request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("ndjson") && !content_type.contains("json") {
            warn!(%content_type, "verification stream has unexpected content type");
        }

        let stream = response
            .bytes_stream()
            .map_err(|e| ClientError::transport(format!("stream read failed: {e}")));
        Ok(Box::pin(stream))
    }
}
