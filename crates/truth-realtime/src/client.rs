use std::sync::Arc;

use tracing::info;

use crate::chat::ChatChannel;
use crate::config::ClientConfig;
use crate::errors::ClientError;
use crate::session::{VerificationRequest, VerificationStream};
use crate::transport::{ReqwestTransport, StreamTransport};

/// Entry point for verification streams and chat channels.
#[derive(Clone)]
pub struct TruthClient {
    config: Arc<ClientConfig>,
    transport: Arc<dyn StreamTransport>,
}

impl TruthClient {
    /// Creates a client using the default `reqwest` transport.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config)?;
        Ok(Self {
            config: Arc::new(config),
            transport: Arc::new(transport),
        })
    }

    /// Creates a client from `TRUTH_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Creates a client with a caller-provided transport.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            transport,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Starts a verification and returns its event stream.
    ///
    /// Fails without producing a stream when the request is invalid or the
    /// server cannot be reached or rejects the request. Once a stream is
    /// returned, every later problem shows up as an `Error` event instead.
    pub async fn check_stream(
        &self,
        request: VerificationRequest,
    ) -> Result<VerificationStream, ClientError> {
        request.validate()?;
        let body = serde_json::to_value(&request)?;
        let url = self.config.stream_url();
        info!(input_type = ?request.input_type, %url, "starting verification stream");
        let bytes = self.transport.open(&url, body).await?;
        Ok(VerificationStream::from_bytes(bytes))
    }

    /// Creates an idle chat channel bound to this client's configuration.
    pub fn chat_channel(&self) -> ChatChannel {
        ChatChannel::new(self.config.as_ref().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::StreamEventKind;
    use crate::transport::ByteStream;
    use bytes::Bytes;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, serde_json::Value)>>,
        lines: Vec<&'static str>,
        refuse: bool,
    }

    #[async_trait::async_trait]
    impl StreamTransport for RecordingTransport {
        async fn open(
            &self,
            url: &str,
            body: serde_json::Value,
        ) -> Result<ByteStream, ClientError> {
            self.calls.lock().push((url.to_string(), body));
            if self.refuse {
                return Err(ClientError::transport("connection refused"));
            }
            let chunks: Vec<Result<Bytes, ClientError>> = self
                .lines
                .iter()
                .map(|line| Ok(Bytes::from(format!("{line}\n"))))
                .collect();
            Ok(Box::pin(futures::stream::iter(chunks)))
        }
    }

    #[tokio::test]
    async fn check_stream_posts_request_to_stream_path() {
        let transport = Arc::new(RecordingTransport {
            lines: vec![r#"{"event":"complete","data":{"label":"TRUE"}}"#],
            ..Default::default()
        });
        let client =
            TruthClient::with_transport(ClientConfig::new("http://api.test"), transport.clone())
                .expect("client");
        let events = client
            .check_stream(VerificationRequest::text("water is wet"))
            .await
            .expect("stream")
            .collect_events()
            .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StreamEventKind::Complete);

        let calls = transport.calls.lock();
        assert_eq!(calls[0].0, "http://api.test/api/truth/check/stream-v2");
        assert_eq!(calls[0].1["input_type"], "text");
    }

    #[tokio::test]
    async fn pre_stream_failure_is_an_error_not_an_event() {
        let transport = Arc::new(RecordingTransport {
            refuse: true,
            ..Default::default()
        });
        let client = TruthClient::with_transport(ClientConfig::new("http://api.test"), transport)
            .expect("client");
        let result = client
            .check_stream(VerificationRequest::text("claim"))
            .await;
        assert!(matches!(result, Err(ClientError::Transport(msg)) if msg.contains("refused")));
    }

    #[tokio::test]
    async fn invalid_request_never_reaches_transport() {
        let transport = Arc::new(RecordingTransport::default());
        let client =
            TruthClient::with_transport(ClientConfig::new("http://api.test"), transport.clone())
                .expect("client");
        let result = client.check_stream(VerificationRequest::text("")).await;
        assert!(matches!(result, Err(ClientError::Validation(_))));
        assert!(transport.calls.lock().is_empty());
    }

    #[test]
    fn new_rejects_invalid_config() {
        assert!(matches!(
            TruthClient::new(ClientConfig::new("api.test")),
            Err(ClientError::Config(_))
        ));
    }
}
