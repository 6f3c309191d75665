use std::collections::VecDeque;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::StreamExt as _;
use futures::stream;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::ClientError;
use crate::lines::LineDecoder;
use crate::normalize::normalize_event;
use crate::stream::{StreamEvent, StreamEventKind};

/// Kind of input submitted for verification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// Free-form claim text.
    Text,
    /// Article or post URL.
    Url,
}

/// Body of a verification request.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VerificationRequest {
    pub input: String,
    pub input_type: InputType,
}

impl VerificationRequest {
    /// Requests verification of a claim.
    pub fn text(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            input_type: InputType::Text,
        }
    }

    /// Requests verification of the content behind a URL.
    pub fn url(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            input_type: InputType::Url,
        }
    }

    /// Picks `Url` when the trimmed input is an http(s) URL, `Text` otherwise.
    pub fn infer(input: impl Into<String>) -> Self {
        let input = input.into();
        if looks_like_url(input.trim()) {
            Self::url(input.trim())
        } else {
            Self::text(input)
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        let input = self.input.trim();
        if input.is_empty() {
            return Err(ClientError::validation("input must not be empty"));
        }
        if self.input_type == InputType::Url && !looks_like_url(input) {
            return Err(ClientError::validation(format!(
                "input_type is url but `{input}` is not an http(s) URL"
            )));
        }
        Ok(())
    }
}

fn looks_like_url(input: &str) -> bool {
    (input.starts_with("http://") || input.starts_with("https://")) && !input.contains(' ')
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GuardState {
    Open,
    Terminated,
}

/// Enforces the terminal outcome of a verification stream.
///
/// At most one `Complete` event passes through. When the stream ends without
/// one, `terminate` yields exactly one synthesized `Error`. Once terminated,
/// nothing else is admitted.
#[derive(Debug)]
pub struct TerminalGuard {
    state: GuardState,
    completion_observed: bool,
}

impl Default for TerminalGuard {
    fn default() -> Self {
        Self {
            state: GuardState::Open,
            completion_observed: false,
        }
    }
}

impl TerminalGuard {
    /// Passes an event through, or drops it when it would break the invariant.
    pub fn admit(&mut self, event: StreamEvent) -> Option<StreamEvent> {
        if self.state == GuardState::Terminated {
            return None;
        }
        if event.kind == StreamEventKind::Complete {
            if self.completion_observed {
                debug!("dropping duplicate complete event");
                return None;
            }
            self.completion_observed = true;
        }
        Some(event)
    }

    /// Closes the guard at end of stream.
    ///
    /// Returns the synthesized error when no `Complete` was observed. Calling
    /// it again returns `None`.
    pub fn terminate(&mut self, reason: Option<&str>) -> Option<StreamEvent> {
        if self.state == GuardState::Terminated {
            return None;
        }
        self.state = GuardState::Terminated;
        if self.completion_observed {
            None
        } else {
            Some(StreamEvent::stream_ended_early(reason))
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state == GuardState::Terminated
    }

    pub fn completion_observed(&self) -> bool {
        self.completion_observed
    }
}

/// Parses one NDJSON line into an object, or `None` when it must be skipped.
pub(crate) fn parse_line(line: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => Some(object),
        Ok(other) => {
            debug!(kind = json_kind(&other), "skipping non-object NDJSON line");
            None
        }
        Err(e) => {
            debug!(error = %e, len = line.len(), "skipping malformed NDJSON line");
            None
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Turns an ordered byte stream into normalized events with the terminal
/// invariant applied.
///
/// A read error ends the sequence the same way end-of-stream does.
pub fn decode_event_stream<S, E>(bytes: S) -> impl futures::Stream<Item = StreamEvent> + Send
where
    S: futures::Stream<Item = Result<bytes::Bytes, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
{
    struct State<S> {
        bytes: S,
        decoder: LineDecoder,
        guard: TerminalGuard,
        pending: VecDeque<StreamEvent>,
    }

    impl<S> State<S> {
        fn accept_line(&mut self, line: &str) {
            let Some(object) = parse_line(line) else {
                return;
            };
            let event = normalize_event(&object);
            debug!(event = %event.event, stage = ?event.stage, "verification event");
            if let Some(event) = self.guard.admit(event) {
                self.pending.push_back(event);
            }
        }

        fn end(&mut self, reason: Option<&str>) {
            if let Some(line) = self.decoder.finish() {
                self.accept_line(&line);
            }
            if let Some(event) = self.guard.terminate(reason) {
                warn!(reason = reason.unwrap_or("eof"), "stream ended without complete event");
                self.pending.push_back(event);
            }
        }
    }

    stream::unfold(
        State {
            bytes,
            decoder: LineDecoder::default(),
            guard: TerminalGuard::default(),
            pending: VecDeque::new(),
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Some((event, state));
                }
                if state.guard.is_terminated() {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        for line in state.decoder.push_chunk(&chunk) {
                            state.accept_line(&line);
                        }
                    }
                    Some(Err(e)) => {
                        let reason = e.to_string();
                        state.end(Some(&reason));
                    }
                    None => state.end(None),
                }
            }
        },
    )
}

/// Final result of a drained verification stream.
#[derive(Clone, Debug, PartialEq)]
pub enum VerificationOutcome {
    /// The `complete` event.
    Completed(StreamEvent),
    /// The terminal synthesized error.
    Failed(StreamEvent),
}

impl VerificationOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn event(&self) -> &StreamEvent {
        match self {
            Self::Completed(event) | Self::Failed(event) => event,
        }
    }
}

/// One-shot sequence of verification events.
///
/// Events arrive in wire order. The sequence always ends in exactly one of
/// two ways: it contained one `Complete` event, or its last element is a
/// synthesized `Error`. It cannot be restarted; open a new stream to retry.
pub struct VerificationStream {
    inner: Pin<Box<dyn futures::Stream<Item = StreamEvent> + Send>>,
}

impl VerificationStream {
    /// Wraps an already-open byte stream.
    pub fn from_bytes<S, E>(bytes: S) -> Self
    where
        S: futures::Stream<Item = Result<bytes::Bytes, E>> + Send + Unpin + 'static,
        E: fmt::Display + Send + 'static,
    {
        Self {
            inner: Box::pin(decode_event_stream(bytes)),
        }
    }

    /// Waits for the next event; `None` once the sequence has ended.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.inner.next().await
    }

    /// Drains the sequence into a vector.
    pub async fn collect_events(self) -> Vec<StreamEvent> {
        self.inner.collect().await
    }

    /// Drains the sequence and returns its terminal outcome.
    pub async fn finish(mut self) -> VerificationOutcome {
        let mut completed = None;
        let mut last = None;
        while let Some(event) = self.inner.next().await {
            if event.kind == StreamEventKind::Complete {
                completed = Some(event);
            } else {
                last = Some(event);
            }
        }
        match (completed, last) {
            (Some(event), _) => VerificationOutcome::Completed(event),
            (None, Some(event)) => VerificationOutcome::Failed(event),
            // decode_event_stream never ends without yielding an event.
            (None, None) => VerificationOutcome::Failed(StreamEvent::stream_ended_early(None)),
        }
    }
}

impl futures::Stream for VerificationStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn chunks(parts: &[&str]) -> Vec<Result<Bytes, String>> {
        parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect()
    }

    async fn decode(items: Vec<Result<Bytes, String>>) -> Vec<StreamEvent> {
        VerificationStream::from_bytes(stream::iter(items))
            .collect_events()
            .await
    }

    #[test]
    fn guard_synthesizes_error_only_without_completion() {
        let mut guard = TerminalGuard::default();
        let error = guard.terminate(None).expect("synthesized error");
        assert_eq!(error.kind, StreamEventKind::Error);
        assert!(guard.terminate(None).is_none());

        let mut guard = TerminalGuard::default();
        let complete = StreamEvent::new("complete", Map::new());
        assert!(guard.admit(complete.clone()).is_some());
        assert!(guard.completion_observed());
        assert!(guard.admit(complete).is_none());
        assert!(guard.terminate(None).is_none());
        assert!(guard.is_terminated());
        assert!(
            guard
                .admit(StreamEvent::new("heartbeat", Map::new()))
                .is_none()
        );
    }

    #[tokio::test]
    async fn events_survive_arbitrary_chunking() {
        let events = decode(chunks(&[
            "{\"event\":\"stream_open\",\"trace_id\":\"t1\"}\n{\"ev",
            "ent\":\"heartbeat\",\"current_stage\":\"stage08_aggregate\",\"idle_ms\":2100}",
            "\n{\"event\":\"complete\",\"data\":{\"label\":\"TRUE\",\"confidence\":0.9}}\n",
        ]))
        .await;
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StreamEventKind::StreamOpen,
                StreamEventKind::Heartbeat,
                StreamEventKind::Complete
            ]
        );
        assert_eq!(events[1].ui_step, Some(4));
    }

    #[tokio::test]
    async fn malformed_and_non_object_lines_are_skipped() {
        let events = decode(chunks(&[
            "{\"event\":\"stage_complete\",\"stage\":\"stage02_querygen\"}\n",
            "{not json\n",
            "[1,2,3]\n",
            "{\"event\":\"complete\",\"data\":{\"label\":\"TRUE\",\"confidence\":0.9}}\n",
        ]))
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].label(), Some("TRUE"));
    }

    #[tokio::test]
    async fn line_with_invalid_utf8_is_skipped() {
        let items = vec![
            Ok(Bytes::from_static(
                b"{\"event\":\"stage_complete\",\"stage\":\"stage03_\xff\"}\n",
            )),
            Ok(Bytes::from_static(
                b"{\"event\":\"complete\",\"data\":{\"label\":\"TRUE\"}}\n",
            )),
        ];
        let events = decode(items).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StreamEventKind::Complete);
    }

    #[tokio::test]
    async fn missing_completion_appends_one_error() {
        let events = decode(chunks(&[
            "{\"event\":\"stage_complete\",\"stage\":\"stage01_normalize\"}\n",
        ]))
        .await;
        assert_eq!(events.len(), 2);
        let last = events.last().expect("last");
        assert_eq!(last.kind, StreamEventKind::Error);
        assert!(last.message().expect("message").contains("complete"));
    }

    #[tokio::test]
    async fn server_error_does_not_end_the_session() {
        let events = decode(chunks(&[
            "{\"event\":\"error\",\"data\":{\"stage\":\"stage04_score\",\"message\":\"retrying\"}}\n",
            "{\"event\":\"complete\",\"data\":{\"label\":\"MIXED\"}}\n",
        ]))
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, StreamEventKind::Error);
        assert!(!events[0].is_synthetic());
        assert_eq!(events[1].kind, StreamEventKind::Complete);
    }

    #[tokio::test]
    async fn read_error_after_partial_data_terminates_with_reason() {
        let items = vec![
            Ok(Bytes::from_static(b"{\"event\":\"stream_open\"}\n")),
            Err("connection reset".to_string()),
            Ok(Bytes::from_static(b"{\"event\":\"complete\"}\n")),
        ];
        let events = decode(items).await;
        assert_eq!(events.len(), 2);
        let message = events[1].message().expect("message");
        assert!(message.contains("connection reset"));
    }

    #[tokio::test]
    async fn unterminated_final_line_is_still_parsed() {
        let events = decode(chunks(&["{\"event\":\"complete\",\"data\":{}}"])).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, StreamEventKind::Complete);
    }

    #[tokio::test]
    async fn duplicate_complete_is_dropped() {
        let events = decode(chunks(&[
            "{\"event\":\"complete\",\"data\":{\"label\":\"TRUE\"}}\n",
            "{\"event\":\"complete\",\"data\":{\"label\":\"FALSE\"}}\n",
        ]))
        .await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label(), Some("TRUE"));
    }

    #[tokio::test]
    async fn finish_reports_outcome() {
        let stream = VerificationStream::from_bytes(stream::iter(chunks(&[
            "{\"event\":\"complete\",\"data\":{\"label\":\"UNVERIFIED\"}}\n",
            "{\"event\":\"heartbeat\"}\n",
        ])));
        let outcome = stream.finish().await;
        assert!(outcome.is_completed());
        assert_eq!(outcome.event().label(), Some("UNVERIFIED"));

        let stream = VerificationStream::from_bytes(stream::iter(chunks(&[])));
        let outcome = stream.finish().await;
        assert!(!outcome.is_completed());
        assert!(outcome.event().is_synthetic());
    }

    #[test]
    fn request_serializes_input_type_lowercase() {
        let body = serde_json::to_value(VerificationRequest::url("https://news.example/a"))
            .expect("serialize");
        assert_eq!(
            body,
            serde_json::json!({"input": "https://news.example/a", "input_type": "url"})
        );
    }

    #[test]
    fn infer_detects_urls() {
        assert_eq!(
            VerificationRequest::infer("  https://news.example/a ").input_type,
            InputType::Url
        );
        assert_eq!(
            VerificationRequest::infer("The moon is made of cheese").input_type,
            InputType::Text
        );
    }

    #[test]
    fn validate_rejects_empty_and_mismatched_input() {
        assert!(matches!(
            VerificationRequest::text("   ").validate(),
            Err(ClientError::Validation(_))
        ));
        assert!(matches!(
            VerificationRequest::url("not a url").validate(),
            Err(ClientError::Validation(msg)) if msg.contains("not an http(s) URL")
        ));
        assert!(VerificationRequest::text("claim").validate().is_ok());
    }
}
