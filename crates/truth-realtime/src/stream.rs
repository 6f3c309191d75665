use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Closed set of verification event kinds.
///
/// The kind is a pure function of the raw `event` name. Names this client
/// does not know map to `Unknown`; the raw name stays on the event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    /// `stream_open`: the pipeline accepted the request.
    StreamOpen,
    /// `heartbeat`: periodic liveness/progress signal.
    Heartbeat,
    /// `stage_complete`: one pipeline stage finished.
    StageComplete,
    /// `complete`: final verdict.
    Complete,
    /// `error`: server-reported or locally synthesized failure.
    Error,
    /// Any other event name.
    Unknown,
}

impl StreamEventKind {
    /// Classifies a raw event name.
    pub fn from_name(name: &str) -> Self {
        match name {
            "stream_open" => Self::StreamOpen,
            "heartbeat" => Self::Heartbeat,
            "stage_complete" => Self::StageComplete,
            "complete" => Self::Complete,
            "error" => Self::Error,
            _ => Self::Unknown,
        }
    }

    /// Wire name for known kinds.
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::StreamOpen => Some("stream_open"),
            Self::Heartbeat => Some("heartbeat"),
            Self::StageComplete => Some("stage_complete"),
            Self::Complete => Some("complete"),
            Self::Error => Some("error"),
            Self::Unknown => None,
        }
    }
}

/// Normalized verification progress event.
#[derive(Clone, Debug, PartialEq)]
pub struct StreamEvent {
    pub kind: StreamEventKind,
    /// Raw `event` field as sent by the server.
    pub event: String,
    pub trace_id: Option<String>,
    /// Raw backend stage identifier.
    pub stage: Option<String>,
    pub ui_step: Option<u8>,
    pub ui_step_title: Option<String>,
    pub idle_ms: Option<u64>,
    pub server_ts: Option<DateTime<Utc>>,
    /// Nested `data` object when the payload has one, otherwise the payload.
    pub data: Map<String, Value>,
}

impl StreamEvent {
    /// Creates an event with only the name and data set.
    pub fn new(event: impl Into<String>, data: Map<String, Value>) -> Self {
        let event = event.into();
        Self {
            kind: StreamEventKind::from_name(&event),
            event,
            trace_id: None,
            stage: None,
            ui_step: None,
            ui_step_title: None,
            idle_ms: None,
            server_ts: None,
            data,
        }
    }

    /// Terminal error appended when the stream ends without a `complete`.
    pub fn stream_ended_early(reason: Option<&str>) -> Self {
        let message = match reason {
            Some(reason) => {
                format!("stream ended before the complete event was received: {reason}")
            }
            None => "stream ended before the complete event was received".to_string(),
        };
        let mut data = Map::new();
        data.insert("message".into(), Value::String(message));
        data.insert("synthetic".into(), Value::Bool(true));
        Self::new("error", data)
    }

    /// True for `Complete` and `Error`, the kinds a UI treats as end-of-attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            StreamEventKind::Complete | StreamEventKind::Error
        )
    }

    /// True when the event was generated locally rather than sent by the server.
    pub fn is_synthetic(&self) -> bool {
        self.data.get("synthetic").and_then(Value::as_bool) == Some(true)
    }

    /// Human-readable message carried in `data.message`.
    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    /// Verdict label of a `complete` event (`TRUE`, `FALSE`, `MIXED`, `UNVERIFIED`).
    pub fn label(&self) -> Option<&str> {
        self.data.get("label").and_then(Value::as_str)
    }

    /// Verdict confidence of a `complete` event, in `0..=1`.
    pub fn confidence(&self) -> Option<f64> {
        self.data.get("confidence").and_then(Value::as_f64)
    }
}
