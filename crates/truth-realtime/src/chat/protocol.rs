//! Wire format of the issue chat socket.
//!
//! Outbound frames are typed commands. Inbound frames are loosely shaped:
//! objects or arrays of objects that usually, but not always, carry a `type`
//! discriminator. Classification never drops a frame.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::errors::ClientError;

/// Parameters of the initial join command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatJoin {
    pub issue_id: String,
    pub user_id: String,
    pub nickname: String,
    pub token: Option<String>,
}

impl ChatJoin {
    pub fn new(
        issue_id: impl Into<String>,
        user_id: impl Into<String>,
        nickname: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            user_id: user_id.into(),
            nickname: nickname.into(),
            token: None,
        }
    }

    /// Attaches an access token to the join command.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

/// Outgoing chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessageDraft {
    pub issue_id: String,
    /// Client-generated id used to match the later `message.ack`.
    pub client_id: String,
    pub user_id: String,
    pub nickname: String,
    pub content: String,
    /// Defaults to the send time when unset.
    pub sent_at: Option<DateTime<Utc>>,
}

impl ChatMessageDraft {
    /// Creates a draft with a fresh random client id.
    pub fn new(
        issue_id: impl Into<String>,
        user_id: impl Into<String>,
        nickname: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            issue_id: issue_id.into(),
            client_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            nickname: nickname.into(),
            content: content.into(),
            sent_at: None,
        }
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    pub fn sent_at(mut self, sent_at: DateTime<Utc>) -> Self {
        self.sent_at = Some(sent_at);
        self
    }
}

/// Command frames written to the socket.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    #[serde(rename = "join", rename_all = "camelCase")]
    Join {
        issue_id: String,
        user_id: String,
        nickname: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        sent_at: DateTime<Utc>,
    },
    #[serde(rename = "message.create", rename_all = "camelCase")]
    MessageCreate {
        issue_id: String,
        client_id: String,
        user_id: String,
        nickname: String,
        content: String,
        sent_at: DateTime<Utc>,
    },
    #[serde(rename = "reaction.toggle", rename_all = "camelCase")]
    ReactionToggle {
        issue_id: String,
        message_id: String,
        user_id: String,
        sent_at: DateTime<Utc>,
    },
}

impl ClientCommand {
    pub fn join(join: &ChatJoin, sent_at: DateTime<Utc>) -> Self {
        Self::Join {
            issue_id: join.issue_id.clone(),
            user_id: join.user_id.clone(),
            nickname: join.nickname.clone(),
            token: join.token.clone(),
            sent_at,
        }
    }

    pub fn message(draft: ChatMessageDraft, now: DateTime<Utc>) -> Self {
        Self::MessageCreate {
            issue_id: draft.issue_id,
            client_id: draft.client_id,
            user_id: draft.user_id,
            nickname: draft.nickname,
            content: draft.content,
            sent_at: draft.sent_at.unwrap_or(now),
        }
    }

    pub fn reaction(
        issue_id: impl Into<String>,
        message_id: impl Into<String>,
        user_id: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self::ReactionToggle {
            issue_id: issue_id.into(),
            message_id: message_id.into(),
            user_id: user_id.into(),
            sent_at,
        }
    }

    /// Wire name of the command.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::MessageCreate { .. } => "message.create",
            Self::ReactionToggle { .. } => "reaction.toggle",
        }
    }

    /// Encodes the command as a JSON text frame.
    pub fn encode(&self) -> Result<String, ClientError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Known inbound discriminators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerEventType {
    MessageCreated,
    MessageAck,
    ReactionUpdated,
    Presence,
    Error,
    /// A discriminator this client does not know yet.
    Other,
}

impl ServerEventType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "message.created" => Self::MessageCreated,
            "message.ack" => Self::MessageAck,
            "reaction.updated" => Self::ReactionUpdated,
            "presence" => Self::Presence,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// Inbound object with a `type` discriminator, forwarded as received.
#[derive(Clone, Debug, PartialEq)]
pub struct ServerEvent {
    pub event_type: String,
    pub payload: Map<String, Value>,
}

impl ServerEvent {
    pub fn kind(&self) -> ServerEventType {
        ServerEventType::from_name(&self.event_type)
    }

    /// Wrapped message object of a `message.created` event.
    ///
    /// Falls back to the payload itself for servers that send the message
    /// fields at the top level.
    pub fn message(&self) -> Option<&Map<String, Value>> {
        if self.kind() != ServerEventType::MessageCreated {
            return None;
        }
        self.payload
            .get("message")
            .and_then(Value::as_object)
            .or(Some(&self.payload))
    }
}

/// Inbound content that could not be classified.
#[derive(Clone, Debug, PartialEq)]
pub enum RawFrame {
    /// Text frame that is not JSON.
    Text(String),
    /// Binary frame that is not JSON.
    Binary(Vec<u8>),
    /// Valid JSON without a recognizable shape.
    Json(Value),
}

/// Everything a chat subscriber can observe.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    /// Emitted as soon as `connect` starts.
    Connecting { url: String },
    /// Socket handshake finished.
    Open,
    /// Socket-level failure; the channel disconnects right after.
    ConnectionError { message: String },
    /// Socket closed by the peer; the channel disconnects right after.
    ConnectionClosed {
        code: Option<u16>,
        reason: Option<String>,
    },
    Server(ServerEvent),
    Raw(RawFrame),
}

/// Undecoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// Decodes and classifies one inbound frame.
///
/// A JSON array yields one event per element; anything undecodable yields a
/// single `Raw` event carrying the original content.
pub fn classify_frame(frame: InboundFrame) -> Vec<ChatEvent> {
    let decoded = match &frame {
        InboundFrame::Text(text) => serde_json::from_str::<Value>(text),
        InboundFrame::Binary(bytes) => serde_json::from_slice::<Value>(bytes),
    };
    match decoded {
        Ok(Value::Array(items)) => items.into_iter().map(classify_value).collect(),
        Ok(value) => vec![classify_value(value)],
        Err(_) => {
            let raw = match frame {
                InboundFrame::Text(text) => RawFrame::Text(text),
                InboundFrame::Binary(bytes) => RawFrame::Binary(bytes),
            };
            vec![ChatEvent::Raw(raw)]
        }
    }
}

/// Classifies one decoded JSON value.
///
/// Objects with a string `type` are forwarded verbatim. Objects without one
/// but with both `content` and `userId` are treated as a newly created
/// message and wrapped as `{"type": "message.created", "message": {...}}`.
/// Everything else is raw.
pub fn classify_value(value: Value) -> ChatEvent {
    let Value::Object(object) = value else {
        return ChatEvent::Raw(RawFrame::Json(value));
    };
    if let Some(event_type) = object.get("type").and_then(Value::as_str) {
        return ChatEvent::Server(ServerEvent {
            event_type: event_type.to_string(),
            payload: object,
        });
    }
    if object.contains_key("content") && object.contains_key("userId") {
        let mut payload = Map::new();
        payload.insert("type".into(), Value::String("message.created".into()));
        payload.insert("message".into(), Value::Object(object));
        return ChatEvent::Server(ServerEvent {
            event_type: "message.created".into(),
            payload,
        });
    }
    ChatEvent::Raw(RawFrame::Json(Value::Object(object)))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 6, 10, 0, 0).unwrap()
    }

    #[test]
    fn join_encodes_camel_case_and_omits_missing_token() {
        let join = ChatJoin::new("issue-1", "u1", "neo");
        let value: Value =
            serde_json::from_str(&ClientCommand::join(&join, ts()).encode().unwrap()).unwrap();
        assert_eq!(value["type"], "join");
        assert_eq!(value["issueId"], "issue-1");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["nickname"], "neo");
        assert_eq!(value["sentAt"], "2026-02-06T10:00:00Z");
        assert!(value.get("token").is_none());

        let with_token = ClientCommand::join(&join.token("tk"), ts());
        let value = serde_json::to_value(&with_token).unwrap();
        assert_eq!(value["token"], "tk");
    }

    #[test]
    fn message_and_reaction_commands_use_dotted_types() {
        let draft = ChatMessageDraft::new("i1", "u1", "neo", "hello").client_id("c-1");
        let value = serde_json::to_value(ClientCommand::message(draft, ts())).unwrap();
        assert_eq!(value["type"], "message.create");
        assert_eq!(value["clientId"], "c-1");
        assert_eq!(value["content"], "hello");

        let reaction = ClientCommand::reaction("i1", "m9", "u1", ts());
        assert_eq!(reaction.type_name(), "reaction.toggle");
        let value = serde_json::to_value(&reaction).unwrap();
        assert_eq!(value["messageId"], "m9");
    }

    #[test]
    fn explicit_sent_at_is_kept() {
        let earlier = Utc.with_ymd_and_hms(2026, 2, 6, 9, 0, 0).unwrap();
        let draft = ChatMessageDraft::new("i1", "u1", "neo", "hi").sent_at(earlier);
        match ClientCommand::message(draft, ts()) {
            ClientCommand::MessageCreate { sent_at, .. } => assert_eq!(sent_at, earlier),
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn drafts_get_distinct_client_ids() {
        let a = ChatMessageDraft::new("i", "u", "n", "x");
        let b = ChatMessageDraft::new("i", "u", "n", "x");
        assert_ne!(a.client_id, b.client_id);
    }

    #[test]
    fn typed_object_is_forwarded_verbatim() {
        let events = classify_frame(InboundFrame::Text(
            r#"{"type":"reaction.updated","messageId":"m1","count":3}"#.into(),
        ));
        assert_eq!(events.len(), 1);
        let ChatEvent::Server(event) = &events[0] else {
            panic!("expected server event");
        };
        assert_eq!(event.kind(), ServerEventType::ReactionUpdated);
        assert_eq!(event.payload["count"], 3);
    }

    #[test]
    fn content_and_user_id_object_becomes_message_created() {
        let event = classify_value(serde_json::json!({"content": "hi", "userId": "u2"}));
        let ChatEvent::Server(event) = event else {
            panic!("expected server event");
        };
        assert_eq!(event.kind(), ServerEventType::MessageCreated);
        let message = event.message().expect("wrapped message");
        assert_eq!(message["content"], "hi");
        assert_eq!(message["userId"], "u2");
    }

    #[test]
    fn object_missing_user_id_is_raw() {
        let event = classify_value(serde_json::json!({"content": "hi"}));
        assert!(matches!(event, ChatEvent::Raw(RawFrame::Json(_))));
    }

    #[test]
    fn array_elements_are_classified_independently() {
        let events = classify_frame(InboundFrame::Binary(
            br#"[{"type":"presence","count":4},{"content":"a","userId":"u"},7]"#.to_vec(),
        ));
        assert_eq!(events.len(), 3);
        assert!(
            matches!(&events[0], ChatEvent::Server(e) if e.kind() == ServerEventType::Presence)
        );
        assert!(
            matches!(&events[1], ChatEvent::Server(e) if e.kind() == ServerEventType::MessageCreated)
        );
        assert!(matches!(&events[2], ChatEvent::Raw(RawFrame::Json(v)) if v == &serde_json::json!(7)));
    }

    #[test]
    fn undecodable_frames_are_surfaced_raw() {
        assert_eq!(
            classify_frame(InboundFrame::Text("pong".into())),
            vec![ChatEvent::Raw(RawFrame::Text("pong".into()))]
        );
        assert_eq!(
            classify_frame(InboundFrame::Binary(vec![0xff, 0x00])),
            vec![ChatEvent::Raw(RawFrame::Binary(vec![0xff, 0x00]))]
        );
    }

    #[test]
    fn unknown_discriminator_is_still_forwarded() {
        let event = classify_value(serde_json::json!({"type": "typing", "userId": "u"}));
        assert!(matches!(event, ChatEvent::Server(e) if e.kind() == ServerEventType::Other));
    }
}
