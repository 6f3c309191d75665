//! Common imports for typical client usage.
pub use crate::{
    ChatChannel, ChatEvent, ChatJoin, ChatMessageDraft, ClientConfig, ClientError,
    ConnectionState, StreamEvent, StreamEventKind, TruthClient, VerificationOutcome,
    VerificationRequest, VerificationStream,
};
