//! Client-side realtime protocol layer for the truth-check service.
//!
//! Two server-driven streams are turned into small, closed event types:
//!
//! - the NDJSON verification stream (`POST /api/truth/check/stream-v2`),
//!   exposed as a one-shot [`VerificationStream`] of [`StreamEvent`]s that
//!   always ends in either one `Complete` or one trailing `Error`;
//! - the issue chat WebSocket, exposed as a [`ChatChannel`] that broadcasts
//!   [`ChatEvent`]s to any number of subscribers.
//!
//! ```no_run
//! use truth_realtime::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = TruthClient::new(ClientConfig::new("https://api.example.com"))?;
//! let mut stream = client
//!     .check_stream(VerificationRequest::text("The Eiffel Tower is in Rome"))
//!     .await?;
//! while let Some(event) = stream.next_event().await {
//!     println!("{:?} step={:?}", event.kind, event.ui_step);
//! }
//! # Ok(())
//! # }
//! ```

/// Issue chat socket: lifecycle, commands, inbound classification.
pub mod chat;
/// Verification client entry point.
pub mod client;
/// Client configuration and endpoint URLs.
pub mod config;
/// Public error type.
pub mod errors;
/// Incremental NDJSON line splitting.
pub mod lines;
/// NDJSON object to `StreamEvent` classification.
pub mod normalize;
/// Tracing subscriber setup.
pub mod observability;
/// Common imports.
pub mod prelude;
/// Verification request, terminal guard and event stream.
pub mod session;
/// Pipeline stage to UI step table.
pub mod stage;
/// Normalized verification events.
pub mod stream;
/// Streaming HTTP transport seam.
pub mod transport;

pub use chat::{
    ChatChannel, ChatEvent, ChatJoin, ChatMessageDraft, ChatSubscription, ConnectionState,
    ServerEvent, ServerEventType,
};
pub use client::TruthClient;
pub use config::ClientConfig;
pub use errors::ClientError;
pub use normalize::normalize_event;
pub use session::{
    InputType, TerminalGuard, VerificationOutcome, VerificationRequest, VerificationStream,
};
pub use stage::{UI_STEP_COUNT, UiStep, ui_step_for_stage};
pub use stream::{StreamEvent, StreamEventKind};
pub use transport::{ByteStream, ReqwestTransport, StreamTransport};
