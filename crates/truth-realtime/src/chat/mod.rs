//! Realtime issue chat over a WebSocket.
//!
//! One `ChatChannel` owns at most one socket at a time. Inbound frames and
//! lifecycle changes are broadcast to every subscriber; outbound commands are
//! queued to the socket task and never wait for an acknowledgement.

mod protocol;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use futures::{SinkExt as _, StreamExt as _};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::errors::ClientError;

pub use protocol::{
    ChatEvent, ChatJoin, ChatMessageDraft, ClientCommand, InboundFrame, RawFrame, ServerEvent,
    ServerEventType, classify_frame, classify_value,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection lifecycle of a chat channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Never connected.
    Idle,
    Connecting,
    Open,
    /// Disconnected locally, closed by the peer, or failed.
    Closed,
}

struct Connection {
    generation: u64,
    issue_id: String,
    outbound: mpsc::UnboundedSender<String>,
}

struct ChannelInner {
    config: ClientConfig,
    events: broadcast::Sender<ChatEvent>,
    state: watch::Sender<ConnectionState>,
    connection: Mutex<Option<Connection>>,
    epoch: AtomicU64,
}

impl ChannelInner {
    fn emit(&self, event: ChatEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Emits inbound events only while `generation` owns the connection.
    ///
    /// Returns false once the slot belongs to someone else.
    fn emit_current(&self, generation: u64, events: Vec<ChatEvent>) -> bool {
        let slot = self.connection.lock();
        if !slot.as_ref().is_some_and(|c| c.generation == generation) {
            return false;
        }
        for event in events {
            self.emit(event);
        }
        true
    }

    /// Emits a terminal lifecycle event and drops the connection, if it
    /// still belongs to `generation`.
    fn fail(&self, generation: u64, event: ChatEvent) {
        let mut slot = self.connection.lock();
        if !slot.as_ref().is_some_and(|c| c.generation == generation) {
            return;
        }
        self.emit(event);
        *slot = None;
        self.set_state(ConnectionState::Closed);
    }
}

/// Broadcast subscription to a chat channel.
pub struct ChatSubscription {
    rx: broadcast::Receiver<ChatEvent>,
}

impl ChatSubscription {
    /// Waits for the next event.
    ///
    /// A subscriber that falls behind the broadcast buffer skips the missed
    /// events. Returns `None` once the channel is gone.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "chat subscriber lagged; events dropped for this subscriber");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Duplex chat channel for one issue at a time.
#[derive(Clone)]
pub struct ChatChannel {
    inner: Arc<ChannelInner>,
}

impl ChatChannel {
    /// Creates an idle channel.
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(config.chat_event_capacity.max(1));
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                events,
                state,
                connection: Mutex::new(None),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Subscribes to every event emitted from now on.
    pub fn subscribe(&self) -> ChatSubscription {
        ChatSubscription {
            rx: self.inner.events.subscribe(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Watches connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Issue of the open connection, if any.
    pub fn issue_id(&self) -> Option<String> {
        self.inner
            .connection
            .lock()
            .as_ref()
            .map(|c| c.issue_id.clone())
    }

    /// Opens the socket for an issue and joins it.
    ///
    /// Any existing connection is dropped first. `url` overrides the socket
    /// URL derived from the configuration.
    pub async fn connect(&self, join: ChatJoin, url: Option<&str>) -> Result<(), ClientError> {
        self.disconnect();
        for (field, value) in [
            ("issue_id", &join.issue_id),
            ("user_id", &join.user_id),
            ("nickname", &join.nickname),
        ] {
            if value.trim().is_empty() {
                return Err(ClientError::validation(format!("{field} must not be empty")));
            }
        }

        let url = url
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| self.inner.config.chat_url(&join.issue_id));
        let generation = self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.set_state(ConnectionState::Connecting);
        self.inner.emit(ChatEvent::Connecting { url: url.clone() });
        info!(issue_id = %join.issue_id, %url, "connecting chat socket");

        let timeout = self.inner.config.connect_timeout;
        let opened =
            tokio::time::timeout(timeout, tokio_tungstenite::connect_async(url.as_str())).await;
        let socket = match opened {
            Ok(Ok((socket, _response))) => socket,
            Ok(Err(e)) => {
                return Err(self.connect_failed(generation, ClientError::transport(e.to_string())));
            }
            Err(_) => return Err(self.connect_failed(generation, ClientError::Timeout(timeout))),
        };
        let join_frame = ClientCommand::join(&join, Utc::now()).encode()?;
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        {
            let mut slot = self.inner.connection.lock();
            if self.inner.epoch.load(Ordering::SeqCst) != generation {
                debug!(issue_id = %join.issue_id, "chat connect superseded while opening");
                return Err(ClientError::transport(
                    "connect superseded by disconnect or reconnect",
                ));
            }
            *slot = Some(Connection {
                generation,
                issue_id: join.issue_id.clone(),
                outbound: outbound.clone(),
            });
            self.inner.set_state(ConnectionState::Open);
            self.inner.emit(ChatEvent::Open);
        }
        // Queued before the task starts, so join is always the first frame.
        let _ = outbound.send(join_frame);

        tokio::spawn(run_socket(
            Arc::downgrade(&self.inner),
            generation,
            socket,
            outbound_rx,
        ));
        Ok(())
    }

    fn connect_failed(&self, generation: u64, err: ClientError) -> ClientError {
        warn!(error = %err, "chat socket failed to open");
        if self.inner.epoch.load(Ordering::SeqCst) == generation {
            let message = match &err {
                ClientError::Transport(message) => message.clone(),
                other => other.to_string(),
            };
            self.inner.emit(ChatEvent::ConnectionError { message });
            self.inner.set_state(ConnectionState::Closed);
        }
        err
    }

    /// Sends a chat message. Delivery is confirmed later by `message.ack`.
    pub fn send_message(&self, draft: ChatMessageDraft) -> Result<(), ClientError> {
        self.send(ClientCommand::message(draft, Utc::now()))
    }

    /// Toggles the caller's reaction on a message.
    pub fn toggle_reaction(
        &self,
        issue_id: &str,
        message_id: &str,
        user_id: &str,
    ) -> Result<(), ClientError> {
        self.send(ClientCommand::reaction(
            issue_id,
            message_id,
            user_id,
            Utc::now(),
        ))
    }

    fn send(&self, command: ClientCommand) -> Result<(), ClientError> {
        let frame = command.encode()?;
        let slot = self.inner.connection.lock();
        let connection = slot.as_ref().ok_or(ClientError::NotConnected)?;
        debug!(command = command.type_name(), "queueing chat command");
        connection
            .outbound
            .send(frame)
            .map_err(|_| ClientError::NotConnected)
    }

    /// Closes the socket and stops delivering inbound frames.
    ///
    /// Emits no event. Safe to call repeatedly or before any `connect`.
    pub fn disconnect(&self) {
        let mut slot = self.inner.connection.lock();
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(connection) = slot.take() {
            info!(issue_id = %connection.issue_id, "disconnecting chat socket");
        }
        if self.state() != ConnectionState::Idle {
            self.inner.set_state(ConnectionState::Closed);
        }
    }
}

async fn run_socket(
    inner: Weak<ChannelInner>,
    generation: u64,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let (mut sink, mut source) = socket.split();
    loop {
        tokio::select! {
            biased;
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame)).await {
                        if let Some(inner) = inner.upgrade() {
                            inner.fail(generation, ChatEvent::ConnectionError { message: e.to_string() });
                        }
                        return;
                    }
                }
                None => {
                    // Sender dropped by disconnect or channel drop.
                    let _ = sink.close().await;
                    debug!(generation, "chat socket closed locally");
                    return;
                }
            },
            message = source.next() => {
                let Some(inner) = inner.upgrade() else {
                    return;
                };
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if !inner.emit_current(generation, classify_frame(InboundFrame::Text(text))) {
                            return;
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        if !inner.emit_current(generation, classify_frame(InboundFrame::Binary(bytes))) {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (
                                Some(u16::from(frame.code)),
                                Some(frame.reason.into_owned()).filter(|r| !r.is_empty()),
                            ),
                            None => (None, None),
                        };
                        info!(generation, ?code, "chat socket closed by peer");
                        inner.fail(generation, ChatEvent::ConnectionClosed { code, reason });
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(generation, error = %e, "chat socket error");
                        inner.fail(generation, ChatEvent::ConnectionError { message: e.to_string() });
                        return;
                    }
                    None => {
                        inner.fail(generation, ChatEvent::ConnectionClosed { code: None, reason: None });
                        return;
                    }
                }
            }
        }
    }
}
