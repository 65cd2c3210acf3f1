use crate::transport::centrifugo::protocol::{self, ALREADY_SUBSCRIBED, Command, Method, Reply};
use crate::transport::{ConnectionId, EventSender, TransportEvent, TransportEventKind};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::timeout;
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub client_name: String,
    pub retry_ms: u64,
    pub retry_max_delay: Duration,
    pub stale_connection_timeout: Duration,
}

#[derive(Debug)]
pub enum SessionCommand {
    Subscribe(String),
    Unsubscribe(String),
    Publish { channel: String, data: Value },
    Token(String),
    Close,
}

#[derive(Debug)]
enum Pending {
    Connect,
    Subscribe(String),
    Unsubscribe(String),
    Publish(String),
}

#[derive(Debug, PartialEq)]
enum Flow {
    Continue,
    Close,
}

// Survives reconnects, the channel set is replayed after every handshake
#[derive(Debug)]
struct SessionState {
    commands: UnboundedReceiver<SessionCommand>,
    token: String,
    channels: BTreeSet<String>,
    pending: HashMap<u32, Pending>,
    last_id: u32,
    connected: bool,
}

impl SessionState {
    fn register(&mut self, pending: Pending) -> u32 {
        self.last_id = self.last_id.wrapping_add(1).max(1);
        self.pending.insert(self.last_id, pending);
        self.last_id
    }
}

/// One logical connection to Centrifugo, kept alive across reconnects until it is closed.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    url: String,
    config: SessionConfig,
    events: EventSender,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        url: String,
        token: String,
        config: SessionConfig,
        events: EventSender,
        commands: UnboundedReceiver<SessionCommand>,
    ) -> Self {
        Session {
            id,
            url,
            config,
            events,
            state: Mutex::new(SessionState {
                commands,
                token,
                channels: BTreeSet::new(),
                pending: HashMap::new(),
                last_id: 0,
                connected: false,
            }),
        }
    }

    #[instrument(skip_all, fields(connection = %self.id))]
    pub async fn run(self) {
        loop {
            // A fresh strategy per loop, so the backoff starts over after a session that completed its handshake
            let strategy = backoff(&self.config).map(jitter);

            match RetryIf::start(strategy, || self.attempt(), SessionError::is_retryable).await {
                Ok(()) => {
                    debug!("🔌 Realtime session closed");
                    return;
                }
                Err(SessionError::ConnectionLost(cause)) => warn!("⚠️ Realtime connection lost: {}. Reconnecting...", cause),
                Err(SessionError::ReceiverDropped) => return,
                Err(e) => {
                    error!("❌ Giving up on realtime connection: {}", e);
                    return;
                }
            }
        }
    }

    async fn attempt(&self) -> Result<(), SessionError> {
        let mut state = self.state.lock().await;
        state.pending.clear();
        state.connected = false;

        if self.drain_offline(&mut state)? == Flow::Close {
            return Ok(());
        }

        let result = self.connect_and_pump(&mut state).await;

        if state.connected {
            state.connected = false;
            let reason = match &result {
                Ok(()) => "closed by client".to_string(),
                Err(e) => e.to_string(),
            };
            self.emit(TransportEventKind::Disconnected { reason })?;
            return result.map_err(SessionError::lost);
        }

        if let Err(e) = &result {
            debug!("🔌 Connecting to {}... failed, {}", self.url, e);
            self.emit(TransportEventKind::Error {
                channel: None,
                message: e.to_string(),
            })?;
        }
        result
    }

    async fn connect_and_pump(&self, state: &mut SessionState) -> Result<(), SessionError> {
        debug!("🔌 Connecting to {}...", self.url);
        let (socket, _) = connect_async(self.url.as_str()).await?;
        let (mut sink, mut source) = socket.split();

        let id = state.register(Pending::Connect);
        let connect = Method::Connect {
            token: state.token.clone(),
            name: self.config.client_name.clone(),
        };
        self.send(&mut sink, Command { id, method: connect }).await?;

        self.pump(state, &mut sink, &mut source).await
    }

    async fn pump(&self, state: &mut SessionState, sink: &mut WsSink, source: &mut WsSource) -> Result<(), SessionError> {
        let stale_timeout = self.config.stale_connection_timeout;
        loop {
            tokio::select! {
                command = state.commands.recv() => {
                    let Some(command) = command else {
                        return self.close(sink).await;
                    };
                    if self.handle_command(command, state, sink).await? == Flow::Close {
                        return self.close(sink).await;
                    }
                }
                frame = timeout(stale_timeout, source.next()) => match frame {
                    Err(_) => return Err(SessionError::Stale(stale_timeout)),
                    Ok(None) => return Err(SessionError::Closed("stream ended".to_string())),
                    Ok(Some(Err(e))) => return Err(e.into()),
                    Ok(Some(Ok(Message::Text(text)))) => {
                        for reply in protocol::decode_frame(&text) {
                            match reply {
                                Ok(reply) => self.handle_reply(reply, state, sink).await?,
                                Err(e) => warn!("⚠️ Ignoring malformed frame: {}", e),
                            }
                        }
                    }
                    Ok(Some(Ok(Message::Close(frame)))) => {
                        let reason = frame.map(|frame| frame.reason.to_string()).unwrap_or_default();
                        return Err(SessionError::Closed(reason));
                    }
                    Ok(Some(Ok(_))) => {}
                }
            }
        }
    }

    async fn handle_command(&self, command: SessionCommand, state: &mut SessionState, sink: &mut WsSink) -> Result<Flow, SessionError> {
        match command {
            SessionCommand::Subscribe(channel) => {
                if !state.channels.insert(channel.clone()) {
                    debug!(channel, "Already subscribed to '{}'", channel);
                } else if state.connected {
                    self.send_subscribe(channel, state, sink).await?;
                }
            }
            SessionCommand::Unsubscribe(channel) => {
                if state.channels.remove(&channel) && state.connected {
                    let id = state.register(Pending::Unsubscribe(channel.clone()));
                    self.send(sink, Command { id, method: Method::Unsubscribe { channel } }).await?;
                }
            }
            SessionCommand::Publish { channel, data } if state.connected => {
                let id = state.register(Pending::Publish(channel.clone()));
                self.send(sink, Command { id, method: Method::Publish { channel, data } }).await?;
            }
            SessionCommand::Publish { channel, .. } => self.reject_publish(channel)?,
            SessionCommand::Token(token) => state.token = token,
            SessionCommand::Close => return Ok(Flow::Close),
        }
        Ok(Flow::Continue)
    }

    // Commands queued while no socket is open only update the channel set
    fn drain_offline(&self, state: &mut SessionState) -> Result<Flow, SessionError> {
        loop {
            match state.commands.try_recv() {
                Ok(SessionCommand::Subscribe(channel)) => {
                    state.channels.insert(channel);
                }
                Ok(SessionCommand::Unsubscribe(channel)) => {
                    state.channels.remove(&channel);
                }
                Ok(SessionCommand::Publish { channel, .. }) => self.reject_publish(channel)?,
                Ok(SessionCommand::Token(token)) => state.token = token,
                Ok(SessionCommand::Close) | Err(TryRecvError::Disconnected) => return Ok(Flow::Close),
                Err(TryRecvError::Empty) => return Ok(Flow::Continue),
            }
        }
    }

    async fn handle_reply(&self, reply: Reply, state: &mut SessionState, sink: &mut WsSink) -> Result<(), SessionError> {
        if reply.is_ping() {
            sink.send(Message::Text("{}".to_string())).await?;
            return Ok(());
        }

        if let Some(push) = reply.push {
            if let Some(disconnect) = push.disconnect {
                if disconnect.is_terminal() {
                    return Err(SessionError::Terminated {
                        code: disconnect.code,
                        reason: disconnect.reason,
                    });
                }
                return Err(SessionError::Closed(disconnect.reason));
            }
            if let Some(publication) = push.publication {
                self.emit(TransportEventKind::Publication {
                    channel: push.channel,
                    data: publication.data,
                })?;
            }
            return Ok(());
        }

        let Some(pending) = state.pending.remove(&reply.id) else {
            debug!(id = reply.id, "Reply for unknown command {}", reply.id);
            return Ok(());
        };

        match (pending, reply.error) {
            (Pending::Connect, Some(error)) => Err(SessionError::Rejected {
                code: error.code,
                message: error.message,
                temporary: error.temporary,
            }),
            (Pending::Connect, None) => {
                state.connected = true;
                info!("🔌 Connecting to {}... OK", self.url);
                self.emit(TransportEventKind::Connected)?;
                for channel in state.channels.clone() {
                    self.send_subscribe(channel, state, sink).await?;
                }
                Ok(())
            }
            (Pending::Subscribe(channel), Some(error)) if error.code == ALREADY_SUBSCRIBED => self.emit(TransportEventKind::Subscribed { channel }),
            (Pending::Subscribe(channel), None) if state.channels.contains(&channel) => self.emit(TransportEventKind::Subscribed { channel }),
            (Pending::Subscribe(channel) | Pending::Unsubscribe(channel) | Pending::Publish(channel), Some(error)) => {
                self.emit(TransportEventKind::Error {
                    channel: Some(channel),
                    message: format!("{} (code {})", error.message, error.code),
                })
            }
            (_, None) => Ok(()),
        }
    }

    async fn send_subscribe(&self, channel: String, state: &mut SessionState, sink: &mut WsSink) -> Result<(), SessionError> {
        let id = state.register(Pending::Subscribe(channel.clone()));
        self.send(sink, Command { id, method: Method::Subscribe { channel } }).await
    }

    async fn send(&self, sink: &mut WsSink, command: Command) -> Result<(), SessionError> {
        sink.send(Message::Text(command.encode()?)).await?;
        Ok(())
    }

    async fn close(&self, sink: &mut WsSink) -> Result<(), SessionError> {
        debug!("🔌 Closing realtime connection...");
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!("🔌 Closing realtime connection... failed, {}", e);
        }
        Ok(())
    }

    fn reject_publish(&self, channel: String) -> Result<(), SessionError> {
        self.emit(TransportEventKind::Error {
            channel: Some(channel),
            message: "cannot publish while disconnected".to_string(),
        })
    }

    fn emit(&self, kind: TransportEventKind) -> Result<(), SessionError> {
        self.events
            .send(TransportEvent { connection: self.id, kind })
            .map_err(|_| SessionError::ReceiverDropped)
    }
}

/// Doubles from `retry_ms` up to `retry_max_delay`.
fn backoff(config: &SessionConfig) -> ExponentialBackoff {
    ExponentialBackoff::from_millis(2)
        .factor((config.retry_ms / 2).max(1))
        .max_delay(config.retry_max_delay)
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("no data for {0:?}")]
    Stale(Duration),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("connect rejected with code {code}: {message}")]
    Rejected { code: u32, message: String, temporary: bool },
    #[error("disconnected with code {code}: {reason}")]
    Terminated { code: u32, reason: String },
    #[error("could not encode command: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("{0}")]
    ConnectionLost(Box<SessionError>),
    #[error("event receiver dropped")]
    ReceiverDropped,
}

impl SessionError {
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::WebSocket(_) | SessionError::Stale(_) | SessionError::Closed(_) => true,
            SessionError::Rejected { temporary, .. } => *temporary,
            _ => false,
        }
    }

    fn lost(self) -> SessionError {
        if self.is_retryable() { SessionError::ConnectionLost(Box::new(self)) } else { self }
    }
}
