pub mod centrifugo;
#[cfg(test)]
pub mod recording;

use serde_json::Value;
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Identifies one connection, so events of a connection that was already replaced can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportEvent {
    pub connection: ConnectionId,
    pub kind: TransportEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEventKind {
    Connected,
    Disconnected { reason: String },
    Error { channel: Option<String>, message: String },
    Subscribed { channel: String },
    Publication { channel: String, data: Value },
}

pub type EventSender = UnboundedSender<TransportEvent>;

/// Opens multiplexed publish/subscribe connections.
pub trait Transport: Debug + Send + Sync {
    fn connect(&self, endpoint: &str, token: &str, id: ConnectionId, events: EventSender) -> Result<Box<dyn Connection>, TransportError>;
}

/// A live connection. Every operation returns immediately; failures and confirmations arrive later as [`TransportEvent`]s.
pub trait Connection: Debug + Send {
    fn id(&self) -> ConnectionId;
    fn subscribe(&self, channel: &str) -> Result<(), TransportError>;
    fn unsubscribe(&self, channel: &str) -> Result<(), TransportError>;
    fn publish(&self, channel: &str, data: Value) -> Result<(), TransportError>;
    /// Replaces the token used for the next handshake, the live connection is kept.
    fn update_token(&self, token: &str) -> Result<(), TransportError>;
    fn close(&self);
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint { endpoint: String, source: url::ParseError },
    #[error("unsupported endpoint scheme '{0}', expected ws or wss")]
    UnsupportedScheme(String),
    #[error("connection is closed")]
    Closed,
}
