use crate::transport::{Connection, ConnectionId, EventSender, Transport, TransportError, TransportEvent, TransportEventKind};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect { id: ConnectionId, endpoint: String, token: String },
    Subscribe { id: ConnectionId, channel: String },
    Unsubscribe { id: ConnectionId, channel: String },
    Publish { id: ConnectionId, channel: String, data: Value },
    UpdateToken { id: ConnectionId, token: String },
    Close { id: ConnectionId },
}

/// Transport double that records every call and lets tests emit events on the last opened connection.
#[derive(Debug, Clone, Default)]
pub struct RecordingTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    last_connection: Arc<Mutex<Option<(ConnectionId, EventSender)>>>,
    fail_connect: Arc<AtomicBool>,
    fail_publish: Arc<AtomicBool>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn connects(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, Call::Connect { .. })).count()
    }

    pub fn closes(&self) -> usize {
        self.calls().iter().filter(|call| matches!(call, Call::Close { .. })).count()
    }

    pub fn publishes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Publish { channel, .. } => Some(channel),
                _ => None,
            })
            .collect()
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    pub fn emit(&self, kind: TransportEventKind) {
        let guard = self.last_connection.lock().unwrap();
        let (connection, events) = guard.as_ref().expect("no connection was opened");
        events.send(TransportEvent { connection: *connection, kind }).unwrap();
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Transport for RecordingTransport {
    fn connect(&self, endpoint: &str, token: &str, id: ConnectionId, events: EventSender) -> Result<Box<dyn Connection>, TransportError> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::UnsupportedScheme("http".to_string()));
        }

        self.record(Call::Connect {
            id,
            endpoint: endpoint.to_string(),
            token: token.to_string(),
        });
        *self.last_connection.lock().unwrap() = Some((id, events));
        Ok(Box::new(RecordingConnection { id, transport: self.clone() }))
    }
}

#[derive(Debug)]
struct RecordingConnection {
    id: ConnectionId,
    transport: RecordingTransport,
}

impl Connection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.transport.record(Call::Subscribe {
            id: self.id,
            channel: channel.to_string(),
        });
        Ok(())
    }

    fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.transport.record(Call::Unsubscribe {
            id: self.id,
            channel: channel.to_string(),
        });
        Ok(())
    }

    fn publish(&self, channel: &str, data: Value) -> Result<(), TransportError> {
        if self.transport.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        self.transport.record(Call::Publish {
            id: self.id,
            channel: channel.to_string(),
            data,
        });
        Ok(())
    }

    fn update_token(&self, token: &str) -> Result<(), TransportError> {
        self.transport.record(Call::UpdateToken {
            id: self.id,
            token: token.to_string(),
        });
        Ok(())
    }

    fn close(&self) {
        self.transport.record(Call::Close { id: self.id });
    }
}
