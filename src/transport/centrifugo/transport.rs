use crate::transport::centrifugo::session::{Session, SessionCommand, SessionConfig};
use crate::transport::{Connection, ConnectionId, EventSender, Transport, TransportError};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, instrument};
use url::Url;

#[derive(Debug, Clone)]
pub struct CentrifugoTransport {
    config: SessionConfig,
}

impl CentrifugoTransport {
    pub fn new(config: SessionConfig) -> Self {
        CentrifugoTransport { config }
    }
}

impl Transport for CentrifugoTransport {
    #[instrument(skip(self, token, events))]
    fn connect(&self, endpoint: &str, token: &str, id: ConnectionId, events: EventSender) -> Result<Box<dyn Connection>, TransportError> {
        let url = validate_endpoint(endpoint)?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        let session = Session::new(id, url.to_string(), token.to_string(), self.config.clone(), events, commands_rx);
        tokio::spawn(session.run());
        debug!(connection = %id, "🔌 Started realtime session for {}", url);

        Ok(Box::new(CentrifugoConnection { id, commands: commands_tx }))
    }
}

fn validate_endpoint(endpoint: &str) -> Result<Url, TransportError> {
    let url = Url::parse(endpoint).map_err(|source| TransportError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(TransportError::UnsupportedScheme(scheme.to_string())),
    }
}

#[derive(Debug)]
struct CentrifugoConnection {
    id: ConnectionId,
    commands: UnboundedSender<SessionCommand>,
}

impl CentrifugoConnection {
    fn send(&self, command: SessionCommand) -> Result<(), TransportError> {
        self.commands.send(command).map_err(|_| TransportError::Closed)
    }
}

impl Connection for CentrifugoConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn subscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.send(SessionCommand::Subscribe(channel.to_string()))
    }

    fn unsubscribe(&self, channel: &str) -> Result<(), TransportError> {
        self.send(SessionCommand::Unsubscribe(channel.to_string()))
    }

    fn publish(&self, channel: &str, data: Value) -> Result<(), TransportError> {
        self.send(SessionCommand::Publish {
            channel: channel.to_string(),
            data,
        })
    }

    fn update_token(&self, token: &str) -> Result<(), TransportError> {
        self.send(SessionCommand::Token(token.to_string()))
    }

    fn close(&self) {
        // The session may already be gone, nothing left to close then
        self.send(SessionCommand::Close).unwrap_or_default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::time::Duration;

    fn transport() -> CentrifugoTransport {
        CentrifugoTransport::new(SessionConfig {
            client_name: "phonewatch".to_string(),
            retry_ms: 10,
            retry_max_delay: Duration::from_millis(20),
            stale_connection_timeout: Duration::from_secs(1),
        })
    }

    #[rstest]
    #[case("ws://localhost:8000/connection/websocket")]
    #[case("wss://realtime.example.com/connection/websocket")]
    fn validate_endpoint_accepts_websocket_urls(#[case] endpoint: &str) {
        assert!(validate_endpoint(endpoint).is_ok());
    }

    #[rstest]
    #[case("https://realtime.example.com", "https")]
    #[case("ftp://realtime.example.com", "ftp")]
    fn validate_endpoint_rejects_other_schemes(#[case] endpoint: &str, #[case] expected: &str) {
        let result = validate_endpoint(endpoint);

        assert!(matches!(result, Err(TransportError::UnsupportedScheme(scheme)) if scheme == expected));
    }

    #[test]
    fn validate_endpoint_rejects_garbage() {
        assert!(matches!(validate_endpoint("not a url"), Err(TransportError::InvalidEndpoint { .. })));
    }

    #[tokio::test]
    async fn connection_operations_fail_once_the_session_is_gone() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let connection = transport().connect("ws://127.0.0.1:9/connection/websocket", "token", ConnectionId(1), events_tx).unwrap();
        drop(events_rx);

        connection.close();
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(connection.subscribe("phone:A"), Err(TransportError::Closed)));
        assert!(matches!(connection.publish("phone:A", Value::Null), Err(TransportError::Closed)));
        assert!(matches!(connection.update_token("refreshed"), Err(TransportError::Closed)));
    }
}
