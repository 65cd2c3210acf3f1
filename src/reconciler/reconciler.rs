use crate::domain::{DeviceStatus, StatusPayloadError, StatusUpdate, StatusView};
use crate::reconciler::rate_limit::RateLimitLedger;
use crate::reconciler::subscription_set::{SubscriptionSet, SubscriptionState, phone_id_from_channel};
use crate::transport::{Connection, ConnectionId, EventSender, Transport, TransportEvent, TransportEventKind};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub endpoint: String,
    pub token: String,
}

impl Credentials {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Credentials {
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.endpoint.trim().is_empty() && !self.token.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub request_cooldown: Duration,
}

#[derive(Debug, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
enum PhoneCommand {
    RequestStatus,
}

/// Keeps one realtime connection with a channel per requested phone and merges what those channels publish.
///
/// All state is owned here and only touched from the task driving the reconciler, see [`crate::reconciler::spawn`].
#[derive(Debug)]
pub struct Reconciler {
    transport: Arc<dyn Transport>,
    credentials: Option<Credentials>,
    requested: BTreeSet<String>,
    connection: Option<Box<dyn Connection>>,
    last_connection_id: u64,
    subscriptions: SubscriptionSet,
    ledger: RateLimitLedger,
    status_tx: watch::Sender<StatusView>,
    events_tx: EventSender,
    events_rx: UnboundedReceiver<TransportEvent>,
}

impl Reconciler {
    pub fn new(transport: Arc<dyn Transport>, config: &ReconcilerConfig) -> Self {
        let (status_tx, _) = watch::channel(StatusView::default());
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        Reconciler {
            transport,
            credentials: None,
            requested: BTreeSet::new(),
            connection: None,
            last_connection_id: 0,
            subscriptions: SubscriptionSet::default(),
            ledger: RateLimitLedger::new(config.request_cooldown),
            status_tx,
            events_tx,
            events_rx,
        }
    }

    pub fn watch(&self) -> watch::Receiver<StatusView> {
        self.status_tx.subscribe()
    }

    #[cfg(test)]
    pub fn status(&self) -> StatusView {
        self.status_tx.borrow().clone()
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.status_tx.borrow().connected
    }

    #[cfg(test)]
    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    #[cfg(test)]
    pub fn subscribed_phone_ids(&self) -> BTreeSet<String> {
        self.subscriptions.phone_ids()
    }

    /// Incomplete credentials count as no credentials. A new token is handed to the live connection,
    /// a new endpoint or missing credentials replace it.
    #[instrument(skip_all)]
    pub fn set_credentials(&mut self, credentials: Option<Credentials>) {
        let credentials = credentials.filter(Credentials::is_complete);
        if self.credentials == credentials {
            return;
        }

        if self.refresh_token(credentials.as_ref()) {
            self.credentials = credentials;
            return;
        }

        if self.connection.is_some() {
            info!("🔑 Realtime credentials changed, closing the current connection");
            self.teardown();
        }

        self.credentials = credentials;
        self.ensure_connection();
        self.reconcile_subscriptions();
    }

    fn refresh_token(&self, next: Option<&Credentials>) -> bool {
        let (Some(connection), Some(current), Some(next)) = (&self.connection, &self.credentials, next) else {
            return false;
        };
        if current.endpoint != next.endpoint {
            return false;
        }

        match connection.update_token(&next.token) {
            Ok(()) => {
                debug!(connection = %connection.id(), "🔑 Refreshed realtime token");
                true
            }
            Err(e) => {
                warn!(connection = %connection.id(), "⚠️ Refreshing realtime token failed, {}", e);
                false
            }
        }
    }

    #[instrument(skip_all)]
    pub fn set_requested<I>(&mut self, phone_ids: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.requested = phone_ids.into_iter().filter(|phone_id| !phone_id.is_empty()).collect();
        debug!("📱 Tracking {} phone(s)", self.requested.len());

        let requested = &self.requested;
        self.status_tx.send_if_modified(|view| {
            let tracked = view.devices.len();
            view.devices.retain(|phone_id, _| requested.contains(phone_id));
            view.devices.len() != tracked
        });

        self.ensure_connection();
        self.reconcile_subscriptions();
    }

    /// Opens a connection when there is none yet and endpoint, token and phones are all known.
    pub fn ensure_connection(&mut self) -> bool {
        if self.connection.is_some() {
            return true;
        }

        let Some(credentials) = &self.credentials else {
            debug!("🔌 Not connecting, no realtime credentials");
            return false;
        };

        if self.requested.is_empty() {
            debug!("🔌 Not connecting, no phones to track");
            return false;
        }

        self.last_connection_id += 1;
        let id = ConnectionId(self.last_connection_id);

        info!(connection = %id, "🔌 Opening realtime connection to {}...", credentials.endpoint);
        match self.transport.connect(&credentials.endpoint, &credentials.token, id, self.events_tx.clone()) {
            Ok(connection) => {
                self.connection = Some(connection);
                true
            }
            Err(e) => {
                warn!(connection = %id, "⚠️ Opening realtime connection to {}... failed, {}", credentials.endpoint, e);
                false
            }
        }
    }

    /// Subscribes every requested phone without a channel and releases every channel that is no longer requested.
    pub fn reconcile_subscriptions(&mut self) {
        let Some(connection) = &self.connection else {
            return;
        };

        let diff = self.subscriptions.diff(&self.requested);

        for phone_id in diff.removed {
            if let Some(subscription) = self.subscriptions.remove(&phone_id) {
                if let Err(e) = connection.unsubscribe(subscription.channel()) {
                    warn!(phone_id, "⚠️ Unsubscribing from '{}' failed, {}", subscription.channel(), e);
                }
                debug!(phone_id, "📴 Unsubscribed from '{}'", subscription.channel());
            }
        }

        for phone_id in diff.added {
            let subscription = self.subscriptions.insert(&phone_id);
            debug!(phone_id, "📱 Subscribing to '{}'...", subscription.channel());
            if let Err(e) = connection.subscribe(subscription.channel()) {
                warn!(phone_id, "⚠️ Subscribing to '{}' failed, {}", subscription.channel(), e);
            }
        }
    }

    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events_rx.recv().await
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        let is_current = self.connection.as_ref().is_some_and(|connection| connection.id() == event.connection);
        if !is_current {
            trace!(connection = %event.connection, "Ignoring event of a closed connection: {:?}", event.kind);
            return;
        }

        match event.kind {
            TransportEventKind::Connected => {
                info!(connection = %event.connection, "🟢 Realtime connection established");
                self.set_connected(true);
            }
            TransportEventKind::Disconnected { reason } => {
                warn!(connection = %event.connection, "🔴 Realtime connection lost: {}", reason);
                self.set_connected(false);
            }
            TransportEventKind::Error {
                channel: Some(channel),
                message,
            } => warn!(channel, "⚠️ Realtime error on '{}': {}", channel, message),
            TransportEventKind::Error { channel: None, message } => warn!("⚠️ Realtime transport error: {}", message),
            TransportEventKind::Subscribed { channel } => self.on_subscribed(&channel),
            TransportEventKind::Publication { channel, data } => self.on_publication(&channel, data),
        }
    }

    fn on_subscribed(&mut self, channel: &str) {
        let Some(phone_id) = phone_id_from_channel(channel) else {
            debug!(channel, "Subscribed to unexpected channel '{}'", channel);
            return;
        };

        if !self.subscriptions.mark_subscribed(phone_id) {
            debug!(phone_id, "Ignoring subscription for untracked phone '{}'", phone_id);
            return;
        }

        info!(phone_id, "📱 Subscribing to '{}'... OK", channel);
        self.request_status(phone_id);
    }

    fn on_publication(&mut self, channel: &str, payload: Value) {
        match phone_id_from_channel(channel) {
            Some(phone_id) if self.subscriptions.get(phone_id).is_some() => {
                self.apply_publication(phone_id, payload);
            }
            _ => trace!(channel, "Dropping publication on untracked channel '{}'", channel),
        }
    }

    /// Merges a publication into the snapshot, returns whether it was accepted.
    pub fn apply_publication(&mut self, phone_id: &str, payload: Value) -> bool {
        let update = match StatusUpdate::from_payload(payload) {
            Ok(update) => update,
            Err(StatusPayloadError::UnsupportedType(message_type)) => {
                trace!(phone_id, "Dropping message of type {:?}", message_type);
                return false;
            }
            Err(e) => {
                warn!(phone_id, "⚠️ Dropping status of phone '{}': {}", phone_id, e);
                return false;
            }
        };

        if let Some(reported) = update.phone_id.as_deref().filter(|reported| *reported != phone_id) {
            debug!(phone_id, "Phone '{}' reported itself as '{}'", phone_id, reported);
        }

        trace!(phone_id, "🔸 Merging {:?}", update);
        self.status_tx.send_modify(|view| {
            view.devices
                .entry(phone_id.to_string())
                .or_insert_with(|| DeviceStatus::new(phone_id))
                .merge(update)
        });
        true
    }

    /// Asks a phone for a full status, at most once per cooldown. Returns whether the request was published.
    pub fn request_status(&mut self, phone_id: &str) -> bool {
        let (Some(connection), Some(subscription)) = (&self.connection, self.subscriptions.get(phone_id)) else {
            return false;
        };

        if subscription.state() != SubscriptionState::Subscribed {
            debug!(phone_id, "Not requesting status of '{}' before its channel is subscribed", phone_id);
            return false;
        }

        let now = Instant::now();
        if let Some(remaining) = self.ledger.remaining(phone_id, now) {
            debug!(phone_id, "⏳ Skipping status request for '{}', cooldown ends in {:?}", phone_id, remaining);
            return false;
        }

        let command = match serde_json::to_value(PhoneCommand::RequestStatus) {
            Ok(command) => command,
            Err(e) => {
                warn!(phone_id, "⚠️ Could not encode status request: {}", e);
                return false;
            }
        };

        self.ledger.try_acquire(phone_id, now);
        match connection.publish(subscription.channel(), command) {
            Ok(()) => {
                debug!(phone_id, "📨 Requested status of phone '{}'", phone_id);
                true
            }
            Err(e) => {
                warn!(phone_id, "⚠️ Requesting status of phone '{}' failed, {}", phone_id, e);
                false
            }
        }
    }

    /// Releases every channel and the connection. Safe to call any number of times.
    #[instrument(skip_all)]
    pub fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            for (phone_id, subscription) in self.subscriptions.drain() {
                if let Err(e) = connection.unsubscribe(subscription.channel()) {
                    debug!(phone_id, "Unsubscribing from '{}' failed, {}", subscription.channel(), e);
                }
            }
            connection.close();
            info!(connection = %connection.id(), "🔌 Closed realtime connection");
        }

        self.subscriptions.clear();
        self.set_connected(false);
    }

    fn set_connected(&self, connected: bool) {
        self.status_tx.send_if_modified(|view| {
            let changed = view.connected != connected;
            view.connected = connected;
            changed
        });
    }
}
