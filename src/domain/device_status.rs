use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Status,
    Heartbeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Offline,
}

/// A status or heartbeat message published by a phone on its channel.
///
/// Heartbeats only carry a subset of the fields. A missing or `null` field means "unknown", not "cleared".
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusUpdate {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub phone_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_presence")]
    pub status: Option<Presence>,
    pub active_connections: Option<u32>,
    pub total_connections: Option<u32>,
    pub rotation_capability: Option<bool>,
    pub sim_country: Option<String>,
    pub sim_carrier: Option<String>,
    pub timestamp: Option<i64>,
}

// An unknown presence reads as "unknown", the other fields of the message still count
fn lenient_presence<'de, D>(deserializer: D) -> Result<Option<Presence>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| Presence::deserialize(value).ok()))
}

impl StatusUpdate {
    pub fn from_payload(payload: Value) -> Result<StatusUpdate, StatusPayloadError> {
        match payload.get("type").and_then(Value::as_str) {
            Some("status") | Some("heartbeat") => Ok(serde_json::from_value(payload)?),
            other => Err(StatusPayloadError::UnsupportedType(other.map(str::to_string))),
        }
    }
}

#[derive(Error, Debug)]
pub enum StatusPayloadError {
    #[error("unsupported message type {0:?}")]
    UnsupportedType(Option<String>),
    #[error("malformed status payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Best-known merged state of a single phone.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub phone_id: String,
    pub last_message: Option<MessageType>,
    pub status: Option<Presence>,
    pub active_connections: Option<u32>,
    pub total_connections: Option<u32>,
    pub rotation_capability: Option<bool>,
    pub sim_country: Option<String>,
    pub sim_carrier: Option<String>,
    pub timestamp: Option<i64>,
}

impl DeviceStatus {
    pub fn new(phone_id: impl Into<String>) -> Self {
        DeviceStatus {
            phone_id: phone_id.into(),
            ..Default::default()
        }
    }

    /// Present fields overwrite, absent fields keep their previous value.
    pub fn merge(&mut self, update: StatusUpdate) {
        self.last_message = Some(update.message_type);
        override_if_present(&mut self.status, update.status);
        override_if_present(&mut self.active_connections, update.active_connections);
        override_if_present(&mut self.total_connections, update.total_connections);
        override_if_present(&mut self.rotation_capability, update.rotation_capability);
        override_if_present(&mut self.sim_country, update.sim_country);
        override_if_present(&mut self.sim_carrier, update.sim_carrier);
        override_if_present(&mut self.timestamp, update.timestamp);
    }

    pub fn is_online(&self) -> bool {
        self.status == Some(Presence::Online)
    }
}

fn override_if_present<T>(field: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *field = value;
    }
}
