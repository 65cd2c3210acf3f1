// Centrifugo JSON client protocol: https://centrifugal.dev/docs/transports/client_protocol
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, PartialEq, Serialize)]
pub struct Command {
    pub id: u32,
    #[serde(flatten)]
    pub method: Method,
}

#[derive(Debug, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Connect { token: String, name: String },
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Publish { channel: String, data: Value },
}

impl Command {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Anything the server sends: a reply to a command (`id` set), an asynchronous push, or an empty ping.
#[derive(Debug, Default, PartialEq, Deserialize)]
pub struct Reply {
    #[serde(default)]
    pub id: u32,
    pub error: Option<ReplyError>,
    pub push: Option<Push>,
}

impl Reply {
    pub fn is_ping(&self) -> bool {
        self.id == 0 && self.error.is_none() && self.push.is_none()
    }
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct ReplyError {
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub temporary: bool,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Push {
    #[serde(default)]
    pub channel: String,
    #[serde(rename = "pub")]
    pub publication: Option<Publication>,
    pub disconnect: Option<Disconnect>,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Publication {
    pub data: Value,
}

#[derive(Debug, PartialEq, Deserialize)]
pub struct Disconnect {
    pub code: u32,
    #[serde(default)]
    pub reason: String,
}

impl Disconnect {
    // 3500..=3999 and 4500..=4999 tell the client not to reconnect
    pub fn is_terminal(&self) -> bool {
        matches!(self.code, 3500..=3999 | 4500..=4999)
    }
}

pub const ALREADY_SUBSCRIBED: u32 = 105;

/// A single WebSocket frame may carry several newline-delimited replies.
pub fn decode_frame(text: &str) -> Vec<Result<Reply, serde_json::Error>> {
    text.lines().map(str::trim).filter(|line| !line.is_empty()).map(serde_json::from_str).collect()
}
