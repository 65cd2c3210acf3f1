use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhoneListing {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub license_expires_at: Option<DateTime<Utc>>,
}

impl PhoneListing {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.license_expires_at.is_some_and(|expires_at| expires_at <= now)
    }
}
