use crate::domain::phone_listing::PhoneListing;
use crate::domain::status_view::StatusView;
use chrono::{DateTime, Utc};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusSummary {
    pub online: usize,
    pub offline: usize,
    pub expired: usize,
}

impl StatusSummary {
    // An expired license wins over the reported presence, unknown presence counts as offline
    pub fn from_view(view: &StatusView, phones: &[PhoneListing], now: DateTime<Utc>) -> Self {
        phones.iter().fold(StatusSummary::default(), |mut summary, phone| {
            if phone.is_expired(now) {
                summary.expired += 1;
            } else if view.device(&phone.id).is_some_and(|device| device.is_online()) {
                summary.online += 1;
            } else {
                summary.offline += 1;
            }
            summary
        })
    }
}

impl Display for StatusSummary {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} online, {} offline, {} expired", self.online, self.offline, self.expired)
    }
}
