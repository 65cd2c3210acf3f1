use crate::domain::{PhoneListing, StatusSummary, StatusView};
use chrono::Utc;
use tokio::sync::watch::Receiver;
use tracing::{debug, info, instrument};

/// Logs a summary whenever the status or the phone list changes. Returns the last reported summary once the
/// reconciler is gone.
#[instrument(skip_all)]
pub async fn status_listener(mut rx: Receiver<StatusView>, mut phones: Receiver<Vec<PhoneListing>>) -> Option<StatusSummary> {
    let mut report = SummaryReport::default();
    let mut listing_open = true;

    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    return report.last();
                }
            }
            changed = phones.changed(), if listing_open => listing_open = changed.is_ok(),
        }

        let view = rx.borrow_and_update().clone();
        let summary = StatusSummary::from_view(&view, &phones.borrow_and_update(), Utc::now());

        if report.update(view.connected, summary) {
            let connection = if view.connected { "connected" } else { "disconnected" };
            info!(connected = view.connected, "📊 {} ({})", summary, connection);
        } else {
            debug!(connected = view.connected, "📊 {}", summary);
        }
    }
}

#[derive(Debug, Default)]
struct SummaryReport {
    last: Option<(bool, StatusSummary)>,
}

impl SummaryReport {
    /// Returns whether the summary differs from the last reported one.
    fn update(&mut self, connected: bool, summary: StatusSummary) -> bool {
        if self.last == Some((connected, summary)) {
            return false;
        }
        self.last = Some((connected, summary));
        true
    }

    fn last(&self) -> Option<StatusSummary> {
        self.last.map(|(_, summary)| summary)
    }
}
