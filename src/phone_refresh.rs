use crate::dashboard::{DashboardError, PhoneDirectory};
use crate::domain::PhoneListing;
use crate::reconciler::{Credentials, ReconcilerHandle, ReconcilerStopped};
use thiserror::Error;
use tokio::sync::watch::Sender;
use tracing::{info, instrument};

/// Pulls the phone list and a realtime token from the dashboard and hands both to the reconciler.
#[instrument(skip_all)]
pub async fn refresh_phones(
    directory: &dyn PhoneDirectory,
    handle: &ReconcilerHandle,
    phones_tx: &Sender<Vec<PhoneListing>>,
    endpoint: &str,
) -> Result<usize, RefreshError> {
    let phones = directory.phones().await?;
    let token = directory.realtime_token().await?;

    handle.track(phones.iter().map(|phone| phone.id.clone()).collect()).await?;
    handle.set_credentials(Some(Credentials::new(endpoint, token))).await?;

    let count = phones.len();
    phones_tx.send_replace(phones);
    info!("🔄 Refreshed {} phone(s)", count);

    Ok(count)
}

#[derive(Error, Debug)]
pub enum RefreshError {
    #[error(transparent)]
    Dashboard(#[from] DashboardError),
    #[error(transparent)]
    Stopped(#[from] ReconcilerStopped),
}
