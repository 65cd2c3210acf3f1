use crate::app_config::AppConfig;
use crate::dashboard::DashboardApi;
use crate::phone_refresh::{RefreshError, refresh_phones};
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::status_listener::status_listener;
use crate::transport::centrifugo::{CentrifugoTransport, SessionConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task;
use tracing::{info, warn};

mod app_config;
mod dashboard;
mod domain;
mod phone_refresh;
mod reconciler;
mod status_listener;
mod transport;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    info!("🪵 Starting {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load()?;
    info!("✅  Loaded configuration");

    let client = dashboard::new_client(&config)?;
    let directory = DashboardApi::new(client, config.dashboard().url());

    let realtime = config.realtime();
    let transport = CentrifugoTransport::new(SessionConfig {
        client_name: realtime.client_name().to_string(),
        retry_ms: realtime.retry_ms(),
        retry_max_delay: realtime.retry_max_delay_ms(),
        stale_connection_timeout: realtime.stale_connection_timeout_ms(),
    });
    let reconciler_config = ReconcilerConfig {
        request_cooldown: realtime.request_cooldown(),
    };
    let handle = reconciler::spawn(Reconciler::new(Arc::new(transport), &reconciler_config), config.core().command_buffer_size());
    info!("✅  Initialized reconciler");

    let (phones_tx, phones_rx) = watch::channel(Vec::new());
    let status_rx = handle.status();
    task::spawn(async move {
        status_listener(status_rx, phones_rx).await;
    });
    info!("✅  Initialized status listener");

    let mut interval = tokio::time::interval(config.dashboard().refresh_interval());
    info!("🔥 {} is up and running", env!("CARGO_PKG_NAME"));

    loop {
        tokio::select! {
            _ = interval.tick() => match refresh_phones(&directory, &handle, &phones_tx, realtime.url()).await {
                Ok(_) => {}
                Err(RefreshError::Stopped(e)) => {
                    warn!("⚠️ {}", e);
                    break;
                }
                Err(e) => warn!("⚠️ Refreshing phones failed, keeping the previous ones: {}", e),
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    info!("🛑 Shutting down {}...", env!("CARGO_PKG_NAME"));
    handle.dispose().await;

    Ok(())
}
