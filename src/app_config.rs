use config::{Config, ConfigError};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    core: Core,
    dashboard: Dashboard,
    realtime: Realtime,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(config::File::with_name("config").required(true))
            .add_source(config::File::with_name("config_local").required(false))
            .add_source(config::Environment::with_prefix("PHONEWATCH").separator("__"))
            .build()?
            .try_deserialize()
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    pub fn dashboard(&self) -> &Dashboard {
        &self.dashboard
    }

    pub fn realtime(&self) -> &Realtime {
        &self.realtime
    }
}

#[derive(Debug, Deserialize)]
pub struct Core {
    command_buffer_size: usize,
}

impl Core {
    pub fn command_buffer_size(&self) -> usize {
        self.command_buffer_size
    }
}

#[derive(Debug, Deserialize)]
pub struct Dashboard {
    url: String,
    api_key: String,
    #[serde(with = "humantime_serde")]
    refresh_interval: Duration,
}

impl Dashboard {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }
}

#[derive(Debug, Deserialize)]
pub struct Realtime {
    url: String,
    client_name: String,
    retry_ms: u64,
    retry_max_delay_ms: u64,
    stale_connection_timeout_ms: u64,
    #[serde(with = "humantime_serde")]
    request_cooldown: Duration,
}

impl Realtime {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn client_name(&self) -> &str {
        &self.client_name
    }

    pub fn retry_ms(&self) -> u64 {
        self.retry_ms
    }

    pub fn retry_max_delay_ms(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn stale_connection_timeout_ms(&self) -> Duration {
        Duration::from_millis(self.stale_connection_timeout_ms)
    }

    pub fn request_cooldown(&self) -> Duration {
        self.request_cooldown
    }
}

#[cfg(test)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

#[cfg(test)]
impl AppConfigBuilder {
    pub fn new() -> Self {
        AppConfigBuilder {
            config: AppConfig {
                core: Core { command_buffer_size: 1 },
                dashboard: Dashboard {
                    url: "https://dashboard.url/".to_string(),
                    api_key: "key".to_string(),
                    refresh_interval: Duration::from_secs(300),
                },
                realtime: Realtime {
                    url: "wss://realtime.url/connection/websocket".to_string(),
                    client_name: "phonewatch".to_string(),
                    retry_ms: 100,
                    retry_max_delay_ms: 200,
                    stale_connection_timeout_ms: 30_000,
                    request_cooldown: Duration::from_secs(10),
                },
            },
        }
    }

    pub fn dashboard_url(mut self, url: String) -> Self {
        self.config.dashboard.url = url;
        self
    }

    pub fn api_key(mut self, api_key: String) -> Self {
        self.config.dashboard.api_key = api_key;
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}
