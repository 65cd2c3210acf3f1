use crate::dashboard::client::DashboardError;
use crate::domain::PhoneListing;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::fmt::Debug;
use tracing::{info, instrument};

/// Where the phones to track and the realtime token come from.
#[async_trait]
pub trait PhoneDirectory: Debug + Send + Sync {
    async fn phones(&self) -> Result<Vec<PhoneListing>, DashboardError>;

    async fn realtime_token(&self) -> Result<String, DashboardError>;
}

#[derive(Debug)]
pub struct DashboardApi {
    client: Client,
    url: String,
}

impl DashboardApi {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        DashboardApi {
            client,
            url: url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PhonesResponse {
    phones: Vec<PhoneListing>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[async_trait]
impl PhoneDirectory for DashboardApi {
    #[instrument(skip(self))]
    async fn phones(&self) -> Result<Vec<PhoneListing>, DashboardError> {
        info!("📋 Retrieving phones...");

        let response = self.client.get(format!("{}/api/phones", self.url)).send().await?.error_for_status()?;
        let phones = response.json::<PhonesResponse>().await?.phones;

        info!("📋 Retrieving phones... OK, {} found", phones.len());
        Ok(phones)
    }

    #[instrument(skip(self))]
    async fn realtime_token(&self) -> Result<String, DashboardError> {
        let response = self
            .client
            .get(format!("{}/api/realtime/token", self.url))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<TokenResponse>().await?.token)
    }
}
