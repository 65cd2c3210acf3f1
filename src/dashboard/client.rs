use crate::app_config::AppConfig;
use reqwest::header::HeaderValue;
use reqwest::{Client, header};
use thiserror::Error;

pub fn new_client(config: &AppConfig) -> Result<Client, DashboardError> {
    let mut headers = header::HeaderMap::new();
    let mut authorization_value = HeaderValue::from_str(&format!("Bearer {}", config.dashboard().api_key()))?;
    authorization_value.set_sensitive(true);
    headers.insert(header::AUTHORIZATION, authorization_value);

    let client = Client::builder().default_headers(headers).build()?;
    Ok(client)
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("request error: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("dashboard client set an invalid header value: {0}")]
    InvalidHeaderValue(#[from] header::InvalidHeaderValue),
}
