//! Configuration module
//!
//! Handles CLI configuration: API location, credential and sync timings.

use anyhow::{Context, Result};
use crawlwatch_client::{ApiClient, ApiKey};
use crawlwatch_sync::SyncConfig;
use std::time::Duration;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the scraping API
    pub api_url: String,
    /// Credential passed to every request
    pub api_key: Option<ApiKey>,
    /// Timing of the synchronization layer
    pub sync: SyncConfig,
}

impl Config {
    /// Builds the configuration, reading sync timings from the environment
    pub fn new(api_url: String, api_key: Option<String>) -> Result<Self> {
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            anyhow::bail!("api url must start with http:// or https://");
        }

        let sync = SyncConfig::from_env();
        sync.validate().context("Invalid synchronization settings")?;

        Ok(Self {
            api_url,
            api_key: api_key
                .filter(|key| !key.trim().is_empty())
                .map(ApiKey::new),
            sync,
        })
    }

    /// Creates an API client carrying the configured credential
    pub fn client(&self) -> Result<ApiClient> {
        // Only the connect phase is bounded: event streams stay open for as
        // long as the job runs
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let client = ApiClient::with_client(&self.api_url, http);
        Ok(match &self.api_key {
            Some(key) => client.with_api_key(key.clone()),
            None => client,
        })
    }
}
