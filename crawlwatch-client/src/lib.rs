//! Crawlwatch HTTP Client
//!
//! A small, type-safe client for the job endpoints of the scraping backend.
//!
//! The client performs single requests only: one status query, or opening
//! one event stream. Retries, fallbacks and state live in the
//! synchronization layer built on top of it.
//!
//! # Example
//!
//! ```no_run
//! use crawlwatch_client::{ApiClient, ApiKey};
//! use crawlwatch_core::domain::job::{JobId, JobKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::new("https://api.example.com/v1")
//!         .with_api_key(ApiKey::new("fc-123"));
//!
//!     let update = client
//!         .fetch_status(&JobId::new("job-1")?, JobKind::Crawl)
//!         .await?;
//!
//!     println!("status: {}", update.status);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod stream;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use stream::{EventStream, StreamFrame};

use reqwest::{Client, Url};
use std::fmt;

/// API key sent with every request
///
/// Passed explicitly to each client instance; never read from global state.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// HTTP client for the scraping backend's job API
#[derive(Debug, Clone)]
pub struct ApiClient {
    /// Base URL of the API (e.g., "https://api.example.com/v1")
    base_url: String,
    /// Credential for status queries and event streams
    api_key: Option<ApiKey>,
    /// HTTP client instance
    client: Client,
}

impl ApiClient {
    /// Create a new API client without a credential
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the API (e.g., "http://localhost:3002/v1")
    ///
    /// # Example
    /// ```
    /// use crawlwatch_client::ApiClient;
    ///
    /// let client = ApiClient::new("http://localhost:3002/v1");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new API client with a custom HTTP client
    ///
    /// This allows you to configure connect timeouts, proxies, TLS settings,
    /// etc. Avoid a total request timeout: it would also cut event streams.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the API
    /// * `client` - A configured reqwest Client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            client,
        }
    }

    /// Attach the credential used for all requests
    pub fn with_api_key(mut self, api_key: ApiKey) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&ApiKey> {
        self.api_key.as_ref().ok_or(ClientError::MissingCredential)
    }

    /// Build an endpoint URL below the base URL
    ///
    /// Each segment is percent-encoded on its own, so a job id containing
    /// `/`, `?` or `#` stays a single path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Check the status code of a response and return its body on success
    async fn handle_text_response(&self, response: reqwest::Response) -> Result<String> {
        let response = self.check_status(response).await?;

        response
            .text()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to read response body: {}", e)))
    }

    /// Turn a non-success status into the matching [`ClientError`]
    async fn check_status(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::from_status(status.as_u16(), error_text));
        }

        Ok(response)
    }
}
