//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the harvester, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests for listing, observation and location pages
//! - Error classification (transient vs permanent)

use crate::config::UserAgentConfig;
use crate::HarvestError;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched the page
    Success {
        /// Final URL after redirects
        final_url: String,
        /// HTTP status code
        status_code: u16,
        /// Page body content
        body: String,
    },

    /// Server answered with a non-success status
    HttpError {
        /// The HTTP status code
        status_code: u16,
    },

    /// Network error (connection refused, timeout, etc.)
    NetworkError {
        /// Error description
        error: String,
        /// Whether retrying may help
        transient: bool,
    },
}

impl FetchResult {
    /// Converts the fetch result into the page body or a classified error
    pub fn into_body(self, url: &str) -> Result<String, HarvestError> {
        match self {
            Self::Success { body, .. } => Ok(body),
            Self::HttpError { status_code } => Err(HarvestError::HttpStatus {
                url: url.to_string(),
                status: status_code,
            }),
            Self::NetworkError { error, transient } => Err(HarvestError::Fetch {
                url: url.to_string(),
                message: error,
                transient,
            }),
        }
    }
}

/// Formats the User-Agent header value
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout_secs` - Whole-request timeout
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout_secs: u64,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(config))
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL and classifies the outcome
///
/// | Condition | Result |
/// |-----------|--------|
/// | 2xx | Success |
/// | 429, 5xx | HttpError (transient) |
/// | other non-2xx | HttpError (permanent) |
/// | Timeout, connection failure | NetworkError, transient |
/// | Body read failure | NetworkError, transient |
pub async fn fetch_url(client: &Client, url: &str) -> FetchResult {
    match client.get(url).send().await {
        Ok(response) => {
            let status = response.status();
            let final_url = response.url().to_string();

            if !status.is_success() {
                if status == StatusCode::TOO_MANY_REQUESTS {
                    tracing::warn!("Rate limited by {}", url);
                }
                return FetchResult::HttpError {
                    status_code: status.as_u16(),
                };
            }

            match response.text().await {
                Ok(body) => FetchResult::Success {
                    final_url,
                    status_code: status.as_u16(),
                    body,
                },
                Err(e) => FetchResult::NetworkError {
                    error: e.to_string(),
                    transient: true,
                },
            }
        }
        Err(e) => {
            if e.is_timeout() {
                FetchResult::NetworkError {
                    error: "Request timeout".to_string(),
                    transient: true,
                }
            } else if e.is_connect() {
                FetchResult::NetworkError {
                    error: format!("Connection failed: {}", e),
                    transient: true,
                }
            } else {
                FetchResult::NetworkError {
                    error: e.to_string(),
                    transient: false,
                }
            }
        }
    }
}

/// Fetches a page body, mapping failures to `HarvestError`
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, HarvestError> {
    tracing::debug!("GET {}", url);
    fetch_url(client, url).await.into_body(url)
}
