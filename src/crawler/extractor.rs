//! Observation page extraction
//!
//! `PageExtractor` is the seam between the scrape loop and the network. The
//! HTTP implementation fetches the observation page, validates it, and performs
//! the secondary location lookup.

use crate::crawler::fetcher::fetch_page;
use crate::crawler::parser::{parse_location, parse_observation, LocationInfo};
use crate::output::ErrorLog;
use crate::storage::ObservationRecord;
use crate::url::resolve_link;
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use url::Url;

/// Error log category for location lookups that came back incomplete
pub const LOCATION_ERROR_CATEGORY: &str = "Error Scraping info from location";

/// Error log category for observations without a location link
pub const EMPTY_LOCATION_CATEGORY: &str = "Empty location URL";

/// Turns one link into one validated record
#[async_trait]
pub trait PageExtractor: Send + Sync {
    /// Extracts the record for `link`
    ///
    /// Fails with `HarvestError::Validation` when a mandatory field is missing
    /// or the count is ambiguous, and with a fetch error when the page could not
    /// be loaded.
    async fn extract(&self, link: &str) -> Result<ObservationRecord, HarvestError>;
}

/// Extractor backed by the live site
pub struct HttpPageExtractor {
    client: Client,
    base_url: Url,
    error_log: Arc<ErrorLog>,
}

impl HttpPageExtractor {
    pub fn new(client: Client, base_url: Url, error_log: Arc<ErrorLog>) -> Self {
        Self {
            client,
            base_url,
            error_log,
        }
    }

    /// Fetches location metadata; every gap is logged and left empty
    async fn lookup_location(&self, link: &str, href: Option<&str>) -> LocationInfo {
        let Some(href) = href else {
            self.error_log
                .record(EMPTY_LOCATION_CATEGORY, link, "observation has no location link")
                .await;
            return LocationInfo::default();
        };

        let location_url = match resolve_link(&self.base_url, href) {
            Ok(url) => url,
            Err(e) => {
                self.error_log
                    .record(LOCATION_ERROR_CATEGORY, link, format!("bad location URL {}: {}", href, e))
                    .await;
                return LocationInfo::default();
            }
        };

        let info = match fetch_page(&self.client, location_url.as_str()).await {
            Ok(body) => parse_location(&body),
            Err(e) => {
                tracing::warn!("Location lookup failed for {}: {}", link, e);
                self.error_log.record(LOCATION_ERROR_CATEGORY, link, &e).await;
                return LocationInfo::default();
            }
        };

        for field in info.missing_fields() {
            self.error_log
                .record(
                    LOCATION_ERROR_CATEGORY,
                    link,
                    format!("no {} on {}", field, location_url),
                )
                .await;
        }
        info
    }
}

#[async_trait]
impl PageExtractor for HttpPageExtractor {
    async fn extract(&self, link: &str) -> Result<ObservationRecord, HarvestError> {
        let url = resolve_link(&self.base_url, link)?;
        let body = fetch_page(&self.client, url.as_str()).await?;
        let parsed = parse_observation(&body, link, url.as_str())?;

        let location = self
            .lookup_location(link, parsed.location_href.as_deref())
            .await;
        Ok(parsed.into_record(location))
    }
}
