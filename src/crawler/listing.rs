//! Listing page source
//!
//! The discoverer asks a `ListingSource` for one parsed listing page at a
//! time, so pagination and retry policy can be tested without a network.

use crate::crawler::fetcher::fetch_page;
use crate::crawler::parser::{parse_listing, ListingPage};
use crate::HarvestError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

/// Fetches and parses one listing page
#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn fetch_listing(&self, url: &Url) -> Result<ListingPage, HarvestError>;
}

/// Listing source backed by the live site
pub struct HttpListingSource {
    client: Client,
    link_prefix: String,
}

impl HttpListingSource {
    pub fn new(client: Client, link_prefix: impl Into<String>) -> Self {
        Self {
            client,
            link_prefix: link_prefix.into(),
        }
    }
}

#[async_trait]
impl ListingSource for HttpListingSource {
    async fn fetch_listing(&self, url: &Url) -> Result<ListingPage, HarvestError> {
        let body = fetch_page(&self.client, url.as_str()).await?;
        Ok(parse_listing(&body, &self.link_prefix))
    }
}
