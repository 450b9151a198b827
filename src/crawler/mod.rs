//! Crawler module for fetching and processing pages
//!
//! This module contains the network-facing logic, including:
//! - HTTP fetching with error classification
//! - HTML parsing of listing, observation and location pages
//! - Link discovery over a paginated listing
//! - The sequential scrape loop
//! - Backoff and courtesy delays

mod backoff;
mod discoverer;
mod executor;
mod extractor;
mod fetcher;
mod listing;
mod parser;

pub use backoff::{sleep_or_cancel, CourtesyDelay, ExponentialBackoff};
pub use discoverer::{DiscoveryReport, LinkDiscoverer, DISCOVERY_ERROR_CATEGORY};
pub use executor::{ScrapeExecutor, ScrapeReport, SCRAPE_ERROR_CATEGORY};
pub use extractor::{
    HttpPageExtractor, PageExtractor, EMPTY_LOCATION_CATEGORY, LOCATION_ERROR_CATEGORY,
};
pub use fetcher::{build_http_client, fetch_page, fetch_url, user_agent_string, FetchResult};
pub use listing::{HttpListingSource, ListingSource};
pub use parser::{
    count_numeric_tokens, format_observation_date, parse_listing, parse_location,
    parse_observation, ListingPage, LocationInfo, ParsedObservation,
};
