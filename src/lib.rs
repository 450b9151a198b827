//! obs-harvest: a resumable observation scraper
//!
//! This crate discovers observation links from a paginated listing, extracts one
//! structured record per link, and persists both progress and results so a run
//! can be stopped and resumed at any point without losing or duplicating work.

pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Opaque identifier of a scrapable resource (a site-relative path)
pub type Link = String;

/// Main error type for obs-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch failed for {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        transient: bool,
    },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true if the error comes from the persistence layer itself
    ///
    /// Only these errors abort a run; everything else is recorded per item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns true if retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Fetch { transient, .. } => *transient,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Reqwest(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Reasons an observation page is rejected instead of being recorded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Missing mandatory field '{field}' on {link}")]
    MissingField { link: String, field: &'static str },

    #[error("Multiple individuals detected in number '{text}' on {link}")]
    AmbiguousCount { link: String, text: String },

    #[error("Unparsable date '{raw}' on {link}")]
    InvalidDate { link: String, raw: String },
}

/// Result type alias for obs-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{LinkSet, LinkState, WorkQueue};
pub use storage::{LinkSetStore, ObservationRecord, ObservationStore};
