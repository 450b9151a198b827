use serde::Deserialize;
use std::path::PathBuf;

/// Main configuration structure for obs-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// The site being harvested
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Base URL that relative links are resolved against
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Listing URL used when discovery is started without a seed
    #[serde(rename = "default-listing-url")]
    pub default_listing_url: String,

    /// Only anchors whose href starts with this prefix are candidate links
    #[serde(rename = "link-prefix", default = "default_link_prefix")]
    pub link_prefix: String,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the harvester
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the harvester
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Listing pagination behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    /// Page limit used when none is given (0 = unbounded)
    #[serde(rename = "default-page-limit", default = "default_page_limit")]
    pub default_page_limit: u32,

    /// Lower bound of the randomized inter-page delay (milliseconds)
    #[serde(rename = "min-delay-ms", default = "default_min_page_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized inter-page delay (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_max_page_delay")]
    pub max_delay_ms: u64,

    /// Attempts per listing page before it is skipped
    #[serde(rename = "max-page-attempts", default = "default_max_page_attempts")]
    pub max_page_attempts: u32,

    /// Backoff before the second attempt of a page (milliseconds)
    #[serde(rename = "backoff-base-ms", default = "default_backoff_base")]
    pub backoff_base_ms: u64,

    /// Backoff cap (milliseconds)
    #[serde(rename = "backoff-max-ms", default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Consecutive skipped pages after which discovery gives up
    #[serde(
        rename = "max-consecutive-skips",
        default = "default_max_consecutive_skips"
    )]
    pub max_consecutive_skips: u32,
}

/// Scrape run behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeConfig {
    /// Failed runs after which a link is parked as exhausted (0 = never)
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Lower bound of the randomized inter-item delay (milliseconds)
    #[serde(rename = "min-delay-ms", default)]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized inter-item delay (milliseconds)
    #[serde(rename = "max-delay-ms", default)]
    pub max_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Directory all state files live in
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,

    #[serde(rename = "pending-file", default = "default_pending_file")]
    pub pending_file: String,

    #[serde(rename = "failed-file", default = "default_failed_file")]
    pub failed_file: String,

    #[serde(rename = "observations-file", default = "default_observations_file")]
    pub observations_file: String,

    #[serde(rename = "attempts-file", default = "default_attempts_file")]
    pub attempts_file: String,

    #[serde(rename = "exhausted-file", default = "default_exhausted_file")]
    pub exhausted_file: String,

    #[serde(rename = "error-log-dir", default = "default_error_log_dir")]
    pub error_log_dir: String,

    #[serde(rename = "export-file", default = "default_export_file")]
    pub export_file: String,
}

impl OutputConfig {
    /// Resolves a configured file name against the data directory
    pub fn path_of(&self, file: &str) -> PathBuf {
        PathBuf::from(&self.data_dir).join(file)
    }

    pub fn pending_path(&self) -> PathBuf {
        self.path_of(&self.pending_file)
    }

    pub fn failed_path(&self) -> PathBuf {
        self.path_of(&self.failed_file)
    }

    pub fn observations_path(&self) -> PathBuf {
        self.path_of(&self.observations_file)
    }

    pub fn attempts_path(&self) -> PathBuf {
        self.path_of(&self.attempts_file)
    }

    pub fn exhausted_path(&self) -> PathBuf {
        self.path_of(&self.exhausted_file)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.path_of(&self.error_log_dir)
    }

    pub fn export_path(&self) -> PathBuf {
        self.path_of(&self.export_file)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            default_page_limit: default_page_limit(),
            min_delay_ms: default_min_page_delay(),
            max_delay_ms: default_max_page_delay(),
            max_page_attempts: default_max_page_attempts(),
            backoff_base_ms: default_backoff_base(),
            backoff_max_ms: default_backoff_max(),
            max_consecutive_skips: default_max_consecutive_skips(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            min_delay_ms: 0,
            max_delay_ms: 0,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pending_file: default_pending_file(),
            failed_file: default_failed_file(),
            observations_file: default_observations_file(),
            attempts_file: default_attempts_file(),
            exhausted_file: default_exhausted_file(),
            error_log_dir: default_error_log_dir(),
            export_file: default_export_file(),
        }
    }
}

fn default_link_prefix() -> String {
    "/observation/".to_string()
}

fn default_page_limit() -> u32 {
    1
}

fn default_min_page_delay() -> u64 {
    500
}

fn default_max_page_delay() -> u64 {
    3500
}

fn default_max_page_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

fn default_backoff_max() -> u64 {
    30_000
}

fn default_max_consecutive_skips() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    5
}

fn default_request_timeout() -> u64 {
    15
}

fn default_data_dir() -> String {
    ".".to_string()
}

fn default_pending_file() -> String {
    "fetched-links.json".to_string()
}

fn default_failed_file() -> String {
    "failed-links.json".to_string()
}

fn default_observations_file() -> String {
    "scraped-observations.json".to_string()
}

fn default_attempts_file() -> String {
    "link-attempts.json".to_string()
}

fn default_exhausted_file() -> String {
    "exhausted-links.json".to_string()
}

fn default_error_log_dir() -> String {
    "error-logs".to_string()
}

fn default_export_file() -> String {
    "scraped-observations.csv".to_string()
}
