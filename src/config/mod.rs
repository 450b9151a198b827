//! Configuration module for obs-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use obs_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Listing pages per run: {}", config.discovery.default_page_limit);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DiscoveryConfig, OutputConfig, ScrapeConfig, SourceConfig, UserAgentConfig,
};

// Re-export parser functions
pub use parser::{load_config, parse_config};
