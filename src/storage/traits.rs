//! Storage traits and error types
//!
//! This module defines the trait interface for link-state backends, the
//! associated error type, and the tagged outcomes every read produces.

use crate::state::{AttemptLedger, LinkSet};
use crate::storage::ObservationRecord;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised when the persistence layer itself cannot be used
///
/// These are fatal for the current run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error for {path}: {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Outcome of reading one persisted file
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    /// The file parsed against its schema
    Loaded(T),

    /// The file does not exist or is blank
    Missing,

    /// The file exists but does not match its schema
    Malformed { reason: String },
}

/// Outcome of reading one line of the observation log
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// A complete, valid record
    Record(ObservationRecord),

    /// An empty or whitespace-only line
    Blank,

    /// Not a valid record (including a line truncated by a crash mid-append)
    Malformed { reason: String },
}

/// Trait for link-state backends
///
/// The reconciler and executor only talk to link state through this trait.
/// Every `save_*` must be atomic with respect to a process that starts right
/// after it returns.
#[async_trait]
pub trait LinkStateStore: Send + Sync {
    /// Links discovered but not yet scraped, in processing order
    async fn load_pending(&self) -> StorageResult<LinkSet>;

    /// Links whose most recent attempt failed
    async fn load_failed(&self) -> StorageResult<LinkSet>;

    /// Links present in the observation store
    async fn load_scraped(&self) -> StorageResult<LinkSet>;

    /// Links parked after reaching the attempt ceiling
    async fn load_exhausted(&self) -> StorageResult<LinkSet>;

    /// Failed-run counts per link
    async fn load_attempts(&self) -> StorageResult<AttemptLedger>;

    async fn save_pending(&self, links: &LinkSet) -> StorageResult<()>;

    async fn save_failed(&self, links: &LinkSet) -> StorageResult<()>;

    async fn save_exhausted(&self, links: &LinkSet) -> StorageResult<()>;

    async fn save_attempts(&self, attempts: &AttemptLedger) -> StorageResult<()>;
}
