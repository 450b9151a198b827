//! JSON-file backed link sets
//!
//! Pending, failed and exhausted links are plain JSON string arrays; attempt
//! counts are a JSON object. The scraped set is never stored here: it is
//! derived from the observation log on every load.

use crate::config::OutputConfig;
use crate::state::{AttemptLedger, LinkSet};
use crate::storage::files::{quarantine, read_json, write_json};
use crate::storage::observations::scan_observations;
use crate::storage::{LinkStateStore, LoadOutcome, StorageResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Link-state backend over the files named in the output configuration
#[derive(Debug, Clone)]
pub struct LinkSetStore {
    pending_path: PathBuf,
    failed_path: PathBuf,
    exhausted_path: PathBuf,
    attempts_path: PathBuf,
    observations_path: PathBuf,
}

impl LinkSetStore {
    pub fn new(
        pending_path: PathBuf,
        failed_path: PathBuf,
        exhausted_path: PathBuf,
        attempts_path: PathBuf,
        observations_path: PathBuf,
    ) -> Self {
        Self {
            pending_path,
            failed_path,
            exhausted_path,
            attempts_path,
            observations_path,
        }
    }

    pub fn from_config(output: &OutputConfig) -> Self {
        Self::new(
            output.pending_path(),
            output.failed_path(),
            output.exhausted_path(),
            output.attempts_path(),
            output.observations_path(),
        )
    }

    pub fn pending_path(&self) -> &Path {
        &self.pending_path
    }

    pub fn failed_path(&self) -> &Path {
        &self.failed_path
    }

    pub fn observations_path(&self) -> &Path {
        &self.observations_path
    }

    /// Loads one file, degrading to the default value when unusable
    ///
    /// A malformed file is copied aside before anything can overwrite it.
    async fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> StorageResult<T> {
        match read_json::<T>(path).await? {
            LoadOutcome::Loaded(value) => Ok(value),
            LoadOutcome::Missing => {
                tracing::debug!("{} not found, starting empty", path.display());
                Ok(T::default())
            }
            LoadOutcome::Malformed { reason } => {
                match quarantine(path).await {
                    Ok(copy) => tracing::warn!(
                        "Malformed state file {} ({}); treating as empty, original kept at {}",
                        path.display(),
                        reason,
                        copy.display()
                    ),
                    Err(e) => tracing::warn!(
                        "Malformed state file {} ({}); treating as empty, could not keep a copy: {}",
                        path.display(),
                        reason,
                        e
                    ),
                }
                Ok(T::default())
            }
        }
    }
}

#[async_trait]
impl LinkStateStore for LinkSetStore {
    async fn load_pending(&self) -> StorageResult<LinkSet> {
        Self::load_or_default(&self.pending_path).await
    }

    async fn load_failed(&self) -> StorageResult<LinkSet> {
        Self::load_or_default(&self.failed_path).await
    }

    async fn load_scraped(&self) -> StorageResult<LinkSet> {
        let scan = scan_observations(&self.observations_path).await?;
        if !scan.malformed.is_empty() {
            tracing::warn!(
                "Skipped {} malformed line(s) while deriving scraped links",
                scan.malformed.len()
            );
        }
        Ok(scan.links())
    }

    async fn load_exhausted(&self) -> StorageResult<LinkSet> {
        Self::load_or_default(&self.exhausted_path).await
    }

    async fn load_attempts(&self) -> StorageResult<AttemptLedger> {
        Self::load_or_default(&self.attempts_path).await
    }

    async fn save_pending(&self, links: &LinkSet) -> StorageResult<()> {
        write_json(&self.pending_path, links).await
    }

    async fn save_failed(&self, links: &LinkSet) -> StorageResult<()> {
        write_json(&self.failed_path, links).await
    }

    async fn save_exhausted(&self, links: &LinkSet) -> StorageResult<()> {
        write_json(&self.exhausted_path, links).await
    }

    async fn save_attempts(&self, attempts: &AttemptLedger) -> StorageResult<()> {
        write_json(&self.attempts_path, attempts).await
    }
}
