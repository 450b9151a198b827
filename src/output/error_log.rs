//! Per-run error log
//!
//! One file per process run under the error-log directory, named after the run
//! start time. Lines look like `[category]: Item <item>: <message>`. The file is
//! only created by the first entry, and `finalize` removes it when the run
//! logged nothing.

use crate::output::OutputResult;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Append log of every failure caught at a loop boundary
pub struct ErrorLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
    entries: AtomicUsize,
}

impl ErrorLog {
    /// Creates the log for a run that started at `started_at`
    pub fn new(dir: impl Into<PathBuf>, started_at: DateTime<Utc>) -> Self {
        let name = format!("{}.txt", started_at.format("%Y-%m-%dT%H-%M-%S-%3fZ"));
        Self {
            path: dir.into().join(name),
            file: Mutex::new(None),
            entries: AtomicUsize::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of entries recorded so far
    pub fn entry_count(&self) -> usize {
        self.entries.load(Ordering::SeqCst)
    }

    pub fn has_entries(&self) -> bool {
        self.entry_count() > 0
    }

    /// Formats one log line
    pub fn format_entry(category: &str, item: &str, message: &str) -> String {
        format!("[{}]: Item {}: {}\n", category, item, message)
    }

    /// Appends one entry
    ///
    /// Failing to write the error log never aborts the caller; it is reported
    /// through tracing instead.
    pub async fn record(&self, category: &str, item: &str, message: impl fmt::Display) {
        self.entries.fetch_add(1, Ordering::SeqCst);
        let line = Self::format_entry(category, item, &message.to_string());

        if let Err(e) = self.append(&line).await {
            tracing::warn!(
                "Could not write to error log {}: {}",
                self.path.display(),
                e
            );
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut guard = self.file.lock().await;
        if guard.is_none() {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent).await?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            *guard = Some(file);
        }

        if let Some(file) = guard.as_mut() {
            file.write_all(line.as_bytes()).await?;
            file.flush().await?;
        }
        Ok(())
    }

    /// Closes the log, deleting the file if nothing was recorded
    ///
    /// Returns the path of the retained log, if any.
    pub async fn finalize(&self) -> OutputResult<Option<PathBuf>> {
        let mut guard = self.file.lock().await;
        if let Some(mut file) = guard.take() {
            file.flush().await?;
        }

        if self.has_entries() {
            tracing::info!(
                "{} error(s) recorded in {}",
                self.entry_count(),
                self.path.display()
            );
            return Ok(Some(self.path.clone()));
        }

        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!("No errors occurred during execution; no error log kept");
        Ok(None)
    }
}
