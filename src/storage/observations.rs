//! Append-only observation log
//!
//! One JSON object per line. Records are never rewritten or removed; the set
//! of links present in this file is the authoritative "scraped" set.

use crate::state::LinkSet;
use crate::storage::files::ensure_parent;
use crate::storage::{LineOutcome, StorageError, StorageResult};
use crate::Link;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// One extracted observation; identity is `link`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    pub link: Link,
    pub date: String,
    pub number_text: String,
    pub sex: Option<String>,
    pub life_stage: Option<String>,
    pub country: Option<String>,
    pub location: Option<String>,
    pub province: Option<String>,
    pub x_ea: Option<String>,
    pub y_n: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub activity: String,
    pub on_in: Option<String>,
    #[serde(default)]
    pub has_comments: bool,
    pub url: String,
}

/// Result of appending a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// A record for this link already exists; nothing was written
    Duplicate,
}

/// Everything read back from the log in one pass
#[derive(Debug, Default)]
pub struct ObservationScan {
    pub records: Vec<ObservationRecord>,
    /// 1-based line numbers that were skipped, with the reason
    pub malformed: Vec<(usize, String)>,
    /// True when the file does not end in a newline (crash mid-append)
    pub unterminated: bool,
}

impl ObservationScan {
    pub fn links(&self) -> LinkSet {
        self.records.iter().map(|r| r.link.clone()).collect()
    }
}

/// Validates one log line against the record schema
pub fn parse_line(line: &str) -> LineOutcome {
    let line = line.trim();
    if line.is_empty() {
        return LineOutcome::Blank;
    }

    match serde_json::from_str::<ObservationRecord>(line) {
        Ok(record) if record.link.trim().is_empty() => LineOutcome::Malformed {
            reason: "record has an empty link".to_string(),
        },
        Ok(record) => LineOutcome::Record(record),
        Err(e) => LineOutcome::Malformed {
            reason: e.to_string(),
        },
    }
}

/// Reads the whole log, skipping lines that are not complete records
///
/// A missing file reads as empty. Skipped lines are reported as warnings.
pub async fn scan_observations(path: &Path) -> StorageResult<ObservationScan> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ObservationScan::default()),
        Err(e) => {
            return Err(StorageError::Io {
                path: path.to_path_buf(),
                source: e,
            })
        }
    };

    let content = String::from_utf8_lossy(&bytes);
    let mut scan = ObservationScan {
        unterminated: !content.is_empty() && !content.ends_with('\n'),
        ..Default::default()
    };

    for (index, line) in content.lines().enumerate() {
        match parse_line(line) {
            LineOutcome::Record(record) => scan.records.push(record),
            LineOutcome::Blank => {}
            LineOutcome::Malformed { reason } => {
                tracing::warn!(
                    "Skipping malformed line {} in {}: {}",
                    index + 1,
                    path.display(),
                    reason
                );
                scan.malformed.push((index + 1, reason));
            }
        }
    }

    Ok(scan)
}

/// Append-only writer over the observation log
pub struct ObservationStore {
    path: PathBuf,
    links: LinkSet,
    needs_newline: bool,
}

impl ObservationStore {
    /// Opens the log, indexing the links already recorded
    pub async fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let scan = scan_observations(&path).await?;
        if scan.unterminated {
            tracing::warn!(
                "{} ends with an incomplete line; next append starts on a new line",
                path.display()
            );
        }
        tracing::debug!(
            "Opened observation log {} ({} records)",
            path.display(),
            scan.records.len()
        );

        Ok(Self {
            links: scan.links(),
            needs_newline: scan.unterminated,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Links that already have a record
    pub fn links(&self) -> &LinkSet {
        &self.links
    }

    pub fn contains(&self, link: &str) -> bool {
        self.links.contains(link)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Durably appends one self-contained line
    ///
    /// Returns `Duplicate` without writing if the link is already recorded.
    pub async fn append(&mut self, record: &ObservationRecord) -> StorageResult<AppendOutcome> {
        if self.links.contains(&record.link) {
            return Ok(AppendOutcome::Duplicate);
        }

        let json = serde_json::to_string(record).map_err(|source| StorageError::Serialization {
            path: self.path.clone(),
            source,
        })?;

        let mut line = String::with_capacity(json.len() + 2);
        if self.needs_newline {
            line.push('\n');
        }
        line.push_str(&json);
        line.push('\n');

        ensure_parent(&self.path).await?;
        let io_error = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_error)?;
        file.write_all(line.as_bytes()).await.map_err(io_error)?;
        file.flush().await.map_err(io_error)?;
        file.sync_data().await.map_err(io_error)?;

        self.needs_newline = false;
        self.links.insert(record.link.clone());
        Ok(AppendOutcome::Written)
    }
}

#[cfg(test)]
pub(crate) fn sample_record(link: &str) -> ObservationRecord {
    ObservationRecord {
        link: link.to_string(),
        date: "14-05-23".to_string(),
        number_text: "1".to_string(),
        sex: Some("male".to_string()),
        life_stage: Some("imago".to_string()),
        country: Some("Belgium".to_string()),
        location: Some("Zoniënwoud".to_string()),
        province: Some("Vlaams-Brabant".to_string()),
        x_ea: Some("155123".to_string()),
        y_n: Some("162456".to_string()),
        latitude: Some("50.7712".to_string()),
        longitude: Some("4.4321".to_string()),
        activity: "foraging".to_string(),
        on_in: None,
        has_comments: false,
        url: format!("https://waarnemingen.be{}", link),
    }
}
