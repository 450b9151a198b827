//! File primitives shared by the stores
//!
//! Whole-file writes go through a temp file in the same directory followed by
//! a rename, so a reader never observes a truncated file.

use crate::storage::{LoadOutcome, StorageError, StorageResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

fn io_error(path: &Path, source: std::io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Temp file used while replacing `path`
pub fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(".{}.tmp", name))
}

/// Ensures the parent directory of `path` exists
pub async fn ensure_parent(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }
    }
    Ok(())
}

/// Atomically replaces `path` with `bytes`
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    ensure_parent(path).await?;
    let temp_path = temp_path_for(path);

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| io_error(&temp_path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| io_error(&temp_path, e))?;
    file.flush().await.map_err(|e| io_error(&temp_path, e))?;
    file.sync_all().await.map_err(|e| io_error(&temp_path, e))?;
    drop(file);

    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(io_error(path, e));
    }

    Ok(())
}

/// Serializes `value` as pretty JSON and atomically writes it to `path`
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StorageResult<()> {
    let json = serde_json::to_string_pretty(value).map_err(|source| {
        StorageError::Serialization {
            path: path.to_path_buf(),
            source,
        }
    })?;
    write_atomic(path, json.as_bytes()).await
}

/// Reads `path` and validates it against `T`
///
/// A missing or blank file is `Missing`; content that is not UTF-8 or does not
/// deserialize into `T` is `Malformed`. Only genuine I/O failures are errors.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<LoadOutcome<T>> {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(LoadOutcome::Missing),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Ok(LoadOutcome::Malformed {
                reason: format!("not valid UTF-8: {}", e),
            })
        }
        Err(e) => return Err(io_error(path, e)),
    };

    if content.trim().is_empty() {
        return Ok(LoadOutcome::Missing);
    }

    match serde_json::from_str(&content) {
        Ok(value) => Ok(LoadOutcome::Loaded(value)),
        Err(e) => Ok(LoadOutcome::Malformed {
            reason: e.to_string(),
        }),
    }
}

/// Copies an unreadable state file aside so the next save cannot destroy it
pub async fn quarantine(path: &Path) -> StorageResult<PathBuf> {
    let stamp = chrono::Utc::now().format("%Y%m%dT%H%M%S");
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".to_string());
    let target = path.with_file_name(format!("{}.malformed-{}", name, stamp));
    fs::copy(path, &target)
        .await
        .map_err(|e| io_error(&target, e))?;
    Ok(target)
}
