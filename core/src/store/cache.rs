// Offline cache — durable buffer for batches the relay could not deliver
//
// One UTF-8 text file, one JSON-encoded batch per line. The file survives
// process restarts; a later successful relay send clears it. All operations
// on one handle are serialized behind an async mutex: exactly one writer at a
// time, and Append/ReadAll/Clear are mutually exclusive.

use crate::reading::{self, MeasurementBatch};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt cache entry: {0}")]
    Parse(#[from] reading::CodecError),
}

/// Result of cleanup-on-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    /// Well-formed entries kept in the rewritten log.
    pub kept: usize,
    /// Malformed lines dropped. Each is a lost measurement batch.
    pub dropped: usize,
}

/// Durable append-only batch log.
pub struct OfflineCache {
    path: PathBuf,
    lock: Mutex<()>,
}

impl OfflineCache {
    /// Open the cache, performing cleanup-on-open.
    ///
    /// Every line is parsed as a batch document; empty lines are ignored and
    /// malformed lines are dropped with a warning, then the log is rewritten
    /// containing only the valid entries. Dropped lines are lost data, never
    /// retried — the report carries the count so callers can surface it.
    pub async fn open(path: impl AsRef<Path>) -> Result<(Self, CleanupReport), CacheError> {
        let path = path.as_ref().to_path_buf();

        let contents = match fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let mut valid = Vec::new();
        let mut dropped = 0usize;
        for (idx, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match reading::decode_batch(line) {
                Ok(_) => valid.push(line),
                Err(e) => {
                    dropped += 1;
                    warn!(
                        cache = %path.display(),
                        line = idx + 1,
                        "dropping corrupt cache entry, measurements lost: {e}"
                    );
                }
            }
        }

        let report = CleanupReport {
            kept: valid.len(),
            dropped,
        };

        let mut rewritten = valid.join("\n");
        if !rewritten.is_empty() {
            rewritten.push('\n');
        }
        Self::write_atomic(&path, rewritten.as_bytes()).await?;

        Ok((
            Self {
                path,
                lock: Mutex::new(()),
            },
            report,
        ))
    }

    /// Append one batch as a new line.
    ///
    /// Failure is terminal for this attempt only; the caller retries on its
    /// next cycle.
    pub async fn append(&self, batch: &MeasurementBatch) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;

        let mut line = reading::encode_batch(batch)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;
        file.flush().await.map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Read every cached batch, in append order.
    pub async fn read_all(&self) -> Result<Vec<MeasurementBatch>, CacheError> {
        let _guard = self.lock.lock().await;

        let contents = match fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| reading::decode_batch(line).map_err(CacheError::Parse))
            .collect()
    }

    /// Empty the log. Idempotent.
    pub async fn clear(&self) -> Result<(), CacheError> {
        let _guard = self.lock.lock().await;
        Self::write_atomic(&self.path, b"").await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CacheError> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, contents)
            .await
            .map_err(|source| CacheError::Io {
                path: tmp.clone(),
                source,
            })?;
        fs::rename(&tmp, path).await.map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::DeviceReading;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn batch(minute: u32) -> MeasurementBatch {
        let mut batch = MeasurementBatch::new(
            NaiveDate::from_ymd_opt(2023, 5, 1)
                .unwrap()
                .and_hms_opt(12, minute, 0)
                .unwrap(),
        );
        batch
            .devices
            .insert("Device1".into(), DeviceReading::Unreachable);
        batch
    }

    #[tokio::test]
    async fn test_append_then_read_all_in_order() {
        let dir = tempdir().unwrap();
        let (cache, report) = OfflineCache::open(dir.path().join("cache.log")).await.unwrap();
        assert_eq!(report, CleanupReport { kept: 0, dropped: 0 });

        cache.append(&batch(1)).await.unwrap();
        cache.append(&batch(2)).await.unwrap();
        cache.append(&batch(3)).await.unwrap();

        let all = cache.read_all().await.unwrap();
        assert_eq!(all, vec![batch(1), batch(2), batch(3)]);
    }

    #[tokio::test]
    async fn test_cleanup_drops_malformed_lines_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        let good = crate::reading::encode_batch(&batch(7)).unwrap();
        let contents = format!("{good}\nnot json\n\n{good}\n{{\"half\":\n");
        std::fs::write(&path, contents).unwrap();

        let (cache, report) = OfflineCache::open(&path).await.unwrap();
        assert_eq!(report, CleanupReport { kept: 2, dropped: 2 });

        let all = cache.read_all().await.unwrap();
        assert_eq!(all, vec![batch(7), batch(7)]);

        // The log itself was rewritten with only the valid entries.
        let rewritten = std::fs::read_to_string(&path).unwrap();
        assert_eq!(rewritten.lines().count(), 2);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let dir = tempdir().unwrap();
        let (cache, _) = OfflineCache::open(dir.path().join("cache.log")).await.unwrap();

        cache.append(&batch(1)).await.unwrap();
        cache.clear().await.unwrap();
        assert!(cache.read_all().await.unwrap().is_empty());

        cache.clear().await.unwrap();
        assert!(cache.read_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.log");

        {
            let (cache, _) = OfflineCache::open(&path).await.unwrap();
            cache.append(&batch(1)).await.unwrap();
            cache.append(&batch(2)).await.unwrap();
        }

        let (cache, report) = OfflineCache::open(&path).await.unwrap();
        assert_eq!(report.kept, 2);
        assert_eq!(cache.read_all().await.unwrap(), vec![batch(1), batch(2)]);
    }
}
