//! Persistent validation cache.
//!
//! Maps company numbers to the verdict of a completed validation, stored as a
//! JSON object (`{"01234567": {"status": "valid"}}`). Only accepting verdicts
//! are written; rejected companies stay uncached so a later run re-evaluates
//! them. Every new entry is flushed to disk before the caller continues, so an
//! interrupted run loses at most the company in flight.
//!
//! Each flush writes a sibling `<name>.tmp` file, syncs it and renames it over
//! the cache, so a crash mid-write leaves the previous contents in place.
//! The file has a single writer. Two runs pointed at the same file will race;
//! there is no file lock.

use crate::error::CacheError;
use bluechip_core::{CompanyNumber, Verdict};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// In-memory view of the cache file plus its location.
#[derive(Debug)]
pub struct ValidationCache {
    path: PathBuf,
    entries: BTreeMap<String, Verdict>,
}

impl ValidationCache {
    /// Load the cache at `path`.
    ///
    /// A missing or empty file is an empty cache.
    ///
    /// # Errors
    /// Returns `CacheError::Malformed` if the file is not a valid cache
    /// document, or `CacheError::Read` for other I/O failures.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();

        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No validation cache at {}, starting empty", path.display());
                return Ok(Self::empty(path));
            }
            Err(source) => return Err(CacheError::Read { path, source }),
        };

        if contents.trim().is_empty() {
            return Ok(Self::empty(path));
        }

        let entries = match serde_json::from_str(&contents) {
            Ok(entries) => entries,
            Err(source) => return Err(CacheError::Malformed { path, source }),
        };

        let cache = Self { path, entries };
        tracing::info!(
            "Loaded {} cached verdicts from {}",
            cache.len(),
            cache.path.display()
        );
        Ok(cache)
    }

    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            entries: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, number: &CompanyNumber) -> Option<&Verdict> {
        self.entries.get(number.as_str())
    }

    /// True when the company has a cached accepting verdict.
    #[must_use]
    pub fn is_valid(&self, number: &CompanyNumber) -> bool {
        self.get(number).is_some_and(|v| v.status.is_valid())
    }

    /// Record a verdict and flush it to disk immediately.
    ///
    /// Non-accepting verdicts are never cached, and an existing accepting
    /// verdict is never replaced. Returns whether anything was written.
    ///
    /// # Errors
    /// Returns `CacheError` if the flush fails; the entry stays in memory.
    pub async fn put(&mut self, number: &CompanyNumber, verdict: Verdict) -> Result<bool, CacheError> {
        if !verdict.status.is_valid() {
            tracing::debug!("Not caching {} verdict for {}", verdict.status, number);
            return Ok(false);
        }
        if self.is_valid(number) {
            return Ok(false);
        }

        self.entries.insert(number.as_str().to_string(), verdict);
        self.flush().await?;
        Ok(true)
    }

    /// Write the whole mapping to disk and sync it.
    ///
    /// The cache file is replaced by rename once the new contents are synced.
    ///
    /// # Errors
    /// Returns `CacheError::Write` if the file cannot be written, synced or
    /// moved into place. The previous cache file is left untouched.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let contents = serde_json::to_string_pretty(&self.entries)?;
        let staging = self.staging_path();
        let write_err = |source| CacheError::Write {
            path: self.path.clone(),
            source,
        };

        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(write_err)?;
        file.write_all(contents.as_bytes()).await.map_err(write_err)?;
        file.sync_all().await.map_err(write_err)?;
        drop(file);

        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        PathBuf::from(staging)
    }

    /// Drop every entry whose status is not `valid` and rewrite the file.
    ///
    /// Returns the number of entries removed.
    pub async fn purge_non_valid(&mut self) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|_, verdict| verdict.status.is_valid());
        let removed = before - self.entries.len();

        self.flush().await?;
        tracing::info!(
            "Purged {} non-valid entries from {}, {} remain",
            removed,
            self.path.display(),
            self.entries.len()
        );
        Ok(removed)
    }

    /// Company numbers with an accepting verdict, in key order.
    ///
    /// Keys that are not well-formed company numbers are logged and skipped.
    #[must_use]
    pub fn valid_numbers(&self) -> Vec<CompanyNumber> {
        self.entries
            .iter()
            .filter(|(_, verdict)| verdict.status.is_valid())
            .filter_map(|(key, _)| match CompanyNumber::new(key.as_str()) {
                Ok(number) => Some(number),
                Err(e) => {
                    tracing::warn!("Skipping malformed cache key '{}': {}", key, e);
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluechip_core::VerdictStatus;
    use tempfile::TempDir;

    fn number(raw: &str) -> CompanyNumber {
        CompanyNumber::new(raw).expect("valid company number")
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let tmp = TempDir::new().expect("create temp dir");
        let cache = ValidationCache::load(tmp.path().join("absent.json"))
            .await
            .expect("missing file is not an error");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_load_empty_file_is_empty() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache.json");
        tokio::fs::write(&path, "  \n").await.expect("write");

        let cache = ValidationCache::load(&path).await.expect("load");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_load_malformed_file_is_fatal() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache.json");
        tokio::fs::write(&path, "{\"01234567\": ").await.expect("write");

        let result = ValidationCache::load(&path).await;
        assert!(matches!(result, Err(CacheError::Malformed { .. })));
    }

    #[tokio::test]
    async fn test_put_is_durable_across_instances() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache.json");

        let mut cache = ValidationCache::load(&path).await.expect("load");
        let written = cache
            .put(&number("01234567"), Verdict::valid())
            .await
            .expect("put");
        assert!(written);

        let reloaded = ValidationCache::load(&path).await.expect("reload");
        assert!(reloaded.is_valid(&number("01234567")));

        let raw = tokio::fs::read_to_string(&path).await.expect("read");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("parse");
        assert_eq!(json["01234567"]["status"], "valid");
    }

    #[tokio::test]
    async fn test_interrupted_write_keeps_confirmed_entries() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache.json");

        let mut cache = ValidationCache::load(&path).await.expect("load");
        cache.put(&number("00000001"), Verdict::valid()).await.expect("put");
        cache.put(&number("00000002"), Verdict::valid()).await.expect("put");
        assert!(!tmp.path().join("cache.json.tmp").exists());

        // A write killed half way only ever touches the staging file.
        tokio::fs::write(tmp.path().join("cache.json.tmp"), "{\"00000003\": ")
            .await
            .expect("write partial staging file");

        let mut reloaded = ValidationCache::load(&path).await.expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_valid(&number("00000001")));
        assert!(reloaded.is_valid(&number("00000002")));

        reloaded
            .put(&number("00000003"), Verdict::valid())
            .await
            .expect("put after interrupted write");
        let reloaded = ValidationCache::load(&path).await.expect("reload");
        assert_eq!(reloaded.len(), 3);
    }

    #[tokio::test]
    async fn test_rejected_verdicts_are_not_cached() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache.json");

        let mut cache = ValidationCache::load(&path).await.expect("load");
        let written = cache
            .put(&number("01234567"), Verdict::rejected("dormant"))
            .await
            .expect("put");

        assert!(!written);
        assert!(cache.get(&number("01234567")).is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_valid_verdict_is_never_overwritten() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut cache = ValidationCache::load(tmp.path().join("cache.json"))
            .await
            .expect("load");

        let valid = Verdict::valid();
        cache.put(&number("01234567"), valid.clone()).await.expect("put");

        let other = Verdict {
            status: VerdictStatus::Valid,
            reason: Some("second opinion".to_string()),
        };
        let written = cache.put(&number("01234567"), other).await.expect("put");

        assert!(!written);
        assert_eq!(cache.get(&number("01234567")), Some(&valid));
    }

    #[tokio::test]
    async fn test_purge_non_valid() {
        let tmp = TempDir::new().expect("create temp dir");
        let path = tmp.path().join("cache.json");
        tokio::fs::write(
            &path,
            r#"{
                "00000001": {"status": "valid"},
                "00000002": {"status": "rejected"},
                "00000003": {"status": "pending"},
                "00000004": {"status": "valid"}
            }"#,
        )
        .await
        .expect("write");

        let mut cache = ValidationCache::load(&path).await.expect("load");
        let removed = cache.purge_non_valid().await.expect("purge");
        assert_eq!(removed, 2);

        let reloaded = ValidationCache::load(&path).await.expect("reload");
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.valid_numbers(),
            vec![number("00000001"), number("00000004")]
        );
    }
}
