//! Persistence for the single cached [`TokenRecord`].
//!
//! [`FileTokenStore`] keeps the record as a small JSON object in the user's
//! home directory; [`MemoryTokenStore`] keeps it in process memory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use super::TokenRecord;
use crate::error::Result;

/// Storage capability for the cached token record.
///
/// `read` never fails: anything that prevents loading a complete record is
/// reported as `None` so the caller falls back to fetching.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads the persisted record, if a complete one exists.
    async fn read(&self) -> Option<TokenRecord>;

    /// Replaces the persisted record.
    async fn write(&self, record: &TokenRecord) -> Result<()>;
}

/// On-disk shape of the cache file. Both fields may be missing.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    expiration_time: Option<u64>,
}

impl StoredRecord {
    fn into_record(self) -> Option<TokenRecord> {
        match (self.token, self.expiration_time) {
            (Some(token), Some(expiration_time)) if !token.is_empty() && expiration_time > 0 => {
                Some(TokenRecord {
                    token,
                    expiration_time,
                })
            }
            _ => None,
        }
    }
}

/// Token store backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Creates a store for the given file path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store at the default location (`~/.azure-gpt-config.json`).
    #[must_use]
    pub fn default_location() -> Self {
        Self::new(crate::util::token_cache_path())
    }

    /// Path of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn read(&self) -> Option<TokenRecord> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "token cache not readable");
                return None;
            }
        };

        match serde_json::from_str::<StoredRecord>(&content) {
            Ok(stored) => stored.into_record(),
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "token cache is malformed");
                None
            }
        }
    }

    async fn write(&self, record: &TokenRecord) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(record)?;
        tokio::fs::write(&self.path, content).await?;
        debug!(path = %self.path.display(), "saved token cache");

        Ok(())
    }
}

/// Token store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    record: RwLock<Option<TokenRecord>>,
}

impl MemoryTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `record`.
    #[must_use]
    pub fn with_record(record: TokenRecord) -> Self {
        Self {
            record: RwLock::new(Some(record)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn read(&self) -> Option<TokenRecord> {
        self.record.read().await.clone()
    }

    async fn write(&self, record: &TokenRecord) -> Result<()> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use assert_fs::TempDir;
    use assert_fs::prelude::*;

    use super::*;

    fn record(token: &str, expiration_time: u64) -> TokenRecord {
        TokenRecord {
            token: token.to_owned(),
            expiration_time,
        }
    }

    mod file_store {
        use super::*;

        #[tokio::test]
        async fn missing_file_reads_as_none() {
            let dir = TempDir::new().unwrap();
            let store = FileTokenStore::new(dir.child("cache.json").path());
            assert!(store.read().await.is_none());
        }

        #[tokio::test]
        async fn malformed_file_reads_as_none() {
            let dir = TempDir::new().unwrap();
            let file = dir.child("cache.json");
            file.write_str("{ not json").unwrap();

            let store = FileTokenStore::new(file.path());
            assert!(store.read().await.is_none());
        }

        #[tokio::test]
        async fn empty_object_reads_as_none() {
            let dir = TempDir::new().unwrap();
            let file = dir.child("cache.json");
            file.write_str("{}").unwrap();

            let store = FileTokenStore::new(file.path());
            assert!(store.read().await.is_none());
        }

        #[tokio::test]
        async fn partial_record_reads_as_none() {
            let dir = TempDir::new().unwrap();
            let file = dir.child("cache.json");
            file.write_str(r#"{ "token": "abc" }"#).unwrap();
            let store = FileTokenStore::new(file.path());
            assert!(store.read().await.is_none());

            file.write_str(r#"{ "expirationTime": 42 }"#).unwrap();
            assert!(store.read().await.is_none());

            file.write_str(r#"{ "token": "", "expirationTime": 42 }"#)
                .unwrap();
            assert!(store.read().await.is_none());
        }

        #[tokio::test]
        async fn reads_camel_case_fields() {
            let dir = TempDir::new().unwrap();
            let file = dir.child("cache.json");
            file.write_str(r#"{ "token": "abc", "expirationTime": 1700000000000 }"#)
                .unwrap();

            let store = FileTokenStore::new(file.path());
            assert_eq!(store.read().await, Some(record("abc", 1_700_000_000_000)));
        }

        #[tokio::test]
        async fn write_then_read() {
            let dir = TempDir::new().unwrap();
            let store = FileTokenStore::new(dir.child("nested/cache.json").path());

            store.write(&record("xyz", 99)).await.unwrap();
            assert_eq!(store.read().await, Some(record("xyz", 99)));

            let raw = std::fs::read_to_string(store.path()).unwrap();
            assert!(raw.contains("\"expirationTime\": 99"));
            assert!(raw.contains("\n  \"token\": \"xyz\""));
        }

        #[tokio::test]
        async fn write_replaces_previous_content() {
            let dir = TempDir::new().unwrap();
            let file = dir.child("cache.json");
            file.write_str(r#"{ "token": "old", "expirationTime": 1, "extra": true }"#)
                .unwrap();

            let store = FileTokenStore::new(file.path());
            store.write(&record("new", 2)).await.unwrap();

            let raw = std::fs::read_to_string(file.path()).unwrap();
            assert!(!raw.contains("extra"));
            assert_eq!(store.read().await, Some(record("new", 2)));
        }

        #[tokio::test]
        async fn write_into_file_parent_fails() {
            let dir = TempDir::new().unwrap();
            let blocker = dir.child("blocker");
            blocker.write_str("not a directory").unwrap();

            let store = FileTokenStore::new(blocker.path().join("cache.json"));
            assert!(store.write(&record("x", 1)).await.is_err());
        }
    }

    mod memory_store {
        use super::*;

        #[tokio::test]
        async fn starts_empty() {
            assert!(MemoryTokenStore::new().read().await.is_none());
        }

        #[tokio::test]
        async fn write_overwrites() {
            let store = MemoryTokenStore::with_record(record("a", 1));
            store.write(&record("b", 2)).await.unwrap();
            assert_eq!(store.read().await, Some(record("b", 2)));
        }
    }
}
