//! Bearer token acquisition with an expiry-based file cache.
//!
//! [`TokenManager`] answers every request for a token by first consulting a
//! [`TokenStore`]. A stored record whose expiration time is still in the
//! future is returned as-is; otherwise a [`TokenFetcher`] obtains a new token,
//! which is stamped with `now + validity margin` and written back.
//!
//! The cache is meant for a single CLI process at a time. There is no lock
//! around the file: two callers racing past expiry both fetch and the later
//! write wins, which is harmless because bearer tokens are interchangeable.
//!
//! ```rust,ignore
//! use azgpt::token::{Credentials, FileTokenStore, HttpTokenFetcher, TokenManager};
//!
//! let fetcher = HttpTokenFetcher::new(
//!     "https://login.example.com/token",
//!     Credentials::client_id("234"),
//! )?;
//! let manager = TokenManager::new(FileTokenStore::default_location(), fetcher);
//! let token = manager.get_auth_token().await?;
//! ```

mod fetcher;
mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub use fetcher::{
    Credentials, DEFAULT_TOKEN_URL, HttpTokenFetcher, HttpTokenFetcherBuilder, TokenFetcher,
};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};

use crate::config::TokenConfig;
use crate::error::Result;
use crate::util::{duration_ms, timestamp_ms};

/// How long a freshly fetched token is reused: 55 minutes, five minutes
/// short of the usual one-hour token lifetime.
pub const DEFAULT_VALIDITY_MARGIN: Duration = Duration::from_secs(55 * 60);

/// A cached bearer token and the instant after which it must not be reused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    /// Opaque bearer token.
    pub token: String,
    /// Expiration instant in milliseconds since the Unix epoch.
    pub expiration_time: u64,
}

impl TokenRecord {
    /// Creates a record for a token fetched at `now_ms`.
    #[must_use]
    pub fn issued_at(token: impl Into<String>, now_ms: u64, margin: Duration) -> Self {
        Self {
            token: token.into(),
            expiration_time: now_ms.saturating_add(duration_ms(margin)),
        }
    }

    /// Whether the record may still be used at `now_ms`.
    #[must_use]
    pub const fn is_valid_at(&self, now_ms: u64) -> bool {
        self.expiration_time > now_ms
    }

    /// Time left before expiry, or `None` once expired.
    #[must_use]
    pub const fn remaining_at(&self, now_ms: u64) -> Option<Duration> {
        if self.is_valid_at(now_ms) {
            Some(Duration::from_millis(self.expiration_time - now_ms))
        } else {
            None
        }
    }
}

/// Anything able to hand out a bearer token for API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token suitable for an `Authorization: Bearer` header.
    async fn auth_token(&self) -> Result<String>;
}

/// Cache-first token source.
#[derive(Clone)]
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    fetcher: Arc<dyn TokenFetcher>,
    validity_margin: Duration,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("validity_margin", &self.validity_margin)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    /// Creates a manager with the default validity margin.
    #[must_use]
    pub fn new(store: impl TokenStore + 'static, fetcher: impl TokenFetcher + 'static) -> Self {
        Self::from_parts(Arc::new(store), Arc::new(fetcher))
    }

    /// Creates a manager from shared store and fetcher handles.
    #[must_use]
    pub fn from_parts(store: Arc<dyn TokenStore>, fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            store,
            fetcher,
            validity_margin: DEFAULT_VALIDITY_MARGIN,
        }
    }

    /// Builds the file-backed manager described by `config`.
    pub fn from_config(config: &TokenConfig) -> Result<Self> {
        let mut builder = HttpTokenFetcher::builder(&config.endpoint, config.credentials.clone())
            .accept_invalid_certs(config.accept_invalid_certs);
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(
            Self::new(FileTokenStore::new(&config.cache_path), builder.build()?)
                .with_validity_margin(config.validity_margin),
        )
    }

    /// Sets how long fetched tokens are reused.
    #[must_use]
    pub const fn with_validity_margin(mut self, margin: Duration) -> Self {
        self.validity_margin = margin;
        self
    }

    /// The configured validity margin.
    #[must_use]
    pub const fn validity_margin(&self) -> Duration {
        self.validity_margin
    }

    /// Returns the cached token while it is valid, otherwise fetches and
    /// caches a new one.
    ///
    /// # Errors
    ///
    /// Fails when a fetch is needed and the token endpoint rejects the
    /// request or cannot be reached. A failed cache write is only logged.
    pub async fn get_auth_token(&self) -> Result<String> {
        self.get_auth_token_at(timestamp_ms()).await
    }

    async fn get_auth_token_at(&self, now_ms: u64) -> Result<String> {
        match self.store.read().await {
            Some(record) if record.is_valid_at(now_ms) => {
                debug!(
                    expires_in_ms = record.expiration_time - now_ms,
                    "using cached token"
                );
                Ok(record.token)
            }
            Some(_) => {
                debug!("cached token expired");
                Ok(self.fetch_and_store(now_ms).await?.record.token)
            }
            None => {
                debug!("no cached token");
                Ok(self.fetch_and_store(now_ms).await?.record.token)
            }
        }
    }

    /// Fetches a new token regardless of the cache and stores it.
    ///
    /// A failed cache write does not fail the refresh; check
    /// [`Refreshed::persisted`].
    ///
    /// # Errors
    ///
    /// Fails when the token endpoint rejects the request or cannot be reached.
    pub async fn refresh(&self) -> Result<Refreshed> {
        self.fetch_and_store(timestamp_ms()).await
    }

    /// The currently stored record, valid or not.
    pub async fn cached(&self) -> Option<TokenRecord> {
        self.store.read().await
    }

    async fn fetch_and_store(&self, now_ms: u64) -> Result<Refreshed> {
        let token = self.fetcher.fetch_token().await?;
        let record = TokenRecord::issued_at(token, now_ms, self.validity_margin);
        info!(expiration_time = record.expiration_time, "fetched new token");

        let persisted = match self.store.write(&record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to write token cache");
                false
            }
        };

        Ok(Refreshed { record, persisted })
    }
}

/// A newly fetched token record and whether the store accepted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refreshed {
    /// The record handed to the store.
    pub record: TokenRecord,
    /// `false` when the store write failed; the token is still usable.
    pub persisted: bool,
}

#[async_trait]
impl TokenProvider for TokenManager {
    async fn auth_token(&self) -> Result<String> {
        self.get_auth_token().await
    }
}

/// A fixed token, for callers that already hold one.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn auth_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::Error;

    const NOW: u64 = 1_700_000_000_000;

    /// Fetcher returning a fixed answer and counting calls.
    #[derive(Debug, Default)]
    struct CountingFetcher {
        token: String,
        fail_with: Option<u16>,
        calls: AtomicUsize,
    }

    impl CountingFetcher {
        fn ok(token: &str) -> Arc<Self> {
            Arc::new(Self {
                token: token.to_owned(),
                ..Self::default()
            })
        }

        fn failing(status: u16) -> Arc<Self> {
            Arc::new(Self {
                fail_with: Some(status),
                ..Self::default()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenFetcher for CountingFetcher {
        async fn fetch_token(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(status) => Err(Error::auth_fetch(
                    reqwest::StatusCode::from_u16(status).unwrap(),
                )),
                None => Ok(self.token.clone()),
            }
        }
    }

    /// Store wrapper counting writes, optionally refusing them.
    #[derive(Debug, Default)]
    struct SpyStore {
        inner: MemoryTokenStore,
        writes: AtomicUsize,
        read_only: bool,
    }

    impl SpyStore {
        fn with(record: TokenRecord) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryTokenStore::with_record(record),
                ..Self::default()
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn read_only() -> Arc<Self> {
            Arc::new(Self {
                read_only: true,
                ..Self::default()
            })
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenStore for SpyStore {
        async fn read(&self) -> Option<TokenRecord> {
            self.inner.read().await
        }

        async fn write(&self, record: &TokenRecord) -> Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.read_only {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only",
                )
                .into());
            }
            self.inner.write(record).await
        }
    }

    fn manager(store: &Arc<SpyStore>, fetcher: &Arc<CountingFetcher>) -> TokenManager {
        TokenManager::from_parts(Arc::<SpyStore>::clone(store), Arc::<CountingFetcher>::clone(fetcher))
    }

    mod record {
        use super::*;

        #[test]
        fn issued_at_adds_margin() {
            let record = TokenRecord::issued_at("t", NOW, DEFAULT_VALIDITY_MARGIN);
            assert_eq!(record.expiration_time, NOW + 55 * 60 * 1000);
        }

        #[test]
        fn validity_is_strict() {
            let record = TokenRecord::issued_at("t", NOW, Duration::from_secs(1));
            assert!(record.is_valid_at(NOW + 999));
            assert!(!record.is_valid_at(NOW + 1000));
            assert_eq!(record.remaining_at(NOW + 400), Some(Duration::from_millis(600)));
            assert_eq!(record.remaining_at(NOW + 2000), None);
        }

        #[test]
        fn serializes_camel_case() {
            let record = TokenRecord::issued_at("abc", 0, Duration::from_millis(5));
            let json = serde_json::to_value(&record).unwrap();
            assert_eq!(json["token"], "abc");
            assert_eq!(json["expirationTime"], 5);
        }
    }

    mod manager {
        use super::*;

        #[tokio::test]
        async fn valid_record_is_reused_without_fetch_or_write() {
            let store = SpyStore::with(TokenRecord {
                token: "abc".to_owned(),
                expiration_time: NOW + 10 * 60 * 1000,
            });
            let fetcher = CountingFetcher::ok("new");
            let mgr = manager(&store, &fetcher);

            assert_eq!(mgr.get_auth_token_at(NOW).await.unwrap(), "abc");
            assert_eq!(fetcher.calls(), 0);
            assert_eq!(store.writes(), 0);
        }

        #[tokio::test]
        async fn missing_record_fetches_and_persists() {
            let store = SpyStore::empty();
            let fetcher = CountingFetcher::ok("xyz");
            let mgr = manager(&store, &fetcher);

            assert_eq!(mgr.get_auth_token_at(NOW).await.unwrap(), "xyz");
            assert_eq!(fetcher.calls(), 1);
            assert_eq!(
                store.read().await,
                Some(TokenRecord {
                    token: "xyz".to_owned(),
                    expiration_time: NOW + 3_300_000,
                })
            );

            // second call inside the window is served from the cache
            assert_eq!(mgr.get_auth_token_at(NOW + 1).await.unwrap(), "xyz");
            assert_eq!(fetcher.calls(), 1);
            assert_eq!(store.writes(), 1);
        }

        #[tokio::test]
        async fn expired_record_is_replaced() {
            let store = SpyStore::with(TokenRecord {
                token: "old".to_owned(),
                expiration_time: NOW - 1000,
            });
            let fetcher = CountingFetcher::ok("fresh");
            let mgr = manager(&store, &fetcher);

            assert_eq!(mgr.get_auth_token_at(NOW).await.unwrap(), "fresh");
            assert_eq!(fetcher.calls(), 1);
            assert_eq!(store.read().await.unwrap().token, "fresh");
        }

        #[tokio::test]
        async fn record_expiring_exactly_now_is_invalid() {
            let store = SpyStore::with(TokenRecord {
                token: "edge".to_owned(),
                expiration_time: NOW,
            });
            let fetcher = CountingFetcher::ok("fresh");
            let mgr = manager(&store, &fetcher);

            assert_eq!(mgr.get_auth_token_at(NOW).await.unwrap(), "fresh");
            assert_eq!(fetcher.calls(), 1);
        }

        #[tokio::test]
        async fn write_failure_still_returns_token() {
            let store = SpyStore::read_only();
            let fetcher = CountingFetcher::ok("xyz");
            let mgr = manager(&store, &fetcher);

            assert_eq!(mgr.get_auth_token_at(NOW).await.unwrap(), "xyz");
            assert_eq!(store.writes(), 1);
            assert!(store.read().await.is_none());
        }

        #[tokio::test]
        async fn fetch_failure_propagates_and_writes_nothing() {
            let store = SpyStore::empty();
            let fetcher = CountingFetcher::failing(401);
            let mgr = manager(&store, &fetcher);

            let err = mgr.get_auth_token_at(NOW).await.unwrap_err();
            assert!(matches!(err, Error::AuthFetch { status: 401, .. }));
            assert!(err.to_string().contains("Unauthorized"));
            assert_eq!(store.writes(), 0);
        }

        #[tokio::test]
        async fn custom_margin_is_applied() {
            let store = SpyStore::empty();
            let fetcher = CountingFetcher::ok("t");
            let mgr = manager(&store, &fetcher).with_validity_margin(Duration::from_secs(60));

            mgr.get_auth_token_at(NOW).await.unwrap();
            assert_eq!(store.read().await.unwrap().expiration_time, NOW + 60_000);
        }

        #[tokio::test]
        async fn refresh_ignores_valid_cache() {
            let store = SpyStore::with(TokenRecord {
                token: "cached".to_owned(),
                expiration_time: u64::MAX,
            });
            let fetcher = CountingFetcher::ok("forced");
            let mgr = manager(&store, &fetcher);

            let refreshed = mgr.refresh().await.unwrap();
            assert_eq!(refreshed.record.token, "forced");
            assert!(refreshed.persisted);
            assert_eq!(mgr.cached().await.unwrap().token, "forced");
            assert_eq!(fetcher.calls(), 1);
        }

        #[tokio::test]
        async fn refresh_reports_failed_write_over_older_record() {
            let store = Arc::new(SpyStore {
                inner: MemoryTokenStore::with_record(TokenRecord {
                    token: "OLD".to_owned(),
                    expiration_time: 1,
                }),
                read_only: true,
                ..SpyStore::default()
            });
            let fetcher = CountingFetcher::ok("NEW");
            let mgr = manager(&store, &fetcher);

            let refreshed = mgr.refresh().await.unwrap();
            assert_eq!(refreshed.record.token, "NEW");
            assert!(!refreshed.persisted);
            // the stale record is still what the store holds
            assert_eq!(mgr.cached().await.unwrap().token, "OLD");
        }

        #[tokio::test]
        async fn token_provider_delegates_to_cache() {
            let store = SpyStore::with(TokenRecord {
                token: "abc".to_owned(),
                expiration_time: u64::MAX,
            });
            let fetcher = CountingFetcher::ok("new");
            let provider: Arc<dyn TokenProvider> = Arc::new(manager(&store, &fetcher));

            assert_eq!(provider.auth_token().await.unwrap(), "abc");
            assert_eq!(fetcher.calls(), 0);
        }
    }
}
