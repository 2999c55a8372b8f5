//! Trusted key set cache.
//!
//! # Responsibilities
//! - Fetch the trust domain's published key set through a [`KeySource`]
//! - Serve it from memory until the TTL expires
//! - Collapse concurrent refreshes into one fetch
//! - Rate-limit forced refreshes triggered by unknown key ids
//!
//! # Design Decisions
//! - Readers take a lock-free `ArcSwapOption` snapshot; only refreshes
//!   serialize on the async mutex
//! - After acquiring the mutex a refresher re-checks the snapshot, so
//!   waiters reuse the winner's result instead of fetching again
//! - A failed fetch is handed to the waiters that queued behind it; they
//!   return that error instead of each fetching in turn
//! - The cache remembers which URL it holds; a different URL is a miss

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use futures_util::future::BoxFuture;
use jsonwebtoken::jwk::JwkSet;
use thiserror::Error;
use tokio::sync::Mutex;

/// Key set retrieval failed.
#[derive(Debug, Clone, Error)]
pub enum KeyFetchError {
    #[error("key set request failed: {0}")]
    Request(String),

    #[error("key set endpoint returned status {0}")]
    Status(u16),

    #[error("key set response is not a JWK set: {0}")]
    Decode(String),
}

/// Where key sets come from.
pub trait KeySource: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<JwkSet, KeyFetchError>>;
}

/// Fetches key sets over HTTPS.
#[derive(Debug, Clone)]
pub struct HttpKeySource {
    client: reqwest::Client,
}

impl HttpKeySource {
    pub fn new(timeout: Duration) -> Result<Self, KeyFetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| KeyFetchError::Request(e.to_string()))?;
        Ok(Self { client })
    }
}

impl KeySource for HttpKeySource {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<JwkSet, KeyFetchError>> {
        Box::pin(async move {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| KeyFetchError::Request(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(KeyFetchError::Status(status.as_u16()));
            }

            response
                .json::<JwkSet>()
                .await
                .map_err(|e| KeyFetchError::Decode(e.to_string()))
        })
    }
}

/// Refresh timing.
#[derive(Debug, Clone, Copy)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub min_refresh_interval: Duration,
}

/// One fetched key set.
#[derive(Debug)]
pub struct CachedKeys {
    url: String,
    keys: JwkSet,
    fetched_at: Instant,
}

impl CachedKeys {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn keys(&self) -> &JwkSet {
        &self.keys
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

/// Outcome of the most recent fetch, when it failed.
#[derive(Debug)]
struct FailedFetch {
    url: String,
    error: KeyFetchError,
}

/// Shared, single-flight key set cache.
pub struct JwksCache {
    source: Arc<dyn KeySource>,
    current: ArcSwapOption<CachedKeys>,
    /// Guards fetching; holds the last failure for queued waiters.
    refresh: Mutex<Option<FailedFetch>>,
    /// Completed fetch attempts, successful or not.
    attempts: AtomicU64,
}

impl JwksCache {
    pub fn new(source: Arc<dyn KeySource>) -> Self {
        Self {
            source,
            current: ArcSwapOption::empty(),
            refresh: Mutex::new(None),
            attempts: AtomicU64::new(0),
        }
    }

    /// Current snapshot, if any. Never fetches.
    pub fn snapshot(&self) -> Option<Arc<CachedKeys>> {
        self.current.load_full()
    }

    /// Keys for `url`, fetching when the cache is cold, stale, or holds a
    /// different URL.
    pub async fn get(&self, url: &str, policy: CachePolicy) -> Result<Arc<CachedKeys>, KeyFetchError> {
        if let Some(fresh) = self.fresh(url, policy.ttl) {
            return Ok(fresh);
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let mut last_failure = self.refresh.lock().await;
        if let Some(fresh) = self.fresh(url, policy.ttl) {
            return Ok(fresh);
        }
        if let Some(error) = self.failed_while_waiting(seen, &last_failure, url) {
            return Err(error);
        }
        self.fetch_and_store(url, &mut last_failure).await
    }

    /// Refetch because `stale` lacked a needed key.
    ///
    /// Returns the newer snapshot if another task already replaced `stale`.
    /// Returns `stale` itself, without fetching, when it is younger than the
    /// minimum refresh interval.
    pub async fn force_refresh(
        &self,
        url: &str,
        stale: &Arc<CachedKeys>,
        policy: CachePolicy,
    ) -> Result<Arc<CachedKeys>, KeyFetchError> {
        let seen = self.attempts.load(Ordering::SeqCst);
        let mut last_failure = self.refresh.lock().await;

        if let Some(current) = self.current.load_full() {
            if current.url == url {
                if !Arc::ptr_eq(&current, stale) {
                    return Ok(current);
                }
                if current.age() < policy.min_refresh_interval {
                    tracing::debug!(url, "Forced key refresh suppressed by rate limit");
                    return Ok(current);
                }
            }
        }
        if let Some(error) = self.failed_while_waiting(seen, &last_failure, url) {
            return Err(error);
        }
        self.fetch_and_store(url, &mut last_failure).await
    }

    /// The error of a fetch for `url` that completed after `seen` was read.
    fn failed_while_waiting(
        &self,
        seen: u64,
        last_failure: &Option<FailedFetch>,
        url: &str,
    ) -> Option<KeyFetchError> {
        if self.attempts.load(Ordering::SeqCst) == seen {
            return None;
        }
        last_failure
            .as_ref()
            .filter(|failed| failed.url == url)
            .map(|failed| failed.error.clone())
    }

    fn fresh(&self, url: &str, ttl: Duration) -> Option<Arc<CachedKeys>> {
        self.current
            .load_full()
            .filter(|c| c.url == url && c.age() < ttl)
    }

    /// Fetch with the refresh lock held, recording the outcome for waiters.
    async fn fetch_and_store(
        &self,
        url: &str,
        last_failure: &mut Option<FailedFetch>,
    ) -> Result<Arc<CachedKeys>, KeyFetchError> {
        let fetched = self.source.fetch(url).await;
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let keys = match fetched {
            Ok(keys) => {
                *last_failure = None;
                keys
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Key set fetch failed");
                *last_failure = Some(FailedFetch {
                    url: url.to_string(),
                    error: e.clone(),
                });
                return Err(e);
            }
        };
        tracing::info!(url, keys = keys.keys.len(), "Key set refreshed");

        let cached = Arc::new(CachedKeys {
            url: url.to_string(),
            keys,
            fetched_at: Instant::now(),
        });
        self.current.store(Some(cached.clone()));
        Ok(cached)
    }
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("current", &self.current.load().as_ref().map(|c| c.url.clone()))
            .finish()
    }
}
