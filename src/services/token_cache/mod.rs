//! Access-token cache
//!
//! Stale-while-revalidate cache in front of the token-issuing endpoint, keyed
//! by `(channel, presentation context)`. Entries are immutable and replaced
//! whole, so a reader holding an `Arc<TokenCacheEntry>` never sees a raw payload
//! paired with somebody else's sanitized one.

pub mod issuer;
pub mod relay;
pub mod sanitize;

pub use issuer::{GqlTokenIssuer, PlaybackToken, TokenIssuer};
pub use relay::{RelayReply, TokenRelay, TokenRequest, cache_key_for_request};
pub use sanitize::TokenSanitizer;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::TokenCacheConfig;
use crate::errors::TokenResult;
use crate::observability::metrics::{MetricsKeyValue, metrics};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenKey {
    pub channel: String,
    pub context: String,
}

impl TokenKey {
    pub fn new(channel: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            context: context.into(),
        }
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.context)
    }
}

#[derive(Debug)]
pub struct TokenCacheEntry {
    pub raw: Value,
    pub sanitized: Value,
    pub stored_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    Fresh,
    Stale,
    Miss,
    Fallback,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            LookupOutcome::Fresh => "fresh",
            LookupOutcome::Stale => "stale",
            LookupOutcome::Miss => "miss",
            LookupOutcome::Fallback => "fallback",
        }
    }
}

/// Cheap to clone; clones share the same entries
#[derive(Clone)]
pub struct TokenCache {
    issuer: Arc<dyn TokenIssuer>,
    sanitizer: Arc<TokenSanitizer>,
    ttl: Duration,
    entries: Arc<RwLock<HashMap<TokenKey, Arc<TokenCacheEntry>>>>,
    refreshing: Arc<Mutex<HashSet<TokenKey>>>,
}

impl TokenCache {
    pub fn new(issuer: Arc<dyn TokenIssuer>, config: &TokenCacheConfig) -> Self {
        Self {
            issuer,
            sanitizer: Arc::new(TokenSanitizer::new(config)),
            ttl: config.ttl,
            entries: Arc::new(RwLock::new(HashMap::new())),
            refreshing: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sanitized token payload for `key`.
    ///
    /// Fresh entries are returned as is. Stale entries are returned immediately
    /// while a background refresh replaces them. Misses fetch synchronously.
    pub async fn get_token(&self, key: &TokenKey) -> TokenResult<Value> {
        let existing = self.entries.read().await.get(key).cloned();

        if let Some(entry) = existing {
            if entry.stored_at.elapsed() < self.ttl {
                record(LookupOutcome::Fresh);
                return Ok(entry.sanitized.clone());
            }
            record(LookupOutcome::Stale);
            debug!(target = "token_cache", key = %key, "serving stale token, refreshing in background");
            self.spawn_refresh(key.clone());
            return Ok(entry.sanitized.clone());
        }

        record(LookupOutcome::Miss);
        self.refresh(key).await
    }

    /// Playback token parsed out of the sanitized payload
    pub async fn get_playback_token(&self, key: &TokenKey) -> TokenResult<PlaybackToken> {
        let payload = self.get_token(key).await?;
        PlaybackToken::from_payload(&payload)
    }

    /// Synchronous fetch. Falls back to whatever entry is still present when the fetch fails.
    pub async fn refresh(&self, key: &TokenKey) -> TokenResult<Value> {
        match self.fetch_and_store(key).await {
            Ok(entry) => Ok(entry.sanitized.clone()),
            Err(err) => {
                if let Some(entry) = self.entry(key).await {
                    record(LookupOutcome::Fallback);
                    warn!(target = "token_cache", key = %key, error = %err, "token fetch failed, using cached entry");
                    return Ok(entry.sanitized.clone());
                }
                Err(err)
            }
        }
    }

    pub async fn entry(&self, key: &TokenKey) -> Option<Arc<TokenCacheEntry>> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub fn sanitizer(&self) -> &TokenSanitizer {
        &self.sanitizer
    }

    /// Store a raw payload obtained elsewhere (e.g. a relayed response) as a fresh entry
    pub async fn store(&self, key: &TokenKey, raw: Value) -> Arc<TokenCacheEntry> {
        let sanitized = self.sanitizer.sanitize(&raw);
        let entry = Arc::new(TokenCacheEntry {
            raw,
            sanitized,
            stored_at: Instant::now(),
        });
        self.entries
            .write()
            .await
            .insert(key.clone(), Arc::clone(&entry));
        entry
    }

    async fn fetch_and_store(&self, key: &TokenKey) -> TokenResult<Arc<TokenCacheEntry>> {
        let raw = self.issuer.fetch_token(&key.channel, &key.context).await?;
        Ok(self.store(key, raw).await)
    }

    /// At most one background refresh per key is in flight
    fn spawn_refresh(&self, key: TokenKey) {
        let Some(guard) = RefreshGuard::claim(&self.refreshing, &key) else {
            return;
        };

        let cache = self.clone();
        tokio::spawn(async move {
            // Released on drop, including when the fetch panics
            let _guard = guard;
            match cache.fetch_and_store(&key).await {
                Ok(_) => debug!(target = "token_cache", key = %key, "background refresh stored"),
                Err(err) => {
                    let mut entries = cache.entries.write().await;
                    let stale = entries
                        .get(&key)
                        .is_some_and(|e| e.stored_at.elapsed() >= cache.ttl);
                    if stale {
                        entries.remove(&key);
                    }
                    warn!(
                        target = "token_cache",
                        key = %key,
                        error = %err,
                        evicted = stale,
                        "background refresh failed"
                    );
                }
            }
        });
    }
}

/// Marks a key as being refreshed until dropped
struct RefreshGuard {
    refreshing: Arc<Mutex<HashSet<TokenKey>>>,
    key: TokenKey,
}

impl RefreshGuard {
    fn claim(refreshing: &Arc<Mutex<HashSet<TokenKey>>>, key: &TokenKey) -> Option<Self> {
        let inserted = refreshing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.clone());
        inserted.then(|| Self {
            refreshing: Arc::clone(refreshing),
            key: key.clone(),
        })
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.refreshing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&self.key);
    }
}

fn record(outcome: LookupOutcome) {
    metrics()
        .token_cache_lookups
        .add(1, &[MetricsKeyValue::new("outcome", outcome.as_str())]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::TokenError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Issues `{ "version": n, "adsEnabled": true }`, counting calls
    struct CountingIssuer {
        calls: AtomicUsize,
        failing: AtomicBool,
        panicking: AtomicBool,
        delay: Duration,
    }

    impl CountingIssuer {
        fn new() -> Arc<Self> {
            Self::with_delay(Duration::ZERO)
        }

        fn with_delay(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                panicking: AtomicBool::new(false),
                delay,
            })
        }
    }

    #[async_trait]
    impl TokenIssuer for CountingIssuer {
        async fn fetch_token(&self, _channel: &str, _context: &str) -> TokenResult<Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.panicking.load(Ordering::SeqCst) {
                panic!("issuer blew up");
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(TokenError::Http { status: 503 });
            }
            Ok(json!({ "version": n, "adsEnabled": true }))
        }
    }

    fn cache(issuer: Arc<CountingIssuer>) -> TokenCache {
        TokenCache::new(issuer, &TokenCacheConfig::default())
    }

    fn key() -> TokenKey {
        TokenKey::new("somechannel", "embed")
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn miss_fetches_and_stores_both_payloads() {
        let issuer = CountingIssuer::new();
        let cache = cache(issuer.clone());

        let token = cache.get_token(&key()).await.unwrap();
        assert_eq!(token, json!({ "version": 1, "adsEnabled": false }));

        let entry = cache.entry(&key()).await.unwrap();
        assert_eq!(entry.raw["adsEnabled"], json!(true));
        assert_eq!(entry.sanitized["adsEnabled"], json!(false));
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_is_served_without_fetching() {
        let issuer = CountingIssuer::new();
        let cache = cache(issuer.clone());

        cache.get_token(&key()).await.unwrap();
        tokio::time::advance(Duration::from_secs(44)).await;
        let token = cache.get_token(&key()).await.unwrap();

        assert_eq!(token["version"], json!(1));
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_is_served_immediately_and_refreshed_in_background() {
        let issuer = CountingIssuer::with_delay(Duration::from_secs(2));
        let cache = cache(issuer.clone());

        cache.get_token(&key()).await.unwrap();
        tokio::time::advance(cache.ttl() + Duration::from_millis(1)).await;

        let before = Instant::now();
        let token = cache.get_token(&key()).await.unwrap();
        assert_eq!(token["version"], json!(1));
        assert_eq!(Instant::now(), before, "stale read must not wait for the refresh");

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
        let token = cache.get_token(&key()).await.unwrap();
        assert_eq!(token["version"], json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_stale_reads_share_one_refresh() {
        let issuer = CountingIssuer::with_delay(Duration::from_secs(1));
        let cache = cache(issuer.clone());

        cache.get_token(&key()).await.unwrap();
        tokio::time::advance(cache.ttl() + Duration::from_millis(1)).await;

        for _ in 0..3 {
            cache.get_token(&key()).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle().await;

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_background_refresh_evicts_stale_entry() {
        let issuer = CountingIssuer::new();
        let cache = cache(issuer.clone());

        cache.get_token(&key()).await.unwrap();
        issuer.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(cache.ttl() + Duration::from_millis(1)).await;

        let token = cache.get_token(&key()).await.unwrap();
        assert_eq!(token["version"], json!(1));
        settle().await;

        assert!(cache.entry(&key()).await.is_none());
        assert!(cache.get_token(&key()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_refresh_does_not_block_later_refreshes() {
        let issuer = CountingIssuer::new();
        let cache = cache(issuer.clone());

        cache.get_token(&key()).await.unwrap();
        issuer.panicking.store(true, Ordering::SeqCst);
        tokio::time::advance(cache.ttl() + Duration::from_millis(1)).await;

        assert_eq!(cache.get_token(&key()).await.unwrap()["version"], json!(1));
        settle().await;
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);

        issuer.panicking.store(false, Ordering::SeqCst);
        assert_eq!(cache.get_token(&key()).await.unwrap()["version"], json!(1));
        settle().await;

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get_token(&key()).await.unwrap()["version"], json!(3));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_synchronous_fetch_falls_back_to_existing_entry() {
        let issuer = CountingIssuer::new();
        let cache = cache(issuer.clone());

        cache.get_token(&key()).await.unwrap();
        issuer.failing.store(true, Ordering::SeqCst);

        let token = cache.refresh(&key()).await.unwrap();
        assert_eq!(token["version"], json!(1));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let issuer = CountingIssuer::new();
        let cache = cache(issuer.clone());
        assert!(cache.is_empty().await);

        cache.get_token(&TokenKey::new("a", "embed")).await.unwrap();
        cache.get_token(&TokenKey::new("a", "site")).await.unwrap();
        cache.get_token(&TokenKey::new("b", "embed")).await.unwrap();

        assert_eq!(cache.len().await, 3);
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 3);
    }
}
