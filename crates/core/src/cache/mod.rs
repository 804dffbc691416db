//! Keyed TTL cache used as an optional accelerator in front of the authoritative queries.
//!
//! Every lookup and write through [`TtlCache`] is best-effort: store errors are logged and
//! reported as a miss (or ignored on write), so callers always have the authoritative path
//! to fall back on. Expired entries are deleted when a lookup finds them; nothing sweeps
//! them in the background except the explicit maintenance call.

pub mod inflation;
pub mod market;
pub mod memory;
pub mod shared;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;

pub use memory::MemoryCacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    Inflation,
    MarketTrends,
    SharedAnalysis,
}

impl CacheNamespace {
    pub fn table(self) -> &'static str {
        match self {
            CacheNamespace::Inflation => "inflation_cache",
            CacheNamespace::MarketTrends => "market_trends_cache",
            CacheNamespace::SharedAnalysis => "shared_analysis_cache",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    /// Secondary index for bulk invalidation (the analysis id for shared payloads).
    pub tag: Option<String>,
    pub value: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[async_trait::async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<Option<CacheEntry>>;

    /// Inserts or replaces the entry under `entry.key`.
    async fn put(&self, ns: CacheNamespace, entry: CacheEntry) -> anyhow::Result<()>;

    async fn delete(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<u64>;

    async fn delete_tagged(&self, ns: CacheNamespace, tag: &str) -> anyhow::Result<u64>;

    /// Deletes `key` only if it is still expired at `now`, so a concurrent refresh survives.
    async fn delete_if_expired(
        &self,
        ns: CacheNamespace,
        key: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<u64>;

    async fn record_hit(
        &self,
        ns: CacheNamespace,
        key: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()>;

    async fn delete_expired(&self, ns: CacheNamespace, now: DateTime<Utc>) -> anyhow::Result<u64>;
}

/// One namespace of a [`CacheStore`] with a fixed time-to-live.
#[derive(Clone)]
pub struct TtlCache {
    store: Arc<dyn CacheStore>,
    ns: CacheNamespace,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(store: Arc<dyn CacheStore>, ns: CacheNamespace, ttl: Duration) -> Self {
        Self { store, ns, ttl }
    }

    /// Returns a live entry. An expired entry is deleted and reported as a miss.
    pub async fn lookup(&self, key: &str, now: DateTime<Utc>) -> Option<CacheEntry> {
        let entry = match self.store.get(self.ns, key).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!(table = self.ns.table(), key, error = %err, "cache read failed; treating as miss");
                return None;
            }
        };

        if entry.is_expired(now) {
            tracing::debug!(table = self.ns.table(), key, expires_at = %entry.expires_at, "cache entry expired");
            if let Err(err) = self.store.delete_if_expired(self.ns, key, now).await {
                tracing::warn!(table = self.ns.table(), key, error = %err, "failed to delete expired cache entry");
            }
            return None;
        }

        Some(entry)
    }

    pub async fn store(&self, key: &str, tag: Option<&str>, value: Value, now: DateTime<Utc>) {
        let entry = CacheEntry {
            key: key.to_string(),
            tag: tag.map(str::to_string),
            value,
            created_at: now,
            expires_at: now + self.ttl,
            access_count: 0,
            last_accessed: None,
        };
        if let Err(err) = self.store.put(self.ns, entry).await {
            tracing::warn!(table = self.ns.table(), key, error = %err, "cache write failed; continuing without cache");
        }
    }

    pub async fn record_hit(&self, key: &str, at: DateTime<Utc>) {
        if let Err(err) = self.store.record_hit(self.ns, key, at).await {
            tracing::warn!(table = self.ns.table(), key, error = %err, "failed to record cache hit");
        }
    }

    pub async fn invalidate(&self, key: &str) {
        if let Err(err) = self.store.delete(self.ns, key).await {
            tracing::warn!(table = self.ns.table(), key, error = %err, "cache invalidation failed");
        }
    }

    pub async fn invalidate_tag(&self, tag: &str) {
        match self.store.delete_tagged(self.ns, tag).await {
            Ok(removed) => {
                tracing::debug!(table = self.ns.table(), tag, removed, "cache entries invalidated")
            }
            Err(err) => {
                tracing::warn!(table = self.ns.table(), tag, error = %err, "cache invalidation failed")
            }
        }
    }

    /// Maintenance sweep. Unlike the request path, errors are returned to the caller.
    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.store.delete_expired(self.ns, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FailingCacheStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn expired_entry_is_deleted_on_lookup() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = TtlCache::new(store.clone(), CacheNamespace::MarketTrends, Duration::hours(24));

        store
            .put(
                CacheNamespace::MarketTrends,
                CacheEntry {
                    key: "k".to_string(),
                    tag: None,
                    value: json!({"stale": true}),
                    created_at: now() - Duration::hours(30),
                    expires_at: now() - Duration::hours(6),
                    access_count: 0,
                    last_accessed: None,
                },
            )
            .await
            .unwrap();

        assert!(cache.lookup("k", now()).await.is_none());
        assert!(store
            .get(CacheNamespace::MarketTrends, "k")
            .await
            .unwrap()
            .is_none());
    }

    /// Serves a stale copy of every entry, as if another request refreshed the row right
    /// after this one read it.
    struct StaleReads {
        inner: MemoryCacheStore,
        stale_at: DateTime<Utc>,
    }

    #[async_trait::async_trait]
    impl CacheStore for StaleReads {
        async fn get(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<Option<CacheEntry>> {
            let entry = self.inner.get(ns, key).await?;
            Ok(entry.map(|e| CacheEntry {
                expires_at: self.stale_at,
                ..e
            }))
        }

        async fn put(&self, ns: CacheNamespace, entry: CacheEntry) -> anyhow::Result<()> {
            self.inner.put(ns, entry).await
        }

        async fn delete(&self, ns: CacheNamespace, key: &str) -> anyhow::Result<u64> {
            self.inner.delete(ns, key).await
        }

        async fn delete_tagged(&self, ns: CacheNamespace, tag: &str) -> anyhow::Result<u64> {
            self.inner.delete_tagged(ns, tag).await
        }

        async fn delete_if_expired(
            &self,
            ns: CacheNamespace,
            key: &str,
            now: DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            self.inner.delete_if_expired(ns, key, now).await
        }

        async fn record_hit(
            &self,
            ns: CacheNamespace,
            key: &str,
            at: DateTime<Utc>,
        ) -> anyhow::Result<()> {
            self.inner.record_hit(ns, key, at).await
        }

        async fn delete_expired(
            &self,
            ns: CacheNamespace,
            now: DateTime<Utc>,
        ) -> anyhow::Result<u64> {
            self.inner.delete_expired(ns, now).await
        }
    }

    #[tokio::test]
    async fn expired_read_does_not_delete_a_refreshed_entry() {
        let store = Arc::new(StaleReads {
            inner: MemoryCacheStore::new(),
            stale_at: now() - Duration::hours(1),
        });
        let cache = TtlCache::new(store.clone(), CacheNamespace::MarketTrends, Duration::hours(24));
        cache.store("k", None, json!({"fresh": true}), now()).await;

        assert!(cache.lookup("k", now()).await.is_none());

        let kept = store.inner.get(CacheNamespace::MarketTrends, "k").await.unwrap();
        assert_eq!(kept.map(|e| e.value), Some(json!({"fresh": true})));
    }

    #[tokio::test]
    async fn live_entry_is_returned_until_ttl() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = TtlCache::new(store, CacheNamespace::Inflation, Duration::hours(168));
        cache.store("inflation_data", None, json!([1, 2]), now()).await;

        let hit = cache.lookup("inflation_data", now() + Duration::hours(167)).await;
        assert_eq!(hit.map(|e| e.value), Some(json!([1, 2])));
        assert!(cache
            .lookup("inflation_data", now() + Duration::hours(168))
            .await
            .is_none());
    }

    #[tokio::test]
    async fn store_failures_are_swallowed() {
        let cache = TtlCache::new(
            Arc::new(FailingCacheStore),
            CacheNamespace::SharedAnalysis,
            Duration::hours(24),
        );
        cache.store("t", Some("a"), json!({}), now()).await;
        assert!(cache.lookup("t", now()).await.is_none());
        cache.invalidate_tag("a").await;
        cache.record_hit("t", now()).await;
        assert!(cache.sweep(now()).await.is_err());
    }

    #[tokio::test]
    async fn namespaces_are_isolated() {
        let store = Arc::new(MemoryCacheStore::new());
        let a = TtlCache::new(store.clone(), CacheNamespace::Inflation, Duration::hours(1));
        let b = TtlCache::new(store, CacheNamespace::MarketTrends, Duration::hours(1));
        a.store("same", None, json!(1), now()).await;
        assert!(b.lookup("same", now()).await.is_none());
        assert!(a.lookup("same", now()).await.is_some());
    }
}
