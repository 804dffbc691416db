use super::{CacheNamespace, CacheStore, TtlCache};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

pub const SHARED_CACHE_TTL_HOURS: i64 = 24;

/// Assembled public payloads keyed by share token, tagged with the analysis id so every
/// link of an analysis can be dropped at once.
#[derive(Clone)]
pub struct SharedAnalysisCache {
    inner: TtlCache,
}

impl SharedAnalysisCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner: TtlCache::new(
                store,
                CacheNamespace::SharedAnalysis,
                Duration::hours(SHARED_CACHE_TTL_HOURS),
            ),
        }
    }

    /// A hit also bumps the entry's access counter and `last_accessed`.
    pub async fn get_cached_analysis(&self, token: &str, now: DateTime<Utc>) -> Option<Value> {
        let entry = self.inner.lookup(token, now).await?;
        self.inner.record_hit(token, now).await;
        Some(entry.value)
    }

    pub async fn cache_analysis(
        &self,
        analysis_id: Uuid,
        token: &str,
        payload: Value,
        now: DateTime<Utc>,
    ) {
        let tag = analysis_id.to_string();
        self.inner.store(token, Some(&tag), payload, now).await;
    }

    pub async fn invalidate_cache(&self, analysis_id: Uuid) {
        self.inner.invalidate_tag(&analysis_id.to_string()).await;
    }

    pub async fn cleanup_expired_cache(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.inner.sweep(now).await
    }
}
