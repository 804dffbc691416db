use super::{CacheNamespace, CacheStore, TtlCache};
use crate::domain::market::MarketTrend;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub const MARKET_CACHE_TTL_HOURS: i64 = 24;

/// Computed market trends keyed by filter key.
#[derive(Clone)]
pub struct MarketTrendCache {
    inner: TtlCache,
}

impl MarketTrendCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner: TtlCache::new(
                store,
                CacheNamespace::MarketTrends,
                Duration::hours(MARKET_CACHE_TTL_HOURS),
            ),
        }
    }

    pub async fn get(&self, filter_key: &str, now: DateTime<Utc>) -> Option<MarketTrend> {
        let entry = self.inner.lookup(filter_key, now).await?;
        match serde_json::from_value::<MarketTrend>(entry.value) {
            Ok(trend) => Some(trend),
            Err(err) => {
                tracing::warn!(filter_key, error = %err, "cached market trend is malformed; ignoring");
                None
            }
        }
    }

    pub async fn put(&self, filter_key: &str, trend: &MarketTrend, now: DateTime<Utc>) {
        match serde_json::to_value(trend) {
            Ok(value) => self.inner.store(filter_key, None, value, now).await,
            Err(err) => tracing::warn!(filter_key, error = %err, "failed to serialize market trend for cache"),
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.inner.sweep(now).await
    }
}
