use super::{CacheNamespace, CacheStore, TtlCache};
use crate::domain::inflation::InflationDataPoint;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;

pub const INFLATION_CACHE_KEY: &str = "inflation_data";
pub const INFLATION_CACHE_TTL_HOURS: i64 = 168;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedInflation {
    pub data: Vec<InflationDataPoint>,
    pub cached: bool,
}

/// Single-entry cache over the reference inflation series.
#[derive(Clone)]
pub struct InflationCache {
    inner: TtlCache,
}

impl InflationCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            inner: TtlCache::new(
                store,
                CacheNamespace::Inflation,
                Duration::hours(INFLATION_CACHE_TTL_HOURS),
            ),
        }
    }

    pub async fn get_cached_inflation_data(&self, now: DateTime<Utc>) -> Option<CachedInflation> {
        let entry = self.inner.lookup(INFLATION_CACHE_KEY, now).await?;
        match serde_json::from_value::<Vec<InflationDataPoint>>(entry.value) {
            Ok(data) => Some(CachedInflation { data, cached: true }),
            Err(err) => {
                tracing::warn!(error = %err, "cached inflation series is malformed; ignoring");
                None
            }
        }
    }

    pub async fn cache_inflation_data(&self, series: &[InflationDataPoint], now: DateTime<Utc>) {
        match serde_json::to_value(series) {
            Ok(value) => self.inner.store(INFLATION_CACHE_KEY, None, value, now).await,
            Err(err) => tracing::warn!(error = %err, "failed to serialize inflation series for cache"),
        }
    }

    pub async fn invalidate_cache(&self) {
        self.inner.invalidate(INFLATION_CACHE_KEY).await;
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.inner.sweep(now).await
    }
}
