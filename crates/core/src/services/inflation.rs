use crate::cache::inflation::{CachedInflation, InflationCache};
use crate::cache::CacheStore;
use crate::domain::inflation::{extrapolate_estimates, InflationDataPoint};
use crate::error::ServiceResult;
use crate::ingest::InflationFetcher;
use crate::storage::ExpenseRepository;
use crate::time::period::YearMonth;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub source: &'static str,
    pub observed: usize,
    pub estimated: usize,
    pub written: u64,
    pub dry_run: bool,
}

#[derive(Clone)]
pub struct InflationService {
    repo: Arc<dyn ExpenseRepository>,
    cache: InflationCache,
}

impl InflationService {
    pub fn new(repo: Arc<dyn ExpenseRepository>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            repo,
            cache: InflationCache::new(store),
        }
    }

    /// Read-through: cache first, then the `inflation_data` table, which repopulates the cache.
    pub async fn series(&self, now: DateTime<Utc>) -> ServiceResult<CachedInflation> {
        if let Some(hit) = self.cache.get_cached_inflation_data(now).await {
            tracing::debug!(points = hit.data.len(), "inflation series served from cache");
            return Ok(hit);
        }

        let data = self
            .repo
            .inflation_series()
            .await
            .context("load inflation series failed")?;
        if !data.is_empty() {
            self.cache.cache_inflation_data(&data, now).await;
        }

        Ok(CachedInflation {
            data,
            cached: false,
        })
    }

    /// Pulls the official series once, fills the months it has not published yet with
    /// estimates up to the current month, and replaces the stored series.
    pub async fn refresh(
        &self,
        fetcher: &dyn InflationFetcher,
        now: DateTime<Utc>,
        dry_run: bool,
    ) -> ServiceResult<RefreshSummary> {
        let observed = fetcher
            .fetch_monthly_series()
            .await
            .with_context(|| format!("fetch inflation series from {} failed", fetcher.source_name()))?;
        if observed.is_empty() {
            return Err(anyhow::anyhow!(
                "inflation source {} returned no observations",
                fetcher.source_name()
            )
            .into());
        }

        let current = YearMonth::from_date(now.date_naive());
        let series: Vec<InflationDataPoint> = extrapolate_estimates(&observed, current);
        let estimated = series.iter().filter(|p| p.is_estimated).count();

        let mut summary = RefreshSummary {
            source: fetcher.source_name(),
            observed: series.len() - estimated,
            estimated,
            written: 0,
            dry_run,
        };

        if dry_run {
            tracing::info!(observed = summary.observed, estimated, "dry run; inflation series not written");
            return Ok(summary);
        }

        summary.written = self
            .repo
            .upsert_inflation(&series)
            .await
            .context("store inflation series failed")?;
        self.cache.invalidate_cache().await;

        tracing::info!(
            source = summary.source,
            observed = summary.observed,
            estimated,
            written = summary.written,
            "inflation series refreshed"
        );
        Ok(summary)
    }

    pub async fn sweep_cache(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.cache.sweep(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::testing::{FailingCacheStore, FakeInflationFetcher, FakeRepository};
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 10, 8, 0, 0).unwrap()
    }

    fn point(year: i32, month: u32, value: f64) -> InflationDataPoint {
        InflationDataPoint {
            period: YearMonth::new(year, month).unwrap(),
            value,
            is_estimated: false,
        }
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let repo = Arc::new(FakeRepository::new());
        repo.inflation.lock().await.push(point(2026, 1, 2.2));
        let svc = InflationService::new(repo.clone(), Arc::new(MemoryCacheStore::new()));

        let first = svc.series(now()).await.unwrap();
        assert!(!first.cached);
        let second = svc.series(now()).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.data, first.data);
        assert_eq!(repo.inflation_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn broken_cache_falls_through_to_table() {
        let repo = Arc::new(FakeRepository::new());
        repo.inflation.lock().await.push(point(2026, 1, 2.2));
        let svc = InflationService::new(repo.clone(), Arc::new(FailingCacheStore));

        for _ in 0..2 {
            let res = svc.series(now()).await.unwrap();
            assert!(!res.cached);
            assert_eq!(res.data.len(), 1);
        }
        assert_eq!(repo.inflation_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn refresh_extrapolates_to_current_month_and_invalidates() {
        let repo = Arc::new(FakeRepository::new());
        let svc = InflationService::new(repo.clone(), Arc::new(MemoryCacheStore::new()));
        // Stale value cached before the refresh.
        repo.inflation.lock().await.push(point(2025, 12, 9.9));
        svc.series(now()).await.unwrap();

        let fetcher = FakeInflationFetcher {
            result: Ok(vec![point(2025, 12, 2.0), point(2026, 1, 3.0), point(2026, 2, 4.0)]),
        };
        let summary = svc.refresh(&fetcher, now(), false).await.unwrap();
        assert_eq!(summary.observed, 3);
        assert_eq!(summary.estimated, 2);
        assert_eq!(summary.written, 5);

        let res = svc.series(now()).await.unwrap();
        assert!(!res.cached);
        let april = res.data.last().unwrap();
        assert_eq!(april.period, YearMonth::new(2026, 4).unwrap());
        assert_eq!(april.value, 3.0);
        assert!(april.is_estimated);
        assert_eq!(res.data[0].value, 2.0);
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let repo = Arc::new(FakeRepository::new());
        let svc = InflationService::new(repo.clone(), Arc::new(MemoryCacheStore::new()));
        let fetcher = FakeInflationFetcher {
            result: Ok(vec![point(2026, 3, 3.0)]),
        };
        let summary = svc.refresh(&fetcher, now(), true).await.unwrap();
        assert_eq!(summary.estimated, 1);
        assert_eq!(summary.written, 0);
        assert!(repo.inflation.lock().await.is_empty());
    }

    #[tokio::test]
    async fn source_failure_and_empty_series_are_errors() {
        let repo = Arc::new(FakeRepository::new());
        let svc = InflationService::new(repo, Arc::new(MemoryCacheStore::new()));
        let fetcher = FakeInflationFetcher {
            result: Err("503 from upstream".to_string()),
        };
        assert!(svc.refresh(&fetcher, now(), false).await.is_err());

        let empty = FakeInflationFetcher { result: Ok(vec![]) };
        assert!(svc.refresh(&empty, now(), false).await.is_err());
    }
}
