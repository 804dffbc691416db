use crate::cache::market::MarketTrendCache;
use crate::cache::CacheStore;
use crate::domain::market::{aggregate_market_trend, filter_key, MarketFilters, MarketTrend};
use crate::domain::trend::{TrendPoint, TrendStats};
use crate::error::ServiceResult;
use crate::storage::ExpenseRepository;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketTrendResponse {
    pub success: bool,
    pub data: Vec<TrendPoint>,
    pub stats: TrendStats,
    pub cached: bool,
}

impl MarketTrendResponse {
    fn new(trend: MarketTrend, cached: bool) -> Self {
        Self {
            success: true,
            data: trend.data,
            stats: trend.stats,
            cached,
        }
    }
}

#[derive(Clone)]
pub struct MarketTrendService {
    repo: Arc<dyn ExpenseRepository>,
    cache: MarketTrendCache,
}

impl MarketTrendService {
    pub fn new(repo: Arc<dyn ExpenseRepository>, store: Arc<dyn CacheStore>) -> Self {
        Self {
            repo,
            cache: MarketTrendCache::new(store),
        }
    }

    pub async fn get_market_trend(
        &self,
        filters: &MarketFilters,
        fallback_if_empty: bool,
        now: DateTime<Utc>,
    ) -> ServiceResult<MarketTrendResponse> {
        let key = match filter_key(filters, fallback_if_empty) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::warn!(error = %err, "failed to build market filter key; skipping cache");
                None
            }
        };

        if let Some(key) = key.as_deref() {
            if let Some(trend) = self.cache.get(key, now).await {
                tracing::debug!(filter_key = key, "market trend served from cache");
                return Ok(MarketTrendResponse::new(trend, true));
            }
        }

        let trend = self.compute(filters, fallback_if_empty).await?;

        if let Some(key) = key.as_deref() {
            self.cache.put(key, &trend, now).await;
        }

        tracing::info!(
            scope = ?trend.stats.scope,
            buildings = trend.stats.total_buildings,
            periods = trend.stats.periods_count,
            used_fallback = trend.stats.used_fallback,
            "market trend computed"
        );
        Ok(MarketTrendResponse::new(trend, false))
    }

    async fn compute(
        &self,
        filters: &MarketFilters,
        fallback_if_empty: bool,
    ) -> anyhow::Result<MarketTrend> {
        let filters = filters.normalized();
        let analyses = self
            .repo
            .completed_totals(filters.category.as_deref())
            .await
            .context("load completed analyses for market trend failed")?;

        let profiles = if filters.has_profile_filters() {
            self.repo
                .building_profiles()
                .await
                .context("load building profiles for market trend failed")?
        } else {
            Vec::new()
        };

        Ok(aggregate_market_trend(
            &analyses,
            &profiles,
            &filters,
            fallback_if_empty,
        ))
    }

    pub async fn sweep_cache(&self, now: DateTime<Utc>) -> anyhow::Result<u64> {
        self.cache.sweep(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::domain::building::BuildingProfile;
    use crate::domain::trend::AggregationScope;
    use crate::testing::{FailingCacheStore, FakeRepository};
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 10, 0, 0).unwrap()
    }

    async fn seeded() -> Arc<FakeRepository> {
        let repo = Arc::new(FakeRepository::new());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        repo.add_analysis(a, "Torre Norte", "enero 2024", 1000.0).await;
        repo.add_analysis(a, "Torre Norte", "febrero 2024", 1200.0).await;
        repo.add_analysis(b, "Edificio Sur", "2024-01", 2000.0).await;
        repo.add_analysis(b, "Edificio Sur", "2024-02", 2200.0).await;
        for (user_id, name) in [(a, "Torre Norte"), (b, "Edificio Sur")] {
            repo.profiles.lock().await.push(BuildingProfile {
                user_id,
                building_name: name.to_string(),
                neighborhood: Some("Palermo".to_string()),
                unit_count_range: Some("21-50".to_string()),
                ..Default::default()
            });
        }
        repo
    }

    #[tokio::test]
    async fn second_identical_request_hits_cache() {
        let repo = seeded().await;
        let svc = MarketTrendService::new(repo.clone(), Arc::new(MemoryCacheStore::new()));
        let filters = MarketFilters::default();

        let first = svc.get_market_trend(&filters, false, now()).await.unwrap();
        assert!(first.success);
        assert!(!first.cached);
        assert_eq!(first.data.len(), 2);
        assert_eq!(first.data[0].average, 1500.0);
        assert_eq!(first.data[1].average, 1700.0);

        let second = svc
            .get_market_trend(&filters, false, now() + Duration::hours(1))
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.data, first.data);
        assert_eq!(repo.completed_totals_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cache_expires_after_a_day() {
        let repo = seeded().await;
        let svc = MarketTrendService::new(repo.clone(), Arc::new(MemoryCacheStore::new()));
        let filters = MarketFilters::default();

        svc.get_market_trend(&filters, true, now()).await.unwrap();
        let later = svc
            .get_market_trend(&filters, true, now() + Duration::hours(25))
            .await
            .unwrap();
        assert!(!later.cached);
        assert_eq!(repo.completed_totals_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fallback_flag_is_part_of_the_key() {
        let repo = seeded().await;
        let svc = MarketTrendService::new(repo.clone(), Arc::new(MemoryCacheStore::new()));
        let filters = MarketFilters::default();

        svc.get_market_trend(&filters, false, now()).await.unwrap();
        let other = svc.get_market_trend(&filters, true, now()).await.unwrap();
        assert!(!other.cached);
    }

    #[tokio::test]
    async fn neighborhood_filter_narrows_to_matching_profiles() {
        let repo = seeded().await;
        let svc = MarketTrendService::new(repo, Arc::new(MemoryCacheStore::new()));
        let filters = MarketFilters {
            neighborhood: Some("palermo".to_string()),
            ..Default::default()
        };
        let res = svc.get_market_trend(&filters, false, now()).await.unwrap();
        assert_eq!(res.stats.scope, AggregationScope::Neighborhood);
        assert!(res.stats.filters_applied);
        assert!(!res.stats.used_fallback);
        assert_eq!(res.stats.total_buildings, 2);
    }

    #[tokio::test]
    async fn failing_cache_still_returns_computed_trend() {
        let repo = seeded().await;
        let svc = MarketTrendService::new(repo.clone(), Arc::new(FailingCacheStore));
        let filters = MarketFilters::default();

        for _ in 0..2 {
            let res = svc.get_market_trend(&filters, false, now()).await.unwrap();
            assert!(!res.cached);
            assert_eq!(res.stats.total_analyses, 4);
        }
        assert_eq!(repo.completed_totals_calls.load(Ordering::SeqCst), 2);
    }
}
