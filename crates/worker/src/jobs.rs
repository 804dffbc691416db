use anyhow::Context;
use chrono::{DateTime, Utc};
use expensa_core::domain::market::MarketFilters;
use expensa_core::domain::text;
use expensa_core::services::{InflationService, MarketTrendService, SharedAnalysisService};
use expensa_core::storage::ExpenseRepository;
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct SweepSummary {
    pub inflation: u64,
    pub market_trends: u64,
    pub shared_analysis: u64,
}

/// Deletes expired entries in every cache namespace. A failing namespace does not stop
/// the others; the first error is returned after all three ran.
pub async fn cleanup_cache(
    inflation: &InflationService,
    market: &MarketTrendService,
    shared: &SharedAnalysisService,
    now: DateTime<Utc>,
) -> anyhow::Result<SweepSummary> {
    let (a, b, c) = (
        inflation.sweep_cache(now).await,
        market.sweep_cache(now).await,
        shared.cleanup_expired_cache(now).await,
    );

    let mut first_err: Option<anyhow::Error> = None;
    let mut take = |res: anyhow::Result<u64>, table: &str| match res {
        Ok(n) => n,
        Err(e) => {
            tracing::error!(table, error = %e, "cache sweep failed");
            first_err.get_or_insert(e);
            0
        }
    };

    let summary = SweepSummary {
        inflation: take(a, "inflation_cache"),
        market_trends: take(b, "market_trends_cache"),
        shared_analysis: take(c, "shared_analysis_cache"),
    };

    match first_err {
        Some(e) => Err(e),
        None => Ok(summary),
    }
}

/// Precomputes the global trend and one trend per known neighborhood so the first
/// dashboard requests of the day hit the cache.
pub async fn warm_market(
    repo: &dyn ExpenseRepository,
    market: &MarketTrendService,
    now: DateTime<Utc>,
) -> anyhow::Result<usize> {
    let mut targets: Vec<(MarketFilters, bool)> = vec![
        (MarketFilters::default(), false),
        (MarketFilters::default(), true),
    ];

    // Keyed by folded name so spelling variants share one entry.
    let mut neighborhoods: BTreeMap<String, String> = BTreeMap::new();
    for profile in repo
        .building_profiles()
        .await
        .context("load building profiles failed")?
    {
        let Some(name) = profile.neighborhood else {
            continue;
        };
        let name = name.trim();
        if !name.is_empty() {
            neighborhoods
                .entry(text::fold_lower(name))
                .or_insert_with(|| name.to_string());
        }
    }
    for neighborhood in neighborhoods.into_values() {
        targets.push((
            MarketFilters {
                neighborhood: Some(neighborhood),
                ..Default::default()
            },
            true,
        ));
    }

    let mut warmed = 0;
    for (filters, fallback_if_empty) in &targets {
        let res = market
            .get_market_trend(filters, *fallback_if_empty, now)
            .await
            .with_context(|| format!("warm market trend failed for {filters:?}"))?;
        tracing::debug!(
            neighborhood = filters.neighborhood.as_deref().unwrap_or("*"),
            fallback_if_empty,
            cached = res.cached,
            points = res.data.len(),
            "market trend warmed"
        );
        warmed += 1;
    }
    Ok(warmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use expensa_core::cache::{CacheNamespace, CacheStore, MemoryCacheStore};
    use expensa_core::domain::building::BuildingProfile;
    use expensa_core::testing::{FailingCacheStore, FakeRepository};
    use std::sync::Arc;
    use uuid::Uuid;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, 4, 0, 0).unwrap()
    }

    async fn repo_with_two_neighborhoods() -> Arc<FakeRepository> {
        let repo = Arc::new(FakeRepository::new());
        for (name, hood) in [("Torre A", "Palermo"), ("Torre B", " palermo "), ("Torre C", "Caballito")] {
            let user = Uuid::new_v4();
            repo.add_analysis(user, name, "2024-01", 100.0).await;
            repo.add_analysis(user, name, "2024-02", 110.0).await;
            repo.profiles.lock().await.push(BuildingProfile {
                user_id: user,
                building_name: name.to_string(),
                neighborhood: Some(hood.to_string()),
                ..Default::default()
            });
        }
        repo
    }

    #[tokio::test]
    async fn warm_market_fills_global_and_neighborhood_entries() {
        let repo = repo_with_two_neighborhoods().await;
        let store = Arc::new(MemoryCacheStore::new());
        let market = MarketTrendService::new(repo.clone(), store.clone());

        let warmed = warm_market(repo.as_ref(), &market, now()).await.unwrap();
        // Global twice (fallback on and off), then Caballito and Palermo once each.
        assert_eq!(warmed, 4);
        assert_eq!(store.len(CacheNamespace::MarketTrends).await, 4);

        let hit = market
            .get_market_trend(&MarketFilters::default(), true, now())
            .await
            .unwrap();
        assert!(hit.cached);
    }

    #[tokio::test]
    async fn cleanup_sweeps_every_namespace() {
        let repo = repo_with_two_neighborhoods().await;
        let store = Arc::new(MemoryCacheStore::new());
        let inflation = InflationService::new(repo.clone(), store.clone());
        let market = MarketTrendService::new(repo.clone(), store.clone());
        let shared = SharedAnalysisService::new(repo.clone(), store.clone());

        warm_market(repo.as_ref(), &market, now()).await.unwrap();
        let summary = cleanup_cache(&inflation, &market, &shared, now() + Duration::hours(25))
            .await
            .unwrap();
        assert_eq!(summary.market_trends, 4);
        assert_eq!(summary.inflation, 0);
        assert_eq!(store.len(CacheNamespace::MarketTrends).await, 0);
    }

    #[tokio::test]
    async fn cleanup_reports_store_failure() {
        let repo: Arc<FakeRepository> = Arc::new(FakeRepository::new());
        let store: Arc<dyn CacheStore> = Arc::new(FailingCacheStore);
        let inflation = InflationService::new(repo.clone(), store.clone());
        let market = MarketTrendService::new(repo.clone(), store.clone());
        let shared = SharedAnalysisService::new(repo, store);

        assert!(cleanup_cache(&inflation, &market, &shared, now()).await.is_err());
    }
}
