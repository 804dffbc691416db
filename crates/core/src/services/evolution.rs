use crate::domain::building::find_matching_building;
use crate::domain::market::MarketFilters;
use crate::domain::trend::{analyze_deviations, build_evolution, Deviations, Evolution, TrendStats};
use crate::error::{ServiceError, ServiceResult};
use crate::llm::error::is_rate_limited;
use crate::llm::{DeviationContext, NarrativeGenerator};
use crate::services::inflation::InflationService;
use crate::services::market::MarketTrendService;
use crate::storage::ExpenseRepository;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionReport {
    pub building_name: String,
    #[serde(flatten)]
    pub evolution: Evolution,
    pub deviations: Deviations,
    pub market_stats: TrendStats,
    pub narrative: Option<String>,
}

#[derive(Clone)]
pub struct EvolutionService {
    repo: Arc<dyn ExpenseRepository>,
    inflation: InflationService,
    market: MarketTrendService,
    narrative: Option<Arc<dyn NarrativeGenerator>>,
}

impl EvolutionService {
    pub fn new(
        repo: Arc<dyn ExpenseRepository>,
        inflation: InflationService,
        market: MarketTrendService,
        narrative: Option<Arc<dyn NarrativeGenerator>>,
    ) -> Self {
        Self {
            repo,
            inflation,
            market,
            narrative,
        }
    }

    /// Growth of one building against inflation and against comparable buildings.
    pub async fn evolution(
        &self,
        user_id: Uuid,
        building_name: &str,
        now: DateTime<Utc>,
    ) -> ServiceResult<EvolutionReport> {
        let building_name = self.canonical_name(user_id, building_name).await?;

        let history = self
            .repo
            .user_history(user_id, &building_name)
            .await
            .context("load building history failed")?;
        if history.is_empty() {
            return Err(ServiceError::not_found(format!(
                "no completed analyses for building {building_name}"
            )));
        }

        let filters = self.comparison_filters(user_id, &building_name).await?;
        let (inflation, market) = tokio::join!(
            self.inflation.series(now),
            self.market.get_market_trend(&filters, true, now)
        );
        let inflation = inflation?;
        let market = market?;

        let evolution = build_evolution(&history, &inflation.data, &market.data);
        let deviations = analyze_deviations(
            &evolution.user_trend,
            &evolution.inflation_trend,
            &evolution.buildings_trend,
        )?;

        let narrative = explain_deviations(
            self.narrative.as_deref(),
            &DeviationContext {
                building_name: Some(building_name.clone()),
                user_trend: evolution.user_trend.clone(),
                inflation_trend: evolution.inflation_trend.clone(),
                buildings_trend: evolution.buildings_trend.clone(),
                deviations: deviations.clone(),
            },
        )
        .await?;

        Ok(EvolutionReport {
            building_name,
            evolution,
            deviations,
            market_stats: market.stats,
            narrative,
        })
    }

    async fn canonical_name(&self, user_id: Uuid, building_name: &str) -> ServiceResult<String> {
        let name = building_name.trim();
        if name.is_empty() {
            return Err(ServiceError::validation("building must not be empty"));
        }
        let known = self
            .repo
            .user_building_names(user_id)
            .await
            .context("load user building names failed")?;
        Ok(find_matching_building(name, &known)
            .unwrap_or(name)
            .to_string())
    }

    /// The building's own profile attributes, with the building itself excluded.
    async fn comparison_filters(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> ServiceResult<MarketFilters> {
        let profile = self
            .repo
            .building_profile(user_id, building_name)
            .await
            .context("load building profile failed")?
            .unwrap_or_default();

        Ok(MarketFilters {
            unit_count_range: profile.unit_count_range,
            age_category: profile.age_category,
            neighborhood: profile.neighborhood,
            zone: profile.zone,
            has_amenities: profile.has_amenities,
            category: None,
            exclude_building: Some(building_name.to_string()),
            exclude_user_id: Some(user_id),
        })
    }
}

/// Text explanation of the deviations. Only a provider rate limit fails the request;
/// any other provider failure yields `None` so the numbers are still returned.
pub async fn explain_deviations(
    generator: Option<&dyn NarrativeGenerator>,
    ctx: &DeviationContext,
) -> ServiceResult<Option<String>> {
    let Some(generator) = generator else {
        return Ok(None);
    };

    match generator.explain_deviation(ctx).await {
        Ok(text) => Ok(Some(text)),
        Err(err) if is_rate_limited(&err) => {
            tracing::warn!(provider = ?generator.provider(), "narrative provider rate limited");
            Err(ServiceError::RateLimited(
                "narrative provider is rate limited; try again later".to_string(),
            ))
        }
        Err(err) => {
            tracing::warn!(provider = ?generator.provider(), error = %err, "narrative generation failed; returning numbers only");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;
    use crate::domain::inflation::InflationDataPoint;
    use crate::domain::trend::{AggregationScope, TrendPercent};
    use crate::testing::{FakeNarrative, FakeNarrativeMode, FakeRepository};
    use crate::time::period::YearMonth;
    use chrono::TimeZone;
    use std::sync::atomic::Ordering;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    fn tp(period: &str, percent: f64) -> TrendPercent {
        TrendPercent {
            period: period.to_string(),
            percent,
        }
    }

    async fn service(
        mode: Option<FakeNarrativeMode>,
    ) -> (EvolutionService, Uuid, Option<Arc<FakeNarrative>>) {
        let repo = Arc::new(FakeRepository::new());
        let store = Arc::new(MemoryCacheStore::new());
        let user = Uuid::new_v4();
        let (n1, n2) = (Uuid::new_v4(), Uuid::new_v4());

        repo.add_analysis(user, "Edificio Central", "enero 2024", 1000.0).await;
        repo.add_analysis(user, "Edificio Central", "febrero 2024", 1200.0).await;
        repo.add_analysis(n1, "Torre A", "2024-01", 500.0).await;
        repo.add_analysis(n1, "Torre A", "2024-02", 525.0).await;
        repo.add_analysis(n2, "Torre B", "2024-01", 1500.0).await;
        repo.add_analysis(n2, "Torre B", "2024-02", 1575.0).await;
        repo.inflation.lock().await.extend([
            InflationDataPoint {
                period: YearMonth::new(2024, 1).unwrap(),
                value: 20.6,
                is_estimated: false,
            },
            InflationDataPoint {
                period: YearMonth::new(2024, 2).unwrap(),
                value: 13.2,
                is_estimated: false,
            },
        ]);

        let narrative = mode.map(|m| Arc::new(FakeNarrative::new(m)));
        let svc = EvolutionService::new(
            repo.clone(),
            InflationService::new(repo.clone(), store.clone()),
            MarketTrendService::new(repo, store),
            narrative.clone().map(|n| n as Arc<dyn NarrativeGenerator>),
        );
        (svc, user, narrative)
    }

    #[tokio::test]
    async fn compares_building_with_inflation_and_market() {
        let (svc, user, narrative) =
            service(Some(FakeNarrativeMode::Text("Subió más que el resto.".into()))).await;

        let report = svc.evolution(user, "Edif. Central", now()).await.unwrap();

        assert_eq!(report.building_name, "Edificio Central");
        assert_eq!(
            report.evolution.user_trend,
            vec![tp("2024-01", 0.0), tp("2024-02", 20.0)]
        );
        assert_eq!(
            report.evolution.inflation_trend,
            vec![tp("2024-01", 0.0), tp("2024-02", 13.2)]
        );
        assert_eq!(
            report.evolution.buildings_trend,
            vec![tp("2024-01", 0.0), tp("2024-02", 5.0)]
        );
        assert_eq!(report.deviations.from_inflation, Some(6.8));
        assert_eq!(report.deviations.from_buildings, Some(15.0));
        assert!(report.deviations.is_significant);
        assert_eq!(report.market_stats.scope, AggregationScope::Global);
        assert_eq!(report.market_stats.total_buildings, 2);
        assert_eq!(report.narrative.as_deref(), Some("Subió más que el resto."));
        assert_eq!(narrative.unwrap().calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn narrative_failure_keeps_the_numbers() {
        let (svc, user, _) = service(Some(FakeNarrativeMode::Fail)).await;
        let report = svc.evolution(user, "Edificio Central", now()).await.unwrap();
        assert_eq!(report.narrative, None);
        assert_eq!(report.deviations.from_buildings, Some(15.0));
    }

    #[tokio::test]
    async fn narrative_rate_limit_is_propagated() {
        let (svc, user, _) = service(Some(FakeNarrativeMode::RateLimited)).await;
        let err = svc
            .evolution(user, "Edificio Central", now())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RateLimited(_)));
    }

    #[tokio::test]
    async fn works_without_a_narrative_provider() {
        let (svc, user, _) = service(None).await;
        let report = svc.evolution(user, "Edificio Central", now()).await.unwrap();
        assert_eq!(report.narrative, None);
    }

    #[tokio::test]
    async fn unknown_building_is_not_found() {
        let (svc, user, _) = service(None).await;
        let err = svc.evolution(user, "Torre A", now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let err = svc.evolution(user, "  ", now()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }
}
