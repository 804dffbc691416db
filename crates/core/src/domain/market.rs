use crate::domain::analysis::AnalysisTotal;
use crate::domain::building::BuildingProfile;
use crate::domain::text;
use crate::domain::trend::{percent_change, AggregationScope, TrendPoint, TrendStats};
use crate::time::period::PeriodKey;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

// A comparison set needs at least this many distinct buildings and periods.
const MIN_BUILDINGS: usize = 2;
const MIN_PERIODS: usize = 2;

/// Filter descriptor for the cross-building market average.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_count_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neighborhood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_amenities: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(
        default,
        rename = "excludeBuilding",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_building: Option<String>,
    #[serde(
        default,
        rename = "excludeUserId",
        skip_serializing_if = "Option::is_none"
    )]
    pub exclude_user_id: Option<Uuid>,
}

impl MarketFilters {
    /// Trims text filters and turns blank ones into `None`.
    pub fn normalized(&self) -> Self {
        fn clean(v: &Option<String>) -> Option<String> {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        }

        Self {
            unit_count_range: clean(&self.unit_count_range),
            age_category: clean(&self.age_category),
            neighborhood: clean(&self.neighborhood),
            zone: clean(&self.zone),
            has_amenities: self.has_amenities,
            category: clean(&self.category),
            exclude_building: clean(&self.exclude_building),
            exclude_user_id: self.exclude_user_id,
        }
    }

    pub fn has_profile_filters(&self) -> bool {
        self.unit_count_range.is_some()
            || self.age_category.is_some()
            || self.has_amenities.is_some()
            || self.neighborhood.is_some()
            || self.zone.is_some()
    }

    fn has_building_traits(&self) -> bool {
        self.unit_count_range.is_some() || self.age_category.is_some() || self.has_amenities.is_some()
    }

    fn has_geography(&self) -> bool {
        self.neighborhood.is_some() || self.zone.is_some()
    }

    fn excludes(&self, row: &AnalysisTotal) -> bool {
        match (&self.exclude_building, self.exclude_user_id) {
            (Some(name), Some(user_id)) => row.user_id == user_id && row.building_name == *name,
            _ => false,
        }
    }

    fn matches_profile(&self, profile: &BuildingProfile, level: AggregationScope) -> bool {
        if !same_text(&self.unit_count_range, &profile.unit_count_range)
            || !same_text(&self.age_category, &profile.age_category)
        {
            return false;
        }
        if let Some(wanted) = self.has_amenities {
            if profile.has_amenities != Some(wanted) {
                return false;
            }
        }

        match level {
            AggregationScope::Neighborhood => {
                same_text(&self.neighborhood, &profile.neighborhood)
            }
            AggregationScope::Zone => same_text(&self.zone, &profile.zone),
            _ => true,
        }
    }
}

fn same_text(wanted: &Option<String>, actual: &Option<String>) -> bool {
    match (wanted, actual) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(w), Some(a)) => text::fold_lower(w.trim()) == text::fold_lower(a.trim()),
    }
}

#[derive(Serialize)]
struct FilterKey<'a> {
    filters: &'a MarketFilters,
    #[serde(rename = "fallbackIfEmpty")]
    fallback_if_empty: bool,
}

/// Canonical JSON of `{filters, fallbackIfEmpty}`; used as the market cache key.
pub fn filter_key(filters: &MarketFilters, fallback_if_empty: bool) -> serde_json::Result<String> {
    let filters = filters.normalized();
    serde_json::to_string(&FilterKey {
        filters: &filters,
        fallback_if_empty,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketTrend {
    pub data: Vec<TrendPoint>,
    pub stats: TrendStats,
}

type BuildingKey<'a> = (Uuid, &'a str);

/// Per-period average spend across the buildings selected by `filters`.
///
/// With profile filters the candidate set is narrowed by neighborhood, then zone. When
/// neither yields a usable set, `fallback_if_empty` decides between loosening (first
/// without geography, then without any filter) and returning an empty result.
pub fn aggregate_market_trend(
    analyses: &[AnalysisTotal],
    profiles: &[BuildingProfile],
    filters: &MarketFilters,
    fallback_if_empty: bool,
) -> MarketTrend {
    let filters = filters.normalized();
    let base: Vec<&AnalysisTotal> = analyses
        .iter()
        .filter(|a| !a.building_name.trim().is_empty())
        .filter(|a| !filters.excludes(a))
        .collect();

    if !filters.has_profile_filters() {
        return summarize(&base, filters.category.is_some(), false, AggregationScope::Global);
    }

    let mut levels = Vec::new();
    if filters.neighborhood.is_some() {
        levels.push(AggregationScope::Neighborhood);
    }
    if filters.zone.is_some() {
        levels.push(AggregationScope::Zone);
    }
    if !filters.has_geography() {
        levels.push(AggregationScope::Profile);
    }

    for level in levels {
        if let Some(subset) = usable_subset(&base, profiles, &filters, level) {
            return summarize(&subset, true, false, level);
        }
        tracing::debug!(?level, "market filter level has too few buildings");
    }

    if !fallback_if_empty {
        return MarketTrend {
            data: Vec::new(),
            stats: TrendStats {
                total_buildings: 0,
                total_analyses: 0,
                periods_count: 0,
                filters_applied: true,
                used_fallback: false,
                scope: AggregationScope::None,
            },
        };
    }

    // Geography-only filters loosen straight to the unfiltered aggregate.
    if filters.has_geography() && filters.has_building_traits() {
        if let Some(subset) = usable_subset(&base, profiles, &filters, AggregationScope::Profile) {
            return summarize(&subset, true, true, AggregationScope::Profile);
        }
    }

    summarize(&base, true, true, AggregationScope::Global)
}

fn usable_subset<'a>(
    base: &[&'a AnalysisTotal],
    profiles: &[BuildingProfile],
    filters: &MarketFilters,
    level: AggregationScope,
) -> Option<Vec<&'a AnalysisTotal>> {
    let candidates: HashSet<BuildingKey<'_>> = profiles
        .iter()
        .filter(|p| filters.matches_profile(p, level))
        .map(|p| (p.user_id, p.building_name.as_str()))
        .collect();
    if candidates.len() < MIN_BUILDINGS {
        return None;
    }

    let subset: Vec<&AnalysisTotal> = base
        .iter()
        .copied()
        .filter(|a| candidates.contains(&(a.user_id, a.building_name.as_str())))
        .collect();

    let buildings: HashSet<BuildingKey<'_>> = subset
        .iter()
        .map(|a| (a.user_id, a.building_name.as_str()))
        .collect();
    let periods: HashSet<PeriodKey> = subset
        .iter()
        .map(|a| PeriodKey::new(&a.period, a.period_date))
        .collect();

    (buildings.len() >= MIN_BUILDINGS && periods.len() >= MIN_PERIODS).then_some(subset)
}

#[derive(Default)]
struct PeriodBucket<'a> {
    sum: f64,
    count: usize,
    buildings: HashSet<BuildingKey<'a>>,
}

fn summarize(
    rows: &[&AnalysisTotal],
    filters_applied: bool,
    used_fallback: bool,
    scope: AggregationScope,
) -> MarketTrend {
    let mut buckets: BTreeMap<PeriodKey, PeriodBucket<'_>> = BTreeMap::new();
    let mut all_buildings: HashSet<BuildingKey<'_>> = HashSet::new();

    for row in rows {
        let key = (row.user_id, row.building_name.as_str());
        let bucket = buckets
            .entry(PeriodKey::new(&row.period, row.period_date))
            .or_default();
        bucket.sum += row.amount;
        bucket.count += 1;
        bucket.buildings.insert(key);
        all_buildings.insert(key);
    }

    let averages: Vec<(String, f64, usize, usize)> = buckets
        .iter()
        .map(|(period, b)| {
            let average = (b.sum / b.count as f64).round();
            (period.to_string(), average, b.count, b.buildings.len())
        })
        .collect();
    let anchor = averages.first().map(|(_, avg, _, _)| *avg).unwrap_or(0.0);

    let data: Vec<TrendPoint> = averages
        .into_iter()
        .map(|(period, average, count, buildings_count)| TrendPoint {
            period,
            average,
            count,
            buildings_count,
            normalized_percent: percent_change(average, anchor),
        })
        .collect();

    MarketTrend {
        stats: TrendStats {
            total_buildings: all_buildings.len(),
            total_analyses: rows.len(),
            periods_count: data.len(),
            filters_applied,
            used_fallback,
            scope,
        },
        data,
    }
}
