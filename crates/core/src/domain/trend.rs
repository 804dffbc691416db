use crate::domain::analysis::AnalysisTotal;
use crate::domain::inflation::InflationDataPoint;
use crate::error::{ServiceError, ServiceResult};
use crate::time::period::{PeriodKey, YearMonth};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Percentage-point gap above which a deviation is flagged.
pub const SIGNIFICANT_DEVIATION_PP: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub period: String,
    pub average: f64,
    pub count: usize,
    pub buildings_count: usize,
    pub normalized_percent: f64,
}

/// Which candidate set produced a market trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationScope {
    Neighborhood,
    Zone,
    Profile,
    Global,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendStats {
    pub total_buildings: usize,
    pub total_analyses: usize,
    pub periods_count: usize,
    pub filters_applied: bool,
    pub used_fallback: bool,
    pub scope: AggregationScope,
}

/// One point of a series expressed as percent change from the series' first period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPercent {
    pub period: String,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deviations {
    pub from_inflation: Option<f64>,
    pub from_buildings: Option<f64>,
    pub is_significant: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evolution {
    pub user_trend: Vec<TrendPercent>,
    pub inflation_trend: Vec<TrendPercent>,
    pub buildings_trend: Vec<TrendPercent>,
}

/// `(value - base) / base * 100`, rounded to two decimals. A zero or non-finite base yields 0.
pub fn percent_change(value: f64, base: f64) -> f64 {
    if base == 0.0 || !base.is_finite() || !value.is_finite() {
        return 0.0;
    }
    round2((value - base) / base * 100.0)
}

/// Anchors every value to the first one.
pub fn normalize_series(values: &[f64]) -> Vec<f64> {
    let Some(&base) = values.first() else {
        return Vec::new();
    };
    values.iter().map(|&v| percent_change(v, base)).collect()
}

/// Compares the user's growth with inflation and with the market average.
///
/// Each input is already anchored at its own first period. The gap is the user's latest
/// percent minus the reference's latest percent, whatever periods those points carry.
pub fn analyze_deviations(
    user: &[TrendPercent],
    inflation: &[TrendPercent],
    buildings: &[TrendPercent],
) -> ServiceResult<Deviations> {
    if user.is_empty() {
        return Err(ServiceError::validation(
            "userTrend must contain at least one point",
        ));
    }

    let from_inflation = deviation_against(user, inflation);
    let from_buildings = deviation_against(user, buildings);

    let significant = |d: Option<f64>| d.is_some_and(|d| d.abs() > SIGNIFICANT_DEVIATION_PP);
    let is_significant = significant(from_inflation) || significant(from_buildings);

    Ok(Deviations {
        from_inflation,
        from_buildings,
        is_significant,
    })
}

fn deviation_against(user: &[TrendPercent], reference: &[TrendPercent]) -> Option<f64> {
    let last_user = user.last()?;
    let last_ref = reference.last()?;
    Some(round2(last_user.percent - last_ref.percent))
}

/// Builds the three comparable growth curves anchored at the user's first observed period.
///
/// `history` may contain several rows for the same month; the last one wins. Inflation is
/// compounded from monthly rates starting after the anchor month. The market series is
/// rebased to the anchor when the market has a point for it, otherwise its own
/// normalization is used.
pub fn build_evolution(
    history: &[AnalysisTotal],
    inflation: &[InflationDataPoint],
    market: &[TrendPoint],
) -> Evolution {
    let mut by_period: BTreeMap<PeriodKey, f64> = BTreeMap::new();
    for row in history {
        by_period.insert(PeriodKey::new(&row.period, row.period_date), row.amount);
    }

    let Some(anchor_key) = by_period.keys().next() else {
        return Evolution {
            user_trend: Vec::new(),
            inflation_trend: Vec::new(),
            buildings_trend: Vec::new(),
        };
    };
    let anchor_key = anchor_key.clone();

    let amounts: Vec<f64> = by_period.values().copied().collect();
    let user_trend: Vec<TrendPercent> = by_period
        .keys()
        .zip(normalize_series(&amounts))
        .map(|(k, percent)| TrendPercent {
            period: k.to_string(),
            percent,
        })
        .collect();

    let inflation_trend = match anchor_key.year_month() {
        Some(anchor) => inflation_from_anchor(anchor, by_period.keys(), inflation),
        None => Vec::new(),
    };

    let buildings_trend = market_from_anchor(&anchor_key, by_period.keys(), market);

    Evolution {
        user_trend,
        inflation_trend,
        buildings_trend,
    }
}

fn inflation_from_anchor<'a>(
    anchor: YearMonth,
    periods: impl Iterator<Item = &'a PeriodKey>,
    inflation: &[InflationDataPoint],
) -> Vec<TrendPercent> {
    let rates: HashMap<YearMonth, f64> = inflation.iter().map(|p| (p.period, p.value)).collect();

    let mut out = Vec::new();
    for key in periods {
        let Some(target) = key.year_month() else {
            continue;
        };
        if target < anchor {
            continue;
        }

        let mut factor = 1.0;
        let mut month = anchor;
        while month < target {
            month = month.next();
            // Missing months contribute no change.
            factor *= 1.0 + rates.get(&month).copied().unwrap_or(0.0) / 100.0;
        }

        out.push(TrendPercent {
            period: target.to_string(),
            percent: round2((factor - 1.0) * 100.0),
        });
    }
    out
}

fn market_from_anchor<'a>(
    anchor: &PeriodKey,
    periods: impl Iterator<Item = &'a PeriodKey>,
    market: &[TrendPoint],
) -> Vec<TrendPercent> {
    let by_period: HashMap<&str, &TrendPoint> =
        market.iter().map(|p| (p.period.as_str(), p)).collect();
    let anchor_label = anchor.to_string();
    let base = by_period
        .get(anchor_label.as_str())
        .map(|p| p.average)
        .filter(|avg| *avg > 0.0);

    periods
        .filter_map(|key| {
            let label = key.to_string();
            let point = by_period.get(label.as_str())?;
            let percent = match base {
                Some(base) => percent_change(point.average, base),
                None => point.normalized_percent,
            };
            Some(TrendPercent {
                period: label,
                percent,
            })
        })
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn tp(period: &str, percent: f64) -> TrendPercent {
        TrendPercent {
            period: period.to_string(),
            percent,
        }
    }

    fn total(period: &str, amount: f64) -> AnalysisTotal {
        AnalysisTotal {
            user_id: Uuid::nil(),
            building_name: "Edificio Central".to_string(),
            period: period.to_string(),
            period_date: None,
            amount,
        }
    }

    fn market_point(period: &str, average: f64, normalized_percent: f64) -> TrendPoint {
        TrendPoint {
            period: period.to_string(),
            average,
            count: 2,
            buildings_count: 2,
            normalized_percent,
        }
    }

    #[test]
    fn normalized_series_starts_at_zero() {
        let out = normalize_series(&[1000.0, 1100.0, 1500.0]);
        assert_eq!(out, vec![0.0, 10.0, 50.0]);
        assert!(normalize_series(&[]).is_empty());
    }

    #[test]
    fn percent_change_is_rounded_to_cents() {
        assert_eq!(percent_change(400.0, 300.0), 33.33);
        assert_eq!(percent_change(1100.0, 1000.0), 10.0);
    }

    #[test]
    fn zero_baseline_degrades_to_zero() {
        assert_eq!(normalize_series(&[0.0, 100.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn deviation_of_ten_points_is_significant() {
        let user = vec![tp("2024-01", 0.0), tp("2024-02", 20.0)];
        let inflation = vec![tp("2024-01", 0.0), tp("2024-02", 10.0)];
        let d = analyze_deviations(&user, &inflation, &[]).unwrap();
        assert_eq!(d.from_inflation, Some(10.0));
        assert_eq!(d.from_buildings, None);
        assert!(d.is_significant);
    }

    #[test]
    fn small_gaps_are_not_significant() {
        let user = vec![tp("2024-01", 0.0), tp("2024-02", 12.0)];
        let inflation = vec![tp("2024-01", 0.0), tp("2024-02", 10.0)];
        let buildings = vec![tp("2024-01", 0.0), tp("2024-02", 15.0)];
        let d = analyze_deviations(&user, &inflation, &buildings).unwrap();
        assert_eq!(d.from_inflation, Some(2.0));
        assert_eq!(d.from_buildings, Some(-3.0));
        assert!(!d.is_significant);
    }

    #[test]
    fn negative_gap_counts_by_magnitude() {
        let user = vec![tp("2024-01", 0.0), tp("2024-03", 1.0)];
        let buildings = vec![tp("2024-01", 0.0), tp("2024-03", 9.0)];
        let d = analyze_deviations(&user, &[], &buildings).unwrap();
        assert_eq!(d.from_buildings, Some(-8.0));
        assert!(d.is_significant);
    }

    #[test]
    fn compares_latest_points_even_when_periods_differ() {
        let user = vec![tp("2024-01", 0.0), tp("2024-02", 8.0), tp("2024-03", 30.0)];
        let inflation = vec![tp("2024-01", 0.0), tp("2024-02", 6.0)];
        let d = analyze_deviations(&user, &inflation, &[]).unwrap();
        assert_eq!(d.from_inflation, Some(24.0));

        // Only the anchor is shared; the gap still comes from the latest points.
        let user = vec![tp("2024-01", 0.0), tp("2024-03", 30.0)];
        let buildings = vec![tp("2024-01", 0.0), tp("2024-02", 10.0)];
        let d = analyze_deviations(&user, &[], &buildings).unwrap();
        assert_eq!(d.from_buildings, Some(20.0));
        assert!(d.is_significant);
    }

    #[test]
    fn empty_user_trend_is_a_validation_error() {
        let err = analyze_deviations(&[], &[tp("2024-01", 0.0)], &[]).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn evolution_is_anchored_at_first_user_period() {
        let history = vec![
            total("marzo 2024", 1200.0),
            total("enero 2024", 1000.0),
            total("febrero 2024", 1100.0),
        ];
        let inflation = vec![
            InflationDataPoint {
                period: YearMonth::new(2024, 1).unwrap(),
                value: 20.0,
                is_estimated: false,
            },
            InflationDataPoint {
                period: YearMonth::new(2024, 2).unwrap(),
                value: 10.0,
                is_estimated: false,
            },
            InflationDataPoint {
                period: YearMonth::new(2024, 3).unwrap(),
                value: 10.0,
                is_estimated: false,
            },
        ];
        let market = vec![
            market_point("2023-12", 800.0, 0.0),
            market_point("2024-01", 1000.0, 25.0),
            market_point("2024-03", 1300.0, 62.5),
        ];

        let evo = build_evolution(&history, &inflation, &market);

        assert_eq!(
            evo.user_trend,
            vec![tp("2024-01", 0.0), tp("2024-02", 10.0), tp("2024-03", 20.0)]
        );
        // January's own rate is before the anchor; Feb and March compound.
        assert_eq!(
            evo.inflation_trend,
            vec![tp("2024-01", 0.0), tp("2024-02", 10.0), tp("2024-03", 21.0)]
        );
        assert_eq!(evo.buildings_trend, vec![tp("2024-01", 0.0), tp("2024-03", 30.0)]);
    }

    #[test]
    fn market_keeps_own_normalization_without_anchor_point() {
        let history = vec![total("2024-01", 100.0), total("2024-02", 110.0)];
        let market = vec![market_point("2024-02", 500.0, 4.0)];
        let evo = build_evolution(&history, &[], &market);
        assert_eq!(evo.buildings_trend, vec![tp("2024-02", 4.0)]);
    }

    #[test]
    fn later_rows_for_same_month_win() {
        let history = vec![
            total("2024-01", 100.0),
            total("2024-02", 150.0),
            total("febrero 2024", 120.0),
        ];
        let evo = build_evolution(&history, &[], &[]);
        assert_eq!(evo.user_trend, vec![tp("2024-01", 0.0), tp("2024-02", 20.0)]);
    }

    #[test]
    fn empty_history_produces_empty_series() {
        let evo = build_evolution(&[], &[], &[]);
        assert!(evo.user_trend.is_empty());
        assert!(evo.inflation_trend.is_empty());
        assert!(evo.buildings_trend.is_empty());
    }
}
