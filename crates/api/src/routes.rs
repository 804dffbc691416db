use crate::auth::SupabaseAuth;
use crate::error::{ApiError, ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use expensa_core::domain::analysis::AnalysisComment;
use expensa_core::domain::building::BuildingProfile;
use expensa_core::domain::market::MarketFilters;
use expensa_core::domain::trend::{analyze_deviations, Deviations, TrendPercent};
use expensa_core::error::ServiceError;
use expensa_core::llm::{DeviationContext, NarrativeGenerator};
use expensa_core::services::{
    explain_deviations, BuildingMatch, BuildingService, EvolutionReport, EvolutionService,
    InflationService, MarketTrendResponse, MarketTrendService, SharedAnalysisService,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
pub struct DataServices {
    pub market: MarketTrendService,
    pub inflation: InflationService,
    pub evolution: EvolutionService,
    pub buildings: BuildingService,
    pub shared: SharedAnalysisService,
}

#[derive(Clone)]
pub struct AppState {
    pub data: Option<DataServices>,
    pub auth: Option<SupabaseAuth>,
    pub narrative: Option<Arc<dyn NarrativeGenerator>>,
}

impl AppState {
    fn data(&self) -> ApiResult<&DataServices> {
        self.data.as_ref().ok_or(ApiError::Unavailable("database"))
    }

    async fn user_id(&self, headers: &HeaderMap) -> ApiResult<Uuid> {
        let auth = self.auth.as_ref().ok_or(ApiError::Unavailable("auth"))?;
        Ok(auth.user_id(headers).await?)
    }
}

/// `{"success": true, ...body}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

fn ok<T>(body: T) -> Json<Envelope<T>> {
    Json(Envelope {
        success: true,
        body,
    })
}

pub async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
pub struct MarketTrendQuery {
    unit_count_range: Option<String>,
    age_category: Option<String>,
    neighborhood: Option<String>,
    zone: Option<String>,
    has_amenities: Option<bool>,
    category: Option<String>,
    #[serde(rename = "excludeBuilding")]
    exclude_building: Option<String>,
    #[serde(rename = "excludeUserId")]
    exclude_user_id: Option<Uuid>,
    #[serde(default, rename = "fallbackIfEmpty")]
    fallback_if_empty: bool,
}

impl MarketTrendQuery {
    fn filters(self) -> (MarketFilters, bool) {
        (
            MarketFilters {
                unit_count_range: self.unit_count_range,
                age_category: self.age_category,
                neighborhood: self.neighborhood,
                zone: self.zone,
                has_amenities: self.has_amenities,
                category: self.category,
                exclude_building: self.exclude_building,
                exclude_user_id: self.exclude_user_id,
            },
            self.fallback_if_empty,
        )
    }
}

pub async fn market_trend(
    State(state): State<AppState>,
    Query(query): Query<MarketTrendQuery>,
) -> ApiResult<Json<MarketTrendResponse>> {
    let (filters, fallback_if_empty) = query.filters();
    let res = state
        .data()?
        .market
        .get_market_trend(&filters, fallback_if_empty, Utc::now())
        .await?;
    Ok(Json(res))
}

#[derive(Debug, Serialize)]
pub struct InflationBody {
    data: Vec<expensa_core::domain::inflation::InflationDataPoint>,
    cached: bool,
}

pub async fn inflation(State(state): State<AppState>) -> ApiResult<Json<Envelope<InflationBody>>> {
    let series = state.data()?.inflation.series(Utc::now()).await?;
    Ok(ok(InflationBody {
        data: series.data,
        cached: series.cached,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EvolutionQuery {
    building: String,
}

pub async fn evolution(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<EvolutionQuery>,
) -> ApiResult<Json<Envelope<EvolutionReport>>> {
    let user_id = state.user_id(&headers).await?;
    let report = state
        .data()?
        .evolution
        .evolution(user_id, &query.building, Utc::now())
        .await?;
    Ok(ok(report))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationsRequest {
    user_trend: Option<Vec<TrendPercent>>,
    inflation_trend: Option<Vec<TrendPercent>>,
    buildings_trend: Option<Vec<TrendPercent>>,
    building_name: Option<String>,
    #[serde(default)]
    explain: bool,
}

#[derive(Debug, Serialize)]
pub struct DeviationsBody {
    deviations: Deviations,
    narrative: Option<String>,
}

pub async fn deviations(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<DeviationsRequest>,
) -> ApiResult<Json<Envelope<DeviationsBody>>> {
    state.user_id(&headers).await?;

    let (Some(user_trend), Some(inflation_trend), Some(buildings_trend)) =
        (req.user_trend, req.inflation_trend, req.buildings_trend)
    else {
        return Err(ServiceError::validation(
            "userTrend, inflationTrend and buildingsTrend are required",
        )
        .into());
    };

    let deviations = analyze_deviations(&user_trend, &inflation_trend, &buildings_trend)?;
    let narrative = if req.explain {
        explain_deviations(
            state.narrative.as_deref(),
            &DeviationContext {
                building_name: req.building_name,
                user_trend,
                inflation_trend,
                buildings_trend,
                deviations: deviations.clone(),
            },
        )
        .await?
    } else {
        None
    };

    Ok(ok(DeviationsBody {
        deviations,
        narrative,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchBuildingRequest {
    building_name: String,
}

pub async fn match_building(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<MatchBuildingRequest>,
) -> ApiResult<Json<Envelope<BuildingMatch>>> {
    let user_id = state.user_id(&headers).await?;
    let m = state
        .data()?
        .buildings
        .resolve_building_name(user_id, &req.building_name)
        .await?;
    Ok(ok(m))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    building_name: String,
    country: Option<String>,
    province: Option<String>,
    city: Option<String>,
    neighborhood: Option<String>,
    zone: Option<String>,
    unit_count_range: Option<String>,
    age_category: Option<String>,
    has_amenities: Option<bool>,
    #[serde(default)]
    amenities: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileBody {
    profile: BuildingProfile,
}

pub async fn upsert_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ProfileRequest>,
) -> ApiResult<Json<Envelope<ProfileBody>>> {
    let user_id = state.user_id(&headers).await?;
    let profile = state
        .data()?
        .buildings
        .upsert_profile(BuildingProfile {
            user_id,
            building_name: req.building_name,
            country: req.country,
            province: req.province,
            city: req.city,
            neighborhood: req.neighborhood,
            zone: req.zone,
            unit_count_range: req.unit_count_range,
            age_category: req.age_category,
            has_amenities: req.has_amenities,
            amenities: req.amenities,
        })
        .await?;
    Ok(ok(ProfileBody { profile }))
}

#[derive(Debug, Serialize)]
pub struct SharedBody {
    data: serde_json::Value,
    cached: bool,
}

pub async fn shared_analysis(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<Envelope<SharedBody>>> {
    let res = state
        .data()?
        .shared
        .shared_analysis(&token, Utc::now())
        .await?;
    Ok(ok(SharedBody {
        data: res.data,
        cached: res.cached,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    author_name: Option<String>,
    body: String,
}

#[derive(Debug, Serialize)]
pub struct CommentBody {
    comment: AnalysisComment,
}

pub async fn visitor_comment(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<CommentBody>>)> {
    let comment = state
        .data()?
        .shared
        .add_visitor_comment(&token, req.author_name.as_deref(), &req.body, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, ok(CommentBody { comment })))
}

pub async fn owner_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(analysis_id): Path<Uuid>,
    Json(req): Json<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Envelope<CommentBody>>)> {
    let user_id = state.user_id(&headers).await?;
    let comment = state
        .data()?
        .shared
        .add_owner_comment(user_id, analysis_id, &req.body)
        .await?;
    Ok((StatusCode::CREATED, ok(CommentBody { comment })))
}

#[derive(Debug, Deserialize)]
pub struct NotesRequest {
    notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

pub async fn update_notes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(analysis_id): Path<Uuid>,
    Json(req): Json<NotesRequest>,
) -> ApiResult<Json<Envelope<Empty>>> {
    let user_id = state.user_id(&headers).await?;
    state
        .data()?
        .shared
        .update_notes(user_id, analysis_id, req.notes.as_deref())
        .await?;
    Ok(ok(Empty {}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn market_query_accepts_descriptor_names() {
        let user = Uuid::new_v4();
        let q: MarketTrendQuery = serde_json::from_value(json!({
            "neighborhood": "Palermo",
            "has_amenities": true,
            "excludeBuilding": "Torre A",
            "excludeUserId": user,
            "fallbackIfEmpty": true
        }))
        .unwrap();
        let (filters, fallback) = q.filters();
        assert!(fallback);
        assert_eq!(filters.neighborhood.as_deref(), Some("Palermo"));
        assert_eq!(filters.has_amenities, Some(true));
        assert_eq!(filters.exclude_user_id, Some(user));
    }

    #[test]
    fn envelope_flattens_body() {
        let v = serde_json::to_value(ok(SharedBody {
            data: json!({"a": 1}),
            cached: true,
        }).0)
        .unwrap();
        assert_eq!(v, json!({"success": true, "data": {"a": 1}, "cached": true}));
    }

    #[tokio::test]
    async fn data_routes_report_missing_database() {
        let state = AppState {
            data: None,
            auth: None,
            narrative: None,
        };
        let err = market_trend(State(state), Query(MarketTrendQuery::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unavailable("database")));
    }
}
