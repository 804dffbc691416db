//! In-memory fakes shared by the service tests.

use crate::cache::{CacheEntry, CacheNamespace, CacheStore};
use crate::domain::analysis::{
    AnalysisComment, AnalysisStatus, AnalysisTotal, ExpenseAnalysis, ExpenseCategory, NewComment,
    SharedLink,
};
use crate::domain::building::BuildingProfile;
use crate::domain::inflation::InflationDataPoint;
use crate::ingest::InflationFetcher;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{DeviationContext, NarrativeGenerator, Provider};
use crate::storage::ExpenseRepository;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

pub struct FailingCacheStore;

#[async_trait::async_trait]
impl CacheStore for FailingCacheStore {
    async fn get(&self, _ns: CacheNamespace, _key: &str) -> anyhow::Result<Option<CacheEntry>> {
        anyhow::bail!("cache table missing")
    }

    async fn put(&self, _ns: CacheNamespace, _entry: CacheEntry) -> anyhow::Result<()> {
        anyhow::bail!("cache table missing")
    }

    async fn delete(&self, _ns: CacheNamespace, _key: &str) -> anyhow::Result<u64> {
        anyhow::bail!("cache table missing")
    }

    async fn delete_tagged(&self, _ns: CacheNamespace, _tag: &str) -> anyhow::Result<u64> {
        anyhow::bail!("cache table missing")
    }

    async fn delete_if_expired(
        &self,
        _ns: CacheNamespace,
        _key: &str,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        anyhow::bail!("cache table missing")
    }

    async fn record_hit(
        &self,
        _ns: CacheNamespace,
        _key: &str,
        _at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        anyhow::bail!("cache table missing")
    }

    async fn delete_expired(
        &self,
        _ns: CacheNamespace,
        _now: DateTime<Utc>,
    ) -> anyhow::Result<u64> {
        anyhow::bail!("cache table missing")
    }
}

/// Stored analysis with its category breakdown.
#[derive(Debug, Clone)]
pub struct StoredAnalysis {
    pub analysis: ExpenseAnalysis,
    pub categories: Vec<ExpenseCategory>,
}

#[derive(Default)]
pub struct FakeRepository {
    pub analyses: Mutex<Vec<StoredAnalysis>>,
    pub profiles: Mutex<Vec<BuildingProfile>>,
    pub inflation: Mutex<Vec<InflationDataPoint>>,
    pub comments: Mutex<Vec<AnalysisComment>>,
    pub links: Mutex<Vec<SharedLink>>,
    pub completed_totals_calls: AtomicUsize,
    pub inflation_calls: AtomicUsize,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_analysis(
        &self,
        user_id: Uuid,
        building_name: &str,
        period: &str,
        total_amount: f64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let mut analyses = self.analyses.lock().await;
        let created_at = fixed_time() + chrono::Duration::seconds(analyses.len() as i64);
        analyses.push(StoredAnalysis {
            analysis: ExpenseAnalysis {
                id,
                user_id,
                building_name: Some(building_name.to_string()),
                period: period.to_string(),
                period_date: None,
                total_amount,
                previous_total: None,
                status: AnalysisStatus::Completed,
                notes: None,
                created_at,
            },
            categories: Vec::new(),
        });
        id
    }

    pub async fn add_link(&self, token: &str, analysis_id: Uuid, is_active: bool) {
        self.links.lock().await.push(SharedLink {
            token: token.to_string(),
            analysis_id,
            is_active,
            expires_at: None,
        });
    }

    pub async fn notes_of(&self, analysis_id: Uuid) -> Option<String> {
        self.analyses
            .lock()
            .await
            .iter()
            .find(|s| s.analysis.id == analysis_id)
            .and_then(|s| s.analysis.notes.clone())
    }
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
}

fn to_total(a: &ExpenseAnalysis, amount: f64) -> Option<AnalysisTotal> {
    Some(AnalysisTotal {
        user_id: a.user_id,
        building_name: a.building_name.clone()?,
        period: a.period.clone(),
        period_date: a.period_date,
        amount,
    })
}

#[async_trait::async_trait]
impl ExpenseRepository for FakeRepository {
    async fn completed_totals(&self, category: Option<&str>) -> anyhow::Result<Vec<AnalysisTotal>> {
        self.completed_totals_calls.fetch_add(1, Ordering::SeqCst);
        let analyses = self.analyses.lock().await;
        Ok(analyses
            .iter()
            .filter(|s| s.analysis.status == AnalysisStatus::Completed)
            .filter_map(|s| match category {
                None => to_total(&s.analysis, s.analysis.total_amount),
                Some(cat) => {
                    let c = s
                        .categories
                        .iter()
                        .find(|c| c.name.eq_ignore_ascii_case(cat))?;
                    to_total(&s.analysis, c.current_amount)
                }
            })
            .collect())
    }

    async fn user_history(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> anyhow::Result<Vec<AnalysisTotal>> {
        let analyses = self.analyses.lock().await;
        let mut rows: Vec<&ExpenseAnalysis> = analyses
            .iter()
            .map(|s| &s.analysis)
            .filter(|a| a.user_id == user_id)
            .filter(|a| a.building_name.as_deref() == Some(building_name))
            .filter(|a| a.status == AnalysisStatus::Completed)
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows
            .into_iter()
            .filter_map(|a| to_total(a, a.total_amount))
            .collect())
    }

    async fn user_building_names(&self, user_id: Uuid) -> anyhow::Result<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for s in self.analyses.lock().await.iter() {
            if s.analysis.user_id != user_id {
                continue;
            }
            if let Some(name) = &s.analysis.building_name {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        for p in self.profiles.lock().await.iter() {
            if p.user_id == user_id && !names.contains(&p.building_name) {
                names.push(p.building_name.clone());
            }
        }
        Ok(names)
    }

    async fn building_profiles(&self) -> anyhow::Result<Vec<BuildingProfile>> {
        Ok(self.profiles.lock().await.clone())
    }

    async fn building_profile(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> anyhow::Result<Option<BuildingProfile>> {
        Ok(self
            .profiles
            .lock()
            .await
            .iter()
            .find(|p| p.user_id == user_id && p.building_name == building_name)
            .cloned())
    }

    async fn save_building_profile(&self, profile: &BuildingProfile) -> anyhow::Result<()> {
        let mut profiles = self.profiles.lock().await;
        profiles.retain(|p| {
            !(p.user_id == profile.user_id && p.building_name == profile.building_name)
        });
        profiles.push(profile.clone());
        Ok(())
    }

    async fn inflation_series(&self) -> anyhow::Result<Vec<InflationDataPoint>> {
        self.inflation_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inflation.lock().await.clone())
    }

    async fn upsert_inflation(&self, points: &[InflationDataPoint]) -> anyhow::Result<u64> {
        let mut stored = self.inflation.lock().await;
        for p in points {
            stored.retain(|s| s.period != p.period);
            stored.push(p.clone());
        }
        stored.sort_by_key(|p| p.period);
        Ok(points.len() as u64)
    }

    async fn analysis(&self, id: Uuid) -> anyhow::Result<Option<ExpenseAnalysis>> {
        Ok(self
            .analyses
            .lock()
            .await
            .iter()
            .find(|s| s.analysis.id == id)
            .map(|s| s.analysis.clone()))
    }

    async fn categories(&self, analysis_id: Uuid) -> anyhow::Result<Vec<ExpenseCategory>> {
        Ok(self
            .analyses
            .lock()
            .await
            .iter()
            .find(|s| s.analysis.id == analysis_id)
            .map(|s| s.categories.clone())
            .unwrap_or_default())
    }

    async fn comments(&self, analysis_id: Uuid) -> anyhow::Result<Vec<AnalysisComment>> {
        Ok(self
            .comments
            .lock()
            .await
            .iter()
            .filter(|c| c.analysis_id == analysis_id)
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: &NewComment) -> anyhow::Result<AnalysisComment> {
        let mut comments = self.comments.lock().await;
        let stored = AnalysisComment {
            id: Uuid::new_v4(),
            analysis_id: comment.analysis_id,
            author: comment.author,
            author_name: comment.author_name.clone(),
            body: comment.body.clone(),
            created_at: fixed_time() + chrono::Duration::minutes(comments.len() as i64),
        };
        comments.push(stored.clone());
        Ok(stored)
    }

    async fn update_notes(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
        notes: Option<&str>,
    ) -> anyhow::Result<bool> {
        let mut analyses = self.analyses.lock().await;
        match analyses
            .iter_mut()
            .find(|s| s.analysis.id == analysis_id && s.analysis.user_id == user_id)
        {
            Some(s) => {
                s.analysis.notes = notes.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn shared_link(&self, token: &str) -> anyhow::Result<Option<SharedLink>> {
        Ok(self
            .links
            .lock()
            .await
            .iter()
            .find(|l| l.token == token)
            .cloned())
    }
}

pub enum FakeNarrativeMode {
    Text(String),
    Fail,
    RateLimited,
}

pub struct FakeNarrative {
    pub mode: FakeNarrativeMode,
    pub calls: AtomicUsize,
}

impl FakeNarrative {
    pub fn new(mode: FakeNarrativeMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl NarrativeGenerator for FakeNarrative {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn explain_deviation(&self, _ctx: &DeviationContext) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.mode {
            FakeNarrativeMode::Text(text) => Ok(text.clone()),
            FakeNarrativeMode::Fail => anyhow::bail!("provider timed out"),
            FakeNarrativeMode::RateLimited => Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                status: Some(429),
                detail: "status=429 Too Many Requests".to_string(),
                raw_output: None,
                raw_response_json: None,
            }
            .into()),
        }
    }
}

pub struct FakeInflationFetcher {
    pub result: Result<Vec<InflationDataPoint>, String>,
}

#[async_trait::async_trait]
impl InflationFetcher for FakeInflationFetcher {
    fn source_name(&self) -> &'static str {
        "fake"
    }

    async fn fetch_monthly_series(&self) -> anyhow::Result<Vec<InflationDataPoint>> {
        self.result.clone().map_err(anyhow::Error::msg)
    }
}
