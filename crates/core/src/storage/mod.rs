pub mod analyses;
pub mod buildings;
pub mod cache;
pub mod inflation;

use crate::domain::analysis::{
    AnalysisComment, AnalysisTotal, ExpenseAnalysis, ExpenseCategory, NewComment, SharedLink,
};
use crate::domain::building::BuildingProfile;
use crate::domain::inflation::InflationDataPoint;
use anyhow::Context;
use uuid::Uuid;

pub use cache::PgCacheStore;

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Read/write access to the expense tables. Implemented over Postgres by
/// [`PgExpenseRepository`]; services only see this trait.
#[async_trait::async_trait]
pub trait ExpenseRepository: Send + Sync {
    /// Completed analyses with a building name. With `category`, the amount is that
    /// category's current amount and analyses without it are skipped.
    async fn completed_totals(&self, category: Option<&str>) -> anyhow::Result<Vec<AnalysisTotal>>;

    /// Completed analyses of one building, oldest first.
    async fn user_history(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> anyhow::Result<Vec<AnalysisTotal>>;

    async fn user_building_names(&self, user_id: Uuid) -> anyhow::Result<Vec<String>>;

    async fn building_profiles(&self) -> anyhow::Result<Vec<BuildingProfile>>;

    async fn building_profile(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> anyhow::Result<Option<BuildingProfile>>;

    async fn save_building_profile(&self, profile: &BuildingProfile) -> anyhow::Result<()>;

    async fn inflation_series(&self) -> anyhow::Result<Vec<InflationDataPoint>>;

    async fn upsert_inflation(&self, points: &[InflationDataPoint]) -> anyhow::Result<u64>;

    async fn analysis(&self, id: Uuid) -> anyhow::Result<Option<ExpenseAnalysis>>;

    async fn categories(&self, analysis_id: Uuid) -> anyhow::Result<Vec<ExpenseCategory>>;

    async fn comments(&self, analysis_id: Uuid) -> anyhow::Result<Vec<AnalysisComment>>;

    async fn insert_comment(&self, comment: &NewComment) -> anyhow::Result<AnalysisComment>;

    /// Returns false when the analysis does not exist or is not owned by `user_id`.
    async fn update_notes(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
        notes: Option<&str>,
    ) -> anyhow::Result<bool>;

    async fn shared_link(&self, token: &str) -> anyhow::Result<Option<SharedLink>>;
}

#[derive(Debug, Clone)]
pub struct PgExpenseRepository {
    pool: sqlx::PgPool,
}

impl PgExpenseRepository {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for PgExpenseRepository {
    async fn completed_totals(&self, category: Option<&str>) -> anyhow::Result<Vec<AnalysisTotal>> {
        analyses::completed_totals(&self.pool, category).await
    }

    async fn user_history(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> anyhow::Result<Vec<AnalysisTotal>> {
        analyses::user_history(&self.pool, user_id, building_name).await
    }

    async fn user_building_names(&self, user_id: Uuid) -> anyhow::Result<Vec<String>> {
        buildings::user_building_names(&self.pool, user_id).await
    }

    async fn building_profiles(&self) -> anyhow::Result<Vec<BuildingProfile>> {
        buildings::all_profiles(&self.pool).await
    }

    async fn building_profile(
        &self,
        user_id: Uuid,
        building_name: &str,
    ) -> anyhow::Result<Option<BuildingProfile>> {
        buildings::profile(&self.pool, user_id, building_name).await
    }

    async fn save_building_profile(&self, profile: &BuildingProfile) -> anyhow::Result<()> {
        buildings::upsert_profile(&self.pool, profile).await
    }

    async fn inflation_series(&self) -> anyhow::Result<Vec<InflationDataPoint>> {
        inflation::series(&self.pool).await
    }

    async fn upsert_inflation(&self, points: &[InflationDataPoint]) -> anyhow::Result<u64> {
        inflation::upsert_points(&self.pool, points).await
    }

    async fn analysis(&self, id: Uuid) -> anyhow::Result<Option<ExpenseAnalysis>> {
        analyses::analysis(&self.pool, id).await
    }

    async fn categories(&self, analysis_id: Uuid) -> anyhow::Result<Vec<ExpenseCategory>> {
        analyses::categories(&self.pool, analysis_id).await
    }

    async fn comments(&self, analysis_id: Uuid) -> anyhow::Result<Vec<AnalysisComment>> {
        analyses::comments(&self.pool, analysis_id).await
    }

    async fn insert_comment(&self, comment: &NewComment) -> anyhow::Result<AnalysisComment> {
        analyses::insert_comment(&self.pool, comment).await
    }

    async fn update_notes(
        &self,
        analysis_id: Uuid,
        user_id: Uuid,
        notes: Option<&str>,
    ) -> anyhow::Result<bool> {
        analyses::update_notes(&self.pool, analysis_id, user_id, notes).await
    }

    async fn shared_link(&self, token: &str) -> anyhow::Result<Option<SharedLink>> {
        analyses::shared_link(&self.pool, token).await
    }
}
