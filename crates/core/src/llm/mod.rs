pub mod anthropic;
pub mod error;

use crate::domain::trend::{Deviations, TrendPercent};
use serde::Serialize;

/// Everything the narrative needs: the three anchored series and the computed gaps.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationContext {
    pub building_name: Option<String>,
    pub user_trend: Vec<TrendPercent>,
    pub inflation_trend: Vec<TrendPercent>,
    pub buildings_trend: Vec<TrendPercent>,
    pub deviations: Deviations,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

/// Opaque text-completion oracle that turns numeric deviations into a short explanation.
#[async_trait::async_trait]
pub trait NarrativeGenerator: Send + Sync {
    fn provider(&self) -> Provider;

    async fn explain_deviation(&self, ctx: &DeviationContext) -> anyhow::Result<String>;
}
