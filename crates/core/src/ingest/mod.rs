pub mod inflation;
pub mod types;

use crate::domain::inflation::InflationDataPoint;

/// Source of the official monthly inflation series.
#[async_trait::async_trait]
pub trait InflationFetcher: Send + Sync {
    fn source_name(&self) -> &'static str;

    /// Observed months only, oldest first. Estimates are added by the caller.
    async fn fetch_monthly_series(&self) -> anyhow::Result<Vec<InflationDataPoint>>;
}
