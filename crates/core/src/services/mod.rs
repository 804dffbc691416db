//! Request-level operations. Each service owns its caches and talks to storage through
//! [`ExpenseRepository`](crate::storage::ExpenseRepository); errors leave as
//! [`ServiceError`](crate::error::ServiceError).

pub mod building;
pub mod evolution;
pub mod inflation;
pub mod market;
pub mod shared;

pub use building::{BuildingMatch, BuildingService};
pub use evolution::{explain_deviations, EvolutionReport, EvolutionService};
pub use inflation::{InflationService, RefreshSummary};
pub use market::{MarketTrendResponse, MarketTrendService};
pub use shared::{SharedAnalysisResponse, SharedAnalysisService};
