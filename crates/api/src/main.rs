mod auth;
mod error;
mod routes;

use axum::{
    routing::{get, patch, post, put},
    Router,
};
use expensa_core::cache::CacheStore;
use expensa_core::llm::anthropic::AnthropicClient;
use expensa_core::llm::NarrativeGenerator;
use expensa_core::services::{
    BuildingService, EvolutionService, InflationService, MarketTrendService,
    SharedAnalysisService,
};
use expensa_core::storage::{ExpenseRepository, PgCacheStore, PgExpenseRepository};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::SupabaseAuth;
use crate::routes::{AppState, DataServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = expensa_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(5);

    let pool: Option<PgPool> = match settings.require_database_url() {
        Ok(db_url) => match sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await
        {
            Ok(pool) => match expensa_core::storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                let err = anyhow::Error::new(e);
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %err, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let narrative: Option<Arc<dyn NarrativeGenerator>> =
        match AnthropicClient::from_settings(&settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "narrative generation disabled");
                None
            }
        };

    let auth = match SupabaseAuth::from_settings(&settings) {
        Ok(auth) => Some(auth),
        Err(e) => {
            tracing::warn!(error = %e, "auth not configured; authenticated routes will return 503");
            None
        }
    };

    let state = AppState {
        data: pool.map(|pool| data_services(pool, narrative.clone())),
        auth,
        narrative,
    };

    let app = Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/market-trend", get(routes::market_trend))
        .route("/inflation", get(routes::inflation))
        .route("/evolution", get(routes::evolution))
        .route("/deviations", post(routes::deviations))
        .route("/buildings/match", post(routes::match_building))
        .route("/buildings/profile", put(routes::upsert_profile))
        .route("/shared/:token", get(routes::shared_analysis))
        .route("/shared/:token/comments", post(routes::visitor_comment))
        .route("/analyses/:id/comments", post(routes::owner_comment))
        .route("/analyses/:id/notes", patch(routes::update_notes))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn data_services(pool: PgPool, narrative: Option<Arc<dyn NarrativeGenerator>>) -> DataServices {
    let repo: Arc<dyn ExpenseRepository> = Arc::new(PgExpenseRepository::new(pool.clone()));
    let store: Arc<dyn CacheStore> = Arc::new(PgCacheStore::new(pool));

    let inflation = InflationService::new(repo.clone(), store.clone());
    let market = MarketTrendService::new(repo.clone(), store.clone());
    DataServices {
        evolution: EvolutionService::new(repo.clone(), inflation.clone(), market.clone(), narrative),
        buildings: BuildingService::new(repo.clone()),
        shared: SharedAnalysisService::new(repo, store),
        inflation,
        market,
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &expensa_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
