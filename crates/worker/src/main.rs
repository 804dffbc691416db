use anyhow::Context;
use clap::{Parser, Subcommand};
use expensa_core::cache::{CacheStore, MemoryCacheStore};
use expensa_core::ingest::inflation::HttpInflationProvider;
use expensa_core::services::{InflationService, MarketTrendService, SharedAnalysisService};
use expensa_core::storage::{ExpenseRepository, PgCacheStore, PgExpenseRepository};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod jobs;

#[derive(Debug, Parser)]
#[command(name = "expensa_worker")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Clock override (RFC 3339). Defaults to now.
    #[arg(long, global = true)]
    at: Option<String>,

    /// Do everything except writing to the database. Cache writes go to a throwaway
    /// in-memory store.
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the official inflation series and store it with estimates for missing months.
    RefreshInflation,
    /// Delete expired entries from every cache table.
    CleanupCache,
    /// Precompute the global and per-neighborhood market trends into the cache.
    WarmMarket,
}

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

    let args = Args::parse();
    let now = resolve_now(args.at.as_deref())?;

    let res = run(&settings, &args, now).await;
    if let Err(err) = &res {
        sentry_anyhow::capture_anyhow(err);
        tracing::error!(command = ?args.command, error = %err, "worker job failed");
    }
    res
}

async fn run(
    settings: &expensa_core::config::Settings,
    args: &Args,
    now: chrono::DateTime<chrono::Utc>,
) -> anyhow::Result<()> {
    let db_url = settings.require_database_url()?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(db_url)
        .await
        .context("connect DATABASE_URL failed")?;

    if !args.dry_run {
        expensa_core::storage::migrate(&pool).await?;
    }

    let repo: Arc<dyn ExpenseRepository> = Arc::new(PgExpenseRepository::new(pool.clone()));
    let store: Arc<dyn CacheStore> = if args.dry_run {
        Arc::new(MemoryCacheStore::new())
    } else {
        Arc::new(PgCacheStore::new(pool))
    };

    let inflation = InflationService::new(repo.clone(), store.clone());
    let market = MarketTrendService::new(repo.clone(), store.clone());

    match args.command {
        Command::RefreshInflation => {
            let fetcher = HttpInflationProvider::from_settings(settings)?;
            let summary = inflation.refresh(&fetcher, now, args.dry_run).await?;
            tracing::info!(
                %now,
                source = summary.source,
                observed = summary.observed,
                estimated = summary.estimated,
                written = summary.written,
                dry_run = summary.dry_run,
                "refresh-inflation done"
            );
        }
        Command::CleanupCache => {
            let shared = SharedAnalysisService::new(repo, store);
            let summary = jobs::cleanup_cache(&inflation, &market, &shared, now).await?;
            tracing::info!(
                %now,
                inflation = summary.inflation,
                market_trends = summary.market_trends,
                shared_analysis = summary.shared_analysis,
                dry_run = args.dry_run,
                "cleanup-cache done"
            );
        }
        Command::WarmMarket => {
            let warmed = jobs::warm_market(repo.as_ref(), &market, now).await?;
            tracing::info!(%now, warmed, dry_run = args.dry_run, "warm-market done");
        }
    }

    Ok(())
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

fn resolve_now(at_arg: Option<&str>) -> anyhow::Result<chrono::DateTime<chrono::Utc>> {
    match at_arg {
        Some(s) => Ok(chrono::DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --at value: {s}"))?
            .with_timezone(&chrono::Utc)),
        None => Ok(chrono::Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_subcommands_with_global_flags() {
        let args = Args::try_parse_from(["expensa_worker", "warm-market", "--dry-run"]).unwrap();
        assert!(matches!(args.command, Command::WarmMarket));
        assert!(args.dry_run);

        let args = Args::try_parse_from([
            "expensa_worker",
            "--at",
            "2026-03-01T00:00:00Z",
            "refresh-inflation",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::RefreshInflation));
        assert!(!args.dry_run);
        assert_eq!(
            resolve_now(args.at.as_deref()).unwrap(),
            chrono::Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_bad_clock_override() {
        assert!(resolve_now(Some("yesterday")).is_err());
    }
}
