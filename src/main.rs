use anyhow::Context;
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use sea_orm_migration::MigratorTrait;
use tracing::info;

use market_tracker::config::Config;
use market_tracker::handlers;
use market_tracker::jobs::{
    candle_sync, live_stats_sync, market_tick, with_timeout, JobContext, CANDLE_SCHEDULE,
    STATS_SCHEDULE, TICKER_SCHEDULE,
};
use market_tracker::services::candle_builder::{CandleInterval, CandleSource};
use market_tracker::telemetry::init_tracing;
use market_tracker::AppState;

#[derive(Parser)]
#[command(name = "market-tracker")]
#[command(about = "Bconomy marketplace price tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Record one price tick per catalog item
    Tick,
    /// Rebuild candles for the current bucket
    Candles {
        /// Candle width: 1h or 1d
        #[arg(long, default_value = "1h")]
        interval: CandleInterval,
        /// Roll up stored hourly candles instead of raw ticks
        #[arg(long)]
        from_hourly: bool,
    },
    /// Refresh live stats for one catalog batch
    Stats {
        /// Zero-based batch index
        #[arg(long)]
        batch: usize,
    },
    /// Serve the read API
    Serve,
    /// Run every job on its schedule until Ctrl-C
    Schedule,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Migrate => {
            let ctx = JobContext::connect(config).await?;
            run_migrations(&ctx).await?;
        }
        Commands::Tick => {
            config.bconomy.require_api_key()?;
            let ctx = JobContext::connect(config).await?;
            let report = with_timeout(TICKER_SCHEDULE.timeout, market_tick::run_once(ctx)).await?;
            info!(report = ?report, "Tick finished");
        }
        Commands::Candles {
            interval,
            from_hourly,
        } => {
            let source = if from_hourly {
                CandleSource::HourlyCandles
            } else {
                CandleSource::RawTicks
            };
            source.check(interval)?;

            let ctx = JobContext::connect(config).await?;
            let report = with_timeout(
                CANDLE_SCHEDULE.timeout,
                candle_sync::run_once(ctx, interval, source),
            )
            .await?;
            info!(report = ?report, "Candle build finished");
        }
        Commands::Stats { batch } => {
            config.bconomy.require_api_key()?;
            config.check_batch(batch)?;
            let ctx = JobContext::connect(config).await?;
            let report = with_timeout(
                STATS_SCHEDULE.timeout,
                live_stats_sync::run_once(ctx, batch),
            )
            .await?;
            info!(report = ?report, "Stats refresh finished");
        }
        Commands::Serve => {
            let bind_addr = config.bind_addr.clone();
            let ctx = JobContext::connect(config).await?;
            run_migrations(&ctx).await?;

            let state = AppState {
                db: ctx.db.clone(),
                catalog: ctx.catalog.clone(),
            };
            let app = handlers::router(state);

            let listener = tokio::net::TcpListener::bind(&bind_addr)
                .await
                .with_context(|| format!("failed to bind {}", bind_addr))?;
            info!("Server listening on {}", listener.local_addr()?);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    tokio::signal::ctrl_c().await.ok();
                    info!("Shutdown signal received, stopping server");
                })
                .await?;
        }
        Commands::Schedule => {
            config.bconomy.require_api_key()?;
            let ctx = JobContext::connect(config).await?;
            run_migrations(&ctx).await?;

            let mut handles = vec![market_tick::start_market_tick_job(ctx.clone())];
            handles.extend(candle_sync::start_candle_sync_jobs(ctx.clone()));
            handles.extend(live_stats_sync::start_live_stats_jobs(ctx));
            info!(jobs = handles.len(), "Scheduler started");

            for result in join_all(handles).await {
                result.context("scheduled job panicked")?;
            }
            info!("Scheduler stopped");
        }
    }

    Ok(())
}

async fn run_migrations(ctx: &JobContext) -> anyhow::Result<()> {
    info!("Running migrations...");
    migration::Migrator::up(&*ctx.db, None)
        .await
        .context("failed to run migrations")?;
    Ok(())
}
