//! One live stats refresh for a single catalog batch.

use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use market_tracker::config::Config;
use market_tracker::jobs::{live_stats_sync, with_timeout, JobContext, STATS_SCHEDULE};
use market_tracker::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "stats_writer", about = "Refresh today's stats for one batch of items")]
struct Args {
    /// Zero-based batch index, below STATS_BATCH_COUNT
    #[arg(long)]
    batch: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env()?;
    config.bconomy.require_api_key()?;

    config.check_batch(args.batch)?;

    let ctx = JobContext::connect(config).await?;
    let report = with_timeout(
        STATS_SCHEDULE.timeout,
        live_stats_sync::run_once(ctx, args.batch),
    )
    .await?;

    info!(
        batch = report.batch,
        updated = report.updated,
        skipped = report.skipped,
        "Stats writer finished"
    );
    Ok(())
}
