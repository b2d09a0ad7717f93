//! One ticker run: append a raw price tick for every catalog item.
//!
//! Intended to be invoked every five minutes by an external scheduler.

use dotenvy::dotenv;
use tracing::info;

use market_tracker::config::Config;
use market_tracker::jobs::{market_tick, with_timeout, JobContext, TICKER_SCHEDULE};
use market_tracker::telemetry::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    config.bconomy.require_api_key()?;

    let ctx = JobContext::connect(config).await?;
    let report = with_timeout(TICKER_SCHEDULE.timeout, market_tick::run_once(ctx)).await?;

    info!(
        fetched = report.fetched,
        inserted = report.inserted,
        skipped = report.skipped,
        "Ticker finished"
    );
    Ok(())
}
