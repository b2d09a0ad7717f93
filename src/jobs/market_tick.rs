//! Market Tick Job
//!
//! Appends one raw price tick per catalog item every five minutes.

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::jobs::{spawn_scheduled, JobContext, TICKER_SCHEDULE};
use crate::services::ticker::{Ticker, TickerReport};

/// One ticker invocation.
pub async fn run_once(ctx: JobContext) -> Result<TickerReport, JobError> {
    let client = ctx.api_client()?;
    let config = &ctx.config;

    Ticker::new(&*ctx.db, &client, config.ticker_mode, config.bconomy.concurrency)
        .run(&ctx.catalog, Utc::now())
        .await
}

/// Start the ticker on its five-minute schedule.
pub fn start_market_tick_job(ctx: JobContext) -> JoinHandle<()> {
    spawn_scheduled("market_tick", TICKER_SCHEDULE, ctx, run_once)
}
