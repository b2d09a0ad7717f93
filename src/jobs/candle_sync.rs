//! Candle Sync Job
//!
//! Folds fresh ticks into candles one minute after each ticker slot, so the
//! bucket already holds the tick that was just written.

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::jobs::{spawn_scheduled, JobContext, CANDLE_SCHEDULE};
use crate::services::candle_builder::{CandleBuilder, CandleInterval, CandleReport, CandleSource};

/// One candle builder invocation.
pub async fn run_once(
    ctx: JobContext,
    interval: CandleInterval,
    source: CandleSource,
) -> Result<CandleReport, JobError> {
    CandleBuilder::new(&*ctx.db, interval, source)?
        .with_lookback(ctx.config.candle_lookback_buckets)
        .run(Utc::now())
        .await
}

/// Start hourly candles from raw ticks, plus daily candles rolled up from the hourly ones.
pub fn start_candle_sync_jobs(ctx: JobContext) -> Vec<JoinHandle<()>> {
    vec![
        spawn_scheduled("candles_1h", CANDLE_SCHEDULE, ctx.clone(), |ctx| {
            run_once(ctx, CandleInterval::OneHour, CandleSource::RawTicks)
        }),
        spawn_scheduled("candles_1d", CANDLE_SCHEDULE, ctx, |ctx| {
            run_once(ctx, CandleInterval::OneDay, CandleSource::HourlyCandles)
        }),
    ]
}
