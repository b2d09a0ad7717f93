//! One candle builder run for the bucket containing "now".
//!
//! `--interval 1d --from-hourly` rolls the day's hourly candles up into a
//! daily candle; the default builds hourly candles from raw ticks.

use clap::Parser;
use dotenvy::dotenv;
use tracing::info;

use market_tracker::config::Config;
use market_tracker::jobs::{candle_sync, with_timeout, JobContext, CANDLE_SCHEDULE};
use market_tracker::services::candle_builder::{CandleInterval, CandleSource};
use market_tracker::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "candle_builder", about = "Aggregate price ticks into OHLC candles")]
struct Args {
    /// Candle width: 1h or 1d
    #[arg(long, default_value = "1h")]
    interval: CandleInterval,
    /// Roll up stored hourly candles instead of raw ticks
    #[arg(long)]
    from_hourly: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let source = if args.from_hourly {
        CandleSource::HourlyCandles
    } else {
        CandleSource::RawTicks
    };
    source.check(args.interval)?;

    let config = Config::from_env()?;
    let ctx = JobContext::connect(config).await?;
    let report = with_timeout(
        CANDLE_SCHEDULE.timeout,
        candle_sync::run_once(ctx, args.interval, source),
    )
    .await?;

    info!(
        interval = %report.interval,
        buckets = report.buckets.len(),
        candles = report.candles_upserted,
        "Candle builder finished"
    );
    Ok(())
}
