//! Live Stats Sync Job
//!
//! Each catalog batch is refreshed twice an hour. Batches are staggered
//! evenly across the period so at most one batch is calling the API at a time.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;

use crate::error::JobError;
use crate::jobs::{spawn_scheduled, JobContext, Schedule, STATS_SCHEDULE};
use crate::services::stats_writer::{StatsReport, StatsWriter};

/// One stats writer invocation for batch `batch`.
pub async fn run_once(ctx: JobContext, batch: usize) -> Result<StatsReport, JobError> {
    let client = ctx.api_client()?;
    let config = &ctx.config;

    StatsWriter::new(&*ctx.db, &client, config.bconomy.concurrency)
        .run(ctx.catalog.items(), config.stats_batch_count, batch, Utc::now())
        .await
}

/// Schedule for `batch` out of `batch_count`.
pub fn batch_schedule(batch: usize, batch_count: usize) -> Schedule {
    let stagger = STATS_SCHEDULE.period.as_secs() / batch_count.max(1) as u64;
    Schedule {
        offset: STATS_SCHEDULE.offset + Duration::from_secs(stagger * batch as u64),
        ..STATS_SCHEDULE
    }
}

/// Start one loop per batch.
pub fn start_live_stats_jobs(ctx: JobContext) -> Vec<JoinHandle<()>> {
    let batch_count = ctx.config.stats_batch_count;

    (0..batch_count)
        .map(|batch| {
            spawn_scheduled(
                "live_stats",
                batch_schedule(batch, batch_count),
                ctx.clone(),
                move |ctx| run_once(ctx, batch),
            )
        })
        .collect()
}
