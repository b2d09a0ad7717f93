//! Job invocations and the in-process scheduler.
//!
//! Each `run_once` is one complete, stateless invocation: it builds its own
//! rate limiter and API client, reads whatever state it needs back from the
//! database, and exits. The `start_*` functions repeat those invocations on
//! wall-clock aligned slots for deployments without an external scheduler.

pub mod candle_sync;
pub mod live_stats_sync;
pub mod market_tick;

use std::{fmt::Debug, future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sea_orm::{Database, DatabaseConnection};
use tokio::{
    task::JoinHandle,
    time::{interval_at, timeout, Instant, MissedTickBehavior},
};
use tracing::{error, info};

use crate::catalog::Catalog;
use crate::config::Config;
use crate::error::{ConfigError, JobError};
use crate::services::{bconomy::BconomyClient, rate_limiter::RateLimiter};

/// When and for how long a job may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub period: Duration,
    /// Delay after each period boundary (e.g. candles run at :01, :06, ...)
    pub offset: Duration,
    /// Runs exceeding this are abandoned; the next slot repeats the work
    pub timeout: Duration,
}

pub const TICKER_SCHEDULE: Schedule = Schedule {
    period: Duration::from_secs(5 * 60),
    offset: Duration::ZERO,
    timeout: Duration::from_secs(5),
};

pub const CANDLE_SCHEDULE: Schedule = Schedule {
    period: Duration::from_secs(5 * 60),
    offset: Duration::from_secs(60),
    timeout: Duration::from_secs(15),
};

/// Per batch; batches are staggered across the period
pub const STATS_SCHEDULE: Schedule = Schedule {
    period: Duration::from_secs(30 * 60),
    offset: Duration::ZERO,
    timeout: Duration::from_secs(30),
};

/// Everything an invocation needs; cheap to clone.
#[derive(Clone)]
pub struct JobContext {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<Config>,
    pub catalog: Arc<Catalog>,
}

impl JobContext {
    pub fn new(db: DatabaseConnection, config: Config, catalog: Catalog) -> Self {
        Self {
            db: Arc::new(db),
            config: Arc::new(config),
            catalog: Arc::new(catalog),
        }
    }

    /// Load the catalog and connect to the database.
    pub async fn connect(config: Config) -> Result<Self, JobError> {
        let catalog = Catalog::load(config.catalog_path.as_deref())?;

        info!("Connecting to database...");
        let db = Database::connect(&config.database_url).await?;

        Ok(Self::new(db, config, catalog))
    }

    /// Fresh client with a limiter scoped to a single invocation.
    pub fn api_client(&self) -> Result<BconomyClient, ConfigError> {
        let limiter = Arc::new(RateLimiter::new(self.config.bconomy.rate_limit_per_sec));
        BconomyClient::new(&self.config.bconomy, limiter)
    }
}

/// Run `job`, giving up after `limit`.
pub async fn with_timeout<T, Fut>(limit: Duration, job: Fut) -> Result<T, JobError>
where
    Fut: Future<Output = Result<T, JobError>>,
{
    timeout(limit, job)
        .await
        .map_err(|_| JobError::Timeout(limit))?
}

/// Time from `now` until the next `k * period + offset` instant (UTC epoch aligned).
///
/// Returns zero when `now` is exactly on a slot.
pub fn delay_until_slot(now: DateTime<Utc>, period: Duration, offset: Duration) -> Duration {
    let period_ms = period.as_millis().max(1) as i64;
    let offset_ms = offset.as_millis() as i64 % period_ms;
    let rem = (now.timestamp_millis() - offset_ms).rem_euclid(period_ms);

    if rem == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis((period_ms - rem) as u64)
    }
}

/// Spawn a loop running `job` on every slot of `schedule` until Ctrl-C.
///
/// Failures and timeouts are logged; the next slot simply runs again.
pub fn spawn_scheduled<F, Fut, R>(
    name: &'static str,
    schedule: Schedule,
    ctx: JobContext,
    job: F,
) -> JoinHandle<()>
where
    F: Fn(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<R, JobError>> + Send + 'static,
    R: Debug + Send + 'static,
{
    tokio::spawn(async move {
        let first_run = delay_until_slot(Utc::now(), schedule.period, schedule.offset);
        info!(
            job = name,
            period_secs = schedule.period.as_secs(),
            first_run_in_secs = first_run.as_secs(),
            "Scheduled job"
        );

        let mut slots = interval_at(Instant::now() + first_run, schedule.period);
        slots.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!(job = name, "Shutdown signal received, stopping job gracefully");
                    break;
                }
                _ = slots.tick() => {
                    match with_timeout(schedule.timeout, job(ctx.clone())).await {
                        Ok(report) => info!(job = name, report = ?report, "Job run completed"),
                        Err(e) => {
                            error!(job = name, error = %e, "Job run failed");
                            // Continue - next slot will retry
                        }
                    }
                }
            }
        }

        info!(job = name, "Job stopped");
    })
}
