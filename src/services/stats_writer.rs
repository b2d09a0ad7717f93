//! Live stats writer.
//!
//! Keeps one "today" snapshot per item in `live_stats`. The catalog is split
//! into disjoint batches and each invocation refreshes exactly one of them,
//! which spreads the per-item listing calls across the hour.
//!
//! The trading day is the UTC calendar date. A write whose date differs from
//! the stored `updated_at` date is the first of a new day and resets the
//! opening price and the daily range to the fetched price.

use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use sea_orm::{
    sea_query::{Expr, OnConflict, SimpleExpr},
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tracing::{debug, info, warn};

use crate::catalog::Item;
use crate::entities::{item_price_history, live_stats, prelude::*};
use crate::error::{ConfigError, JobError};
use crate::services::bconomy::{ListingSummary, MarketApi};

/// Split `items` into `batch_count` contiguous, disjoint batches.
///
/// Batches hold `ceil(len / batch_count)` items; trailing batches may be
/// short or empty when the catalog is small.
pub fn partition(items: &[Item], batch_count: usize) -> Vec<&[Item]> {
    let batch_count = batch_count.max(1);
    let size = items.len().div_ceil(batch_count).max(1);
    let mut batches: Vec<&[Item]> = items.chunks(size).collect();
    batches.resize(batch_count.max(batches.len()), &[]);
    batches
}

/// The batch a given invocation is responsible for.
pub fn batch(items: &[Item], batch_count: usize, index: usize) -> Result<&[Item], ConfigError> {
    if index >= batch_count {
        return Err(ConfigError::BatchOutOfRange {
            index,
            count: batch_count,
        });
    }
    Ok(partition(items, batch_count)[index])
}

/// Current-day snapshot for one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyStats {
    pub last_known_price: i64,
    pub opening_price: i64,
    pub highest_price_today: i64,
    pub lowest_price_today: i64,
    pub supply: i64,
    pub updated_at: DateTime<Utc>,
}

impl DailyStats {
    /// True when `now` falls on a different UTC date than the previous write.
    pub fn is_first_of_day(prev: Option<&DailyStats>, now: DateTime<Utc>) -> bool {
        match prev {
            None => true,
            Some(prev) => prev.updated_at.date_naive() != now.date_naive(),
        }
    }

    /// Snapshot after observing `price` and `supply` at `now`.
    pub fn next(prev: Option<&DailyStats>, price: i64, supply: i64, now: DateTime<Utc>) -> Self {
        match prev {
            Some(prev) if !Self::is_first_of_day(Some(prev), now) => Self {
                last_known_price: price,
                opening_price: prev.opening_price,
                highest_price_today: prev.highest_price_today.max(price),
                lowest_price_today: prev.lowest_price_today.min(price),
                supply,
                updated_at: now,
            },
            _ => Self {
                last_known_price: price,
                opening_price: price,
                highest_price_today: price,
                lowest_price_today: price,
                supply,
                updated_at: now,
            },
        }
    }
}

impl From<&live_stats::Model> for DailyStats {
    fn from(row: &live_stats::Model) -> Self {
        Self {
            last_known_price: row.last_known_price,
            opening_price: row.opening_price,
            highest_price_today: row.highest_price_today,
            lowest_price_today: row.lowest_price_today,
            supply: row.supply,
            updated_at: row.updated_at.with_timezone(&Utc),
        }
    }
}

/// Statistics from one stats writer run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReport {
    pub batch: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub struct StatsWriter<'a, A: MarketApi + ?Sized> {
    db: &'a DatabaseConnection,
    api: &'a A,
    concurrency: usize,
}

impl<'a, A: MarketApi + ?Sized> StatsWriter<'a, A> {
    pub fn new(db: &'a DatabaseConnection, api: &'a A, concurrency: usize) -> Self {
        Self {
            db,
            api,
            concurrency: concurrency.max(1),
        }
    }

    /// Refresh every item of batch `index` out of `batch_count`.
    ///
    /// Per-item failures are logged and counted; the rest of the batch still runs.
    pub async fn run(
        &self,
        items: &[Item],
        batch_count: usize,
        index: usize,
        now: DateTime<Utc>,
    ) -> Result<StatsReport, JobError> {
        let batch = batch(items, batch_count, index)?;
        info!(batch = index, batch_count = batch_count, items = batch.len(), "Refreshing live stats");

        let writer = self;
        let ids: Vec<i32> = batch.iter().map(|item| item.id).collect();

        let outcomes: Vec<(i32, Result<Option<DailyStats>, JobError>)> = stream::iter(ids)
            .map(move |item_id| async move { (item_id, writer.refresh_item(item_id, now).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut report = StatsReport {
            batch: index,
            updated: 0,
            skipped: 0,
        };

        for (item_id, outcome) in outcomes {
            match outcome {
                Ok(Some(_)) => report.updated += 1,
                Ok(None) => {
                    warn!(item_id = item_id, "No listings and no recorded price, skipping");
                    report.skipped += 1;
                }
                Err(e) => {
                    warn!(item_id = item_id, error = %e, "Failed to refresh live stats, skipping");
                    report.skipped += 1;
                }
            }
        }

        info!(
            batch = index,
            updated = report.updated,
            skipped = report.skipped,
            "Live stats batch completed"
        );

        Ok(report)
    }

    /// Fetch, merge and upsert one item's snapshot. `Ok(None)` means no price is known.
    pub async fn refresh_item(
        &self,
        item_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DailyStats>, JobError> {
        let listings = self.api.market_listings(item_id).await?;
        let summary = ListingSummary::from_listings(&listings)?;

        let price = match summary.lowest_price {
            Some(price) => price,
            None => match self.latest_recorded_price(item_id).await? {
                Some(price) => price,
                None => return Ok(None),
            },
        };

        let existing = LiveStats::find()
            .filter(live_stats::Column::ItemId.eq(item_id))
            .one(self.db)
            .await?;
        let prev = existing.as_ref().map(DailyStats::from);

        if DailyStats::is_first_of_day(prev.as_ref(), now) {
            debug!(item_id = item_id, price = price, "First write of the UTC day, resetting range");
        }
        let next = DailyStats::next(prev.as_ref(), price, summary.supply, now);

        LiveStats::insert(live_stats::ActiveModel {
            item_id: Set(item_id),
            last_known_price: Set(next.last_known_price),
            opening_price: Set(next.opening_price),
            highest_price_today: Set(next.highest_price_today),
            lowest_price_today: Set(next.lowest_price_today),
            supply: Set(next.supply),
            updated_at: Set(next.updated_at.fixed_offset()),
            ..Default::default()
        })
        .on_conflict(stats_conflict())
        .exec_without_returning(self.db)
        .await?;

        debug!(item_id = item_id, stats = ?next, "Live stats refreshed");
        Ok(Some(next))
    }

    async fn latest_recorded_price(&self, item_id: i32) -> Result<Option<i64>, JobError> {
        let latest = ItemPriceHistory::find()
            .filter(item_price_history::Column::ItemId.eq(item_id))
            .order_by_desc(item_price_history::Column::Timestamp)
            .one(self.db)
            .await?;
        Ok(latest.map(|tick| tick.price))
    }
}

/// Same-day writes keep the opening price and widen the range; a write on a
/// new UTC date takes the incoming (reset) values.
fn stats_conflict() -> OnConflict {
    OnConflict::column(live_stats::Column::ItemId)
        .value(
            live_stats::Column::OpeningPrice,
            same_day_or_reset("opening_price", "live_stats.opening_price"),
        )
        .value(
            live_stats::Column::HighestPriceToday,
            same_day_or_reset(
                "highest_price_today",
                "GREATEST(live_stats.highest_price_today, EXCLUDED.highest_price_today)",
            ),
        )
        .value(
            live_stats::Column::LowestPriceToday,
            same_day_or_reset(
                "lowest_price_today",
                "LEAST(live_stats.lowest_price_today, EXCLUDED.lowest_price_today)",
            ),
        )
        .update_columns([
            live_stats::Column::LastKnownPrice,
            live_stats::Column::Supply,
            live_stats::Column::UpdatedAt,
        ])
        // A run that started before a newer write must not roll the row back
        .action_and_where(Expr::cust("EXCLUDED.updated_at >= live_stats.updated_at"))
        .to_owned()
}

fn same_day_or_reset(column: &str, same_day: &str) -> SimpleExpr {
    Expr::cust(format!(
        "CASE WHEN (live_stats.updated_at AT TIME ZONE 'UTC')::date = \
         (EXCLUDED.updated_at AT TIME ZONE 'UTC')::date \
         THEN {} ELSE EXCLUDED.{} END",
        same_day, column
    ))
}
