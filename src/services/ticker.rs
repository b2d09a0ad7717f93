//! Ticker Service
//!
//! Polls current marketplace prices for every catalog item and appends raw
//! ticks to `item_price_history`. Inserts are `ON CONFLICT DO NOTHING` on
//! `(item_id, timestamp)`, so a retried run never duplicates a tick.
//!
//! Per-item mode writes ticks as soon as their listings arrive, so a run cut
//! short by its timeout keeps everything fetched up to that point.

use std::pin::pin;

use chrono::{DateTime, SubsecRound, Utc};
use futures_util::{stream, StreamExt};
use sea_orm::{sea_query::OnConflict, DatabaseConnection, DbErr, EntityTrait, Set};
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::config::TickerMode;
use crate::entities::{item_price_history, prelude::ItemPriceHistory};
use crate::error::{FetchError, JobError};
use crate::services::bconomy::{ListingSummary, MarketApi, MarketListing};

/// One raw price observation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub item_id: i32,
    pub price: i64,
    pub timestamp: DateTime<Utc>,
}

/// Statistics from one ticker run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerReport {
    /// Items a price was obtained for
    pub fetched: usize,
    /// Rows actually written (conflicts excluded)
    pub inserted: u64,
    pub skipped: usize,
}

pub struct Ticker<'a, A: MarketApi + ?Sized> {
    db: &'a DatabaseConnection,
    api: &'a A,
    mode: TickerMode,
    concurrency: usize,
}

impl<'a, A: MarketApi + ?Sized> Ticker<'a, A> {
    pub fn new(db: &'a DatabaseConnection, api: &'a A, mode: TickerMode, concurrency: usize) -> Self {
        Self {
            db,
            api,
            mode,
            concurrency: concurrency.max(1),
        }
    }

    /// Record one tick per catalog item.
    ///
    /// In bulk mode a failed preview call fails the run; per-item problems
    /// only skip that item.
    pub async fn run(&self, catalog: &Catalog, now: DateTime<Utc>) -> Result<TickerReport, JobError> {
        info!(mode = ?self.mode, items = catalog.len(), "Starting market tick");

        let report = match self.mode {
            TickerMode::Bulk => {
                let (ticks, skipped) = self.collect_bulk(catalog, now).await?;
                TickerReport {
                    fetched: ticks.len(),
                    inserted: insert_ticks(self.db, &ticks).await?,
                    skipped,
                }
            }
            TickerMode::PerItem => self.tick_per_item(catalog, now).await?,
        };
        info!(
            fetched = report.fetched,
            inserted = report.inserted,
            skipped = report.skipped,
            "Market tick complete"
        );

        Ok(report)
    }

    async fn collect_bulk(
        &self,
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> Result<(Vec<Tick>, usize), JobError> {
        let preview = self.api.market_preview().await?;
        let timestamp = preview.last_updated.unwrap_or_else(|| now.trunc_subsecs(0));
        debug!(entries = preview.len(), timestamp = %timestamp, "Fetched market preview");

        let mut ticks = Vec::with_capacity(catalog.len());
        let mut skipped = 0;

        for item in catalog.items() {
            match preview.price(item.id) {
                Ok(Some(price)) => ticks.push(Tick {
                    item_id: item.id,
                    price,
                    timestamp,
                }),
                Ok(None) => {
                    debug!(item_id = item.id, "Item not in market preview, skipping");
                    skipped += 1;
                }
                Err(e) => {
                    warn!(item_id = item.id, error = %e, "Skipping item");
                    skipped += 1;
                }
            }
        }

        Ok((ticks, skipped))
    }

    /// Fetch listings item by item and insert whatever has arrived after every poll.
    async fn tick_per_item(
        &self,
        catalog: &Catalog,
        now: DateTime<Utc>,
    ) -> Result<TickerReport, JobError> {
        let timestamp = now.trunc_subsecs(0);
        let api = self.api;
        let ids: Vec<i32> = catalog.items().iter().map(|item| item.id).collect();

        let mut arrivals = pin!(stream::iter(ids)
            .map(move |item_id| async move { (item_id, api.market_listings(item_id).await) })
            .buffer_unordered(self.concurrency)
            .ready_chunks(self.concurrency));

        let mut report = TickerReport::default();
        while let Some(results) = arrivals.next().await {
            let (ticks, skipped) = ticks_from_listings(results, timestamp);
            report.fetched += ticks.len();
            report.skipped += skipped;
            report.inserted += insert_ticks(self.db, &ticks).await?;
        }

        Ok(report)
    }
}

/// Lowest ask per item; items without listings or with a failed fetch are skipped.
fn ticks_from_listings(
    results: Vec<(i32, Result<Vec<MarketListing>, FetchError>)>,
    timestamp: DateTime<Utc>,
) -> (Vec<Tick>, usize) {
    let mut ticks = Vec::with_capacity(results.len());
    let mut skipped = 0;

    for (item_id, result) in results {
        let lowest = result
            .and_then(|listings| ListingSummary::from_listings(&listings))
            .map(|summary| summary.lowest_price);

        match lowest {
            Ok(Some(price)) => ticks.push(Tick {
                item_id,
                price,
                timestamp,
            }),
            Ok(None) => {
                debug!(item_id = item_id, "No open listings, skipping");
                skipped += 1;
            }
            Err(e) => {
                warn!(item_id = item_id, error = %e, "Failed to fetch listings, skipping");
                skipped += 1;
            }
        }
    }

    ticks.sort_by_key(|tick| tick.item_id);
    (ticks, skipped)
}

/// Append ticks in one statement; rows that already exist are ignored.
pub async fn insert_ticks(db: &DatabaseConnection, ticks: &[Tick]) -> Result<u64, DbErr> {
    if ticks.is_empty() {
        return Ok(0);
    }

    let models = ticks.iter().map(|tick| item_price_history::ActiveModel {
        item_id: Set(tick.item_id),
        price: Set(tick.price),
        timestamp: Set(tick.timestamp.fixed_offset()),
        ..Default::default()
    });

    ItemPriceHistory::insert_many(models)
        .on_conflict(
            OnConflict::columns([
                item_price_history::Column::ItemId,
                item_price_history::Column::Timestamp,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{with_timeout, TICKER_SCHEDULE};
    use crate::services::bconomy::MarketPreview;
    use crate::services::rate_limiter::RateLimiter;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
    use serde_json::json;
    use std::collections::HashMap;

    struct FakeApi {
        preview: Option<MarketPreview>,
        listings: HashMap<i32, Vec<MarketListing>>,
    }

    #[async_trait]
    impl MarketApi for FakeApi {
        async fn market_preview(&self) -> Result<MarketPreview, FetchError> {
            self.preview
                .clone()
                .ok_or_else(|| FetchError::Parse("preview unavailable".to_string()))
        }

        async fn market_listings(&self, item_id: i32) -> Result<Vec<MarketListing>, FetchError> {
            self.listings
                .get(&item_id)
                .cloned()
                .ok_or_else(|| FetchError::Parse(format!("no listings fixture for {}", item_id)))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, 10, 5, 0).unwrap() + chrono::Duration::milliseconds(250)
    }

    fn exec(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_bulk_tick_uses_preview_timestamp_and_skips_bad_items() {
        let last_updated = Utc.with_ymd_and_hms(2025, 6, 14, 10, 4, 58).unwrap();
        let api = FakeApi {
            preview: Some(MarketPreview::new(
                Some(last_updated),
                HashMap::from([
                    ("item0".to_string(), json!(100)),
                    ("item1".to_string(), json!("oops")),
                    ("item2".to_string(), json!(250)),
                ]),
            )),
            listings: HashMap::new(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(2)])
            .into_connection();

        let report = Ticker::new(&db, &api, TickerMode::Bulk, 1)
            .run(&Catalog::numbered(4), now())
            .await
            .unwrap();

        assert_eq!(report, TickerReport { fetched: 2, inserted: 2, skipped: 2 });

        let log = db.into_transaction_log();
        let insert = &log[0].statements()[0];
        assert!(insert.sql.contains(r#"ON CONFLICT ("item_id", "timestamp") DO NOTHING"#));
        let values = format!("{:?}", insert.values);
        assert!(values.contains("2025-06-14T10:04:58"));
    }

    #[tokio::test]
    async fn test_bulk_tick_without_source_timestamp_uses_whole_second_now() {
        let api = FakeApi {
            preview: Some(MarketPreview::new(
                None,
                HashMap::from([("item0".to_string(), json!(5))]),
            )),
            listings: HashMap::new(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1)])
            .into_connection();

        let ticker = Ticker::new(&db, &api, TickerMode::Bulk, 1);
        let (ticks, _) = ticker.collect_bulk(&Catalog::numbered(1), now()).await.unwrap();

        assert_eq!(ticks[0].timestamp, Utc.with_ymd_and_hms(2025, 6, 14, 10, 5, 0).unwrap());
    }

    #[tokio::test]
    async fn test_bulk_preview_failure_fails_the_run() {
        let api = FakeApi {
            preview: None,
            listings: HashMap::new(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let result = Ticker::new(&db, &api, TickerMode::Bulk, 1)
            .run(&Catalog::numbered(3), now())
            .await;

        assert!(matches!(result, Err(JobError::Fetch(_))));
        assert!(db.into_transaction_log().is_empty());
    }

    /// Every bound value of every insert, for asserting on written rows.
    fn written_values(log: &[sea_orm::Transaction]) -> Vec<String> {
        log.iter()
            .flat_map(|txn| txn.statements())
            .flat_map(|stmt| stmt.values.iter().flat_map(|values| values.0.iter()))
            .map(|value| format!("{:?}", value))
            .collect()
    }

    #[tokio::test]
    async fn test_per_item_tick_continues_past_failures() {
        let api = FakeApi {
            preview: None,
            listings: HashMap::from([
                (0, vec![MarketListing { id: 0, price: 30, amount: 1 }, MarketListing { id: 0, price: 25, amount: 4 }]),
                (2, vec![]),
                (3, vec![MarketListing { id: 3, price: 8, amount: 9 }]),
            ]),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1), exec(1), exec(1), exec(1)])
            .into_connection();

        let report = Ticker::new(&db, &api, TickerMode::PerItem, 4)
            .run(&Catalog::numbered(4), now())
            .await
            .unwrap();

        assert_eq!(report.fetched, 2);
        // item 1 failed to fetch, item 2 has no listings
        assert_eq!(report.skipped, 2);

        let values = written_values(&db.into_transaction_log());
        assert!(values.contains(&"BigInt(Some(25))".to_string()));
        assert!(values.contains(&"BigInt(Some(8))".to_string()));
        assert!(!values.contains(&"BigInt(Some(30))".to_string()));
    }

    /// Lists every item at one price, paced like the real client
    struct PacedApi {
        limiter: RateLimiter,
    }

    #[async_trait]
    impl MarketApi for PacedApi {
        async fn market_preview(&self) -> Result<MarketPreview, FetchError> {
            Err(FetchError::Parse("not used".to_string()))
        }

        async fn market_listings(&self, item_id: i32) -> Result<Vec<MarketListing>, FetchError> {
            self.limiter.acquire().await;
            Ok(vec![MarketListing { id: i64::from(item_id), price: 100, amount: 1 }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_item_timeout_keeps_ticks_already_fetched() {
        // 165 items at 10 req/s need ~16.5s, well past the ticker timeout
        let api = PacedApi {
            limiter: RateLimiter::new(10),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results((0..165).map(|_| exec(1)))
            .into_connection();
        let catalog = Catalog::numbered(165);
        let ticker = Ticker::new(&db, &api, TickerMode::PerItem, 10);

        let result = with_timeout(TICKER_SCHEDULE.timeout, ticker.run(&catalog, now())).await;
        assert!(matches!(result, Err(JobError::Timeout(_))));

        // Each row binds item_id, price and timestamp
        let rows_written = written_values(&db.into_transaction_log()).len() / 3;
        assert!(rows_written >= 40, "only {} ticks written before timeout", rows_written);
        assert!(rows_written < 165);
    }

    #[tokio::test]
    async fn test_rerun_with_same_snapshot_inserts_nothing_new() {
        let snapshot = MarketPreview::new(
            Some(Utc.with_ymd_and_hms(2025, 6, 14, 10, 0, 0).unwrap()),
            HashMap::from([("item0".to_string(), json!(100))]),
        );
        let api = FakeApi {
            preview: Some(snapshot),
            listings: HashMap::new(),
        };
        // The database reports the second insert as a conflict (0 rows)
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([exec(1), exec(0)])
            .into_connection();

        let ticker = Ticker::new(&db, &api, TickerMode::Bulk, 1);
        let catalog = Catalog::numbered(1);
        let first = ticker.run(&catalog, now()).await.unwrap();
        let second = ticker.run(&catalog, now()).await.unwrap();

        assert_eq!(first.inserted, 1);
        assert_eq!(second.inserted, 0);

        let log = db.into_transaction_log();
        assert_eq!(log[0].statements()[0].values, log[1].statements()[0].values);
    }

    #[tokio::test]
    async fn test_no_ticks_means_no_statement() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        assert_eq!(insert_ticks(&db, &[]).await.unwrap(), 0);
        assert!(db.into_transaction_log().is_empty());
    }
}
