//! Candle Builder Service
//!
//! Compresses raw price ticks into fixed-interval OHLC candles:
//! - Floor-aligns "now" to the interval boundary (UTC)
//! - Aggregates every item's ticks inside the bucket
//! - Upserts one candle per item, merging with what earlier runs stored
//!
//! The merge keeps `open`, widens `high`/`low` and advances `close`, so the
//! job can run many times while a bucket is still filling.

use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entities::{item_price_candle, item_price_history, prelude::*};
use crate::error::{ConfigError, JobError};

/// Upper bound on how many earlier buckets one run may rebuild (one week of hours)
pub const MAX_LOOKBACK_BUCKETS: u32 = 168;

/// Candle bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandleInterval {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "1d")]
    OneDay,
}

impl CandleInterval {
    /// Short code stored in `item_price_candle.interval`
    pub fn code(&self) -> &'static str {
        match self {
            CandleInterval::OneHour => "1h",
            CandleInterval::OneDay => "1d",
        }
    }

    pub fn width(&self) -> Duration {
        match self {
            CandleInterval::OneHour => Duration::hours(1),
            CandleInterval::OneDay => Duration::days(1),
        }
    }

    /// Start of the bucket containing `ts` (e.g. 10:47:12 -> 10:00:00 for `1h`)
    pub fn bucket_start(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let width = self.width().num_seconds();
        let secs = ts.timestamp();
        DateTime::from_timestamp(secs - secs.rem_euclid(width), 0).unwrap_or(ts)
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1h" => Ok(CandleInterval::OneHour),
            "1d" => Ok(CandleInterval::OneDay),
            other => Err(format!("unknown candle interval '{}' (expected 1h or 1d)", other)),
        }
    }
}

/// What a candle is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleSource {
    RawTicks,
    /// Roll up the stored `1h` candles of the bucket
    HourlyCandles,
}

impl CandleSource {
    /// Hourly candles can only feed wider intervals.
    pub fn check(self, interval: CandleInterval) -> Result<(), ConfigError> {
        if self == CandleSource::HourlyCandles && interval == CandleInterval::OneHour {
            return Err(ConfigError::Invalid {
                key: "interval",
                value: "1h candles cannot be built from 1h candles".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Ohlc {
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
}

impl Ohlc {
    /// Candle of a single observation
    pub fn flat(price: i64) -> Self {
        Self {
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    /// Fold in data that comes after `self` in time.
    pub fn merge(self, later: Ohlc) -> Ohlc {
        Ohlc {
            open: self.open,
            high: self.high.max(later.high),
            low: self.low.min(later.low),
            close: later.close,
        }
    }
}

impl From<&item_price_candle::Model> for Ohlc {
    fn from(candle: &item_price_candle::Model) -> Self {
        Self {
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
        }
    }
}

/// Aggregate `(item_id, ohlc)` pairs, ordered by time within each item, into one candle per item.
pub fn group_by_item<I>(points: I) -> BTreeMap<i32, Ohlc>
where
    I: IntoIterator<Item = (i32, Ohlc)>,
{
    let mut grouped: BTreeMap<i32, Ohlc> = BTreeMap::new();
    for (item_id, point) in points {
        grouped
            .entry(item_id)
            .and_modify(|candle| *candle = candle.merge(point))
            .or_insert(point);
    }
    grouped
}

/// Statistics from one candle builder run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandleReport {
    pub interval: CandleInterval,
    pub buckets: Vec<DateTime<Utc>>,
    pub candles_upserted: usize,
}

pub struct CandleBuilder<'a> {
    db: &'a DatabaseConnection,
    interval: CandleInterval,
    source: CandleSource,
    lookback_buckets: u32,
}

impl<'a> CandleBuilder<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        interval: CandleInterval,
        source: CandleSource,
    ) -> Result<Self, ConfigError> {
        source.check(interval)?;

        Ok(Self {
            db,
            interval,
            source,
            lookback_buckets: 0,
        })
    }

    /// Also rebuild this many buckets before the current one, capped at
    /// [`MAX_LOOKBACK_BUCKETS`].
    pub fn with_lookback(mut self, buckets: u32) -> Self {
        self.lookback_buckets = buckets.min(MAX_LOOKBACK_BUCKETS);
        self
    }

    /// Rebuild the bucket containing `now` plus the configured lookback, oldest first.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<CandleReport, JobError> {
        let current = self.interval.bucket_start(now);
        info!(
            interval = %self.interval,
            bucket = %current,
            lookback = self.lookback_buckets,
            "Starting candle build"
        );

        let mut report = CandleReport {
            interval: self.interval,
            buckets: Vec::new(),
            candles_upserted: 0,
        };

        for back in (0..=self.lookback_buckets).rev() {
            let start = current - self.interval.width() * back as i32;
            let upserted = self.build_bucket(start).await?;
            report.buckets.push(start);
            report.candles_upserted += upserted;
        }

        info!(
            interval = %self.interval,
            buckets = report.buckets.len(),
            candles = report.candles_upserted,
            "Candle build complete"
        );

        Ok(report)
    }

    /// Aggregate and upsert a single bucket; returns the number of candles written.
    pub async fn build_bucket(&self, start: DateTime<Utc>) -> Result<usize, DbErr> {
        let end = start + self.interval.width();

        let grouped = match self.source {
            CandleSource::RawTicks => self.load_ticks(start, end).await?,
            CandleSource::HourlyCandles => self.load_hourly_candles(start, end).await?,
        };

        if grouped.is_empty() {
            debug!(interval = %self.interval, bucket = %start, "No data in bucket, skipping");
            return Ok(0);
        }

        let models = grouped.iter().map(|(item_id, ohlc)| item_price_candle::ActiveModel {
            interval: Set(self.interval.code().to_string()),
            item_id: Set(*item_id),
            open: Set(ohlc.open),
            high: Set(ohlc.high),
            low: Set(ohlc.low),
            close: Set(ohlc.close),
            timestamp: Set(start.fixed_offset()),
            ..Default::default()
        });

        ItemPriceCandle::insert_many(models)
            .on_conflict(candle_conflict())
            .exec_without_returning(self.db)
            .await?;

        debug!(
            interval = %self.interval,
            bucket = %start,
            candles = grouped.len(),
            "Upserted candles"
        );

        Ok(grouped.len())
    }

    async fn load_ticks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<i32, Ohlc>, DbErr> {
        let ticks = ItemPriceHistory::find()
            .filter(item_price_history::Column::Timestamp.gte(start.fixed_offset()))
            .filter(item_price_history::Column::Timestamp.lt(end.fixed_offset()))
            .order_by_asc(item_price_history::Column::ItemId)
            .order_by_asc(item_price_history::Column::Timestamp)
            .all(self.db)
            .await?;

        Ok(group_by_item(
            ticks.iter().map(|tick| (tick.item_id, Ohlc::flat(tick.price))),
        ))
    }

    async fn load_hourly_candles(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<BTreeMap<i32, Ohlc>, DbErr> {
        let candles = ItemPriceCandle::find()
            .filter(item_price_candle::Column::Interval.eq(CandleInterval::OneHour.code()))
            .filter(item_price_candle::Column::Timestamp.gte(start.fixed_offset()))
            .filter(item_price_candle::Column::Timestamp.lt(end.fixed_offset()))
            .order_by_asc(item_price_candle::Column::ItemId)
            .order_by_asc(item_price_candle::Column::Timestamp)
            .all(self.db)
            .await?;

        Ok(group_by_item(
            candles.iter().map(|candle| (candle.item_id, Ohlc::from(candle))),
        ))
    }
}

/// `open` is never touched on conflict; it was set by the first run of the bucket.
fn candle_conflict() -> OnConflict {
    OnConflict::columns([
        item_price_candle::Column::ItemId,
        item_price_candle::Column::Timestamp,
        item_price_candle::Column::Interval,
    ])
    .value(
        item_price_candle::Column::High,
        Expr::cust("GREATEST(item_price_candle.high, EXCLUDED.high)"),
    )
    .value(
        item_price_candle::Column::Low,
        Expr::cust("LEAST(item_price_candle.low, EXCLUDED.low)"),
    )
    .update_column(item_price_candle::Column::Close)
    .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, QueryTrait};

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 14, h, m, s).unwrap()
    }

    fn tick(id: i64, item_id: i32, price: i64, ts: DateTime<Utc>) -> item_price_history::Model {
        item_price_history::Model {
            id,
            item_id,
            price,
            timestamp: ts.fixed_offset(),
        }
    }

    #[test]
    fn test_bucket_alignment() {
        assert_eq!(CandleInterval::OneHour.bucket_start(at(10, 47, 12)), at(10, 0, 0));
        assert_eq!(CandleInterval::OneHour.bucket_start(at(10, 0, 0)), at(10, 0, 0));
        assert_eq!(CandleInterval::OneDay.bucket_start(at(23, 59, 59)), at(0, 0, 0));
    }

    #[test]
    fn test_interval_codes_round_trip_through_from_str() {
        for interval in [CandleInterval::OneHour, CandleInterval::OneDay] {
            assert_eq!(interval.code().parse::<CandleInterval>().unwrap(), interval);
        }
        assert!("15m".parse::<CandleInterval>().is_err());
    }

    #[test]
    fn test_single_observation_is_flat() {
        let grouped = group_by_item([(7, Ohlc::flat(55))]);
        assert_eq!(grouped[&7], Ohlc { open: 55, high: 55, low: 55, close: 55 });
    }

    #[test]
    fn test_example_bucket_and_later_run() {
        // 10:00 -> 100, 10:15 -> 120, 10:45 -> 90
        let first_run = group_by_item([
            (111, Ohlc::flat(100)),
            (111, Ohlc::flat(120)),
            (111, Ohlc::flat(90)),
        ]);
        let stored = first_run[&111];
        assert_eq!(stored, Ohlc { open: 100, high: 120, low: 90, close: 90 });

        // A later run also sees 10:50 -> 130
        let second_run = group_by_item([
            (111, Ohlc::flat(100)),
            (111, Ohlc::flat(120)),
            (111, Ohlc::flat(90)),
            (111, Ohlc::flat(130)),
        ]);
        let stored = stored.merge(second_run[&111]);
        assert_eq!(stored, Ohlc { open: 100, high: 130, low: 90, close: 130 });
    }

    #[test]
    fn test_repeated_runs_are_monotonic() {
        let prices = [50, 70, 40, 65, 90, 30, 60];
        let mut stored: Option<Ohlc> = None;

        for seen in 1..=prices.len() {
            let run = group_by_item(prices[..seen].iter().map(|p| (1, Ohlc::flat(*p))))[&1];
            let next = match stored {
                None => run,
                Some(existing) => existing.merge(run),
            };

            if let Some(previous) = stored {
                assert!(next.high >= previous.high);
                assert!(next.low <= previous.low);
                assert_eq!(next.open, previous.open);
            }
            assert_eq!(next.close, prices[seen - 1]);
            assert!(next.low <= next.open.min(next.close));
            assert!(next.high >= next.open.max(next.close));
            stored = Some(next);
        }
    }

    #[test]
    fn test_hourly_candles_roll_up_into_a_day() {
        let hours = [
            Ohlc { open: 10, high: 15, low: 8, close: 12 },
            Ohlc { open: 12, high: 20, low: 11, close: 18 },
            Ohlc { open: 18, high: 19, low: 5, close: 6 },
        ];
        let day = group_by_item(hours.iter().map(|h| (3, *h)))[&3];
        assert_eq!(day, Ohlc { open: 10, high: 20, low: 5, close: 6 });
    }

    #[test]
    fn test_upsert_sql_merges_instead_of_overwriting() {
        let sql = ItemPriceCandle::insert(item_price_candle::ActiveModel {
            interval: Set("1h".to_string()),
            item_id: Set(1),
            open: Set(1),
            high: Set(1),
            low: Set(1),
            close: Set(1),
            timestamp: Set(at(10, 0, 0).fixed_offset()),
            ..Default::default()
        })
        .on_conflict(candle_conflict())
        .build(DatabaseBackend::Postgres)
        .to_string();

        assert!(sql.contains(r#"ON CONFLICT ("item_id", "timestamp", "interval") DO UPDATE SET"#));
        assert!(sql.contains(r#""high" = GREATEST(item_price_candle.high, EXCLUDED.high)"#));
        assert!(sql.contains(r#""low" = LEAST(item_price_candle.low, EXCLUDED.low)"#));
        assert!(sql.contains(r#""close" = "excluded"."close""#));
        assert!(!sql.contains(r#""open" = "#));
    }

    #[test]
    fn test_hourly_from_hourly_is_rejected() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        assert!(CandleBuilder::new(&db, CandleInterval::OneHour, CandleSource::HourlyCandles).is_err());
    }

    #[tokio::test]
    async fn test_build_bucket_upserts_one_candle_per_item() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                tick(1, 111, 100, at(10, 0, 0)),
                tick(2, 111, 120, at(10, 15, 0)),
                tick(3, 111, 90, at(10, 45, 0)),
                tick(4, 112, 7, at(10, 30, 0)),
            ]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .into_connection();

        let builder = CandleBuilder::new(&db, CandleInterval::OneHour, CandleSource::RawTicks).unwrap();
        let report = builder.run(at(10, 56, 0)).await.unwrap();

        assert_eq!(report.buckets, vec![at(10, 0, 0)]);
        assert_eq!(report.candles_upserted, 2);

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        let insert = log[1].statements()[0].sql.clone();
        assert!(insert.starts_with(r#"INSERT INTO "item_price_candle""#));
        assert!(insert.contains("GREATEST"));
    }

    #[tokio::test]
    async fn test_empty_bucket_writes_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<item_price_history::Model>::new()])
            .into_connection();

        let builder = CandleBuilder::new(&db, CandleInterval::OneHour, CandleSource::RawTicks).unwrap();
        let report = builder.run(at(11, 1, 0)).await.unwrap();

        assert_eq!(report.candles_upserted, 0);
        assert_eq!(db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn test_lookback_rebuilds_previous_bucket_first() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([
                vec![tick(1, 5, 40, at(9, 58, 0))],
                Vec::<item_price_history::Model>::new(),
            ])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let builder = CandleBuilder::new(&db, CandleInterval::OneHour, CandleSource::RawTicks)
            .unwrap()
            .with_lookback(1);
        let report = builder.run(at(10, 1, 0)).await.unwrap();

        assert_eq!(report.buckets, vec![at(9, 0, 0), at(10, 0, 0)]);
        assert_eq!(report.candles_upserted, 1);
    }

    #[test]
    fn test_lookback_is_capped() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let builder = CandleBuilder::new(&db, CandleInterval::OneDay, CandleSource::RawTicks)
            .unwrap()
            .with_lookback(u32::MAX);

        assert_eq!(builder.lookback_buckets, MAX_LOOKBACK_BUCKETS);
    }
}
