//! Item read API request/response models
//!
//! Shapes served under `/api/items` to the dashboard. Prices are integer
//! in-game currency units; timestamps are UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::{item_price_candle, item_price_history, live_stats};
use crate::services::price_utils::percent_change;

/// Largest page the history endpoint will return
pub const MAX_HISTORY_LIMIT: u64 = 500;

/// Today's stats for one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LiveStatsEntry {
    pub item_id: i32,
    pub last_known_price: i64,
    pub opening_price: i64,
    pub highest_price_today: i64,
    pub lowest_price_today: i64,
    pub supply: i64,
    /// Move from the opening price; null when the opening price is zero
    pub percent_change: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl From<live_stats::Model> for LiveStatsEntry {
    fn from(m: live_stats::Model) -> Self {
        Self {
            item_id: m.item_id,
            last_known_price: m.last_known_price,
            opening_price: m.opening_price,
            highest_price_today: m.highest_price_today,
            lowest_price_today: m.lowest_price_today,
            supply: m.supply,
            percent_change: percent_change(m.last_known_price, m.opening_price),
            updated_at: m.updated_at.with_timezone(&Utc),
        }
    }
}

/// Catalog entry joined with its stats, if any have been written yet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: i32,
    pub name: String,
    pub image_url: String,
    pub stats: Option<LiveStatsEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemListResponse {
    pub items: Vec<ItemSummary>,
}

/// Query parameters for the candles endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct CandleQuery {
    /// 1h or 1d (defaults to 1h)
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Inclusive range start (defaults to 24h before `to`)
    pub from: Option<DateTime<Utc>>,
    /// Inclusive range end (defaults to now)
    pub to: Option<DateTime<Utc>>,
}

fn default_interval() -> String {
    "1h".to_string()
}

impl CandleQuery {
    /// Resolve the requested range against `now`.
    pub fn range(&self, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), String> {
        let to = self.to.unwrap_or(now);
        let from = self.from.unwrap_or(to - chrono::Duration::hours(24));

        if from > to {
            return Err("'from' must not be after 'to'".to_string());
        }
        Ok((from, to))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandleEntry {
    pub timestamp: DateTime<Utc>,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
}

impl From<item_price_candle::Model> for CandleEntry {
    fn from(m: item_price_candle::Model) -> Self {
        Self {
            timestamp: m.timestamp.with_timezone(&Utc),
            open: m.open,
            high: m.high,
            low: m.low,
            close: m.close,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandlesResponse {
    pub item_id: i32,
    pub interval: String,
    pub data: Vec<CandleEntry>,
}

/// Query parameters for the raw tick history endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    10
}

impl HistoryQuery {
    pub fn validate(&self) -> Result<u64, String> {
        if self.limit == 0 || self.limit > MAX_HISTORY_LIMIT {
            return Err(format!("limit must be between 1 and {}", MAX_HISTORY_LIMIT));
        }
        Ok(self.limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub price: i64,
    pub timestamp: DateTime<Utc>,
}

impl From<item_price_history::Model> for HistoryEntry {
    fn from(m: item_price_history::Model) -> Self {
        Self {
            price: m.price,
            timestamp: m.timestamp.with_timezone(&Utc),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub item_id: i32,
    /// Newest first
    pub data: Vec<HistoryEntry>,
}

/// Error response for the item endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
        }
    }
}
