//! Bconomy marketplace API client.
//!
//! Every call is a `POST /api/data` whose JSON body names the request type.
//! Responses are decoded into explicit structs and validated; anything that
//! does not look like a non-negative integer price or amount is a
//! [`FetchError::Parse`].

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::BconomyConfig;
use crate::error::{ConfigError, FetchError};
use crate::services::rate_limiter::RateLimiter;

const DATA_PATH: &str = "/api/data";

/// Read-only view of the marketplace, as used by the ticker and the stats writer.
#[async_trait]
pub trait MarketApi: Send + Sync {
    /// Current price of every listed item in one call.
    async fn market_preview(&self) -> Result<MarketPreview, FetchError>;

    /// Open listings for a single item.
    async fn market_listings(&self, item_id: i32) -> Result<Vec<MarketListing>, FetchError>;
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum DataRequest {
    MarketPreview,
    MarketListings {
        #[serde(rename = "itemId")]
        item_id: i32,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMarketPreview {
    #[serde(default)]
    last_updated: Option<Value>,
    data: HashMap<String, Value>,
}

/// Bulk price snapshot keyed by `item<N>`.
#[derive(Debug, Clone)]
pub struct MarketPreview {
    /// Provider-side snapshot time, truncated to whole seconds
    pub last_updated: Option<DateTime<Utc>>,
    prices: HashMap<String, Value>,
}

impl MarketPreview {
    /// Build a preview from already-decoded parts.
    pub fn new(last_updated: Option<DateTime<Utc>>, prices: HashMap<String, Value>) -> Self {
        Self { last_updated, prices }
    }

    /// Price for one item.
    ///
    /// `Ok(None)` when the item is absent from the preview, `Err` when the
    /// entry is present but is not a non-negative integer.
    pub fn price(&self, item_id: i32) -> Result<Option<i64>, FetchError> {
        let key = format!("item{}", item_id);
        match self.prices.get(&key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => parse_price(value)
                .map(Some)
                .ok_or_else(|| FetchError::Parse(format!("{} has malformed price {}", key, value))),
        }
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl TryFrom<RawMarketPreview> for MarketPreview {
    type Error = FetchError;

    fn try_from(raw: RawMarketPreview) -> Result<Self, Self::Error> {
        let last_updated = raw
            .last_updated
            .as_ref()
            .and_then(Value::as_i64)
            .and_then(DateTime::from_timestamp_millis)
            .map(|ts| ts.trunc_subsecs(0));

        Ok(Self::new(last_updated, raw.data))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MarketListing {
    /// Item id the listing belongs to
    pub id: i64,
    pub price: i64,
    /// Quantity offered
    pub amount: i64,
}

/// Aggregate view of an item's open listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListingSummary {
    /// Cheapest ask, `None` when nothing is listed
    pub lowest_price: Option<i64>,
    /// Total quantity across all listings
    pub supply: i64,
}

impl ListingSummary {
    /// Fails when the total amount does not fit in an `i64`.
    pub fn from_listings(listings: &[MarketListing]) -> Result<Self, FetchError> {
        let supply = listings
            .iter()
            .try_fold(0i64, |total, l| total.checked_add(l.amount))
            .ok_or_else(|| FetchError::Parse("total listing amount overflows".to_string()))?;

        Ok(Self {
            lowest_price: listings.iter().map(|l| l.price).min(),
            supply,
        })
    }
}

fn validate_listings(listings: Vec<MarketListing>) -> Result<Vec<MarketListing>, FetchError> {
    if let Some(bad) = listings.iter().find(|l| l.price < 0 || l.amount < 0) {
        return Err(FetchError::Parse(format!(
            "negative price or amount in listing {:?}",
            bad
        )));
    }
    Ok(listings)
}

/// Accept JSON integers, and floats with no fractional part. Strings are rejected.
fn parse_price(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()).map(|f| f as i64))
            .filter(|p| *p >= 0),
        _ => None,
    }
}

#[derive(Clone)]
pub struct BconomyClient {
    client: Client,
    base_url: String,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl BconomyClient {
    /// Create a client paced by `limiter`.
    ///
    /// The limiter belongs to the calling job invocation; every request made
    /// through this client takes a slot from it.
    pub fn new(config: &BconomyConfig, limiter: Arc<RateLimiter>) -> Result<Self, ConfigError> {
        let api_key = config.require_api_key()?.to_string();
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                key: "BCONOMY_BASE_URL",
                value: e.to_string(),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            limiter,
        })
    }

    async fn post_data<T: DeserializeOwned>(&self, request: &DataRequest) -> Result<T, FetchError> {
        self.limiter.acquire().await;

        let url = format!("{}{}", self.base_url, DATA_PATH);
        debug!(url = %url, request = ?request, "Calling Bconomy API");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| {
            let snippet: String = String::from_utf8_lossy(&bytes).chars().take(200).collect();
            FetchError::Parse(format!("{} (body: {})", e, snippet))
        })
    }
}

#[async_trait]
impl MarketApi for BconomyClient {
    async fn market_preview(&self) -> Result<MarketPreview, FetchError> {
        let raw: RawMarketPreview = self.post_data(&DataRequest::MarketPreview).await?;
        MarketPreview::try_from(raw)
    }

    async fn market_listings(&self, item_id: i32) -> Result<Vec<MarketListing>, FetchError> {
        let listings: Vec<MarketListing> = self
            .post_data(&DataRequest::MarketListings { item_id })
            .await?;
        validate_listings(listings)
    }
}
