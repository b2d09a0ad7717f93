//! Environment-driven configuration shared by every job binary.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::error::ConfigError;
use crate::services::candle_builder::MAX_LOOKBACK_BUCKETS;

/// Environment variable for the Postgres connection string
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
/// Environment variable for the marketplace API key
pub const ENV_API_KEY: &str = "BCONOMY_API_KEY";
const ENV_BASE_URL: &str = "BCONOMY_BASE_URL";
const ENV_RATE_LIMIT: &str = "BCONOMY_RATE_LIMIT";
const ENV_FETCH_CONCURRENCY: &str = "FETCH_CONCURRENCY";
const ENV_TICKER_MODE: &str = "TICKER_MODE";
const ENV_STATS_BATCH_COUNT: &str = "STATS_BATCH_COUNT";
const ENV_CANDLE_LOOKBACK: &str = "CANDLE_LOOKBACK_BUCKETS";
const ENV_CATALOG_PATH: &str = "ITEM_CATALOG_PATH";
const ENV_BIND_ADDR: &str = "BIND_ADDR";

const DEFAULT_BASE_URL: &str = "https://bconomy.net";
/// Requests per second the provider tolerates
const DEFAULT_RATE_LIMIT: u32 = 10;
const DEFAULT_FETCH_CONCURRENCY: usize = 10;
const DEFAULT_STATS_BATCH_COUNT: usize = 2;
const DEFAULT_CANDLE_LOOKBACK: u32 = 1;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// How the ticker obtains prices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerMode {
    /// One `marketPreview` call covering every item
    Bulk,
    /// One `marketListings` call per item
    PerItem,
}

impl FromStr for TickerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bulk" => Ok(TickerMode::Bulk),
            "per-item" | "per_item" => Ok(TickerMode::PerItem),
            other => Err(format!("unknown ticker mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BconomyConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub rate_limit_per_sec: u32,
    pub concurrency: usize,
    pub request_timeout: Duration,
}

impl BconomyConfig {
    /// The credential is only needed by jobs that call the API.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_API_KEY))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bconomy: BconomyConfig,
    pub ticker_mode: TickerMode,
    pub stats_batch_count: usize,
    pub candle_lookback_buckets: u32,
    pub catalog_path: Option<PathBuf>,
    pub bind_addr: String,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(ENV_DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;

        let stats_batch_count = parse_or(&lookup, ENV_STATS_BATCH_COUNT, DEFAULT_STATS_BATCH_COUNT)?;
        if stats_batch_count == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_STATS_BATCH_COUNT,
                value: "0".to_string(),
            });
        }

        let rate_limit_per_sec = parse_or(&lookup, ENV_RATE_LIMIT, DEFAULT_RATE_LIMIT)?;
        if rate_limit_per_sec == 0 {
            return Err(ConfigError::Invalid {
                key: ENV_RATE_LIMIT,
                value: "0".to_string(),
            });
        }

        let candle_lookback_buckets =
            parse_or(&lookup, ENV_CANDLE_LOOKBACK, DEFAULT_CANDLE_LOOKBACK)?;
        if candle_lookback_buckets > MAX_LOOKBACK_BUCKETS {
            return Err(ConfigError::Invalid {
                key: ENV_CANDLE_LOOKBACK,
                value: candle_lookback_buckets.to_string(),
            });
        }

        Ok(Self {
            database_url,
            bconomy: BconomyConfig {
                base_url: lookup(ENV_BASE_URL).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                api_key: lookup(ENV_API_KEY),
                rate_limit_per_sec,
                concurrency: parse_or(&lookup, ENV_FETCH_CONCURRENCY, DEFAULT_FETCH_CONCURRENCY)?
                    .max(1),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            ticker_mode: parse_or(&lookup, ENV_TICKER_MODE, TickerMode::Bulk)?,
            stats_batch_count,
            candle_lookback_buckets,
            catalog_path: lookup(ENV_CATALOG_PATH).map(PathBuf::from),
            bind_addr: lookup(ENV_BIND_ADDR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }

    /// Reject a stats batch index outside `0..stats_batch_count`.
    pub fn check_batch(&self, index: usize) -> Result<(), ConfigError> {
        if index >= self.stats_batch_count {
            return Err(ConfigError::BatchOutOfRange {
                index,
                count: self.stats_batch_count,
            });
        }
        Ok(())
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
