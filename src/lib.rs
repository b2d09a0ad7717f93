// src/lib.rs

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use catalog::Catalog;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub catalog: Arc<Catalog>,
}

pub mod catalog;
pub mod config;
pub mod error;
pub mod telemetry;

pub mod entities {
    pub mod prelude;
    pub mod item_price_candle;
    pub mod item_price_history;
    pub mod live_stats;
}

pub mod services {
    pub mod bconomy;
    pub mod candle_builder;
    pub mod price_utils;
    pub mod rate_limiter;
    pub mod stats_writer;
    pub mod ticker;
}

pub mod jobs;
pub mod models;
pub mod handlers;
