//! SeaORM Entity for OHLC candles

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "item_price_candle")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Bucket width code: '1h', '1d'
    pub interval: String,
    pub item_id: i32,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    /// Bucket start, aligned to the interval boundary in UTC
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
