//! `SeaORM` Entity for live_stats table

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "live_stats")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub item_id: i32,
    pub last_known_price: i64,
    pub opening_price: i64,
    pub highest_price_today: i64,
    pub lowest_price_today: i64,
    pub supply: i64,
    /// Last write; its UTC date is the trading day the row describes
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
