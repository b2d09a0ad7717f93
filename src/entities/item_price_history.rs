//! SeaORM Entity for raw item price ticks

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "item_price_history")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Catalog item id
    pub item_id: i32,
    /// Observed market price in BC
    pub price: i64,
    /// Observation instant (UTC, whole seconds)
    pub timestamp: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
