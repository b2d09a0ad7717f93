pub use sea_orm_migration::prelude::*;

mod m20250601_000001_create_item_price_history;
mod m20250601_000002_create_item_price_candle;
mod m20250602_000001_create_live_stats;
mod m20250603_000001_add_updated_at_to_live_stats;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_item_price_history::Migration),
            Box::new(m20250601_000002_create_item_price_candle::Migration),
            Box::new(m20250602_000001_create_live_stats::Migration),
            Box::new(m20250603_000001_add_updated_at_to_live_stats::Migration),
        ]
    }
}
