use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Raw price ticks, one row per (item, instant)
        manager
            .create_table(
                Table::create()
                    .table(ItemPriceHistory::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ItemPriceHistory::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ItemPriceHistory::ItemId).integer().not_null())
                    .col(ColumnDef::new(ItemPriceHistory::Price).big_integer().not_null())
                    .col(
                        ColumnDef::new(ItemPriceHistory::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(SimpleExpr::Keyword(Keyword::CurrentTimestamp)),
                    )
                    .to_owned(),
            )
            .await?;

        // The ticker's ON CONFLICT target
        manager
            .create_index(
                Index::create()
                    .name("unique_item_timestamp")
                    .table(ItemPriceHistory::Table)
                    .col(ItemPriceHistory::ItemId)
                    .col(ItemPriceHistory::Timestamp)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Candle builder scans a time window across all items
        manager
            .create_index(
                Index::create()
                    .name("idx_item_price_history_timestamp")
                    .table(ItemPriceHistory::Table)
                    .col(ItemPriceHistory::Timestamp)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ItemPriceHistory::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ItemPriceHistory {
    Table,
    Id,
    ItemId,
    Price,
    Timestamp,
}
