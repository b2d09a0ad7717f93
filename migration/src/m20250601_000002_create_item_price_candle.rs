use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ItemPriceCandle::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ItemPriceCandle::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    // 1h, 1d
                    .col(ColumnDef::new(ItemPriceCandle::Interval).string_len(2).not_null())
                    .col(ColumnDef::new(ItemPriceCandle::ItemId).integer().not_null())
                    .col(ColumnDef::new(ItemPriceCandle::Open).big_integer().not_null())
                    .col(ColumnDef::new(ItemPriceCandle::High).big_integer().not_null())
                    .col(ColumnDef::new(ItemPriceCandle::Low).big_integer().not_null())
                    .col(ColumnDef::new(ItemPriceCandle::Close).big_integer().not_null())
                    .col(
                        ColumnDef::new(ItemPriceCandle::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("unique_item_timestamp_interval")
                    .table(ItemPriceCandle::Table)
                    .col(ItemPriceCandle::ItemId)
                    .col(ItemPriceCandle::Timestamp)
                    .col(ItemPriceCandle::Interval)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ItemPriceCandle::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ItemPriceCandle {
    Table,
    Id,
    Interval,
    ItemId,
    Open,
    High,
    Low,
    Close,
    Timestamp,
}
