use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LiveStats::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LiveStats::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LiveStats::ItemId).integer().not_null())
                    .col(ColumnDef::new(LiveStats::LastKnownPrice).big_integer().not_null())
                    .col(ColumnDef::new(LiveStats::OpeningPrice).big_integer().not_null())
                    .col(ColumnDef::new(LiveStats::HighestPriceToday).big_integer().not_null())
                    .col(ColumnDef::new(LiveStats::LowestPriceToday).big_integer().not_null())
                    .col(ColumnDef::new(LiveStats::Supply).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        // One snapshot per item; also the stats writer's ON CONFLICT target
        manager
            .create_index(
                Index::create()
                    .name("unique_item_id")
                    .table(LiveStats::Table)
                    .col(LiveStats::ItemId)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LiveStats::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum LiveStats {
    Table,
    Id,
    ItemId,
    LastKnownPrice,
    OpeningPrice,
    HighestPriceToday,
    LowestPriceToday,
    Supply,
}
