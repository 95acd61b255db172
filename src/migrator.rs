use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_items_table::Migration),
            Box::new(m20240101_000002_create_stock_receipts_table::Migration),
            Box::new(m20240101_000003_create_stock_transfers_table::Migration),
            Box::new(m20240101_000004_create_stock_batches_table::Migration),
            Box::new(m20240101_000005_create_stock_removals_table::Migration),
            Box::new(m20240101_000006_create_stock_transfer_lines_table::Migration),
        ]
    }
}

mod m20240101_000001_create_items_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_items_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Items::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Items::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Items::Name).string_len(255).not_null())
                        .col(ColumnDef::new(Items::Unit).string_len(16).not_null())
                        .col(ColumnDef::new(Items::Location).string_len(16).not_null())
                        .col(
                            ColumnDef::new(Items::SellingPrice)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Items::ShopQuantity)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Items::StoreQuantity)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Items::ReorderLevel)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(10),
                        )
                        .col(
                            ColumnDef::new(Items::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Items::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Items::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_items_name")
                        .table(Items::Table)
                        .col(Items::Name)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Items::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Items {
        Table,
        Id,
        Name,
        Unit,
        Location,
        SellingPrice,
        ShopQuantity,
        StoreQuantity,
        ReorderLevel,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_stock_receipts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_stock_receipts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockReceipts::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockReceipts::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockReceipts::ReceiptNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(StockReceipts::Source).string_len(20).not_null())
                        .col(ColumnDef::new(StockReceipts::Location).string_len(16).not_null())
                        .col(ColumnDef::new(StockReceipts::DateReceived).date().not_null())
                        .col(ColumnDef::new(StockReceipts::SupplierId).big_integer().null())
                        .col(ColumnDef::new(StockReceipts::PurchaseOrderId).big_integer().null())
                        .col(ColumnDef::new(StockReceipts::Notes).text().null())
                        .col(ColumnDef::new(StockReceipts::CreatedBy).big_integer().null())
                        .col(ColumnDef::new(StockReceipts::SessionId).big_integer().null())
                        .col(ColumnDef::new(StockReceipts::TermId).big_integer().null())
                        .col(
                            ColumnDef::new(StockReceipts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockReceipts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockReceipts {
        Table,
        Id,
        ReceiptNumber,
        Source,
        Location,
        DateReceived,
        SupplierId,
        PurchaseOrderId,
        Notes,
        CreatedBy,
        SessionId,
        TermId,
        CreatedAt,
    }
}

mod m20240101_000003_create_stock_transfers_table {
    use sea_orm_migration::prelude::*;

    use super::m20240101_000002_create_stock_receipts_table::StockReceipts;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_stock_transfers_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransfers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransfers::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockTransfers::ReceiptNumber)
                                .string_len(32)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(StockTransfers::Direction).string_len(20).not_null())
                        .col(ColumnDef::new(StockTransfers::TransferDate).date().not_null())
                        .col(ColumnDef::new(StockTransfers::ReceiptId).big_integer().null())
                        .col(ColumnDef::new(StockTransfers::Notes).text().null())
                        .col(ColumnDef::new(StockTransfers::CreatedBy).big_integer().null())
                        .col(ColumnDef::new(StockTransfers::SessionId).big_integer().null())
                        .col(ColumnDef::new(StockTransfers::TermId).big_integer().null())
                        .col(
                            ColumnDef::new(StockTransfers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transfers_receipt")
                                .from(StockTransfers::Table, StockTransfers::ReceiptId)
                                .to(StockReceipts::Table, StockReceipts::Id)
                                .on_delete(ForeignKeyAction::SetNull),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransfers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockTransfers {
        Table,
        Id,
        ReceiptNumber,
        Direction,
        TransferDate,
        ReceiptId,
        Notes,
        CreatedBy,
        SessionId,
        TermId,
        CreatedAt,
    }
}

mod m20240101_000004_create_stock_batches_table {
    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_items_table::Items;
    use super::m20240101_000002_create_stock_receipts_table::StockReceipts;
    use super::m20240101_000003_create_stock_transfers_table::StockTransfers;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_stock_batches_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockBatches::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockBatches::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockBatches::ReceiptId).big_integer().not_null())
                        .col(ColumnDef::new(StockBatches::ItemId).big_integer().not_null())
                        .col(ColumnDef::new(StockBatches::Location).string_len(16).not_null())
                        .col(ColumnDef::new(StockBatches::ReceivedDate).date().not_null())
                        .col(
                            ColumnDef::new(StockBatches::UnitCost)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::QuantityReceived)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockBatches::QuantityRemaining)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockBatches::Source).string_len(20).not_null())
                        .col(ColumnDef::new(StockBatches::PoLineId).big_integer().null())
                        .col(ColumnDef::new(StockBatches::TransferId).big_integer().null())
                        .col(ColumnDef::new(StockBatches::BatchNumber).string_len(64).null())
                        .col(ColumnDef::new(StockBatches::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(StockBatches::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_batches_item")
                                .from(StockBatches::Table, StockBatches::ItemId)
                                .to(Items::Table, Items::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_batches_receipt")
                                .from(StockBatches::Table, StockBatches::ReceiptId)
                                .to(StockReceipts::Table, StockReceipts::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_batches_transfer")
                                .from(StockBatches::Table, StockBatches::TransferId)
                                .to(StockTransfers::Table, StockTransfers::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            // FIFO walk: item + location, oldest received first
            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_batches_item_location_received")
                        .table(StockBatches::Table)
                        .col(StockBatches::ItemId)
                        .col(StockBatches::Location)
                        .col(StockBatches::ReceivedDate)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockBatches::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockBatches {
        Table,
        Id,
        ReceiptId,
        ItemId,
        Location,
        ReceivedDate,
        UnitCost,
        QuantityReceived,
        QuantityRemaining,
        Source,
        PoLineId,
        TransferId,
        BatchNumber,
        ExpiryDate,
        CreatedAt,
    }
}

mod m20240101_000005_create_stock_removals_table {
    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_items_table::Items;
    use super::m20240101_000003_create_stock_transfers_table::StockTransfers;
    use super::m20240101_000004_create_stock_batches_table::StockBatches;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_stock_removals_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockRemovals::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockRemovals::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockRemovals::ItemId).big_integer().not_null())
                        .col(ColumnDef::new(StockRemovals::Location).string_len(16).not_null())
                        .col(
                            ColumnDef::new(StockRemovals::QuantityRemoved)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRemovals::UnitCost)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockRemovals::TotalCost)
                                .decimal_len(14, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockRemovals::Reason).string_len(24).not_null())
                        .col(ColumnDef::new(StockRemovals::BatchId).big_integer().null())
                        .col(ColumnDef::new(StockRemovals::TransferId).big_integer().null())
                        .col(ColumnDef::new(StockRemovals::StaffRecipientId).big_integer().null())
                        .col(ColumnDef::new(StockRemovals::Notes).text().null())
                        .col(ColumnDef::new(StockRemovals::DateRemoved).date().not_null())
                        .col(ColumnDef::new(StockRemovals::CreatedBy).big_integer().null())
                        .col(ColumnDef::new(StockRemovals::SessionId).big_integer().null())
                        .col(ColumnDef::new(StockRemovals::TermId).big_integer().null())
                        .col(
                            ColumnDef::new(StockRemovals::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_removals_item")
                                .from(StockRemovals::Table, StockRemovals::ItemId)
                                .to(Items::Table, Items::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_removals_batch")
                                .from(StockRemovals::Table, StockRemovals::BatchId)
                                .to(StockBatches::Table, StockBatches::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_removals_transfer")
                                .from(StockRemovals::Table, StockRemovals::TransferId)
                                .to(StockTransfers::Table, StockTransfers::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_stock_removals_item_location")
                        .table(StockRemovals::Table)
                        .col(StockRemovals::ItemId)
                        .col(StockRemovals::Location)
                        .if_not_exists()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockRemovals::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockRemovals {
        Table,
        Id,
        ItemId,
        Location,
        QuantityRemoved,
        UnitCost,
        TotalCost,
        Reason,
        BatchId,
        TransferId,
        StaffRecipientId,
        Notes,
        DateRemoved,
        CreatedBy,
        SessionId,
        TermId,
        CreatedAt,
    }
}

mod m20240101_000006_create_stock_transfer_lines_table {
    use sea_orm_migration::prelude::*;

    use super::m20240101_000001_create_items_table::Items;
    use super::m20240101_000003_create_stock_transfers_table::StockTransfers;
    use super::m20240101_000004_create_stock_batches_table::StockBatches;
    use super::m20240101_000005_create_stock_removals_table::StockRemovals;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000006_create_stock_transfer_lines_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockTransferLines::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockTransferLines::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::TransferId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransferLines::ItemId).big_integer().not_null())
                        .col(
                            ColumnDef::new(StockTransferLines::Quantity)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockTransferLines::RemovalId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockTransferLines::BatchId).big_integer().not_null())
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transfer_lines_transfer")
                                .from(StockTransferLines::Table, StockTransferLines::TransferId)
                                .to(StockTransfers::Table, StockTransfers::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transfer_lines_item")
                                .from(StockTransferLines::Table, StockTransferLines::ItemId)
                                .to(Items::Table, Items::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transfer_lines_removal")
                                .from(StockTransferLines::Table, StockTransferLines::RemovalId)
                                .to(StockRemovals::Table, StockRemovals::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_stock_transfer_lines_batch")
                                .from(StockTransferLines::Table, StockTransferLines::BatchId)
                                .to(StockBatches::Table, StockBatches::Id)
                                .on_delete(ForeignKeyAction::Restrict),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockTransferLines::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum StockTransferLines {
        Table,
        Id,
        TransferId,
        ItemId,
        Quantity,
        RemovalId,
        BatchId,
    }
}
