use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{BatchSource, Location};

/// One receipt of an item at a location, consumed oldest-first.
///
/// `quantity_received` never changes after insert; `quantity_remaining` only
/// goes down, and always stays within `0..=quantity_received`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub receipt_id: i64,
    pub item_id: i64,
    pub location: Location,
    pub received_date: NaiveDate,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub unit_cost: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub quantity_received: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub quantity_remaining: Decimal,
    pub source: BatchSource,
    pub po_line_id: Option<i64>,
    pub transfer_id: Option<i64>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Model {
    pub fn is_open(&self) -> bool {
        self.quantity_remaining > Decimal::ZERO
    }

    pub fn is_untouched(&self) -> bool {
        self.quantity_remaining == self.quantity_received
    }

    pub fn line_total(&self) -> Decimal {
        self.quantity_received * self.unit_cost
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
    #[sea_orm(
        belongs_to = "super::stock_receipt::Entity",
        from = "Column::ReceiptId",
        to = "super::stock_receipt::Column::Id"
    )]
    StockReceipt,
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl Related<super::stock_receipt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockReceipt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
