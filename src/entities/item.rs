use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{ItemLocation, Location, UnitOfMeasure};

/// Catalog item with its cached per-location on-hand quantities.
///
/// `shop_quantity` and `store_quantity` are aggregates of the open batches at
/// each location and are only written by the ledger services.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub name: String,
    pub unit: UnitOfMeasure,
    pub location: ItemLocation,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub selling_price: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub shop_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub store_quantity: Decimal,
    #[sea_orm(column_type = "Decimal(Some((12, 2)))")]
    pub reorder_level: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    pub fn on_hand(&self, location: Location) -> Decimal {
        match location {
            Location::Shop => self.shop_quantity,
            Location::Store => self.store_quantity,
        }
    }

    pub fn total_quantity(&self) -> Decimal {
        self.shop_quantity + self.store_quantity
    }

    pub fn is_low_stock(&self) -> bool {
        self.total_quantity() <= self.reorder_level
    }
}

/// Column holding the cached quantity for `location`.
pub fn quantity_column(location: Location) -> Column {
    match location {
        Location::Shop => Column::ShopQuantity,
        Location::Store => Column::StoreQuantity,
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::stock_batch::Entity")]
    StockBatches,
    #[sea_orm(has_many = "super::stock_removal::Entity")]
    StockRemovals,
}

impl Related<super::stock_batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockBatches.def()
    }
}

impl Related<super::stock_removal::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StockRemovals.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
