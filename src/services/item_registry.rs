use crate::{
    db::DbPool,
    entities::{
        item::{self, Entity as Item},
        stock_batch::{self, Entity as StockBatch},
        ItemLocation, Location, UnitOfMeasure,
    },
    errors::{ServiceError, ServiceResult},
    services::validate_non_negative_amount,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, *};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

pub const DEFAULT_REORDER_LEVEL: Decimal = Decimal::TEN;

/// Catalog entry to seed; quantities always start at zero.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewItem {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub unit: UnitOfMeasure,
    pub location: ItemLocation,
    #[validate(custom = "validate_non_negative_amount")]
    pub selling_price: Decimal,
    #[validate(custom = "validate_non_negative_amount")]
    pub reorder_level: Decimal,
}

impl NewItem {
    pub fn new(name: impl Into<String>, location: ItemLocation, selling_price: Decimal) -> Self {
        Self {
            name: name.into(),
            unit: UnitOfMeasure::Piece,
            location,
            selling_price,
            reorder_level: DEFAULT_REORDER_LEVEL,
        }
    }

    pub fn with_unit(mut self, unit: UnitOfMeasure) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_reorder_level(mut self, reorder_level: Decimal) -> Self {
        self.reorder_level = reorder_level;
        self
    }
}

/// Read side of the cached per-location quantities.
#[derive(Clone)]
pub struct ItemRegistry {
    db_pool: Arc<DbPool>,
}

impl ItemRegistry {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, new_item), fields(name = %new_item.name))]
    pub async fn create_item(&self, new_item: NewItem) -> ServiceResult<item::Model> {
        new_item.validate()?;
        let now = Utc::now();

        let model = item::ActiveModel {
            name: Set(new_item.name),
            unit: Set(new_item.unit),
            location: Set(new_item.location),
            selling_price: Set(new_item.selling_price),
            shop_quantity: Set(Decimal::ZERO),
            store_quantity: Set(Decimal::ZERO),
            reorder_level: Set(new_item.reorder_level),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db_pool.as_ref())
        .await
        .map_err(ServiceError::db_error)?;

        info!(item_id = model.id, "Item created");
        Ok(model)
    }

    pub async fn find_item(&self, item_id: i64) -> ServiceResult<item::Model> {
        load_item(self.db_pool.as_ref(), item_id).await
    }

    /// Cached on-hand quantity for one location.
    pub async fn get_on_hand(&self, item_id: i64, location: Location) -> ServiceResult<Decimal> {
        let item = load_item(self.db_pool.as_ref(), item_id).await?;
        Ok(item.on_hand(location))
    }

    pub async fn last_cost_price(&self, item_id: i64) -> ServiceResult<Decimal> {
        last_cost_price(self.db_pool.as_ref(), item_id).await
    }

    /// Active items whose combined shop and store quantity is at or below
    /// their reorder level, by id.
    pub async fn low_stock(&self) -> ServiceResult<Vec<item::Model>> {
        let items = Item::find()
            .filter(item::Column::IsActive.eq(true))
            .order_by_asc(item::Column::Id)
            .all(self.db_pool.as_ref())
            .await
            .map_err(ServiceError::db_error)?;

        Ok(items.into_iter().filter(item::Model::is_low_stock).collect())
    }
}

pub async fn load_item<C: ConnectionTrait>(conn: &C, item_id: i64) -> ServiceResult<item::Model> {
    Item::find_by_id(item_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}

/// Reads the item row under `SELECT ... FOR UPDATE` where the backend has it.
pub async fn lock_item(txn: &DatabaseTransaction, item_id: i64) -> ServiceResult<item::Model> {
    Item::find_by_id(item_id)
        .lock_exclusive()
        .one(txn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", item_id)))
}

/// Writes `quantity` as the cached value for `location`.
async fn set_on_hand(
    txn: &DatabaseTransaction,
    item_id: i64,
    location: Location,
    quantity: Decimal,
) -> ServiceResult<()> {
    Item::update_many()
        .col_expr(item::quantity_column(location), Expr::value(quantity))
        .col_expr(item::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(item::Column::Id.eq(item_id))
        .exec(txn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(())
}

/// Adds `quantity` to the cached value. The sum is taken in `Decimal` on the
/// row as this transaction sees it; the caller holds the item lock.
pub async fn increase(
    txn: &DatabaseTransaction,
    item_id: i64,
    location: Location,
    quantity: Decimal,
) -> ServiceResult<()> {
    let item = load_item(txn, item_id).await?;
    set_on_hand(txn, item_id, location, item.on_hand(location) + quantity).await
}

/// Subtracts `quantity` from the cached value, refused when it would go
/// negative.
pub async fn decrease(
    txn: &DatabaseTransaction,
    item_id: i64,
    location: Location,
    quantity: Decimal,
) -> ServiceResult<()> {
    let item = load_item(txn, item_id).await?;
    let on_hand = item.on_hand(location);
    if on_hand < quantity {
        return Err(ServiceError::insufficient_stock(
            item_id, location, quantity, on_hand,
        ));
    }
    set_on_hand(txn, item_id, location, on_hand - quantity).await
}

/// Unit cost of the newest batch of the item at any location, or zero.
pub async fn last_cost_price<C: ConnectionTrait>(conn: &C, item_id: i64) -> ServiceResult<Decimal> {
    let latest = StockBatch::find()
        .filter(stock_batch::Column::ItemId.eq(item_id))
        .order_by_desc(stock_batch::Column::ReceivedDate)
        .order_by_desc(stock_batch::Column::Id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(latest.map(|b| b.unit_cost).unwrap_or(Decimal::ZERO))
}

/// Cost for stock that has no purchase price of its own: the last cost
/// price, or the selling price when nothing was ever received.
pub async fn fallback_cost<C: ConnectionTrait>(conn: &C, item: &item::Model) -> ServiceResult<Decimal> {
    let last = last_cost_price(conn, item.id).await?;
    if last > Decimal::ZERO {
        Ok(last)
    } else {
        Ok(item.selling_price)
    }
}
