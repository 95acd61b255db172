use crate::{
    db::DbPool,
    entities::{
        stock_batch::{self, Entity as StockBatch},
        BatchSource, Location,
    },
    errors::{ServiceError, ServiceResult},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::error;

/// Fields of a batch about to be written under a receipt header.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub receipt_id: i64,
    pub item_id: i64,
    pub location: Location,
    pub received_date: NaiveDate,
    pub unit_cost: Decimal,
    pub quantity: Decimal,
    pub source: BatchSource,
    pub po_line_id: Option<i64>,
    pub transfer_id: Option<i64>,
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

/// Read access to batch history.
#[derive(Clone)]
pub struct BatchStore {
    db_pool: Arc<DbPool>,
}

impl BatchStore {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn open_batches(
        &self,
        item_id: i64,
        location: Location,
    ) -> ServiceResult<Vec<stock_batch::Model>> {
        open_batches(self.db_pool.as_ref(), item_id, location).await
    }

    pub async fn available(&self, item_id: i64, location: Location) -> ServiceResult<Decimal> {
        available(self.db_pool.as_ref(), item_id, location).await
    }

    pub async fn batches_for_item(&self, item_id: i64) -> ServiceResult<Vec<stock_batch::Model>> {
        batches_for_item(self.db_pool.as_ref(), item_id).await
    }

    pub async fn find_batch(&self, batch_id: i64) -> ServiceResult<stock_batch::Model> {
        find_batch(self.db_pool.as_ref(), batch_id).await
    }
}

/// Batches with stock left, oldest received first, insertion order on ties.
pub async fn open_batches<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
    location: Location,
) -> ServiceResult<Vec<stock_batch::Model>> {
    StockBatch::find()
        .filter(stock_batch::Column::ItemId.eq(item_id))
        .filter(stock_batch::Column::Location.eq(location))
        .filter(stock_batch::Column::QuantityRemaining.gt(Decimal::ZERO))
        .order_by_asc(stock_batch::Column::ReceivedDate)
        .order_by_asc(stock_batch::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

/// Sum of `quantity_remaining` over the open batches at one location.
pub async fn available<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
    location: Location,
) -> ServiceResult<Decimal> {
    let batches = open_batches(conn, item_id, location).await?;
    Ok(sum_remaining(&batches))
}

/// Remaining quantity per location across every batch of the item.
pub async fn remaining_by_location<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
) -> ServiceResult<BTreeMap<Location, Decimal>> {
    let mut sums = BTreeMap::new();
    for batch in batches_for_item(conn, item_id).await? {
        *sums.entry(batch.location).or_insert(Decimal::ZERO) += batch.quantity_remaining;
    }
    Ok(sums)
}

pub fn sum_remaining(batches: &[stock_batch::Model]) -> Decimal {
    batches.iter().map(|b| b.quantity_remaining).sum()
}

pub async fn batches_for_item<C: ConnectionTrait>(
    conn: &C,
    item_id: i64,
) -> ServiceResult<Vec<stock_batch::Model>> {
    StockBatch::find()
        .filter(stock_batch::Column::ItemId.eq(item_id))
        .order_by_asc(stock_batch::Column::Location)
        .order_by_asc(stock_batch::Column::ReceivedDate)
        .order_by_asc(stock_batch::Column::Id)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub async fn find_batch<C: ConnectionTrait>(
    conn: &C,
    batch_id: i64,
) -> ServiceResult<stock_batch::Model> {
    StockBatch::find_by_id(batch_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Batch {} not found", batch_id)))
}

/// `0 <= remaining <= received`
pub fn check_bounds(batch_id: i64, remaining: Decimal, received: Decimal) -> ServiceResult<()> {
    if remaining < Decimal::ZERO || remaining > received {
        error!(
            batch_id,
            %remaining,
            %received,
            "batch remaining quantity out of bounds"
        );
        return Err(ServiceError::DataIntegrity(format!(
            "batch {} would hold {} of {} received",
            batch_id, remaining, received
        )));
    }
    Ok(())
}

pub async fn insert_batch(
    txn: &DatabaseTransaction,
    new_batch: NewBatch,
) -> ServiceResult<stock_batch::Model> {
    if new_batch.quantity <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "batch quantity must be greater than 0, got {}",
            new_batch.quantity
        )));
    }
    if new_batch.unit_cost < Decimal::ZERO {
        return Err(ServiceError::InvalidInput(format!(
            "unit cost cannot be negative, got {}",
            new_batch.unit_cost
        )));
    }

    stock_batch::ActiveModel {
        receipt_id: Set(new_batch.receipt_id),
        item_id: Set(new_batch.item_id),
        location: Set(new_batch.location),
        received_date: Set(new_batch.received_date),
        unit_cost: Set(new_batch.unit_cost),
        quantity_received: Set(new_batch.quantity),
        quantity_remaining: Set(new_batch.quantity),
        source: Set(new_batch.source),
        po_line_id: Set(new_batch.po_line_id),
        transfer_id: Set(new_batch.transfer_id),
        batch_number: Set(new_batch.batch_number),
        expiry_date: Set(new_batch.expiry_date),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)
}

/// Takes `quantity` out of one batch. The caller holds the item lock.
pub async fn decrement(
    txn: &DatabaseTransaction,
    batch: &stock_batch::Model,
    quantity: Decimal,
) -> ServiceResult<stock_batch::Model> {
    let remaining = batch.quantity_remaining - quantity;
    check_bounds(batch.id, remaining, batch.quantity_received)?;

    let mut active: stock_batch::ActiveModel = batch.clone().into();
    active.quantity_remaining = Set(remaining);
    active.update(txn).await.map_err(ServiceError::db_error)
}
