use crate::{
    db::{self, DbPool, ItemLocks},
    entities::{
        item,
        stock_batch::{self, Entity as StockBatch},
        stock_receipt::{self, Entity as StockReceipt},
        BatchSource, Location,
    },
    errors::{ServiceError, ServiceResult},
    events::{Event, EventSender},
    services::{
        batch_store::{self, NewBatch},
        ensure_positive, item_registry, receipt_number, validate_non_negative_amount,
        validate_positive_quantity, OperationContext, STOCK_IN_PREFIX,
    },
};
use chrono::{NaiveDate, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// A single receipt of stock at one location.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReceiveStock {
    pub item_id: i64,
    pub location: Location,
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative_amount")]
    pub unit_cost: Decimal,
    pub source: BatchSource,
    pub po_line_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    pub supplier_id: Option<i64>,
    /// Defaults to today.
    pub received_date: Option<NaiveDate>,
    #[validate(length(max = 64))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

impl ReceiveStock {
    pub fn new(
        item_id: i64,
        location: Location,
        quantity: Decimal,
        unit_cost: Decimal,
        source: BatchSource,
    ) -> Self {
        Self {
            item_id,
            location,
            quantity,
            unit_cost,
            source,
            po_line_id: None,
            purchase_order_id: None,
            supplier_id: None,
            received_date: None,
            batch_number: None,
            expiry_date: None,
            notes: None,
        }
    }

    pub fn with_po_line(mut self, po_line_id: i64) -> Self {
        self.po_line_id = Some(po_line_id);
        self
    }

    pub fn received_on(mut self, date: NaiveDate) -> Self {
        self.received_date = Some(date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// One purchase-order line arriving at the receiving location.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PurchaseOrderLine {
    pub po_line_id: i64,
    pub item_id: i64,
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
    #[validate(custom = "validate_non_negative_amount")]
    pub unit_cost: Decimal,
    #[validate(length(max = 64))]
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOrderReceipt {
    pub purchase_order_id: i64,
    pub supplier_id: Option<i64>,
    pub location: Location,
    pub received_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub lines: Vec<PurchaseOrderLine>,
}

/// Header fields shared by every batch of one stock-in event.
#[derive(Debug, Clone)]
pub(crate) struct ReceiptHeader {
    pub prefix: &'static str,
    pub source: BatchSource,
    pub location: Location,
    pub date: NaiveDate,
    pub supplier_id: Option<i64>,
    pub purchase_order_id: Option<i64>,
    pub notes: Option<String>,
}

pub(crate) async fn create_receipt(
    txn: &DatabaseTransaction,
    header: ReceiptHeader,
    ctx: &OperationContext,
) -> ServiceResult<stock_receipt::Model> {
    stock_receipt::ActiveModel {
        receipt_number: Set(receipt_number(header.prefix, header.date)),
        source: Set(header.source),
        location: Set(header.location),
        date_received: Set(header.date),
        supplier_id: Set(header.supplier_id),
        purchase_order_id: Set(header.purchase_order_id),
        notes: Set(header.notes),
        created_by: Set(ctx.actor_id),
        session_id: Set(ctx.session_id),
        term_id: Set(ctx.term_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)
}

pub(crate) fn ensure_eligible(item: &item::Model, location: Location) -> ServiceResult<()> {
    if !item.location.allows(location) {
        return Err(ServiceError::InvalidInput(format!(
            "item {} is stocked at {} only, not {}",
            item.id, item.location, location
        )));
    }
    Ok(())
}

/// Appends a batch and credits the registry. The caller holds the item lock
/// and owns the transaction.
pub(crate) async fn receive_in_txn(
    txn: &DatabaseTransaction,
    item: &item::Model,
    new_batch: NewBatch,
) -> ServiceResult<stock_batch::Model> {
    ensure_eligible(item, new_batch.location)?;
    let batch = batch_store::insert_batch(txn, new_batch).await?;
    item_registry::increase(txn, item.id, batch.location, batch.quantity_received).await?;
    Ok(batch)
}

pub struct StockInService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: ItemLocks,
}

impl StockInService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, locks: ItemLocks) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Records one receipt: a header, a batch with `remaining == received`,
    /// and the registry credit, all in one transaction.
    #[instrument(skip(self, request, ctx), fields(item_id = request.item_id, location = %request.location, quantity = %request.quantity))]
    pub async fn receive(
        &self,
        request: ReceiveStock,
        ctx: OperationContext,
    ) -> ServiceResult<stock_batch::Model> {
        request.validate()?;
        let date = request.received_date.unwrap_or_else(|| Utc::now().date_naive());

        let _guard = self.locks.acquire(request.item_id).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let item = item_registry::lock_item(&txn, request.item_id).await?;
        let receipt = create_receipt(
            &txn,
            ReceiptHeader {
                prefix: STOCK_IN_PREFIX,
                source: request.source,
                location: request.location,
                date,
                supplier_id: request.supplier_id,
                purchase_order_id: request.purchase_order_id,
                notes: request.notes.clone(),
            },
            &ctx,
        )
        .await?;

        let batch = receive_in_txn(
            &txn,
            &item,
            NewBatch {
                receipt_id: receipt.id,
                item_id: item.id,
                location: request.location,
                received_date: date,
                unit_cost: request.unit_cost,
                quantity: request.quantity,
                source: request.source,
                po_line_id: request.po_line_id,
                transfer_id: None,
                batch_number: request.batch_number.clone(),
                expiry_date: request.expiry_date,
            },
        )
        .await?;

        db::commit(txn).await?;

        counter!("stock_ledger.stock_in.received", 1);
        info!(
            batch_id = batch.id,
            receipt_number = %receipt.receipt_number,
            "Stock received"
        );
        self.event_sender.publish(Event::StockReceived {
            item_id: batch.item_id,
            location: batch.location,
            batch_id: batch.id,
            receipt_number: receipt.receipt_number,
            quantity: batch.quantity_received,
            unit_cost: batch.unit_cost,
        });

        Ok(batch)
    }

    /// Receives every line of a purchase order under one receipt header.
    #[instrument(skip(self, receipt, ctx), fields(purchase_order_id = receipt.purchase_order_id, lines = receipt.lines.len()))]
    pub async fn receive_purchase_order(
        &self,
        receipt: PurchaseOrderReceipt,
        ctx: OperationContext,
    ) -> ServiceResult<Vec<stock_batch::Model>> {
        if receipt.lines.is_empty() {
            return Err(ServiceError::InvalidInput(format!(
                "purchase order {} has no lines to receive",
                receipt.purchase_order_id
            )));
        }
        for line in &receipt.lines {
            line.validate()?;
        }
        let date = receipt.received_date.unwrap_or_else(|| Utc::now().date_naive());

        let guards = self
            .locks
            .acquire_many(receipt.lines.iter().map(|l| l.item_id))
            .await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let mut items = HashMap::new();
        for item_id in guards.item_ids() {
            items.insert(item_id, item_registry::lock_item(&txn, item_id).await?);
        }

        let header = create_receipt(
            &txn,
            ReceiptHeader {
                prefix: STOCK_IN_PREFIX,
                source: BatchSource::Purchase,
                location: receipt.location,
                date,
                supplier_id: receipt.supplier_id,
                purchase_order_id: Some(receipt.purchase_order_id),
                notes: receipt.notes.clone(),
            },
            &ctx,
        )
        .await?;

        let mut batches = Vec::with_capacity(receipt.lines.len());
        for line in receipt.lines {
            let item = items.get(&line.item_id).ok_or_else(|| {
                ServiceError::InternalError(format!("item {} was not locked", line.item_id))
            })?;
            let batch = receive_in_txn(
                &txn,
                item,
                NewBatch {
                    receipt_id: header.id,
                    item_id: line.item_id,
                    location: receipt.location,
                    received_date: date,
                    unit_cost: line.unit_cost,
                    quantity: line.quantity,
                    source: BatchSource::Purchase,
                    po_line_id: Some(line.po_line_id),
                    transfer_id: None,
                    batch_number: line.batch_number,
                    expiry_date: line.expiry_date,
                },
            )
            .await?;
            batches.push(batch);
        }

        db::commit(txn).await?;
        drop(guards);

        counter!("stock_ledger.stock_in.received", batches.len() as u64);
        info!(
            receipt_number = %header.receipt_number,
            batches = batches.len(),
            "Purchase order received"
        );
        for batch in &batches {
            self.event_sender.publish(Event::StockReceived {
                item_id: batch.item_id,
                location: batch.location,
                batch_id: batch.id,
                receipt_number: header.receipt_number.clone(),
                quantity: batch.quantity_received,
                unit_cost: batch.unit_cost,
            });
        }

        Ok(batches)
    }

    /// Backs an item's starting quantity with an adjustment batch priced at
    /// the last cost, falling back to the selling price.
    #[instrument(skip(self, ctx))]
    pub async fn record_opening_stock(
        &self,
        item_id: i64,
        location: Location,
        quantity: Decimal,
        ctx: OperationContext,
    ) -> ServiceResult<stock_batch::Model> {
        ensure_positive(quantity, "opening quantity")?;
        let date = Utc::now().date_naive();

        let _guard = self.locks.acquire(item_id).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let item = item_registry::lock_item(&txn, item_id).await?;
        let unit_cost = item_registry::fallback_cost(&txn, &item).await?;
        let receipt = create_receipt(
            &txn,
            ReceiptHeader {
                prefix: STOCK_IN_PREFIX,
                source: BatchSource::Adjustment,
                location,
                date,
                supplier_id: None,
                purchase_order_id: None,
                notes: Some(format!("Opening stock for {}", item.name)),
            },
            &ctx,
        )
        .await?;

        let batch = receive_in_txn(
            &txn,
            &item,
            NewBatch {
                receipt_id: receipt.id,
                item_id,
                location,
                received_date: date,
                unit_cost,
                quantity,
                source: BatchSource::Adjustment,
                po_line_id: None,
                transfer_id: None,
                batch_number: None,
                expiry_date: None,
            },
        )
        .await?;

        db::commit(txn).await?;

        info!(batch_id = batch.id, %unit_cost, "Opening stock recorded");
        self.event_sender.publish(Event::StockReceived {
            item_id,
            location,
            batch_id: batch.id,
            receipt_number: receipt.receipt_number,
            quantity,
            unit_cost,
        });

        Ok(batch)
    }

    /// Deletes a batch nothing has been taken from and debits the registry
    /// by its full quantity. Returns the removed batch.
    #[instrument(skip(self, ctx), fields(actor_id = ?ctx.actor_id))]
    pub async fn reverse_batch(
        &self,
        batch_id: i64,
        ctx: OperationContext,
    ) -> ServiceResult<stock_batch::Model> {
        let item_id = batch_store::find_batch(self.db_pool.as_ref(), batch_id)
            .await?
            .item_id;

        let _guard = self.locks.acquire(item_id).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        item_registry::lock_item(&txn, item_id).await?;
        let batch = batch_store::find_batch(&txn, batch_id).await?;

        if batch.source == BatchSource::Transfer {
            return Err(ServiceError::InvalidInput(format!(
                "batch {} belongs to a transfer and cannot be reversed on its own",
                batch_id
            )));
        }
        if !batch.is_untouched() {
            warn!(
                remaining = %batch.quantity_remaining,
                received = %batch.quantity_received,
                "Refusing to reverse a consumed batch"
            );
            return Err(ServiceError::InvalidInput(format!(
                "batch {} has been partly consumed ({} of {} left)",
                batch_id, batch.quantity_remaining, batch.quantity_received
            )));
        }

        StockBatch::delete_by_id(batch.id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        item_registry::decrease(&txn, item_id, batch.location, batch.quantity_received).await?;

        let siblings = StockBatch::find()
            .filter(stock_batch::Column::ReceiptId.eq(batch.receipt_id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        if siblings == 0 {
            StockReceipt::delete_by_id(batch.receipt_id)
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        db::commit(txn).await?;

        counter!("stock_ledger.stock_in.reversed", 1);
        info!(item_id, quantity = %batch.quantity_received, "Batch reversed");
        self.event_sender.publish(Event::BatchReversed {
            batch_id: batch.id,
            item_id,
            location: batch.location,
            quantity: batch.quantity_received,
        });

        Ok(batch)
    }
}
