use crate::{
    db::{self, DbPool, ItemLocks},
    entities::{
        stock_batch, stock_removal,
        stock_transfer::{self, Entity as StockTransfer},
        stock_transfer_line::{self, Entity as StockTransferLine},
        BatchSource, RemovalReason, TransferDirection,
    },
    errors::{ServiceError, ServiceResult},
    events::{Event, EventSender},
    services::{
        batch_store::NewBatch,
        consumption::{consume_in_txn, flag_integrity, RemovalDetails},
        ensure_positive, item_registry, receipt_number,
        stock_in::{create_receipt, receive_in_txn, ReceiptHeader},
        OperationContext, STOCK_IN_PREFIX, TRANSFER_PREFIX,
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

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransferLineRequest {
    pub item_id: i64,
    pub quantity: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub direction: TransferDirection,
    pub lines: Vec<TransferLineRequest>,
    pub notes: Option<String>,
    /// Defaults to today.
    pub transfer_date: Option<NaiveDate>,
}

impl TransferRequest {
    pub fn new(direction: TransferDirection, lines: Vec<(i64, Decimal)>) -> Self {
        Self {
            direction,
            lines: lines
                .into_iter()
                .map(|(item_id, quantity)| TransferLineRequest { item_id, quantity })
                .collect(),
            notes: None,
            transfer_date: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// A committed transfer with everything it wrote, line by line.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transfer: stock_transfer::Model,
    pub lines: Vec<stock_transfer_line::Model>,
    pub removals: Vec<stock_removal::Model>,
    pub batches: Vec<stock_batch::Model>,
}

/// Lines in processing order: ascending item id, stable for repeats.
fn ordered_lines(request: &TransferRequest) -> ServiceResult<Vec<TransferLineRequest>> {
    if request.lines.is_empty() {
        return Err(ServiceError::InvalidInput(
            "a transfer needs at least one line".to_string(),
        ));
    }
    for line in &request.lines {
        ensure_positive(line.quantity, &format!("transfer quantity for item {}", line.item_id))?;
    }

    let mut lines = request.lines.clone();
    lines.sort_by_key(|l| l.item_id);
    Ok(lines)
}

pub struct TransferService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: ItemLocks,
}

impl TransferService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, locks: ItemLocks) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Moves stock between locations. Every line's source removal and
    /// destination batch commit together; one short line rolls back the
    /// whole transfer.
    #[instrument(skip(self, request, ctx), fields(direction = %request.direction, lines = request.lines.len()))]
    pub async fn transfer(
        &self,
        request: TransferRequest,
        ctx: OperationContext,
    ) -> ServiceResult<TransferReceipt> {
        let lines = ordered_lines(&request)?;
        let source = request.direction.source();
        let destination = request.direction.destination();
        let date = request.transfer_date.unwrap_or_else(|| Utc::now().date_naive());

        let guards = self.locks.acquire_many(lines.iter().map(|l| l.item_id)).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let mut items = HashMap::new();
        for item_id in guards.item_ids() {
            items.insert(item_id, item_registry::lock_item(&txn, item_id).await?);
        }

        let number = receipt_number(TRANSFER_PREFIX, date);
        let receipt = create_receipt(
            &txn,
            ReceiptHeader {
                prefix: STOCK_IN_PREFIX,
                source: BatchSource::Transfer,
                location: destination,
                date,
                supplier_id: None,
                purchase_order_id: None,
                notes: Some(format!("From transfer {}", number)),
            },
            &ctx,
        )
        .await?;

        let transfer = stock_transfer::ActiveModel {
            receipt_number: Set(number),
            direction: Set(request.direction),
            transfer_date: Set(date),
            receipt_id: Set(Some(receipt.id)),
            notes: Set(request.notes.clone()),
            created_by: Set(ctx.actor_id),
            session_id: Set(ctx.session_id),
            term_id: Set(ctx.term_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(ServiceError::db_error)?;

        let mut receipt_lines = Vec::with_capacity(lines.len());
        let mut removals = Vec::with_capacity(lines.len());
        let mut batches = Vec::with_capacity(lines.len());

        for line in &lines {
            let item = items.get(&line.item_id).ok_or_else(|| {
                ServiceError::InternalError(format!("item {} was not locked", line.item_id))
            })?;

            let removal = consume_in_txn(
                &txn,
                item,
                source,
                line.quantity,
                RemovalReason::Transfer,
                RemovalDetails {
                    notes: request.notes.clone(),
                    transfer_id: Some(transfer.id),
                    ..Default::default()
                },
                &ctx,
            )
            .await
            .map_err(|e| {
                warn!(
                    item_id = line.item_id,
                    error = %e,
                    "Transfer line failed; rolling back transfer"
                );
                flag_integrity(&self.event_sender, &e, line.item_id);
                e
            })?;

            // newest stock-in cost, read before this line's batch exists
            let unit_cost = item_registry::last_cost_price(&txn, line.item_id).await?;
            let batch = receive_in_txn(
                &txn,
                item,
                NewBatch {
                    receipt_id: receipt.id,
                    item_id: line.item_id,
                    location: destination,
                    received_date: date,
                    unit_cost,
                    quantity: line.quantity,
                    source: BatchSource::Transfer,
                    po_line_id: None,
                    transfer_id: Some(transfer.id),
                    batch_number: None,
                    expiry_date: None,
                },
            )
            .await?;

            let transfer_line = stock_transfer_line::ActiveModel {
                transfer_id: Set(transfer.id),
                item_id: Set(line.item_id),
                quantity: Set(line.quantity),
                removal_id: Set(removal.id),
                batch_id: Set(batch.id),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;

            receipt_lines.push(transfer_line);
            removals.push(removal);
            batches.push(batch);
        }

        db::commit(txn).await?;
        drop(guards);

        counter!("stock_ledger.transfers.completed", 1);
        info!(
            transfer_id = transfer.id,
            receipt_number = %transfer.receipt_number,
            "Stock transferred"
        );
        self.event_sender.publish(Event::StockTransferred {
            transfer_id: transfer.id,
            receipt_number: transfer.receipt_number.clone(),
            direction: transfer.direction,
            line_count: receipt_lines.len(),
        });

        Ok(TransferReceipt {
            transfer,
            lines: receipt_lines,
            removals,
            batches,
        })
    }

    /// Reloads a committed transfer with its lines.
    pub async fn find_transfer(
        &self,
        transfer_id: i64,
    ) -> ServiceResult<(stock_transfer::Model, Vec<stock_transfer_line::Model>)> {
        let db = self.db_pool.as_ref();
        let transfer = StockTransfer::find_by_id(transfer_id)
            .one(db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Transfer {} not found", transfer_id)))?;

        let lines = StockTransferLine::find()
            .filter(stock_transfer_line::Column::TransferId.eq(transfer_id))
            .order_by_asc(stock_transfer_line::Column::Id)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok((transfer, lines))
    }
}
