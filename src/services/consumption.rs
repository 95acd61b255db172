use crate::{
    db::{self, DbPool, ItemLocks},
    entities::{item, stock_batch, stock_removal, Location, RemovalReason},
    errors::{ServiceError, ServiceResult},
    events::{Event, EventSender},
    services::{batch_store, ensure_positive, item_registry, validate_positive_quantity, OperationContext},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// Stock leaving a location, drawn oldest batch first.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsumeStock {
    pub item_id: i64,
    pub location: Location,
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
    pub reason: RemovalReason,
    pub staff_recipient_id: Option<i64>,
    pub notes: Option<String>,
}

impl ConsumeStock {
    pub fn new(item_id: i64, location: Location, quantity: Decimal, reason: RemovalReason) -> Self {
        Self {
            item_id,
            location,
            quantity,
            reason,
            staff_recipient_id: None,
            notes: None,
        }
    }

    pub fn to_staff(mut self, staff_id: i64) -> Self {
        self.staff_recipient_id = Some(staff_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Stock taken from one named batch, bypassing FIFO order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConsumeFromBatch {
    pub batch_id: i64,
    #[validate(custom = "validate_positive_quantity")]
    pub quantity: Decimal,
    pub reason: RemovalReason,
    pub staff_recipient_id: Option<i64>,
    pub notes: Option<String>,
}

impl ConsumeFromBatch {
    pub fn new(batch_id: i64, quantity: Decimal, reason: RemovalReason) -> Self {
        Self {
            batch_id,
            quantity,
            reason,
            staff_recipient_id: None,
            notes: None,
        }
    }
}

/// Quantity to take from one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Draw {
    pub batch_id: i64,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
}

/// Optional fields copied onto the removal record.
#[derive(Debug, Clone, Default)]
pub(crate) struct RemovalDetails {
    pub staff_recipient_id: Option<i64>,
    pub notes: Option<String>,
    pub transfer_id: Option<i64>,
    pub batch_id: Option<i64>,
}

/// Splits `requested` across `batches` in the order given, each draw taking
/// `min(remaining, still_needed)`. `None` when the batches cannot cover it.
pub fn plan_fifo(batches: &[stock_batch::Model], requested: Decimal) -> Option<Vec<Draw>> {
    let mut still_needed = requested;
    let mut draws = Vec::new();

    for batch in batches {
        if still_needed <= Decimal::ZERO {
            break;
        }
        if batch.quantity_remaining <= Decimal::ZERO {
            continue;
        }
        let take = batch.quantity_remaining.min(still_needed);
        draws.push(Draw {
            batch_id: batch.id,
            quantity: take,
            unit_cost: batch.unit_cost,
        });
        still_needed -= take;
    }

    if still_needed > Decimal::ZERO {
        None
    } else {
        Some(draws)
    }
}

#[allow(clippy::too_many_arguments)]
pub(crate) async fn insert_removal(
    txn: &DatabaseTransaction,
    item_id: i64,
    location: Location,
    quantity: Decimal,
    unit_cost: Decimal,
    reason: RemovalReason,
    details: RemovalDetails,
    ctx: &OperationContext,
) -> ServiceResult<stock_removal::Model> {
    let now = Utc::now();
    stock_removal::ActiveModel {
        item_id: Set(item_id),
        location: Set(location),
        quantity_removed: Set(quantity),
        unit_cost: Set(unit_cost),
        total_cost: Set((quantity * unit_cost).round_dp(2)),
        reason: Set(reason),
        batch_id: Set(details.batch_id),
        transfer_id: Set(details.transfer_id),
        staff_recipient_id: Set(details.staff_recipient_id),
        notes: Set(details.notes),
        date_removed: Set(now.date_naive()),
        created_by: Set(ctx.actor_id),
        session_id: Set(ctx.session_id),
        term_id: Set(ctx.term_id),
        created_at: Set(now),
        ..Default::default()
    }
    .insert(txn)
    .await
    .map_err(ServiceError::db_error)
}

/// FIFO removal inside the caller's transaction. The caller holds the item
/// lock; availability comes from the batches, not the cached quantity.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn consume_in_txn(
    txn: &DatabaseTransaction,
    item: &item::Model,
    location: Location,
    quantity: Decimal,
    reason: RemovalReason,
    details: RemovalDetails,
    ctx: &OperationContext,
) -> ServiceResult<stock_removal::Model> {
    ensure_positive(quantity, "quantity")?;

    let batches = batch_store::open_batches(txn, item.id, location).await?;
    let available = batch_store::sum_remaining(&batches);
    if quantity > available {
        return Err(ServiceError::insufficient_stock(item.id, location, quantity, available));
    }

    let draws = plan_fifo(&batches, quantity)
        .ok_or_else(|| ServiceError::insufficient_stock(item.id, location, quantity, available))?;
    let unit_cost = draws
        .first()
        .map(|d| d.unit_cost)
        .ok_or_else(|| ServiceError::InternalError("empty FIFO plan".to_string()))?;

    for draw in &draws {
        let batch = batches
            .iter()
            .find(|b| b.id == draw.batch_id)
            .ok_or_else(|| ServiceError::InternalError(format!("batch {} not in plan", draw.batch_id)))?;
        batch_store::decrement(txn, batch, draw.quantity).await?;
    }
    item_registry::decrease(txn, item.id, location, quantity).await?;

    insert_removal(txn, item.id, location, quantity, unit_cost, reason, details, ctx).await
}

/// Publishes `IntegrityViolation` when a stock movement failed on a broken
/// batch or registry row.
pub(crate) fn flag_integrity(sender: &EventSender, error: &ServiceError, item_id: i64) {
    if let ServiceError::DataIntegrity(message) = error {
        sender.publish(Event::IntegrityViolation {
            item_id: Some(item_id),
            message: message.clone(),
        });
    }
}

pub struct ConsumptionService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: ItemLocks,
}

impl ConsumptionService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, locks: ItemLocks) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    /// Removes stock oldest batch first. Either every batch decrement, the
    /// registry debit and the removal record commit together, or none do.
    #[instrument(skip(self, request, ctx), fields(item_id = request.item_id, location = %request.location, quantity = %request.quantity, reason = %request.reason))]
    pub async fn consume(
        &self,
        request: ConsumeStock,
        ctx: OperationContext,
    ) -> ServiceResult<stock_removal::Model> {
        request.validate()?;

        let _guard = self.locks.acquire(request.item_id).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let item = item_registry::lock_item(&txn, request.item_id).await?;
        let removal = match consume_in_txn(
            &txn,
            &item,
            request.location,
            request.quantity,
            request.reason,
            RemovalDetails {
                staff_recipient_id: request.staff_recipient_id,
                notes: request.notes.clone(),
                ..Default::default()
            },
            &ctx,
        )
        .await
        {
            Ok(removal) => removal,
            Err(e) => {
                self.record_failure(&e, item.id);
                return Err(e);
            }
        };

        db::commit(txn).await?;
        self.after_removal(&item, &removal);
        Ok(removal)
    }

    /// Removes stock from one batch only, for manual corrections.
    #[instrument(skip(self, request, ctx), fields(batch_id = request.batch_id, quantity = %request.quantity, reason = %request.reason))]
    pub async fn consume_from_batch(
        &self,
        request: ConsumeFromBatch,
        ctx: OperationContext,
    ) -> ServiceResult<stock_removal::Model> {
        request.validate()?;
        let item_id = batch_store::find_batch(self.db_pool.as_ref(), request.batch_id)
            .await?
            .item_id;

        let _guard = self.locks.acquire(item_id).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let item = item_registry::lock_item(&txn, item_id).await?;
        let batch = batch_store::find_batch(&txn, request.batch_id).await?;

        if request.quantity > batch.quantity_remaining {
            let e = ServiceError::insufficient_stock(
                item_id,
                batch.location,
                request.quantity,
                batch.quantity_remaining,
            );
            self.record_failure(&e, item_id);
            return Err(e);
        }

        let result = async {
            batch_store::decrement(&txn, &batch, request.quantity).await?;
            item_registry::decrease(&txn, item_id, batch.location, request.quantity).await?;
            insert_removal(
                &txn,
                item_id,
                batch.location,
                request.quantity,
                batch.unit_cost,
                request.reason,
                RemovalDetails {
                    staff_recipient_id: request.staff_recipient_id,
                    notes: request.notes.clone(),
                    batch_id: Some(batch.id),
                    transfer_id: None,
                },
                &ctx,
            )
            .await
        }
        .await;

        let removal = match result {
            Ok(removal) => removal,
            Err(e) => {
                self.record_failure(&e, item_id);
                return Err(e);
            }
        };

        db::commit(txn).await?;
        self.after_removal(&item, &removal);
        Ok(removal)
    }

    fn record_failure(&self, error: &ServiceError, item_id: i64) {
        counter!("stock_ledger.consumption.failed", 1, "code" => error.code());
        flag_integrity(&self.event_sender, error, item_id);
        if let ServiceError::InsufficientStock(message) = error {
            warn!(item_id, %message, "Consumption rejected");
        }
    }

    fn after_removal(&self, item: &item::Model, removal: &stock_removal::Model) {
        counter!("stock_ledger.consumption.completed", 1);
        info!(
            removal_id = removal.id,
            unit_cost = %removal.unit_cost,
            total_cost = %removal.total_cost,
            "Stock consumed"
        );

        self.event_sender.publish(Event::StockConsumed {
            item_id: removal.item_id,
            location: removal.location,
            removal_id: removal.id,
            quantity: removal.quantity_removed,
            unit_cost: removal.unit_cost,
            reason: removal.reason,
        });

        let total_after = item.total_quantity() - removal.quantity_removed;
        if item.is_active && total_after <= item.reorder_level {
            self.event_sender.publish(Event::LowStock {
                item_id: item.id,
                total_quantity: total_after,
                reorder_level: item.reorder_level,
            });
        }
    }
}
