use crate::{
    db::{self, DbPool, ItemLocks},
    entities::{
        item::{self, Entity as Item},
        stock_batch, BatchSource, Location,
    },
    errors::{ServiceError, ServiceResult},
    events::{Event, EventSender},
    services::{
        batch_store::{self, NewBatch},
        item_registry,
        stock_in::{create_receipt, ReceiptHeader},
        OperationContext, ADJUSTMENT_PREFIX,
    },
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::*;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const LOCATIONS: [Location; 2] = [Location::Shop, Location::Store];

/// A location whose cached quantity disagrees with its batches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DriftReport {
    pub item_id: i64,
    pub item_name: String,
    pub location: Location,
    pub registry_quantity: Decimal,
    pub batch_sum: Decimal,
}

impl DriftReport {
    /// Registry minus batch sum; positive when batches are missing.
    pub fn difference(&self) -> Decimal {
        self.registry_quantity - self.batch_sum
    }

    /// Only a registry surplus can be backed by a new batch without
    /// changing the on-hand figure.
    pub fn is_repairable(&self) -> bool {
        self.difference() > Decimal::ZERO
    }
}

/// An adjustment batch written to cover a registry surplus.
#[derive(Debug, Clone, Serialize)]
pub struct DriftCorrection {
    pub item_id: i64,
    pub location: Location,
    pub deficit: Decimal,
    pub unit_cost: Decimal,
    pub receipt_number: String,
    pub batch: stock_batch::Model,
}

fn compare(item: &item::Model, location: Location, batch_sum: Decimal) -> Option<DriftReport> {
    let registry_quantity = item.on_hand(location);
    if registry_quantity == batch_sum {
        return None;
    }
    Some(DriftReport {
        item_id: item.id,
        item_name: item.name.clone(),
        location,
        registry_quantity,
        batch_sum,
    })
}

pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    locks: ItemLocks,
}

impl ReconciliationService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, locks: ItemLocks) -> Self {
        Self {
            db_pool,
            event_sender,
            locks,
        }
    }

    async fn target_items(&self, item_id: Option<i64>) -> ServiceResult<Vec<i64>> {
        let db = self.db_pool.as_ref();
        match item_id {
            Some(id) => Ok(vec![item_registry::load_item(db, id).await?.id]),
            None => {
                let items = Item::find()
                    .filter(item::Column::IsActive.eq(true))
                    .order_by_asc(item::Column::Id)
                    .all(db)
                    .await
                    .map_err(ServiceError::db_error)?;
                Ok(items.into_iter().map(|i| i.id).collect())
            }
        }
    }

    /// Read-only scan for cached quantities that differ from their batch
    /// sums, in either direction.
    #[instrument(skip(self))]
    pub async fn detect_drift(&self, item_id: Option<i64>) -> ServiceResult<Vec<DriftReport>> {
        let db = self.db_pool.as_ref();
        let mut reports = Vec::new();

        for id in self.target_items(item_id).await? {
            // consistent snapshot of item row and batches
            let _guard = self.locks.acquire(id).await?;
            let item = item_registry::load_item(db, id).await?;
            let sums = batch_store::remaining_by_location(db, id).await?;

            for location in LOCATIONS {
                let batch_sum = sums.get(&location).copied().unwrap_or(Decimal::ZERO);
                if let Some(report) = compare(&item, location, batch_sum) {
                    warn!(
                        item_id = id,
                        %location,
                        registry = %report.registry_quantity,
                        batch_sum = %report.batch_sum,
                        "Registry drift"
                    );
                    reports.push(report);
                }
            }
        }

        counter!("stock_ledger.reconciliation.drift_detected", reports.len() as u64);
        Ok(reports)
    }

    /// Backs every registry surplus with an adjustment batch dated today.
    /// On-hand figures never change; a registry below its batch sum is only
    /// reported.
    #[instrument(skip(self, ctx))]
    pub async fn reconcile(
        &self,
        item_id: Option<i64>,
        ctx: OperationContext,
    ) -> ServiceResult<Vec<DriftCorrection>> {
        let mut corrections = Vec::new();
        for id in self.target_items(item_id).await? {
            corrections.extend(self.reconcile_item(id, &ctx).await?);
        }

        info!(corrections = corrections.len(), "Reconciliation finished");
        Ok(corrections)
    }

    async fn reconcile_item(
        &self,
        item_id: i64,
        ctx: &OperationContext,
    ) -> ServiceResult<Vec<DriftCorrection>> {
        let _guard = self.locks.acquire(item_id).await?;
        let txn = db::begin_locked(self.db_pool.as_ref(), self.locks.timeout()).await?;

        let item = item_registry::lock_item(&txn, item_id).await?;
        let today = Utc::now().date_naive();
        let mut corrections = Vec::new();
        let mut unrepairable = Vec::new();

        for location in LOCATIONS {
            let batch_sum = batch_store::available(&txn, item_id, location).await?;
            let Some(report) = compare(&item, location, batch_sum) else {
                continue;
            };

            if !report.is_repairable() {
                warn!(
                    item_id,
                    %location,
                    registry = %report.registry_quantity,
                    batch_sum = %report.batch_sum,
                    "Registry below batch sum; leaving for an operator"
                );
                unrepairable.push(report);
                continue;
            }

            let deficit = report.difference();
            let unit_cost = item_registry::fallback_cost(&txn, &item).await?;
            let receipt = create_receipt(
                &txn,
                ReceiptHeader {
                    prefix: ADJUSTMENT_PREFIX,
                    source: BatchSource::Adjustment,
                    location,
                    date: today,
                    supplier_id: None,
                    purchase_order_id: None,
                    notes: Some(format!(
                        "Reconciliation: registry {} vs batches {}",
                        report.registry_quantity, report.batch_sum
                    )),
                },
                ctx,
            )
            .await?;

            let batch = batch_store::insert_batch(
                &txn,
                NewBatch {
                    receipt_id: receipt.id,
                    item_id,
                    location,
                    received_date: today,
                    unit_cost,
                    quantity: deficit,
                    source: BatchSource::Adjustment,
                    po_line_id: None,
                    transfer_id: None,
                    batch_number: None,
                    expiry_date: None,
                },
            )
            .await?;

            corrections.push(DriftCorrection {
                item_id,
                location,
                deficit,
                unit_cost,
                receipt_number: receipt.receipt_number,
                batch,
            });
        }

        db::commit(txn).await?;

        for correction in &corrections {
            counter!("stock_ledger.reconciliation.corrected", 1);
            info!(
                item_id,
                location = %correction.location,
                deficit = %correction.deficit,
                batch_id = correction.batch.id,
                "Drift corrected"
            );
            self.event_sender.publish(Event::DriftCorrected {
                item_id,
                location: correction.location,
                batch_id: correction.batch.id,
                deficit: correction.deficit,
            });
        }
        for report in unrepairable {
            self.event_sender.publish(Event::DriftDetected {
                item_id,
                location: report.location,
                registry_quantity: report.registry_quantity,
                batch_sum: report.batch_sum,
            });
        }

        Ok(corrections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{ItemLocation, UnitOfMeasure};
    use rust_decimal_macros::dec;

    fn item(shop: Decimal, store: Decimal) -> item::Model {
        item::Model {
            id: 1,
            name: "Soap".into(),
            unit: UnitOfMeasure::Piece,
            location: ItemLocation::Both,
            selling_price: dec!(60),
            shop_quantity: shop,
            store_quantity: store,
            reorder_level: dec!(10),
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn matching_sums_report_nothing() {
        assert!(compare(&item(dec!(4), dec!(0)), Location::Shop, dec!(4)).is_none());
    }

    #[test]
    fn surplus_is_repairable_and_shortfall_is_not() {
        let surplus = compare(&item(dec!(0), dec!(12)), Location::Store, dec!(10)).unwrap();
        assert_eq!(surplus.difference(), dec!(2));
        assert!(surplus.is_repairable());

        let shortfall = compare(&item(dec!(3), dec!(0)), Location::Shop, dec!(5)).unwrap();
        assert_eq!(shortfall.difference(), dec!(-2));
        assert!(!shortfall.is_repairable());
    }
}
