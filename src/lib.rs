//! Stock Ledger Library
//!
//! Batch-tracked inventory for a school's shop and store: stock-in, FIFO
//! stock-out, location transfers and drift reconciliation, each applied as a
//! single locked transaction.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod migrator;
pub mod services;

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::AppConfig;
use crate::db::{DbPool, ItemLocks};
use crate::entities::{item, stock_batch, stock_removal, Location};
use crate::errors::ServiceResult;
use crate::events::{Event, EventSender};
use crate::services::{
    batch_store::BatchStore,
    consumption::{ConsumeFromBatch, ConsumeStock, ConsumptionService},
    item_registry::{ItemRegistry, NewItem},
    reconciliation::{DriftCorrection, DriftReport, ReconciliationService},
    stock_in::{PurchaseOrderReceipt, ReceiveStock, StockInService},
    transfer::{TransferReceipt, TransferRequest, TransferService},
    OperationContext,
};

pub use crate::errors::ServiceError;

/// Every ledger service wired to one pool, one event channel and one lock
/// table. Clones share all three.
#[derive(Clone)]
pub struct StockLedger {
    pub db: Arc<DbPool>,
    pub event_sender: Arc<EventSender>,
    pub locks: ItemLocks,
    pub items: Arc<ItemRegistry>,
    pub batches: Arc<BatchStore>,
    pub stock_in: Arc<StockInService>,
    pub consumption: Arc<ConsumptionService>,
    pub transfers: Arc<TransferService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl StockLedger {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>, lock_timeout: Duration) -> Self {
        let locks = ItemLocks::new(lock_timeout);
        Self {
            items: Arc::new(ItemRegistry::new(db.clone())),
            batches: Arc::new(BatchStore::new(db.clone())),
            stock_in: Arc::new(StockInService::new(
                db.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            consumption: Arc::new(ConsumptionService::new(
                db.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            transfers: Arc::new(TransferService::new(
                db.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            reconciliation: Arc::new(ReconciliationService::new(
                db.clone(),
                event_sender.clone(),
                locks.clone(),
            )),
            db,
            event_sender,
            locks,
        }
    }

    /// Connects using `config`, migrating first when `auto_migrate` is set.
    /// The caller owns the event receiver.
    pub async fn connect(config: &AppConfig) -> ServiceResult<(Self, mpsc::Receiver<Event>)> {
        let pool = db::establish_connection_from_app_config(config).await?;
        if config.auto_migrate {
            db::run_migrations(&pool).await?;
        }

        let (sender, rx) = EventSender::channel(config.event_channel_capacity);
        let ledger = Self::new(Arc::new(pool), Arc::new(sender), config.lock_timeout());
        Ok((ledger, rx))
    }

    pub async fn create_item(&self, new_item: NewItem) -> ServiceResult<item::Model> {
        self.items.create_item(new_item).await
    }

    pub async fn get_on_hand(&self, item_id: i64, location: Location) -> ServiceResult<Decimal> {
        self.items.get_on_hand(item_id, location).await
    }

    pub async fn last_cost_price(&self, item_id: i64) -> ServiceResult<Decimal> {
        self.items.last_cost_price(item_id).await
    }

    pub async fn low_stock(&self) -> ServiceResult<Vec<item::Model>> {
        self.items.low_stock().await
    }

    pub async fn receive(
        &self,
        request: ReceiveStock,
        ctx: OperationContext,
    ) -> ServiceResult<stock_batch::Model> {
        self.stock_in.receive(request, ctx).await
    }

    pub async fn receive_purchase_order(
        &self,
        receipt: PurchaseOrderReceipt,
        ctx: OperationContext,
    ) -> ServiceResult<Vec<stock_batch::Model>> {
        self.stock_in.receive_purchase_order(receipt, ctx).await
    }

    pub async fn record_opening_stock(
        &self,
        item_id: i64,
        location: Location,
        quantity: Decimal,
        ctx: OperationContext,
    ) -> ServiceResult<stock_batch::Model> {
        self.stock_in
            .record_opening_stock(item_id, location, quantity, ctx)
            .await
    }

    pub async fn reverse_batch(
        &self,
        batch_id: i64,
        ctx: OperationContext,
    ) -> ServiceResult<stock_batch::Model> {
        self.stock_in.reverse_batch(batch_id, ctx).await
    }

    pub async fn consume(
        &self,
        request: ConsumeStock,
        ctx: OperationContext,
    ) -> ServiceResult<stock_removal::Model> {
        self.consumption.consume(request, ctx).await
    }

    pub async fn consume_from_batch(
        &self,
        request: ConsumeFromBatch,
        ctx: OperationContext,
    ) -> ServiceResult<stock_removal::Model> {
        self.consumption.consume_from_batch(request, ctx).await
    }

    pub async fn transfer(
        &self,
        request: TransferRequest,
        ctx: OperationContext,
    ) -> ServiceResult<TransferReceipt> {
        self.transfers.transfer(request, ctx).await
    }

    pub async fn reconcile(&self, item_id: Option<i64>) -> ServiceResult<Vec<DriftCorrection>> {
        self.reconciliation
            .reconcile(item_id, OperationContext::system())
            .await
    }

    pub async fn detect_drift(&self, item_id: Option<i64>) -> ServiceResult<Vec<DriftReport>> {
        self.reconciliation.detect_drift(item_id).await
    }
}
