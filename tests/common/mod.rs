#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder};
use stock_ledger::{
    config::AppConfig,
    db,
    entities::{
        item::{self, Entity as Item},
        stock_batch::{self, Entity as StockBatch},
        stock_receipt::Entity as StockReceipt,
        stock_removal::Entity as StockRemoval,
        stock_transfer::Entity as StockTransfer,
        BatchSource, ItemLocation, Location,
    },
    events::{Event, EventSender},
    services::{item_registry::NewItem, stock_in::ReceiveStock, OperationContext},
    StockLedger,
};
use tokio::sync::mpsc;

pub const LOCATIONS: [Location; 2] = [Location::Shop, Location::Store];

/// A ledger over a fresh in-memory SQLite database.
pub struct TestLedger {
    pub ledger: StockLedger,
    pub events: mpsc::Receiver<Event>,
}

/// Everything a failed operation must leave untouched.
#[derive(Debug, PartialEq)]
pub struct Snapshot {
    pub items: Vec<item::Model>,
    pub batches: Vec<stock_batch::Model>,
    pub receipts: u64,
    pub removals: u64,
    pub transfers: u64,
}

pub fn ctx() -> OperationContext {
    OperationContext::actor(1).with_term(2024, 2)
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

impl TestLedger {
    pub async fn new() -> Self {
        Self::with_lock_timeout(2_000).await
    }

    pub async fn with_lock_timeout(lock_timeout_ms: u64) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // one connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.lock_timeout_ms = lock_timeout_ms;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to migrate test database");

        let (sender, events) = EventSender::channel(256);
        let ledger = StockLedger::new(Arc::new(pool), Arc::new(sender), cfg.lock_timeout());

        Self { ledger, events }
    }

    pub async fn item(&self, name: &str, location: ItemLocation) -> item::Model {
        self.ledger
            .create_item(NewItem::new(name, location, Decimal::new(100, 0)))
            .await
            .expect("create item")
    }

    pub async fn receive(
        &self,
        item_id: i64,
        location: Location,
        quantity: Decimal,
        unit_cost: Decimal,
    ) -> stock_batch::Model {
        self.ledger
            .receive(
                ReceiveStock::new(item_id, location, quantity, unit_cost, BatchSource::Purchase),
                ctx(),
            )
            .await
            .expect("receive stock")
    }

    pub async fn receive_on(
        &self,
        item_id: i64,
        location: Location,
        quantity: Decimal,
        unit_cost: Decimal,
        date: NaiveDate,
    ) -> stock_batch::Model {
        self.ledger
            .receive(
                ReceiveStock::new(item_id, location, quantity, unit_cost, BatchSource::Purchase)
                    .received_on(date),
                ctx(),
            )
            .await
            .expect("receive stock")
    }

    pub async fn on_hand(&self, item_id: i64, location: Location) -> Decimal {
        self.ledger
            .get_on_hand(item_id, location)
            .await
            .expect("on hand")
    }

    /// Every batch of the item at `location`, by id.
    pub async fn batches(&self, item_id: i64, location: Location) -> Vec<stock_batch::Model> {
        StockBatch::find()
            .filter(stock_batch::Column::ItemId.eq(item_id))
            .filter(stock_batch::Column::Location.eq(location))
            .order_by_asc(stock_batch::Column::Id)
            .all(self.ledger.db.as_ref())
            .await
            .expect("load batches")
    }

    pub async fn remaining(&self, item_id: i64, location: Location) -> Vec<Decimal> {
        self.batches(item_id, location)
            .await
            .into_iter()
            .map(|b| b.quantity_remaining)
            .collect()
    }

    /// Overwrites a cached quantity behind the ledger's back.
    pub async fn tamper_registry(&self, item_id: i64, location: Location, delta: Decimal) {
        let column = item::quantity_column(location);
        Item::update_many()
            .col_expr(column, Expr::col(column).add(delta))
            .filter(item::Column::Id.eq(item_id))
            .exec(self.ledger.db.as_ref())
            .await
            .expect("tamper registry");
    }

    /// Overwrites a batch's remaining quantity behind the ledger's back.
    pub async fn tamper_batch(&self, batch_id: i64, remaining: Decimal) {
        StockBatch::update_many()
            .col_expr(stock_batch::Column::QuantityRemaining, Expr::value(remaining))
            .filter(stock_batch::Column::Id.eq(batch_id))
            .exec(self.ledger.db.as_ref())
            .await
            .expect("tamper batch");
    }

    pub async fn snapshot(&self) -> Snapshot {
        let db = self.ledger.db.as_ref();
        Snapshot {
            items: Item::find()
                .order_by_asc(item::Column::Id)
                .all(db)
                .await
                .expect("items"),
            batches: StockBatch::find()
                .order_by_asc(stock_batch::Column::Id)
                .all(db)
                .await
                .expect("batches"),
            receipts: StockReceipt::find().count(db).await.expect("receipts"),
            removals: StockRemoval::find().count(db).await.expect("removals"),
            transfers: StockTransfer::find().count(db).await.expect("transfers"),
        }
    }

    /// Registry equals the batch sum at both locations and every batch is
    /// within `0..=received`.
    pub async fn assert_consistent(&self, item_id: i64) {
        for location in LOCATIONS {
            let batches = self.batches(item_id, location).await;
            for batch in &batches {
                assert!(
                    batch.quantity_remaining >= Decimal::ZERO
                        && batch.quantity_remaining <= batch.quantity_received,
                    "batch {} out of bounds: {} of {}",
                    batch.id,
                    batch.quantity_remaining,
                    batch.quantity_received
                );
            }
            let sum: Decimal = batches.iter().map(|b| b.quantity_remaining).sum();
            assert_eq!(
                self.on_hand(item_id, location).await,
                sum,
                "item {} at {}: registry differs from batch sum",
                item_id,
                location
            );
        }
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
