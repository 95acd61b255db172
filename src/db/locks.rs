//! Per-item exclusive locks held for the span of a ledger transaction.
//!
//! Backends without `SELECT ... FOR UPDATE` (SQLite) would otherwise let two
//! writers read the same batch state. Every mutating operation takes the lock
//! for each item it touches before opening its transaction.

use dashmap::DashMap;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::errors::{ServiceError, ServiceResult};

#[derive(Debug, Clone)]
pub struct ItemLocks {
    slots: Arc<DashMap<i64, Arc<Mutex<()>>>>,
    timeout: Duration,
}

/// Held lock on one item; released on drop.
#[derive(Debug)]
pub struct ItemGuard {
    item_id: i64,
    _guard: OwnedMutexGuard<()>,
}

impl ItemGuard {
    pub fn item_id(&self) -> i64 {
        self.item_id
    }
}

/// Locks on several items, taken in ascending id order.
#[derive(Debug)]
pub struct ItemGuards {
    guards: Vec<ItemGuard>,
}

impl ItemGuards {
    pub fn item_ids(&self) -> Vec<i64> {
        self.guards.iter().map(ItemGuard::item_id).collect()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl ItemLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn slot(&self, item_id: i64) -> Arc<Mutex<()>> {
        // the shard guard must not live across an await
        let entry = self
            .slots
            .entry(item_id)
            .or_insert_with(|| Arc::new(Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Waits up to the configured timeout for exclusive access to `item_id`.
    pub async fn acquire(&self, item_id: i64) -> ServiceResult<ItemGuard> {
        let slot = self.slot(item_id);
        match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => {
                debug!(item_id, "item lock acquired");
                Ok(ItemGuard {
                    item_id,
                    _guard: guard,
                })
            }
            Err(_) => {
                counter!("stock_ledger.lock.timeouts", 1);
                warn!(item_id, timeout_ms = self.timeout.as_millis() as u64, "item lock wait timed out");
                Err(ServiceError::ConcurrencyTimeout(format!(
                    "timed out after {}ms waiting for item {}",
                    self.timeout.as_millis(),
                    item_id
                )))
            }
        }
    }

    /// Locks every distinct id in ascending order. Guards already taken are
    /// released if a later wait times out.
    pub async fn acquire_many<I>(&self, item_ids: I) -> ServiceResult<ItemGuards>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut ids: Vec<i64> = item_ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();

        let mut guards = Vec::with_capacity(ids.len());
        for id in ids {
            guards.push(self.acquire(id).await?);
        }
        Ok(ItemGuards { guards })
    }
}
